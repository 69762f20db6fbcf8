//! Core data model for chunked copy jobs.
//!
//! This module defines the main data structures:
//! - FileCopyJob: the immutable description of one copy request
//! - ByteRange: the slice of the source assigned to one worker
//! - WorkerState / WorkerStatus: per-worker progress and lifecycle
//! - WorkerReport, JobOutcome, JobReport: terminal results

use crate::error::{EngineError, WorkerError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use uuid::Uuid;

/// A request to copy one source file into `worker_count` segment files.
///
/// Immutable once built; the orchestrator only ever reads it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileCopyJob {
    source_path: PathBuf,
    destination_directory: PathBuf,
    worker_count: usize,
    file_size_bytes: u64,
}

impl FileCopyJob {
    /// Build a job from explicit parameters. Nothing is checked here;
    /// `CopyOrchestrator::start` validates the job against the filesystem.
    pub fn new(
        source_path: impl Into<PathBuf>,
        destination_directory: impl Into<PathBuf>,
        worker_count: usize,
        file_size_bytes: u64,
    ) -> Self {
        FileCopyJob {
            source_path: source_path.into(),
            destination_directory: destination_directory.into(),
            worker_count,
            file_size_bytes,
        }
    }

    /// Build a job whose size is read from the source file's metadata.
    ///
    /// # Errors
    /// Returns `SourceNotFound`, `SourceNotAFile` or `SourceUnreadable` if the
    /// source cannot be inspected.
    pub fn from_source<P: AsRef<Path>, Q: AsRef<Path>>(
        source_path: P,
        destination_directory: Q,
        worker_count: usize,
    ) -> Result<Self, EngineError> {
        let source = source_path.as_ref();
        let metadata = match std::fs::metadata(source) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(EngineError::SourceNotFound {
                    path: source.to_path_buf(),
                });
            }
            Err(e) => {
                return Err(EngineError::SourceUnreadable {
                    path: source.to_path_buf(),
                    source: e,
                });
            }
        };
        if !metadata.is_file() {
            return Err(EngineError::SourceNotAFile {
                path: source.to_path_buf(),
            });
        }

        Ok(Self::new(
            source,
            destination_directory.as_ref(),
            worker_count,
            metadata.len(),
        ))
    }

    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    pub fn destination_directory(&self) -> &Path {
        &self.destination_directory
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    pub fn file_size_bytes(&self) -> u64 {
        self.file_size_bytes
    }
}

/// A contiguous span `[start_offset, end_offset_exclusive)` of the source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ByteRange {
    pub start_offset: u64,
    pub end_offset_exclusive: u64,
    pub worker_index: usize,
}

impl ByteRange {
    /// Number of bytes in this range.
    pub fn len(&self) -> u64 {
        self.end_offset_exclusive - self.start_offset
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Lifecycle of a single worker.
///
/// Running may move to Paused and back; Cancelled, Completed and Failed are
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkerStatus {
    /// Copying blocks
    Running,
    /// Blocked on the pause gate
    Paused,
    /// Stopped early after observing cancellation
    Cancelled,
    /// Every byte of the range was copied
    Completed,
    /// A read or write failed; the range is partially copied
    Failed,
}

impl WorkerStatus {
    /// Returns true if this status is terminal (no further changes expected).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkerStatus::Cancelled | WorkerStatus::Completed | WorkerStatus::Failed
        )
    }
}

impl std::fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkerStatus::Running => write!(f, "Running"),
            WorkerStatus::Paused => write!(f, "Paused"),
            WorkerStatus::Cancelled => write!(f, "Cancelled"),
            WorkerStatus::Completed => write!(f, "Completed"),
            WorkerStatus::Failed => write!(f, "Failed"),
        }
    }
}

/// Snapshot of one worker's progress.
///
/// Only the owning worker mutates the live value; everyone else receives
/// clones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerState {
    pub range: ByteRange,
    pub bytes_copied: u64,
    pub status: WorkerStatus,
    pub error: Option<WorkerError>,
}

impl WorkerState {
    pub fn new(range: ByteRange) -> Self {
        WorkerState {
            range,
            bytes_copied: 0,
            status: WorkerStatus::Running,
            error: None,
        }
    }
}

/// Final state of a worker together with the segment it wrote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerReport {
    pub worker_index: usize,
    pub segment_path: PathBuf,
    pub state: WorkerState,
}

/// A failed worker as surfaced in an aggregate `JobOutcome::Failed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerFailure {
    pub worker_index: usize,
    pub error: WorkerError,
}

/// The single terminal result of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobOutcome {
    /// Every worker completed its range
    Completed,
    /// Cancellation was requested and at least one worker stopped early
    Cancelled,
    /// One or more workers failed; carries every failure in worker order
    Failed(Vec<WorkerFailure>),
}

impl JobOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, JobOutcome::Completed)
    }
}

impl std::fmt::Display for JobOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobOutcome::Completed => write!(f, "Completed"),
            JobOutcome::Cancelled => write!(f, "Cancelled"),
            JobOutcome::Failed(failures) => write!(f, "Failed ({} workers)", failures.len()),
        }
    }
}

/// Everything known about a job once it has resolved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobReport {
    /// Unique identifier assigned at start
    pub job_id: Uuid,
    pub outcome: JobOutcome,
    /// Per-worker final states, ordered by worker index
    pub workers: Vec<WorkerReport>,
    pub file_size_bytes: u64,
    /// Bytes written across all segments
    pub bytes_copied: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl JobReport {
    /// Wall-clock time between start and resolution.
    pub fn elapsed(&self) -> Duration {
        (self.finished_at - self.started_at)
            .to_std()
            .unwrap_or_default()
    }

    /// Segment paths in worker-index order, i.e. concatenation order.
    pub fn segment_paths(&self) -> Vec<&Path> {
        self.workers.iter().map(|w| w.segment_path.as_path()).collect()
    }
}
