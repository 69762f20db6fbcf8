//! Progress reporting.
//!
//! This module defines the CopyObserver trait, which decouples the engine
//! from whatever consumes its progress (a terminal, a GUI event loop, a test).
//! Observer methods are called on worker threads; moving updates onto a
//! particular thread is the observer's job. A `crossbeam_channel::Sender` of
//! `CopyEvent` is an observer out of the box.
//!
//! `ProgressAggregator` merges per-worker byte counters into one overall
//! percentage and forwards each update to the observer.

use crate::model::{ByteRange, JobReport, WorkerReport};
use crossbeam_channel::Sender;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

/// Overall progress of a job at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    /// Bytes written across all segments
    pub bytes_copied: u64,
    pub total_bytes: u64,
    /// `bytes_copied / total_bytes * 100`, clamped to [0, 100]
    pub percent: f64,
}

impl ProgressSnapshot {
    pub fn new(bytes_copied: u64, total_bytes: u64) -> Self {
        ProgressSnapshot {
            bytes_copied,
            total_bytes,
            percent: percent_of(bytes_copied, total_bytes),
        }
    }
}

/// Percentage of `total` represented by `copied`. An empty file counts as
/// fully copied.
pub fn percent_of(copied: u64, total: u64) -> f64 {
    if total == 0 {
        return 100.0;
    }
    (copied as f64 * 100.0 / total as f64).clamp(0.0, 100.0)
}

/// One progress step reported by a worker.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub worker_index: usize,
    /// Bytes this worker has copied so far
    pub worker_bytes: u64,
    pub overall: ProgressSnapshot,
}

/// Trait for receiving events from a running copy job.
///
/// All methods may be called from worker or supervisor threads. Only
/// `on_progress` is required.
pub trait CopyObserver: Send + Sync {
    /// Called once from the job's supervisor thread, before any worker
    /// starts. `start()` may already have returned.
    fn on_job_started(&self, _job_id: Uuid, _ranges: &[ByteRange]) {}

    /// Called after every block a worker writes.
    fn on_progress(&self, update: ProgressUpdate);

    /// Called when a worker exits, whatever its final status.
    fn on_worker_finished(&self, _report: &WorkerReport) {}

    /// Called exactly once, when the job resolves.
    fn on_job_finished(&self, _report: &JobReport) {}
}

/// Observer that discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl CopyObserver for NoopObserver {
    fn on_progress(&self, _update: ProgressUpdate) {}
}

/// Events forwarded by the channel observer.
#[derive(Debug, Clone)]
pub enum CopyEvent {
    JobStarted { job_id: Uuid, ranges: Vec<ByteRange> },
    Progress(ProgressUpdate),
    WorkerFinished(WorkerReport),
    JobFinished(JobReport),
}

impl CopyObserver for Sender<CopyEvent> {
    fn on_job_started(&self, job_id: Uuid, ranges: &[ByteRange]) {
        let _ = self.send(CopyEvent::JobStarted {
            job_id,
            ranges: ranges.to_vec(),
        });
    }

    fn on_progress(&self, update: ProgressUpdate) {
        let _ = self.send(CopyEvent::Progress(update));
    }

    fn on_worker_finished(&self, report: &WorkerReport) {
        let _ = self.send(CopyEvent::WorkerFinished(report.clone()));
    }

    fn on_job_finished(&self, report: &JobReport) {
        let _ = self.send(CopyEvent::JobFinished(report.clone()));
    }
}

/// Thread-safe sink merging per-worker counters into overall progress.
///
/// The observer is called after the counter lock is released, so a slow
/// observer never stalls other workers or `snapshot()`. Each worker's own
/// updates arrive in order; updates from different workers may interleave,
/// so the overall byte count of consecutive events is not ordered.
pub struct ProgressAggregator {
    total_bytes: u64,
    per_worker: Mutex<Vec<u64>>,
    observer: Arc<dyn CopyObserver>,
}

impl ProgressAggregator {
    pub fn new(total_bytes: u64, worker_count: usize, observer: Arc<dyn CopyObserver>) -> Self {
        ProgressAggregator {
            total_bytes,
            per_worker: Mutex::new(vec![0; worker_count]),
            observer,
        }
    }

    fn counters(&self) -> MutexGuard<'_, Vec<u64>> {
        self.per_worker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add `bytes_delta` to worker `worker_index` and notify the observer.
    ///
    /// Returns `None` for an unknown worker index.
    pub fn record(&self, worker_index: usize, bytes_delta: u64) -> Option<ProgressUpdate> {
        let update = {
            let mut counters = self.counters();
            let slot = counters.get_mut(worker_index)?;
            *slot = slot.saturating_add(bytes_delta);
            let worker_bytes = *slot;
            let copied = counters.iter().sum();
            ProgressUpdate {
                worker_index,
                worker_bytes,
                overall: ProgressSnapshot::new(copied, self.total_bytes),
            }
        };
        self.observer.on_progress(update);
        Some(update)
    }

    /// Current overall progress.
    pub fn snapshot(&self) -> ProgressSnapshot {
        let copied = self.counters().iter().sum();
        ProgressSnapshot::new(copied, self.total_bytes)
    }

    /// Bytes recorded so far for one worker.
    pub fn worker_bytes(&self, worker_index: usize) -> Option<u64> {
        self.counters().get(worker_index).copied()
    }
}

impl std::fmt::Debug for ProgressAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressAggregator")
            .field("total_bytes", &self.total_bytes)
            .field("per_worker", &*self.counters())
            .finish_non_exhaustive()
    }
}
