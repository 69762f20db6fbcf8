//! Copy worker.
//!
//! A `CopyWorker` copies one `ByteRange` of the source into its own segment
//! file. Each worker opens its own read handle, so no two workers ever share
//! a seek position. Between blocks the worker passes the job's pause gate,
//! which is also where it observes cancellation. I/O errors end only this
//! worker; they are recorded on its state and returned in its report.

use crate::control::{CancellationSignal, Checkpoint, PauseGate};
use crate::error::{WorkerError, WorkerErrorKind};
use crate::model::{ByteRange, WorkerReport, WorkerState, WorkerStatus};
use crate::progress::ProgressAggregator;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, warn};

/// Job-wide collaborators handed to every worker.
#[derive(Debug, Clone)]
pub struct WorkerContext {
    pub block_size: usize,
    pub gate: PauseGate,
    pub cancel: CancellationSignal,
    pub progress: Arc<ProgressAggregator>,
}

/// Read-only view of a worker's published state.
#[derive(Debug, Clone)]
pub struct WorkerMonitor {
    published: Arc<Mutex<WorkerState>>,
}

impl WorkerMonitor {
    /// Latest state published by the worker.
    pub fn snapshot(&self) -> WorkerState {
        self.published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Copies one byte range into one segment file.
#[derive(Debug)]
pub struct CopyWorker {
    source_path: PathBuf,
    segment_path: PathBuf,
    state: WorkerState,
    published: Arc<Mutex<WorkerState>>,
}

impl CopyWorker {
    pub fn new(
        range: ByteRange,
        source_path: impl Into<PathBuf>,
        segment_path: impl Into<PathBuf>,
    ) -> Self {
        let state = WorkerState::new(range);
        CopyWorker {
            source_path: source_path.into(),
            segment_path: segment_path.into(),
            published: Arc::new(Mutex::new(state.clone())),
            state,
        }
    }

    pub fn range(&self) -> ByteRange {
        self.state.range
    }

    pub fn monitor(&self) -> WorkerMonitor {
        WorkerMonitor {
            published: Arc::clone(&self.published),
        }
    }

    fn publish(&self) {
        let mut published = self.published.lock().unwrap_or_else(PoisonError::into_inner);
        *published = self.state.clone();
    }

    /// Open the source and segment files and copy the range.
    ///
    /// Never fails: errors are recorded on the returned report with status
    /// `Failed`. A zero-length range completes without touching either file.
    pub fn run(mut self, ctx: &WorkerContext) -> WorkerReport {
        let range = self.state.range;
        debug!(
            worker = range.worker_index,
            start = range.start_offset,
            end = range.end_offset_exclusive,
            "Worker started"
        );

        let status = match self.open_and_copy(ctx) {
            Ok(status) => status,
            Err(err) => {
                warn!(worker = range.worker_index, error = %err, "Worker failed");
                self.state.error = Some(err);
                WorkerStatus::Failed
            }
        };
        self.state.status = status;
        self.publish();

        debug!(
            worker = range.worker_index,
            bytes = self.state.bytes_copied,
            status = %status,
            "Worker finished"
        );

        WorkerReport {
            worker_index: range.worker_index,
            segment_path: self.segment_path,
            state: self.state,
        }
    }

    fn open_and_copy(&mut self, ctx: &WorkerContext) -> Result<WorkerStatus, WorkerError> {
        if self.state.range.is_empty() {
            return Ok(WorkerStatus::Completed);
        }

        let mut source = File::open(&self.source_path)
            .map_err(|e| WorkerError::from_io(WorkerErrorKind::Open, &self.source_path, &e))?;
        let mut segment = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&self.segment_path)
            .map_err(|e| WorkerError::from_io(WorkerErrorKind::Open, &self.segment_path, &e))?;

        self.copy_range(&mut source, &mut segment, ctx)
    }

    /// Copy the worker's range from `source` into `segment`, block by block.
    ///
    /// `source` is positioned at the range start first. After each block is
    /// fully written the progress sink is updated, then the pause gate is
    /// passed; cancellation is only observed there, so a block is never
    /// abandoned half-written.
    pub fn copy_range<R: Read + Seek, W: Write>(
        &mut self,
        source: &mut R,
        segment: &mut W,
        ctx: &WorkerContext,
    ) -> Result<WorkerStatus, WorkerError> {
        let range = self.state.range;
        let mut remaining = range.len();
        if remaining == 0 {
            return Ok(WorkerStatus::Completed);
        }

        source
            .seek(SeekFrom::Start(range.start_offset))
            .map_err(|e| WorkerError::from_io(WorkerErrorKind::Read, &self.source_path, &e))?;

        let clamp = |n: u64| usize::try_from(n).unwrap_or(usize::MAX);
        let mut buffer = vec![0u8; ctx.block_size.max(1).min(clamp(remaining))];

        let mut status = self.pass_gate(ctx);
        while status == WorkerStatus::Running {
            let want = buffer.len().min(clamp(remaining));
            let read = match source.read(&mut buffer[..want]) {
                Ok(0) => {
                    return Err(WorkerError::new(
                        WorkerErrorKind::UnexpectedEof,
                        &self.source_path,
                        format!("source ended with {} bytes of the range unread", remaining),
                    ));
                }
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    return Err(WorkerError::from_io(WorkerErrorKind::Read, &self.source_path, &e));
                }
            };

            segment
                .write_all(&buffer[..read])
                .map_err(|e| WorkerError::from_io(WorkerErrorKind::Write, &self.segment_path, &e))?;

            remaining -= read as u64;
            self.state.bytes_copied += read as u64;
            self.publish();
            ctx.progress.record(range.worker_index, read as u64);

            status = if remaining == 0 {
                WorkerStatus::Completed
            } else {
                self.pass_gate(ctx)
            };
        }

        segment
            .flush()
            .map_err(|e| WorkerError::from_io(WorkerErrorKind::Write, &self.segment_path, &e))?;
        Ok(status)
    }

    /// Returns `Running` to keep copying or `Cancelled` to stop.
    fn pass_gate(&mut self, ctx: &WorkerContext) -> WorkerStatus {
        if ctx.cancel.is_cancelled() {
            return WorkerStatus::Cancelled;
        }
        let checkpoint = ctx.gate.checkpoint(|suspended| {
            self.state.status = if suspended {
                WorkerStatus::Paused
            } else {
                WorkerStatus::Running
            };
            self.publish();
        });
        match checkpoint {
            Checkpoint::Continue => WorkerStatus::Running,
            Checkpoint::Cancelled => WorkerStatus::Cancelled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::job_controls;
    use crate::planner::partition;
    use crate::progress::NoopObserver;
    use std::io::Cursor;
    use std::thread;
    use std::time::{Duration, Instant};

    fn context(total_bytes: u64, workers: usize, block_size: usize) -> WorkerContext {
        let (gate, cancel) = job_controls();
        WorkerContext {
            block_size,
            gate,
            cancel,
            progress: Arc::new(ProgressAggregator::new(total_bytes, workers, Arc::new(NoopObserver))),
        }
    }

    fn sample_data(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    // Test helper: accepts `limit` bytes, then fails every write
    struct FailingWriter {
        limit: usize,
        written: Vec<u8>,
    }

    impl Write for FailingWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.written.len() >= self.limit {
                return Err(io::Error::new(io::ErrorKind::Other, "disk full"));
            }
            let n = buf.len().min(self.limit - self.written.len());
            self.written.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_copy_range_copies_exact_slice() {
        let data = sample_data(1000);
        let ranges = partition(1000, 3).expect("Failed to partition");
        let ctx = context(1000, 3, 64);

        for range in ranges {
            let mut worker = CopyWorker::new(range, "source.bin", "segment.dat");
            assert_eq!(worker.range(), range);
            let mut segment = Vec::new();
            let status = worker
                .copy_range(&mut Cursor::new(&data), &mut segment, &ctx)
                .expect("Copy should succeed");

            assert_eq!(status, WorkerStatus::Completed);
            let start = range.start_offset as usize;
            let end = range.end_offset_exclusive as usize;
            assert_eq!(segment, &data[start..end]);
            assert_eq!(worker.monitor().snapshot().bytes_copied, range.len());
        }
        assert_eq!(ctx.progress.snapshot().percent, 100.0);
    }

    #[test]
    fn test_zero_length_range_completes_without_files() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let range = ByteRange {
            start_offset: 3,
            end_offset_exclusive: 3,
            worker_index: 0,
        };
        let worker = CopyWorker::new(
            range,
            temp_dir.path().join("does-not-exist"),
            temp_dir.path().join("Part_0.dat"),
        );
        let report = worker.run(&context(3, 1, 4096));

        assert_eq!(report.state.status, WorkerStatus::Completed);
        assert_eq!(report.state.bytes_copied, 0);
        assert!(report.state.error.is_none());
    }

    #[test]
    fn test_write_failure_marks_worker_failed() {
        let data = sample_data(256);
        let range = ByteRange {
            start_offset: 0,
            end_offset_exclusive: 256,
            worker_index: 0,
        };
        let ctx = context(256, 1, 32);
        let mut worker = CopyWorker::new(range, "source.bin", "Part_0.dat");
        let mut segment = FailingWriter {
            limit: 100,
            written: Vec::new(),
        };

        let err = worker
            .copy_range(&mut Cursor::new(&data), &mut segment, &ctx)
            .expect_err("Copy should fail");
        assert_eq!(err.kind, WorkerErrorKind::Write);
        assert_eq!(err.path, PathBuf::from("Part_0.dat"));
        // Only fully written blocks are counted
        assert_eq!(worker.monitor().snapshot().bytes_copied, 96);
    }

    #[test]
    fn test_short_source_is_unexpected_eof() {
        let data = sample_data(50);
        let range = ByteRange {
            start_offset: 0,
            end_offset_exclusive: 100,
            worker_index: 0,
        };
        let ctx = context(100, 1, 16);
        let mut worker = CopyWorker::new(range, "source.bin", "Part_0.dat");
        let mut segment = Vec::new();

        let err = worker
            .copy_range(&mut Cursor::new(&data), &mut segment, &ctx)
            .expect_err("Copy should fail");
        assert_eq!(err.kind, WorkerErrorKind::UnexpectedEof);
        assert_eq!(segment.len(), 50);
    }

    #[test]
    fn test_cancel_before_start_copies_nothing() {
        let data = sample_data(100);
        let range = ByteRange {
            start_offset: 0,
            end_offset_exclusive: 100,
            worker_index: 0,
        };
        let ctx = context(100, 1, 10);
        ctx.cancel.cancel();

        let mut worker = CopyWorker::new(range, "source.bin", "Part_0.dat");
        let mut segment = Vec::new();
        let status = worker
            .copy_range(&mut Cursor::new(&data), &mut segment, &ctx)
            .expect("Cancellation is not an error");

        assert_eq!(status, WorkerStatus::Cancelled);
        assert!(segment.is_empty());
    }

    #[test]
    fn test_run_records_open_failure() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let range = ByteRange {
            start_offset: 0,
            end_offset_exclusive: 10,
            worker_index: 2,
        };
        let worker = CopyWorker::new(
            range,
            temp_dir.path().join("missing.bin"),
            temp_dir.path().join("Part_2.dat"),
        );
        let monitor = worker.monitor();
        let report = worker.run(&context(10, 3, 4096));

        assert_eq!(report.worker_index, 2);
        assert_eq!(report.state.status, WorkerStatus::Failed);
        let error = report.state.error.expect("Expected an error");
        assert_eq!(error.kind, WorkerErrorKind::Open);
        assert_eq!(monitor.snapshot().status, WorkerStatus::Failed);
    }

    #[test]
    fn test_paused_worker_reports_paused_and_resumes() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("source.bin");
        let data = sample_data(4096);
        std::fs::write(&src, &data).expect("Failed to write source");

        let range = ByteRange {
            start_offset: 0,
            end_offset_exclusive: 4096,
            worker_index: 0,
        };
        let ctx = context(4096, 1, 512);
        ctx.gate.pause();

        let segment = temp_dir.path().join("Part_0.dat");
        let worker = CopyWorker::new(range, &src, &segment);
        let monitor = worker.monitor();
        let worker_ctx = ctx.clone();
        let handle = thread::spawn(move || worker.run(&worker_ctx));

        let deadline = Instant::now() + Duration::from_secs(5);
        while monitor.snapshot().status != WorkerStatus::Paused {
            assert!(Instant::now() < deadline, "Worker never paused");
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(monitor.snapshot().bytes_copied, 0);

        ctx.gate.resume();
        let report = handle.join().expect("Worker panicked");
        assert_eq!(report.state.status, WorkerStatus::Completed);
        assert_eq!(std::fs::read(&segment).expect("Failed to read segment"), data);
    }
}
