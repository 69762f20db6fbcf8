//! Job orchestration module.
//!
//! This module provides the job lifecycle:
//! - Validating a job against the filesystem
//! - Planning ranges and creating one segment file per worker
//! - Spawning workers and a supervisor that resolves the terminal result
//! - Pause, resume and cancel through the returned `JobHandle`

use crate::config::CopyConfig;
use crate::control::{job_controls, CancellationSignal, PauseGate};
use crate::error::{ControlError, EngineError, WorkerError, WorkerErrorKind};
use crate::model::{
    ByteRange, FileCopyJob, JobOutcome, JobReport, WorkerFailure, WorkerReport, WorkerState,
    WorkerStatus,
};
use crate::planner;
use crate::progress::{CopyObserver, ProgressAggregator, ProgressSnapshot};
use crate::worker::{CopyWorker, WorkerContext, WorkerMonitor};
use chrono::{DateTime, Utc};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use std::any::Any;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Starts copy jobs with a shared configuration.
#[derive(Debug, Clone, Default)]
pub struct CopyOrchestrator {
    config: CopyConfig,
}

impl CopyOrchestrator {
    pub fn new(config: CopyConfig) -> Self {
        CopyOrchestrator { config }
    }

    pub fn config(&self) -> &CopyConfig {
        &self.config
    }

    /// Validate `job`, create its segment files and start every worker.
    ///
    /// Returns as soon as the workers are spawned; the terminal result is
    /// obtained from the handle. `observer` receives progress from worker
    /// threads.
    ///
    /// # Errors
    /// Returns a validation `EngineError` if the configuration or job is
    /// invalid or the destination cannot be written. In that case no worker
    /// was spawned and no segment file remains.
    pub fn start<O: CopyObserver + 'static>(
        &self,
        job: FileCopyJob,
        observer: O,
    ) -> Result<JobHandle, EngineError> {
        self.config.validate()?;
        validate_job(&job)?;

        let ranges = planner::partition(job.file_size_bytes(), job.worker_count())?;
        let segment_paths = create_segments(&job, &self.config)?;

        let job_id = Uuid::new_v4();
        let started_at = Utc::now();
        let observer: Arc<dyn CopyObserver> = Arc::new(observer);
        let (gate, cancel) = job_controls();
        let progress = Arc::new(ProgressAggregator::new(
            job.file_size_bytes(),
            job.worker_count(),
            Arc::clone(&observer),
        ));

        info!(
            job_id = %job_id,
            source = %job.source_path().display(),
            destination = %job.destination_directory().display(),
            workers = job.worker_count(),
            bytes = job.file_size_bytes(),
            "Copy job started"
        );

        let ctx = WorkerContext {
            block_size: self.config.block_size,
            gate: gate.clone(),
            cancel: cancel.clone(),
            progress: Arc::clone(&progress),
        };

        let workers: Vec<CopyWorker> = ranges
            .iter()
            .zip(&segment_paths)
            .map(|(range, segment_path)| CopyWorker::new(*range, job.source_path(), segment_path))
            .collect();
        let monitors: Vec<WorkerMonitor> = workers.iter().map(CopyWorker::monitor).collect();

        // The supervisor announces the job and spawns the workers, so start()
        // never calls into the observer on the caller's thread.
        let (completion_tx, completion) = bounded(1);
        let finished = Arc::new(AtomicBool::new(false));
        let supervisor = {
            let monitors = monitors.clone();
            let segment_paths = segment_paths.clone();
            let ranges = ranges.clone();
            let finished = Arc::clone(&finished);
            let file_size = job.file_size_bytes();
            thread::spawn(move || {
                observer.on_job_started(job_id, &ranges);

                let handles: Vec<JoinHandle<WorkerReport>> = workers
                    .into_iter()
                    .map(|worker| {
                        let ctx = ctx.clone();
                        let observer = Arc::clone(&observer);
                        thread::spawn(move || {
                            let report = worker.run(&ctx);
                            observer.on_worker_finished(&report);
                            report
                        })
                    })
                    .collect();
                drop(ctx);

                let reports = handles
                    .into_iter()
                    .zip(monitors.iter().zip(segment_paths))
                    .map(|(handle, (monitor, segment_path))| match handle.join() {
                        Ok(report) => report,
                        Err(panic) => panicked_report(monitor, segment_path, panic),
                    })
                    .collect();

                let report = build_report(job_id, file_size, started_at, reports);
                info!(
                    job_id = %job_id,
                    outcome = %report.outcome,
                    bytes = report.bytes_copied,
                    elapsed_ms = report.elapsed().as_millis() as u64,
                    "Copy job finished"
                );

                finished.store(true, Ordering::SeqCst);
                let _ = completion_tx.send(report.clone());
                observer.on_job_finished(&report);
            })
        };

        Ok(JobHandle {
            job_id,
            job,
            ranges,
            segment_paths,
            started_at,
            gate,
            cancel,
            progress,
            monitors,
            finished,
            completion,
            report: None,
            supervisor: Some(supervisor),
        })
    }
}

/// Orchestrator-side handle for one in-flight job.
///
/// Control methods never block. `wait` blocks until every worker has exited
/// and returns the terminal report, which the supervisor delivers exactly
/// once.
#[derive(Debug)]
pub struct JobHandle {
    job_id: Uuid,
    job: FileCopyJob,
    ranges: Vec<ByteRange>,
    segment_paths: Vec<PathBuf>,
    started_at: DateTime<Utc>,
    gate: PauseGate,
    cancel: CancellationSignal,
    progress: Arc<ProgressAggregator>,
    monitors: Vec<WorkerMonitor>,
    finished: Arc<AtomicBool>,
    completion: Receiver<JobReport>,
    report: Option<JobReport>,
    supervisor: Option<JoinHandle<()>>,
}

impl JobHandle {
    pub fn id(&self) -> Uuid {
        self.job_id
    }

    pub fn job(&self) -> &FileCopyJob {
        &self.job
    }

    pub fn ranges(&self) -> &[ByteRange] {
        &self.ranges
    }

    /// Segment paths in worker-index order.
    pub fn segment_paths(&self) -> &[PathBuf] {
        &self.segment_paths
    }

    /// Suspend every worker after its in-flight block.
    ///
    /// Pausing a paused job is accepted and changes nothing.
    pub fn pause(&self) -> Result<(), ControlError> {
        self.check_controllable()?;
        if self.gate.pause() {
            debug!(job_id = %self.job_id, "Job paused");
        }
        Ok(())
    }

    /// Let suspended workers continue.
    ///
    /// Resuming a running job is accepted and changes nothing.
    pub fn resume(&self) -> Result<(), ControlError> {
        self.check_controllable()?;
        if self.gate.resume() {
            debug!(job_id = %self.job_id, "Job resumed");
        }
        Ok(())
    }

    /// Ask every worker to stop after its in-flight block. Returns without
    /// waiting for them.
    pub fn cancel(&self) -> Result<(), ControlError> {
        if self.is_finished() {
            return Err(ControlError::JobFinished);
        }
        if self.cancel.cancel() {
            info!(job_id = %self.job_id, "Job cancellation requested");
        }
        Ok(())
    }

    fn check_controllable(&self) -> Result<(), ControlError> {
        if self.is_finished() {
            return Err(ControlError::JobFinished);
        }
        if self.cancel.is_cancelled() {
            return Err(ControlError::Cancelling);
        }
        Ok(())
    }

    pub fn is_paused(&self) -> bool {
        self.gate.is_paused()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// True once every worker has exited and the result is resolved.
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    /// Current overall progress.
    pub fn progress(&self) -> ProgressSnapshot {
        self.progress.snapshot()
    }

    /// Snapshots of every worker's state, in worker-index order.
    pub fn worker_states(&self) -> Vec<WorkerState> {
        self.monitors.iter().map(WorkerMonitor::snapshot).collect()
    }

    /// Wait up to `timeout` for the terminal report.
    pub fn wait_timeout(&mut self, timeout: Duration) -> Option<&JobReport> {
        if self.report.is_none() {
            match self.completion.recv_timeout(timeout) {
                Ok(report) => self.report = Some(report),
                Err(RecvTimeoutError::Timeout) => return None,
                Err(RecvTimeoutError::Disconnected) => self.report = Some(self.abandoned_report()),
            }
        }
        self.report.as_ref()
    }

    /// Block until the job resolves and return its report.
    pub fn wait(mut self) -> JobReport {
        let report = match self.report.take() {
            Some(report) => report,
            None => match self.completion.recv() {
                Ok(report) => report,
                Err(_) => self.abandoned_report(),
            },
        };
        if let Some(supervisor) = self.supervisor.take() {
            let _ = supervisor.join();
        }
        report
    }

    /// Report assembled from worker monitors when the supervisor exited
    /// without delivering one.
    fn abandoned_report(&self) -> JobReport {
        warn!(job_id = %self.job_id, "Supervisor exited without a result");
        let reports = self
            .monitors
            .iter()
            .zip(&self.segment_paths)
            .map(|(monitor, segment_path)| {
                let mut state = monitor.snapshot();
                if !state.status.is_terminal() {
                    state.status = WorkerStatus::Failed;
                    state.error = Some(WorkerError::new(
                        WorkerErrorKind::Panicked,
                        segment_path,
                        "supervisor exited before the worker finished",
                    ));
                }
                WorkerReport {
                    worker_index: state.range.worker_index,
                    segment_path: segment_path.clone(),
                    state,
                }
            })
            .collect();
        build_report(self.job_id, self.job.file_size_bytes(), self.started_at, reports)
    }
}

/// Resolve the terminal outcome from every worker's final state.
///
/// Any failure makes the job Failed, carrying every failed worker's error;
/// otherwise any cancelled worker makes it Cancelled; otherwise Completed.
pub fn resolve_outcome(workers: &[WorkerReport]) -> JobOutcome {
    let failures: Vec<WorkerFailure> = workers
        .iter()
        .filter(|w| w.state.status == WorkerStatus::Failed)
        .map(|w| WorkerFailure {
            worker_index: w.worker_index,
            error: w.state.error.clone().unwrap_or_else(|| {
                WorkerError::new(WorkerErrorKind::Read, &w.segment_path, "unknown error")
            }),
        })
        .collect();

    if !failures.is_empty() {
        JobOutcome::Failed(failures)
    } else if workers.iter().any(|w| w.state.status == WorkerStatus::Cancelled) {
        JobOutcome::Cancelled
    } else {
        JobOutcome::Completed
    }
}

fn build_report(
    job_id: Uuid,
    file_size_bytes: u64,
    started_at: DateTime<Utc>,
    mut workers: Vec<WorkerReport>,
) -> JobReport {
    workers.sort_by_key(|w| w.worker_index);
    JobReport {
        job_id,
        outcome: resolve_outcome(&workers),
        bytes_copied: workers.iter().map(|w| w.state.bytes_copied).sum(),
        workers,
        file_size_bytes,
        started_at,
        finished_at: Utc::now(),
    }
}

fn panicked_report(
    monitor: &WorkerMonitor,
    segment_path: PathBuf,
    panic: Box<dyn Any + Send>,
) -> WorkerReport {
    let message = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "worker panicked".to_string());

    let mut state = monitor.snapshot();
    warn!(worker = state.range.worker_index, panic = %message, "Worker panicked");
    state.status = WorkerStatus::Failed;
    state.error = Some(WorkerError::new(WorkerErrorKind::Panicked, &segment_path, message));
    WorkerReport {
        worker_index: state.range.worker_index,
        segment_path,
        state,
    }
}

/// Check a job against the filesystem without creating any segment.
///
/// # Errors
/// The first failed check, as a validation `EngineError`.
pub fn validate_job(job: &FileCopyJob) -> Result<(), EngineError> {
    let source = job.source_path();
    let destination = job.destination_directory();

    if source.as_os_str().is_empty() {
        return Err(EngineError::EmptyPath { what: "Source" });
    }
    if destination.as_os_str().is_empty() {
        return Err(EngineError::EmptyPath { what: "Destination" });
    }
    if job.worker_count() == 0 {
        return Err(EngineError::InvalidWorkerCount {
            count: job.worker_count(),
        });
    }

    // Source exists, is a regular file, opens for reading and has the declared size
    let metadata = match fs::metadata(source) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
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
    File::open(source).map_err(|e| EngineError::SourceUnreadable {
        path: source.to_path_buf(),
        source: e,
    })?;
    if metadata.len() != job.file_size_bytes() {
        return Err(EngineError::SizeMismatch {
            path: source.to_path_buf(),
            expected: job.file_size_bytes(),
            actual: metadata.len(),
        });
    }

    // Destination is an existing, writable directory
    match fs::metadata(destination) {
        Ok(metadata) if metadata.is_dir() => {}
        Ok(_) => {
            return Err(EngineError::DestinationNotADirectory {
                path: destination.to_path_buf(),
            });
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(EngineError::DestinationNotFound {
                path: destination.to_path_buf(),
            });
        }
        Err(e) => {
            return Err(EngineError::DestinationNotWritable {
                path: destination.to_path_buf(),
                source: e,
            });
        }
    }
    probe_writable(destination).map_err(|e| EngineError::DestinationNotWritable {
        path: destination.to_path_buf(),
        source: e,
    })
}

/// Create and delete a uniquely named file in `directory`.
fn probe_writable(directory: &Path) -> io::Result<()> {
    let probe = directory.join(format!(".chunkcopy-probe-{}", Uuid::new_v4()));
    OpenOptions::new().write(true).create_new(true).open(&probe)?;
    fs::remove_file(&probe)
}

/// Create (or truncate) one empty segment file per worker.
///
/// If any segment cannot be created, the ones already created are removed.
fn create_segments(job: &FileCopyJob, config: &CopyConfig) -> Result<Vec<PathBuf>, EngineError> {
    let mut created: Vec<PathBuf> = Vec::with_capacity(job.worker_count());
    for index in 0..job.worker_count() {
        let path = config.segment_path(job.destination_directory(), index);
        if let Err(e) = File::create(&path) {
            for segment in &created {
                let _ = fs::remove_file(segment);
            }
            return Err(EngineError::DestinationNotWritable { path, source: e });
        }
        created.push(path);
    }
    Ok(created)
}
