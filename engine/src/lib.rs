//! # ChunkCopy Engine - Parallel Chunked File Copy Library
//!
//! A headless engine that splits one source file into N contiguous byte
//! ranges and copies each range concurrently into its own segment file.
//! Designed as the foundation for any front end (CLI, GUI, automation).
//!
//! ## Overview
//!
//! The engine features:
//! - Exact range planning (contiguous, non-overlapping, covering the file)
//! - One worker thread per range with its own read handle
//! - Cooperative pause/resume and one-shot cancellation with blocking waits
//! - Per-worker error isolation, aggregated into one terminal result
//! - Progress reporting via an observer trait (decoupled from UI technology)
//!
//! Segments are left as separate files named by worker index; concatenating
//! them in index order reproduces the source.
//!
//! ## Basic Usage
//!
//! ```no_run
//! use engine::{CopyOrchestrator, FileCopyJob, JobOutcome, NoopObserver};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let job = FileCopyJob::from_source("C:\\data\\big.iso", "D:\\parts", 4)?;
//! let handle = CopyOrchestrator::default().start(job, NoopObserver)?;
//!
//! // Controls return immediately
//! handle.pause()?;
//! handle.resume()?;
//!
//! let report = handle.wait();
//! match report.outcome {
//!     JobOutcome::Completed => println!("Wrote {} bytes", report.bytes_copied),
//!     JobOutcome::Cancelled => println!("Cancelled"),
//!     JobOutcome::Failed(failures) => {
//!         for failure in failures {
//!             eprintln!("worker {}: {}", failure.worker_index, failure.error);
//!         }
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - **model**: Core data structures (FileCopyJob, ByteRange, WorkerState, JobReport)
//! - **error**: Error types and handling
//! - **config**: Block size and segment naming
//! - **planner**: Range partitioning
//! - **control**: Pause gate and cancellation signal
//! - **progress**: Observer trait and progress aggregation
//! - **worker**: Per-range copy worker
//! - **job**: Job orchestration (validate, start, control, resolve)

pub mod config;
pub mod control;
pub mod error;
pub mod job;
pub mod model;
pub mod planner;
pub mod progress;
pub mod worker;

// Re-export main types and functions
pub use config::CopyConfig;
pub use control::{job_controls, CancellationSignal, Checkpoint, PauseGate};
pub use error::{ControlError, EngineError, WorkerError, WorkerErrorKind};
pub use job::{resolve_outcome, validate_job, CopyOrchestrator, JobHandle};
pub use model::{
    ByteRange, FileCopyJob, JobOutcome, JobReport, WorkerFailure, WorkerReport, WorkerState,
    WorkerStatus,
};
pub use planner::partition;
pub use progress::{
    CopyEvent, CopyObserver, NoopObserver, ProgressAggregator, ProgressSnapshot, ProgressUpdate,
};
pub use worker::{CopyWorker, WorkerContext, WorkerMonitor};
