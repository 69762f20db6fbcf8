//! Error types for the copy engine.
//!
//! `EngineError` covers job-level validation failures: a job that fails one of
//! these checks is never started and no segment file is left behind. I/O
//! failures inside a running worker are recorded as `WorkerError` on that
//! worker's state, not raised as `EngineError`. `ControlError` is the
//! rejection returned by pause/resume/cancel when the job cannot accept them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that prevent a copy job from starting.
///
/// Every variant is a validation error: it is reported synchronously by
/// `CopyOrchestrator::start` before any worker is spawned.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A required path was empty
    #[error("{what} path is empty")]
    EmptyPath { what: &'static str },

    /// Worker count must be at least one
    #[error("Invalid worker count {count}: at least one worker is required")]
    InvalidWorkerCount { count: usize },

    /// Block size must be at least one byte
    #[error("Invalid block size {size}: must be greater than zero")]
    InvalidBlockSize { size: usize },

    /// Invalid configuration value
    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    /// Source file does not exist
    #[error("Source file not found: {}", path.display())]
    SourceNotFound { path: PathBuf },

    /// Source exists but is not a regular file
    #[error("Source is not a regular file: {}", path.display())]
    SourceNotAFile { path: PathBuf },

    /// Source exists but cannot be opened for reading
    #[error("Source file is not readable: {}", path.display())]
    SourceUnreadable { path: PathBuf, source: io::Error },

    /// The declared size does not match the file on disk
    #[error(
        "Source size mismatch for {}: job declares {expected} bytes, file has {actual}",
        path.display()
    )]
    SizeMismatch {
        path: PathBuf,
        expected: u64,
        actual: u64,
    },

    /// Destination directory does not exist
    #[error("Destination directory not found: {}", path.display())]
    DestinationNotFound { path: PathBuf },

    /// Destination exists but is not a directory
    #[error("Destination is not a directory: {}", path.display())]
    DestinationNotADirectory { path: PathBuf },

    /// Destination directory cannot be written to
    #[error("Destination directory is not writable: {}", path.display())]
    DestinationNotWritable { path: PathBuf, source: io::Error },
}

impl EngineError {
    /// Extract the OS error code from this error, if available.
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            Self::SourceUnreadable { source, .. } | Self::DestinationNotWritable { source, .. } => {
                source.raw_os_error()
            }
            _ => None,
        }
    }
}

/// Which step of a worker's copy loop failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkerErrorKind {
    /// Opening the source cursor or the segment file
    Open,
    /// Reading from the source
    Read,
    /// Writing to the segment file
    Write,
    /// The source ended before the assigned range did
    UnexpectedEof,
    /// The worker thread panicked
    Panicked,
}

impl fmt::Display for WorkerErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::Read => write!(f, "read"),
            Self::Write => write!(f, "write"),
            Self::UnexpectedEof => write!(f, "unexpected end of file"),
            Self::Panicked => write!(f, "panic"),
        }
    }
}

/// An I/O failure local to one worker.
///
/// Stored as plain data (the `io::Error` is flattened into a message and OS
/// code) so it can be cloned into reports and serialized by collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind} error on {}: {message}", path.display())]
pub struct WorkerError {
    pub kind: WorkerErrorKind,
    pub path: PathBuf,
    pub message: String,
    pub os_code: Option<i32>,
}

impl WorkerError {
    pub fn from_io(kind: WorkerErrorKind, path: impl Into<PathBuf>, err: &io::Error) -> Self {
        WorkerError {
            kind,
            path: path.into(),
            message: err.to_string(),
            os_code: err.raw_os_error(),
        }
    }

    pub fn new(kind: WorkerErrorKind, path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        WorkerError {
            kind,
            path: path.into(),
            message: message.into(),
            os_code: None,
        }
    }
}

/// Rejection of a pause, resume or cancel request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ControlError {
    /// The job already reached its terminal result
    #[error("job has already finished")]
    JobFinished,

    /// Cancellation was requested; the job can no longer be paused or resumed
    #[error("job is being cancelled")]
    Cancelling,
}
