//! Error types for batch processing.

use std::path::PathBuf;
use thiserror::Error;

use crate::converter::ConvertError;
use crate::encoder::EncoderError;

/// Errors that can occur while setting up or running a batch.
#[derive(Debug, Error)]
pub enum BatchError {
    /// A batch is active or its queue still holds items.
    #[error("A batch is already running")]
    AlreadyRunning,

    /// The output directory is unusable.
    #[error("Invalid output directory {path}: {reason}")]
    InvalidOutput { path: PathBuf, reason: String },

    /// The source tree could not be walked.
    #[error("Failed to scan {path}: {reason}")]
    Scan { path: PathBuf, reason: String },

    /// A worker task panicked or was aborted.
    #[error("Worker {worker} failed: {reason}")]
    Worker { worker: usize, reason: String },

    #[error(transparent)]
    Queue(#[from] QueueError),
}

impl BatchError {
    pub fn invalid_output(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::InvalidOutput {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

/// Misuse of the job queue.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    /// More acknowledgements than items put on the queue.
    #[error("task_done called more times than items were queued")]
    Overacknowledged,
}

/// Failure of a byte copy.
#[derive(Debug, Error)]
pub enum CopyError {
    #[error("Source file not found: {path}")]
    SourceNotFound { path: PathBuf },

    #[error("Failed to copy {source_path} to {destination}: {reason}")]
    Failed {
        source_path: PathBuf,
        destination: PathBuf,
        reason: String,
    },

    /// The copy completed but the destination hash differs.
    #[error("Checksum mismatch for {path}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },
}

impl CopyError {
    pub fn failed(source: &std::path::Path, destination: &std::path::Path, err: std::io::Error) -> Self {
        Self::Failed {
            source_path: source.to_path_buf(),
            destination: destination.to_path_buf(),
            reason: err.to_string(),
        }
    }
}

/// Why a single task failed. Caught at the worker boundary.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("Failed to probe source: {0}")]
    Probe(#[source] EncoderError),

    #[error("Failed to check destination {path}: {reason}")]
    CheckDestination { path: PathBuf, reason: String },

    #[error("Failed to create {path}: {reason}")]
    CreateDir { path: PathBuf, reason: String },

    #[error(transparent)]
    Copy(#[from] CopyError),

    #[error(transparent)]
    Convert(#[from] ConvertError),
}
