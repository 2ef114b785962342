//! Error types for the tag store.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur while reading or writing tags.
#[derive(Debug, Error)]
pub enum TagError {
    /// Tags could not be read from the file.
    #[error("Failed to load tags from {path}: {reason}")]
    Load { path: PathBuf, reason: String },

    /// Tags could not be written to the file.
    #[error("Failed to save tags to {path}: {reason}")]
    Save { path: PathBuf, reason: String },

    /// The blocking tag task did not complete.
    #[error("Tag task failed: {0}")]
    Task(String),
}

impl TagError {
    pub fn load(path: &Path, reason: impl ToString) -> Self {
        Self::Load {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        }
    }

    pub fn save(path: &Path, reason: impl ToString) -> Self {
        Self::Save {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        }
    }
}
