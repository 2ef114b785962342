//! Error types for the encoder module.

use std::path::PathBuf;
use thiserror::Error;

/// A single rejected field from a settings load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsIssue {
    /// Field name as it appears in the settings map.
    pub field: String,
    /// Why the value was rejected.
    pub reason: String,
}

impl SettingsIssue {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

fn describe_issues(issues: &[SettingsIssue]) -> String {
    issues
        .iter()
        .map(|i| format!("{}: {}", i.field, i.reason))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors that can occur while checking, configuring or running an encoder.
#[derive(Debug, Error)]
pub enum EncoderError {
    /// Encoder binary is missing or failed its version check.
    #[error("{encoder} unavailable at {path}: {reason}")]
    Unavailable {
        encoder: String,
        path: PathBuf,
        reason: String,
    },

    /// Settings were rejected; nothing was applied.
    #[error("Invalid {encoder} settings: {}", describe_issues(.issues))]
    InvalidSettings {
        encoder: String,
        issues: Vec<SettingsIssue>,
    },

    /// Input file not found.
    #[error("Input file not found: {path}")]
    InputNotFound { path: PathBuf },

    /// The encoder process failed or produced no output.
    #[error("Encoding failed: {reason}")]
    EncodeFailed {
        reason: String,
        diagnostics: Option<String>,
    },

    /// Failed to read stream information from a media file.
    #[error("Failed to probe media file: {reason}")]
    ProbeFailed { reason: String },

    /// I/O error while talking to the process.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EncoderError {
    /// Creates a new encode failed error with captured diagnostics.
    pub fn encode_failed(reason: impl Into<String>, diagnostics: Option<String>) -> Self {
        Self::EncodeFailed {
            reason: reason.into(),
            diagnostics,
        }
    }

    /// Creates a new probe failed error.
    pub fn probe_failed(reason: impl Into<String>) -> Self {
        Self::ProbeFailed {
            reason: reason.into(),
        }
    }

    /// Creates a new unavailable error.
    pub fn unavailable(
        encoder: impl Into<String>,
        path: impl Into<PathBuf>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Unavailable {
            encoder: encoder.into(),
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Names of the fields rejected by a settings load.
    pub fn invalid_fields(&self) -> Vec<&str> {
        match self {
            Self::InvalidSettings { issues, .. } => {
                issues.iter().map(|i| i.field.as_str()).collect()
            }
            _ => Vec::new(),
        }
    }
}
