//! Helpers shared by the subprocess-backed encoders.

use std::collections::VecDeque;
use std::path::Path;

use super::error::EncoderError;

/// How many trailing diagnostic lines are kept per run.
const MAX_DIAGNOSTIC_LINES: usize = 20;

/// Keeps the last few lines a process printed, for error reports.
#[derive(Debug, Default)]
pub(crate) struct Diagnostics {
    lines: VecDeque<String>,
}

impl Diagnostics {
    pub(crate) fn push(&mut self, line: &str) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }
        if self.lines.len() == MAX_DIAGNOSTIC_LINES {
            self.lines.pop_front();
        }
        self.lines.push_back(line.to_string());
    }

    pub(crate) fn into_text(self) -> Option<String> {
        if self.lines.is_empty() {
            None
        } else {
            Some(Vec::from(self.lines).join("\n"))
        }
    }
}

/// Maps a spawn failure, turning a missing binary into `Unavailable`.
pub(crate) fn spawn_error(encoder: &str, exe: &Path, err: std::io::Error) -> EncoderError {
    if err.kind() == std::io::ErrorKind::NotFound {
        EncoderError::unavailable(encoder, exe, "executable not found")
    } else {
        EncoderError::Io(err)
    }
}

/// Fails with `InputNotFound` unless `path` is an existing file.
pub(crate) async fn ensure_input(path: &Path) -> Result<(), EncoderError> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() => Ok(()),
        _ => Err(EncoderError::InputNotFound {
            path: path.to_path_buf(),
        }),
    }
}

/// Creates the parent directory of an output path.
pub(crate) async fn ensure_parent(path: &Path) -> Result<(), EncoderError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    Ok(())
}

/// Fails with `EncodeFailed` when the process left no output file behind.
pub(crate) async fn ensure_output(
    path: &Path,
    diagnostics: Option<String>,
) -> Result<(), EncoderError> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() => Ok(()),
        _ => Err(EncoderError::encode_failed(
            format!("Output file not created: {}", path.display()),
            diagnostics,
        )),
    }
}
