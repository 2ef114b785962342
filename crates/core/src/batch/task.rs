//! Conversion task and destination path policy.

use std::path::{Path, PathBuf};
use uuid::Uuid;

/// One file to convert or copy.
///
/// Destination paths are relative to the batch output directory and always
/// use `/` as separator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionTask {
    id: Uuid,
    source_path: PathBuf,
    relative_dir: String,
    base_name: String,
    target_extension: String,
}

impl ConversionTask {
    /// Creates a task for `source_path` placed under `relative_dir`.
    pub fn new(
        source_path: impl Into<PathBuf>,
        relative_dir: &str,
        target_extension: &str,
    ) -> Self {
        let source_path = source_path.into();
        let base_name = source_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        Self {
            id: Uuid::new_v4(),
            source_path,
            relative_dir: normalize_relative_dir(relative_dir),
            base_name,
            target_extension: normalize_extension(target_extension),
        }
    }

    /// Returns a copy targeting `extension`. The id is kept.
    pub fn with_extension(mut self, extension: &str) -> Self {
        self.target_extension = normalize_extension(extension);
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    pub fn relative_dir(&self) -> &str {
        &self.relative_dir
    }

    pub fn base_name(&self) -> &str {
        &self.base_name
    }

    pub fn target_extension(&self) -> &str {
        &self.target_extension
    }

    /// Lowercase extension of the source file, if it has one.
    pub fn source_extension(&self) -> Option<String> {
        match self.base_name.rfind('.') {
            Some(pos) if pos + 1 < self.base_name.len() => {
                Some(self.base_name[pos + 1..].to_ascii_lowercase())
            }
            _ => None,
        }
    }

    /// Source name without its extension.
    pub fn stem(&self) -> &str {
        match self.base_name.rfind('.') {
            Some(pos) if pos > 0 => &self.base_name[..pos],
            _ => &self.base_name,
        }
    }

    /// Relative destination of a transcode: `relative_dir + stem + "." + ext`.
    pub fn destination_path(&self) -> String {
        format!(
            "{}{}.{}",
            self.relative_dir,
            self.stem(),
            self.target_extension
        )
    }

    /// Relative destination of a byte copy, keeping the source name.
    pub fn copy_path(&self) -> String {
        format!("{}{}", self.relative_dir, self.base_name)
    }

    /// Absolute transcode destination under `output_dir`.
    pub fn output_path(&self, output_dir: &Path) -> PathBuf {
        output_dir.join(self.destination_path())
    }
}

/// Strips leading separators and ends non-empty paths with exactly one `/`.
pub fn normalize_relative_dir(raw: &str) -> String {
    let unified = raw.replace('\\', "/");
    let trimmed = unified.trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{}/", trimmed)
    }
}

fn normalize_extension(raw: &str) -> String {
    raw.trim_start_matches('.').to_ascii_lowercase()
}
