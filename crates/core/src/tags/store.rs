//! Tag store contract.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::error::TagError;
use super::types::{TagKey, TagSet};

/// Reads and writes tag fields and artwork on audio files.
///
/// Implementations do blocking file I/O; async callers go through
/// [`copy_tags`] or `spawn_blocking`.
pub trait TagStore: Send + Sync {
    /// Reads every supported field and the cover image.
    fn load_tags(&self, path: &Path) -> Result<TagSet, TagError>;

    /// Replaces the given fields and artwork on the file.
    ///
    /// Fields the file's tag format cannot hold are skipped with a warning and
    /// returned; they are not an error.
    fn save_tags(&self, path: &Path, tags: &TagSet) -> Result<Vec<TagKey>, TagError>;
}

/// Copies all tags from `source` onto `target` on the blocking pool.
pub async fn copy_tags(
    store: Arc<dyn TagStore>,
    source: PathBuf,
    target: PathBuf,
) -> Result<Vec<TagKey>, TagError> {
    tokio::task::spawn_blocking(move || {
        let tags = store.load_tags(&source)?;
        store.save_tags(&target, &tags)
    })
    .await
    .map_err(|e| TagError::Task(e.to_string()))?
}
