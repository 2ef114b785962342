//! Builds conversion tasks from a source tree.

use std::path::Path;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::error::BatchError;
use super::task::ConversionTask;

/// Walks `root` depth first and returns one task per regular file, with
/// directory entries sorted by name.
///
/// Each task's relative directory mirrors the file's parent under `root`.
/// Target extensions are left empty; the coordinator sets them from the
/// active encoder. Unreadable entries are skipped with a warning.
pub fn scan_tree(root: &Path) -> Result<Vec<ConversionTask>, BatchError> {
    if !root.is_dir() {
        return Err(BatchError::Scan {
            path: root.to_path_buf(),
            reason: "not a directory".to_string(),
        });
    }

    info!("Scanning source tree: {:?}", root);
    let mut tasks = Vec::new();

    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable entry under {:?}: {}", root, e);
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative_dir = path
            .parent()
            .and_then(|parent| parent.strip_prefix(root).ok())
            .map(|dir| {
                dir.components()
                    .map(|c| c.as_os_str().to_string_lossy().to_string())
                    .collect::<Vec<_>>()
                    .join("/")
            })
            .unwrap_or_default();

        debug!("Found {:?} in {:?}", path, relative_dir);
        tasks.push(ConversionTask::new(path, &relative_dir, ""));
    }

    info!("Scan complete: {} files under {:?}", tasks.len(), root);
    Ok(tasks)
}
