//! Mock tag store for testing.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::tags::{TagError, TagKey, TagSet, TagStore};

/// In-memory tag store.
///
/// Tags are keyed by path; files are never touched. Loading a path with no
/// stored tags returns an empty set.
#[derive(Debug, Default, Clone)]
pub struct MockTagStore {
    tags: Arc<Mutex<HashMap<PathBuf, TagSet>>>,
    saves: Arc<Mutex<Vec<PathBuf>>>,
    fail_next_save: Arc<Mutex<bool>>,
    unsupported: Arc<Mutex<Vec<TagKey>>>,
}

impl MockTagStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store tags for a path.
    pub fn insert(&self, path: impl AsRef<Path>, tags: TagSet) {
        if let Ok(mut map) = self.tags.lock() {
            map.insert(path.as_ref().to_path_buf(), tags);
        }
    }

    /// Tags currently stored for a path.
    pub fn get(&self, path: impl AsRef<Path>) -> Option<TagSet> {
        self.tags
            .lock()
            .ok()
            .and_then(|map| map.get(path.as_ref()).cloned())
    }

    /// Paths written so far, in order.
    pub fn recorded_saves(&self) -> Vec<PathBuf> {
        self.saves.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Make the next save fail.
    pub fn fail_next_save(&self) {
        if let Ok(mut flag) = self.fail_next_save.lock() {
            *flag = true;
        }
    }

    /// Fields every save reports as unsupported.
    pub fn set_unsupported(&self, keys: Vec<TagKey>) {
        if let Ok(mut unsupported) = self.unsupported.lock() {
            *unsupported = keys;
        }
    }
}

impl TagStore for MockTagStore {
    fn load_tags(&self, path: &Path) -> Result<TagSet, TagError> {
        Ok(self.get(path).unwrap_or_default())
    }

    fn save_tags(&self, path: &Path, tags: &TagSet) -> Result<Vec<TagKey>, TagError> {
        let fail = self
            .fail_next_save
            .lock()
            .map(|mut flag| std::mem::take(&mut *flag))
            .unwrap_or(false);
        if fail {
            return Err(TagError::save(path, "simulated save failure"));
        }

        let skipped = self
            .unsupported
            .lock()
            .map(|u| u.clone())
            .unwrap_or_default();
        let mut stored = tags.clone();
        for key in &skipped {
            stored.fields.remove(key);
        }

        self.insert(path, stored);
        if let Ok(mut saves) = self.saves.lock() {
            saves.push(path.to_path_buf());
        }
        Ok(skipped)
    }
}
