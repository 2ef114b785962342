//! Testing utilities and mock implementations.
//!
//! This module provides mock implementations of the encoder, transcoder and
//! tag store traits, so batches can run end to end without external binaries.
//!
//! # Example
//!
//! ```rust,ignore
//! use mytunes_core::testing::{MockEncoder, MockTagStore, MockTranscoder};
//!
//! let encoder = Arc::new(MockEncoder::new("mock-aac", true));
//! let transcoder = Arc::new(MockTranscoder::new());
//! let tags = Arc::new(MockTagStore::new());
//!
//! // Report an ALAC stream inside an m4a container
//! transcoder.set_codec("/music/track.m4a", "alac").await;
//! ```

mod mock_encoder;
mod mock_tag_store;
mod mock_transcoder;

pub use mock_encoder::{MockEncoder, RecordedEncode};
pub use mock_tag_store::MockTagStore;
pub use mock_transcoder::MockTranscoder;

/// Test fixtures and helper functions.
pub mod fixtures {
    use std::path::{Path, PathBuf};

    /// Creates `relative` under `root` (with parent directories) holding `contents`.
    pub fn write_file(root: &Path, relative: &str, contents: &[u8]) -> PathBuf {
        let path = root.join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create fixture dir");
        }
        std::fs::write(&path, contents).expect("write fixture file");
        path
    }

    /// Creates one small file per relative path, with contents derived from the name.
    pub fn source_tree(root: &Path, files: &[&str]) -> Vec<PathBuf> {
        files
            .iter()
            .map(|f| write_file(root, f, format!("audio data for {}", f).as_bytes()))
            .collect()
    }
}
