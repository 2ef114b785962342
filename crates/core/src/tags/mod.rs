//! Tag store: tag fields and cover art on audio files.
//!
//! The convert pipeline only needs `load_tags` and `save_tags`; the lofty
//! implementation maps [`TagKey`] onto the file's native tag format.

mod error;
mod lofty_store;
mod store;
mod types;

pub use error::TagError;
pub use lofty_store::LoftyTagStore;
pub use store::{copy_tags, TagStore};
pub use types::{Artwork, TagKey, TagKind, TagSet, TagValue};
