//! Error types for the convert pipeline.

use thiserror::Error;

use crate::encoder::EncoderError;
use crate::tags::TagError;

/// A failed stage of one conversion.
#[derive(Debug, Error)]
pub enum ConvertError {
    /// The intermediate WAV decode failed.
    #[error("Decode failed: {0}")]
    Decode(#[source] EncoderError),

    /// The final encode failed.
    #[error("Encode failed: {0}")]
    Encode(#[source] EncoderError),

    /// Tags could not be copied; the encoded file is kept.
    #[error("Tag copy failed: {0}")]
    Tags(#[source] TagError),
}

impl ConvertError {
    /// Whether only metadata was lost and the audio output exists.
    pub fn is_metadata_only(&self) -> bool {
        matches!(self, Self::Tags(_))
    }
}
