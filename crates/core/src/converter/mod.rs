//! Conversion of a single file into the target format.
//!
//! Encoders that need PCM input get a WAV intermediate produced by the
//! [`Transcoder`](crate::encoder::Transcoder) first; the source tags are then
//! copied onto the finished file.

mod error;
mod pipeline;

pub use error::ConvertError;
pub use pipeline::{ConvertReport, Converter, DECODE_SHARE};
