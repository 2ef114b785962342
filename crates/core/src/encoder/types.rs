//! Types for the encoder module.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Version banner reported by an encoder binary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    /// Encoder name ("ffmpeg", "qaac").
    pub encoder: String,
    /// First line of the version output.
    pub version: String,
    /// Remaining version output, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Outcome of the construction-time availability check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Availability {
    /// No check has run yet.
    Unchecked,
    Ready(VersionInfo),
    /// The check failed; the encoder must not be used.
    Unavailable(String),
}

impl Availability {
    pub fn is_usable(&self) -> bool {
        !matches!(self, Self::Unavailable(_))
    }
}

/// Information about an audio file, parsed from the transcoder's banner.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    /// File path.
    pub path: PathBuf,
    /// Duration in seconds.
    pub duration_secs: f64,
    /// Overall bitrate as printed ("1000 kb/s").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bitrate: Option<String>,
    /// Audio stream codec ("alac", "mp3", "flac").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub codec: Option<String>,
    /// Sample rate in Hz.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_rate: Option<u32>,
    /// Channel layout ("stereo", "5.1").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channels: Option<String>,
    /// Sample format ("s16p", "fltp").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_format: Option<String>,
    /// Container level metadata.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl MediaInfo {
    /// Whether the audio stream carries Apple Lossless data.
    pub fn is_alac(&self) -> bool {
        self.codec
            .as_deref()
            .map(|c| c.starts_with("alac"))
            .unwrap_or(false)
    }
}
