//! Trait definitions for the encoder module.

use async_trait::async_trait;
use std::path::Path;
use tokio::sync::mpsc;

use super::error::EncoderError;
use super::settings::SettingsMap;
use super::types::{MediaInfo, VersionInfo};

/// An external encoder process behind a uniform contract.
#[async_trait]
pub trait Encoder: Send + Sync {
    /// Returns the name of this encoder implementation.
    fn name(&self) -> &str;

    /// Whether inputs must be decoded to WAV before this encoder can read them.
    fn needs_wav(&self) -> bool;

    /// Extension (no dot) of the files this encoder currently writes.
    async fn output_extension(&self) -> String;

    /// Whether the construction-time availability check passed.
    async fn is_available(&self) -> bool;

    /// Runs the version check against the encoder binary.
    async fn check_available(&self) -> Result<VersionInfo, EncoderError>;

    /// Applies new settings on top of the current ones.
    ///
    /// Every parameter is type checked against its field and the result is
    /// validated as a whole. On error the previous settings stay in force.
    async fn load_settings(&self, params: &SettingsMap) -> Result<(), EncoderError>;

    /// Current settings as a parameter map.
    async fn settings(&self) -> SettingsMap;

    /// Encodes `input` into `output`, sending percentages in `[0, 100]` as the
    /// process reports them.
    ///
    /// The sender is dropped when the process exits, which closes the channel.
    /// If the receiver is gone, encoding continues without progress reporting.
    async fn process_with_progress(
        &self,
        input: &Path,
        output: &Path,
        progress_tx: mpsc::Sender<u8>,
    ) -> Result<(), EncoderError>;

    /// Encodes `input` into `output` without progress reporting.
    async fn process(&self, input: &Path, output: &Path) -> Result<(), EncoderError> {
        let (tx, _rx) = mpsc::channel(1);
        self.process_with_progress(input, output, tx).await
    }
}

/// The general purpose transcoder used for intermediate decodes and probing.
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Decodes any supported input to 16-bit little endian PCM WAV.
    async fn decode_to_wav(
        &self,
        input: &Path,
        output: &Path,
        progress_tx: mpsc::Sender<u8>,
    ) -> Result<(), EncoderError>;

    /// Reads duration and stream information from a media file.
    async fn probe(&self, path: &Path) -> Result<MediaInfo, EncoderError>;
}
