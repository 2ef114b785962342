//! Mock transcoder for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};

use crate::encoder::{EncoderError, MediaInfo, Transcoder};

/// Mock implementation of the Transcoder trait.
///
/// Decodes write a small WAV marker file. Probes return a configured result,
/// or a three minute stream whose codec is named after the file extension.
#[derive(Debug, Default)]
pub struct MockTranscoder {
    /// Recorded decodes as (input, output).
    decodes: Arc<RwLock<Vec<(PathBuf, PathBuf)>>>,
    /// Recorded probe paths.
    probes: Arc<RwLock<Vec<PathBuf>>>,
    /// Pre-configured probe results by path.
    probe_results: Arc<RwLock<HashMap<PathBuf, MediaInfo>>>,
    /// If set, the next decode will fail with this error.
    next_error: Arc<RwLock<Option<EncoderError>>>,
}

impl MockTranscoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all recorded decodes.
    pub async fn recorded_decodes(&self) -> Vec<(PathBuf, PathBuf)> {
        self.decodes.read().await.clone()
    }

    /// Get all probed paths.
    pub async fn recorded_probes(&self) -> Vec<PathBuf> {
        self.probes.read().await.clone()
    }

    /// Set a probe result for a specific path.
    pub async fn set_probe_result(&self, path: impl AsRef<Path>, info: MediaInfo) {
        self.probe_results
            .write()
            .await
            .insert(path.as_ref().to_path_buf(), info);
    }

    /// Report `codec` as the audio stream codec of `path`.
    pub async fn set_codec(&self, path: impl AsRef<Path>, codec: &str) {
        let path = path.as_ref();
        let mut info = Self::default_info(path);
        info.codec = Some(codec.to_string());
        self.set_probe_result(path, info).await;
    }

    /// Configure the next decode to fail with the given error.
    pub async fn set_next_error(&self, error: EncoderError) {
        *self.next_error.write().await = Some(error);
    }

    fn default_info(path: &Path) -> MediaInfo {
        let codec = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("unknown")
            .to_ascii_lowercase();

        MediaInfo {
            path: path.to_path_buf(),
            duration_secs: 180.0,
            bitrate: Some("320 kb/s".to_string()),
            codec: Some(codec),
            sample_rate: Some(44100),
            channels: Some("stereo".to_string()),
            sample_format: Some("s16p".to_string()),
            metadata: Default::default(),
        }
    }
}

#[async_trait]
impl Transcoder for MockTranscoder {
    async fn decode_to_wav(
        &self,
        input: &Path,
        output: &Path,
        progress_tx: mpsc::Sender<u8>,
    ) -> Result<(), EncoderError> {
        self.decodes
            .write()
            .await
            .push((input.to_path_buf(), output.to_path_buf()));

        if let Some(err) = self.next_error.write().await.take() {
            return Err(err);
        }

        for step in [0u8, 50, 100] {
            let _ = progress_tx.try_send(step);
        }

        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(output, b"RIFF").await?;
        Ok(())
    }

    async fn probe(&self, path: &Path) -> Result<MediaInfo, EncoderError> {
        self.probes.write().await.push(path.to_path_buf());

        if let Some(info) = self.probe_results.read().await.get(path) {
            return Ok(info.clone());
        }
        Ok(Self::default_info(path))
    }
}
