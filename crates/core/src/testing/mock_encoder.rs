//! Mock encoder for testing.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock, Semaphore};

use crate::encoder::{Encoder, EncoderError, SettingsMap, VersionInfo};

/// Progress values sent during each encode.
const PROGRESS_STEPS: [u8; 5] = [0, 25, 50, 75, 100];

/// A recorded encode call for test assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedEncode {
    pub input: PathBuf,
    pub output: PathBuf,
}

/// Mock implementation of the Encoder trait.
///
/// Provides controllable behavior for testing:
/// - Track encode calls for assertions
/// - Simulate success/failure
/// - Simulate progress updates
/// - Hold encodes behind a gate until the test releases them
///
/// Successful encodes write a small marker file at the output path.
///
/// # Example
///
/// ```rust,ignore
/// use mytunes_core::testing::MockEncoder;
///
/// let encoder = MockEncoder::new("mock-aac", true);
/// encoder.set_next_error(EncoderError::encode_failed("boom", None)).await;
///
/// // Run a batch...
///
/// assert_eq!(encoder.encode_count().await, 1);
/// ```
#[derive(Debug)]
pub struct MockEncoder {
    name: String,
    needs_wav: bool,
    extension: Arc<RwLock<String>>,
    available: Arc<RwLock<bool>>,
    settings: Arc<RwLock<SettingsMap>>,
    /// Recorded encodes.
    encodes: Arc<RwLock<Vec<RecordedEncode>>>,
    /// If set, the next encode will fail with this error.
    next_error: Arc<RwLock<Option<EncoderError>>>,
    /// When set, each encode waits for a permit.
    gate: Arc<RwLock<Option<Arc<Semaphore>>>>,
}

impl MockEncoder {
    /// Create a new mock encoder writing `m4a`.
    pub fn new(name: impl Into<String>, needs_wav: bool) -> Self {
        Self {
            name: name.into(),
            needs_wav,
            extension: Arc::new(RwLock::new("m4a".to_string())),
            available: Arc::new(RwLock::new(true)),
            settings: Arc::new(RwLock::new(SettingsMap::new())),
            encodes: Arc::new(RwLock::new(Vec::new())),
            next_error: Arc::new(RwLock::new(None)),
            gate: Arc::new(RwLock::new(None)),
        }
    }

    /// Get all recorded encodes.
    pub async fn recorded_encodes(&self) -> Vec<RecordedEncode> {
        self.encodes.read().await.clone()
    }

    /// Get the number of encodes started.
    pub async fn encode_count(&self) -> usize {
        self.encodes.read().await.len()
    }

    /// Set the extension reported by `output_extension`.
    pub async fn set_extension(&self, extension: &str) {
        *self.extension.write().await = extension.to_string();
    }

    /// Mark the encoder as unavailable.
    pub async fn set_available(&self, available: bool) {
        *self.available.write().await = available;
    }

    /// Configure the next encode to fail with the given error.
    pub async fn set_next_error(&self, error: EncoderError) {
        *self.next_error.write().await = Some(error);
    }

    /// Hold every encode until a permit is added to the returned semaphore.
    pub async fn hold_encodes(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.gate.write().await = Some(gate.clone());
        gate
    }
}

#[async_trait]
impl Encoder for MockEncoder {
    fn name(&self) -> &str {
        &self.name
    }

    fn needs_wav(&self) -> bool {
        self.needs_wav
    }

    async fn output_extension(&self) -> String {
        self.extension.read().await.clone()
    }

    async fn is_available(&self) -> bool {
        *self.available.read().await
    }

    async fn check_available(&self) -> Result<VersionInfo, EncoderError> {
        if !*self.available.read().await {
            return Err(EncoderError::unavailable(
                self.name.as_str(),
                "/mock",
                "marked unavailable",
            ));
        }
        Ok(VersionInfo {
            encoder: self.name.clone(),
            version: format!("{} 1.0 (mock)", self.name),
            details: None,
        })
    }

    async fn load_settings(&self, params: &SettingsMap) -> Result<(), EncoderError> {
        self.settings.write().await.extend(params.clone());
        Ok(())
    }

    async fn settings(&self) -> SettingsMap {
        self.settings.read().await.clone()
    }

    async fn process_with_progress(
        &self,
        input: &Path,
        output: &Path,
        progress_tx: mpsc::Sender<u8>,
    ) -> Result<(), EncoderError> {
        self.encodes.write().await.push(RecordedEncode {
            input: input.to_path_buf(),
            output: output.to_path_buf(),
        });

        let gate = self.gate.read().await.clone();
        if let Some(gate) = gate {
            gate.acquire()
                .await
                .map_err(|_| EncoderError::encode_failed("gate closed", None))?
                .forget();
        }

        if let Some(err) = self.next_error.write().await.take() {
            return Err(err);
        }

        for step in PROGRESS_STEPS {
            let _ = progress_tx.try_send(step);
        }

        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(output, format!("encoded by {}", self.name)).await?;
        Ok(())
    }
}
