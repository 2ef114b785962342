//! Encoder adapters for external audio encoder processes.
//!
//! This module provides the `Encoder` contract and two implementations:
//! ffmpeg (general transcoder, also used for WAV decodes and probing) and
//! qaac (dedicated AAC encoder).
//!
//! # Features
//!
//! - Typed per-backend settings loaded from loosely typed parameter maps
//! - Availability check at construction
//! - Progress streamed over a channel while the process runs
//!
//! # Example
//!
//! ```ignore
//! use mytunes_core::encoder::{Encoder, QaacEncoder, SettingValue};
//!
//! let qaac = QaacEncoder::new(&config.converter).await;
//! let mut params = SettingsMap::new();
//! params.insert("mode".into(), SettingValue::from("tvbr"));
//! params.insert("bitrate".into(), SettingValue::Int(91));
//! qaac.load_settings(&params).await?;
//!
//! let (tx, mut rx) = tokio::sync::mpsc::channel(16);
//! let job = tokio::spawn(async move { qaac.process_with_progress(&wav, &out, tx).await });
//! while let Some(percent) = rx.recv().await {
//!     println!("{}%", percent);
//! }
//! job.await??;
//! ```

mod capabilities;
mod error;
mod ffmpeg;
mod probe;
mod process;
mod qaac;
mod settings;
mod traits;
mod types;

pub use capabilities::EncoderCapabilities;
pub use error::{EncoderError, SettingsIssue};
pub use ffmpeg::{FfmpegCodec, FfmpegEncoder, FfmpegSettings};
pub use probe::{parse_banner, parse_bracket_percent, parse_duration_line, ProgressParser};
pub use qaac::{QaacEncoder, QaacMode, QaacSettings, QAAC_FORMATS};
pub use settings::{
    apply_settings, EncoderSettings, Field, SampleRate, SettingValue, SettingsMap, ValueKind,
};
pub use traits::{Encoder, Transcoder};
pub use types::{Availability, MediaInfo, VersionInfo};

use std::sync::Arc;

use crate::config::{ConverterConfig, EncoderKind, EncodersConfig};

/// Builds the active encoder from config and loads its initial settings.
///
/// An encoder whose binary is missing is still returned, marked unavailable;
/// rejected settings are an error.
pub async fn create_encoder(
    converter: &ConverterConfig,
    encoders: &EncodersConfig,
) -> Result<Arc<dyn Encoder>, EncoderError> {
    let (encoder, params): (Arc<dyn Encoder>, &SettingsMap) = match converter.encoder {
        EncoderKind::Qaac => (Arc::new(QaacEncoder::new(converter).await), &encoders.qaac),
        EncoderKind::Ffmpeg => (
            Arc::new(FfmpegEncoder::new(converter).await),
            &encoders.ffmpeg,
        ),
    };

    if !params.is_empty() {
        encoder.load_settings(params).await?;
    }
    Ok(encoder)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn missing_tools() -> ConverterConfig {
        ConverterConfig::with_paths(
            PathBuf::from("/nonexistent/ffmpeg"),
            PathBuf::from("/nonexistent/qaac64"),
        )
    }

    #[tokio::test]
    async fn test_create_encoder_qaac() {
        let mut encoders = EncodersConfig::default();
        encoders
            .qaac
            .insert("mode".to_string(), SettingValue::from("tvbr"));
        encoders.qaac.insert("bitrate".to_string(), SettingValue::Int(91));

        let encoder = create_encoder(&missing_tools(), &encoders).await.unwrap();
        assert_eq!(encoder.name(), "qaac");
        assert!(encoder.needs_wav());
        assert!(!encoder.is_available().await);
        assert_eq!(
            encoder.settings().await.get("bitrate"),
            Some(&SettingValue::Int(91))
        );
    }

    #[tokio::test]
    async fn test_create_encoder_ffmpeg() {
        let converter = ConverterConfig {
            encoder: EncoderKind::Ffmpeg,
            ..missing_tools()
        };
        let encoder = create_encoder(&converter, &EncodersConfig::default())
            .await
            .unwrap();
        assert_eq!(encoder.name(), "ffmpeg");
        assert!(!encoder.needs_wav());
    }

    #[tokio::test]
    async fn test_create_encoder_rejects_bad_settings() {
        let mut encoders = EncodersConfig::default();
        encoders
            .qaac
            .insert("mode".to_string(), SettingValue::from("tvbr"));
        encoders.qaac.insert("bitrate".to_string(), SettingValue::Int(200));

        let err = create_encoder(&missing_tools(), &encoders).await.err().unwrap();
        assert!(matches!(err, EncoderError::InvalidSettings { .. }));
    }
}
