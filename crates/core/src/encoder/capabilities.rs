//! Audio encoder capability detection.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

use super::ffmpeg::FfmpegCodec;

/// Audio encoders compiled into the local ffmpeg build.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncoderCapabilities {
    /// Native AAC encoder
    pub aac: bool,
    /// Fraunhofer FDK AAC (non-free builds only)
    pub libfdk_aac: bool,
    /// Opus via libopus
    pub libopus: bool,
    /// WavPack lossless
    pub wavpack: bool,
}

impl EncoderCapabilities {
    /// Detect available encoders by probing `ffmpeg -encoders`.
    ///
    /// Any failure yields the empty set.
    pub async fn detect(ffmpeg_path: &Path) -> Self {
        let output = Command::new(ffmpeg_path)
            .args(["-hide_banner", "-encoders"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .output()
            .await;

        match output {
            Ok(o) if o.status.success() => Self::parse(&String::from_utf8_lossy(&o.stdout)),
            _ => Self::default(),
        }
    }

    /// Parses the `-encoders` listing: ` A....D aac   AAC (Advanced Audio Coding)`.
    pub fn parse(listing: &str) -> Self {
        let mut caps = Self::default();
        for line in listing.lines() {
            let mut cols = line.split_whitespace();
            let (Some(flags), Some(name)) = (cols.next(), cols.next()) else {
                continue;
            };
            if !flags.starts_with('A') {
                continue;
            }
            match name {
                "aac" => caps.aac = true,
                "libfdk_aac" => caps.libfdk_aac = true,
                "libopus" => caps.libopus = true,
                "wavpack" => caps.wavpack = true,
                _ => {}
            }
        }
        caps
    }

    pub fn supports(&self, codec: FfmpegCodec) -> bool {
        match codec {
            FfmpegCodec::Aac => self.aac,
            FfmpegCodec::LibfdkAac => self.libfdk_aac,
            FfmpegCodec::Libopus => self.libopus,
            FfmpegCodec::Wavpack => self.wavpack,
        }
    }

    /// Returns the available codecs, best AAC encoder first.
    pub fn available_codecs(&self) -> Vec<FfmpegCodec> {
        [
            FfmpegCodec::LibfdkAac,
            FfmpegCodec::Aac,
            FfmpegCodec::Libopus,
            FfmpegCodec::Wavpack,
        ]
        .into_iter()
        .filter(|c| self.supports(*c))
        .collect()
    }

    /// Check if any AAC encoder is available.
    pub fn has_aac(&self) -> bool {
        self.aac || self.libfdk_aac
    }
}
