use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;

use crate::encoder::SettingsMap;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub converter: ConverterConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub formats: FormatsConfig,
    #[serde(default)]
    pub encoders: EncodersConfig,
    #[serde(default)]
    pub library: LibraryConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Which backend encodes the final output.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EncoderKind {
    #[default]
    Qaac,
    Ffmpeg,
}

impl EncoderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Qaac => "qaac",
            Self::Ffmpeg => "ffmpeg",
        }
    }
}

/// External tool locations and the active backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConverterConfig {
    /// Path to the ffmpeg binary (general transcoder).
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: PathBuf,

    /// Path to the qaac binary (AAC encoder).
    #[serde(default = "default_qaac_path")]
    pub qaac_path: PathBuf,

    /// Directory for intermediate WAV files.
    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,

    /// Backend used for transcoding.
    #[serde(default)]
    pub encoder: EncoderKind,
}

fn default_ffmpeg_path() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_qaac_path() -> PathBuf {
    PathBuf::from("qaac64")
}

fn default_temp_dir() -> PathBuf {
    std::env::temp_dir().join("mytunes")
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: default_ffmpeg_path(),
            qaac_path: default_qaac_path(),
            temp_dir: default_temp_dir(),
            encoder: EncoderKind::default(),
        }
    }
}

impl ConverterConfig {
    /// Creates a config with custom tool paths.
    pub fn with_paths(ffmpeg_path: PathBuf, qaac_path: PathBuf) -> Self {
        Self {
            ffmpeg_path,
            qaac_path,
            ..Default::default()
        }
    }
}

/// Worker pool configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BatchConfig {
    /// Number of parallel workers.
    #[serde(default = "default_threads")]
    pub threads: usize,

    /// Replace destination files that already exist.
    #[serde(default = "default_overwrite")]
    pub overwrite: bool,

    /// Compare sha256 of source and destination after a byte copy.
    #[serde(default)]
    pub verify_copies: bool,
}

fn default_threads() -> usize {
    4
}

fn default_overwrite() -> bool {
    true
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            threads: default_threads(),
            overwrite: default_overwrite(),
            verify_copies: false,
        }
    }
}

/// Extension sets that drive routing decisions.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FormatsConfig {
    #[serde(default = "default_known")]
    pub known: BTreeSet<String>,
    #[serde(default = "default_lossless")]
    pub lossless: BTreeSet<String>,
    /// Lossy formats copied byte-for-byte. Defaults to `known - lossless`.
    #[serde(default)]
    pub passthrough: Option<BTreeSet<String>>,
    /// Containers whose stream codec is probed for a lossless payload.
    #[serde(default = "default_probe")]
    pub probe: BTreeSet<String>,
}

fn ext_set(list: &str) -> BTreeSet<String> {
    list.split(',').map(str::to_string).collect()
}

fn default_known() -> BTreeSet<String> {
    ext_set("aac,m4a,mp3,ogg,mp4,wma,opus,m4r,mp2,wav,flac,aiff,ape")
}

fn default_lossless() -> BTreeSet<String> {
    ext_set("wav,flac,aiff,ape")
}

fn default_probe() -> BTreeSet<String> {
    ext_set("m4a")
}

impl Default for FormatsConfig {
    fn default() -> Self {
        Self {
            known: default_known(),
            lossless: default_lossless(),
            passthrough: None,
            probe: default_probe(),
        }
    }
}

/// Initial settings for each encoder backend.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct EncodersConfig {
    #[serde(default)]
    pub qaac: SettingsMap,
    #[serde(default)]
    pub ffmpeg: SettingsMap,
}

/// Library locations
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LibraryConfig {
    /// Root of the source tree.
    #[serde(default)]
    pub root_path: Option<PathBuf>,
    /// Default output directory for batches.
    #[serde(default)]
    pub sync_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Default tracing filter when `RUST_LOG` is not set.
    #[serde(default = "default_level")]
    pub level: String,
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
        }
    }
}
