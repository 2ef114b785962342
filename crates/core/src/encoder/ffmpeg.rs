//! FFmpeg-based encoder and transcoder.

use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::str::FromStr;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};

use super::error::{EncoderError, SettingsIssue};
use super::probe::{parse_banner, ProgressParser};
use super::process::{ensure_input, ensure_output, ensure_parent, spawn_error, Diagnostics};
use super::settings::{
    apply_settings, as_int, as_text, EncoderSettings, Field, SampleRate, SettingValue,
    SettingsMap, ValueKind,
};
use super::traits::{Encoder, Transcoder};
use super::types::{Availability, MediaInfo, VersionInfo};
use crate::config::ConverterConfig;

const ENCODER_NAME: &str = "ffmpeg";

/// Audio codecs the ffmpeg backend encodes with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfmpegCodec {
    Aac,
    LibfdkAac,
    Libopus,
    Wavpack,
}

impl FfmpegCodec {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Aac => "aac",
            Self::LibfdkAac => "libfdk_aac",
            Self::Libopus => "libopus",
            Self::Wavpack => "wavpack",
        }
    }

    /// Containers this codec can be written to; the first is the default.
    pub fn formats(&self) -> &'static [&'static str] {
        match self {
            Self::Aac | Self::LibfdkAac => &["m4a", "aac", "mp4"],
            Self::Libopus => &["ogg", "opus"],
            Self::Wavpack => &["wv"],
        }
    }

    pub fn is_lossless(&self) -> bool {
        matches!(self, Self::Wavpack)
    }
}

impl FromStr for FfmpegCodec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "aac" => Ok(Self::Aac),
            "libfdk_aac" => Ok(Self::LibfdkAac),
            "libopus" | "opus" => Ok(Self::Libopus),
            "wavpack" => Ok(Self::Wavpack),
            other => Err(format!("unknown codec '{}'", other)),
        }
    }
}

impl fmt::Display for FfmpegCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Settings for the ffmpeg backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FfmpegSettings {
    pub codec: FfmpegCodec,
    pub format: String,
    /// Target bitrate in kbps; ignored for lossless codecs.
    pub bitrate: u32,
    pub rate: SampleRate,
}

impl Default for FfmpegSettings {
    fn default() -> Self {
        Self {
            codec: FfmpegCodec::Aac,
            format: "m4a".to_string(),
            bitrate: 320,
            rate: SampleRate::Auto,
        }
    }
}

static FFMPEG_FIELDS: [Field<FfmpegSettings>; 4] = [
    Field {
        name: "codec",
        kind: ValueKind::Text,
        set: set_codec,
        get: get_codec,
    },
    Field {
        name: "format",
        kind: ValueKind::Text,
        set: set_format,
        get: get_format,
    },
    Field {
        name: "bitrate",
        kind: ValueKind::Int,
        set: set_bitrate,
        get: get_bitrate,
    },
    Field {
        name: "rate",
        kind: ValueKind::Text,
        set: set_rate,
        get: get_rate,
    },
];

fn set_codec(s: &mut FfmpegSettings, v: &SettingValue) -> Result<(), String> {
    s.codec = as_text(v)?.parse()?;
    Ok(())
}

fn get_codec(s: &FfmpegSettings) -> SettingValue {
    SettingValue::Text(s.codec.to_string())
}

fn set_format(s: &mut FfmpegSettings, v: &SettingValue) -> Result<(), String> {
    s.format = as_text(v)?.to_ascii_lowercase();
    Ok(())
}

fn get_format(s: &FfmpegSettings) -> SettingValue {
    SettingValue::Text(s.format.clone())
}

fn set_bitrate(s: &mut FfmpegSettings, v: &SettingValue) -> Result<(), String> {
    s.bitrate = as_int(v)?;
    Ok(())
}

fn get_bitrate(s: &FfmpegSettings) -> SettingValue {
    SettingValue::Int(i64::from(s.bitrate))
}

fn set_rate(s: &mut FfmpegSettings, v: &SettingValue) -> Result<(), String> {
    s.rate = as_text(v)?.parse()?;
    Ok(())
}

fn get_rate(s: &FfmpegSettings) -> SettingValue {
    SettingValue::Text(s.rate.to_string())
}

impl EncoderSettings for FfmpegSettings {
    const ENCODER: &'static str = ENCODER_NAME;

    fn fields() -> &'static [Field<Self>] {
        &FFMPEG_FIELDS
    }

    fn validate(&self) -> Vec<SettingsIssue> {
        let mut issues = Vec::new();

        if !self.codec.is_lossless() && !(8..=320).contains(&self.bitrate) {
            issues.push(SettingsIssue::new("bitrate", "must be within 8..=320"));
        }

        if !self.rate.is_supported() {
            issues.push(SettingsIssue::new(
                "rate",
                format!("unsupported sample rate {}", self.rate),
            ));
        }

        if !self.codec.formats().contains(&self.format.as_str()) {
            issues.push(SettingsIssue::new(
                "format",
                format!(
                    "{} cannot be written to '{}' (expected {})",
                    self.codec,
                    self.format,
                    self.codec.formats().join(", ")
                ),
            ));
        }

        issues
    }

    fn output_extension(&self) -> &str {
        &self.format
    }
}

impl FfmpegSettings {
    /// Codec parameters placed between the fixed options and the output path.
    pub fn params(&self) -> Vec<String> {
        let mut params = vec!["-c:a".to_string(), self.codec.to_string()];

        if !self.codec.is_lossless() {
            params.extend(["-b:a".to_string(), format!("{}k", self.bitrate)]);
        }

        if let SampleRate::Hz(hz) = self.rate {
            params.extend(["-ar".to_string(), hz.to_string()]);
        }

        params
    }
}

/// Parameters for the intermediate WAV decode.
const WAV_PARAMS: [&str; 2] = ["-acodec", "pcm_s16le"];

/// FFmpeg-based encoder and transcoder.
pub struct FfmpegEncoder {
    exe: PathBuf,
    settings: RwLock<FfmpegSettings>,
    availability: RwLock<Availability>,
}

impl FfmpegEncoder {
    /// Creates the encoder and runs its availability check.
    ///
    /// A failed check is logged and leaves the encoder marked unavailable.
    pub async fn new(config: &ConverterConfig) -> Self {
        let encoder = Self::unchecked(config.ffmpeg_path.clone());
        let availability = match encoder.check_available().await {
            Ok(version) => {
                info!(version = %version.version, "ffmpeg available");
                if let Some(details) = &version.details {
                    debug!(%details, "ffmpeg build");
                }
                Availability::Ready(version)
            }
            Err(e) => {
                warn!(error = %e, "ffmpeg unavailable");
                Availability::Unavailable(e.to_string())
            }
        };
        *encoder.availability.write().await = availability;
        encoder
    }

    /// Creates the encoder without checking the binary.
    pub fn unchecked(exe: PathBuf) -> Self {
        Self {
            exe,
            settings: RwLock::new(FfmpegSettings::default()),
            availability: RwLock::new(Availability::Unchecked),
        }
    }

    pub async fn availability(&self) -> Availability {
        self.availability.read().await.clone()
    }

    /// Builds ffmpeg arguments for one run.
    fn build_args(input: &Path, output: &Path, params: &[String]) -> Vec<String> {
        let mut args = vec![
            "-i".to_string(),
            input.to_string_lossy().to_string(),
            "-hide_banner".to_string(),
            "-nostats".to_string(),
            "-y".to_string(),
            // Cover streams break mp4 muxing; drop them from the audio output.
            "-disposition:v".to_string(),
            "-attached_pic".to_string(),
            "-vn".to_string(),
            "-progress".to_string(),
            "-".to_string(),
        ];
        args.extend(params.iter().cloned());
        args.push(output.to_string_lossy().to_string());
        args
    }

    /// Runs one conversion, streaming progress parsed from `-progress -`.
    async fn run(
        &self,
        input: &Path,
        output: &Path,
        params: &[String],
        progress_tx: mpsc::Sender<u8>,
    ) -> Result<(), EncoderError> {
        ensure_input(input).await?;

        let duration = match self.probe(input).await {
            Ok(info) => info.duration_secs,
            Err(EncoderError::ProbeFailed { reason }) => {
                return Err(EncoderError::encode_failed(reason, None))
            }
            Err(e) => return Err(e),
        };
        if duration <= 0.0 {
            return Err(EncoderError::encode_failed(
                format!("file with zero duration: {}", input.display()),
                None,
            ));
        }

        ensure_parent(output).await?;

        let args = Self::build_args(input, output, params);
        debug!(exe = %self.exe.display(), ?args, "running ffmpeg");

        let mut child = Command::new(&self.exe)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| spawn_error(ENCODER_NAME, &self.exe, e))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EncoderError::encode_failed("ffmpeg stdout not captured", None))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| EncoderError::encode_failed("ffmpeg stderr not captured", None))?;

        // With -hide_banner and -nostats stderr only carries warnings and errors.
        let stderr_task = tokio::spawn(async move {
            let mut diagnostics = Diagnostics::default();
            let mut reader = BufReader::new(stderr);
            let mut buf = Vec::new();
            loop {
                buf.clear();
                match reader.read_until(b'\n', &mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(_) => {
                        let line = String::from_utf8_lossy(&buf);
                        diagnostics.push(line.trim_end_matches(['\r', '\n']));
                    }
                }
            }
            diagnostics
        });

        let mut parser = ProgressParser::new(duration);
        let mut lines = BufReader::new(stdout).lines();
        while let Some(line) = lines.next_line().await? {
            if let Some(percent) = parser.feed(&line) {
                let _ = progress_tx.try_send(percent);
            }
        }

        let status = child.wait().await?;
        let diagnostics = stderr_task.await.ok().and_then(Diagnostics::into_text);

        if !status.success() {
            return Err(EncoderError::encode_failed(
                format!("ffmpeg exited with code: {:?}", status.code()),
                diagnostics,
            ));
        }

        ensure_output(output, diagnostics).await
    }
}

#[async_trait]
impl Encoder for FfmpegEncoder {
    fn name(&self) -> &str {
        ENCODER_NAME
    }

    fn needs_wav(&self) -> bool {
        false
    }

    async fn output_extension(&self) -> String {
        self.settings.read().await.format.clone()
    }

    async fn is_available(&self) -> bool {
        self.availability.read().await.is_usable()
    }

    async fn check_available(&self) -> Result<VersionInfo, EncoderError> {
        let output = Command::new(&self.exe)
            .arg("-version")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .output()
            .await
            .map_err(|e| spawn_error(ENCODER_NAME, &self.exe, e))?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        if !stdout.starts_with("ffmpeg version") {
            return Err(EncoderError::unavailable(
                ENCODER_NAME,
                &self.exe,
                "unexpected -version output",
            ));
        }

        let (version, details) = stdout
            .split_once('\n')
            .unwrap_or((stdout.as_str(), ""));
        let details = details.trim();
        Ok(VersionInfo {
            encoder: ENCODER_NAME.to_string(),
            version: version.trim().to_string(),
            details: (!details.is_empty()).then(|| details.to_string()),
        })
    }

    async fn load_settings(&self, params: &SettingsMap) -> Result<(), EncoderError> {
        let mut settings = self.settings.write().await;
        *settings = apply_settings(&*settings, params)?;
        debug!(settings = ?*settings, "ffmpeg settings loaded");
        Ok(())
    }

    async fn settings(&self) -> SettingsMap {
        self.settings.read().await.to_map()
    }

    async fn process_with_progress(
        &self,
        input: &Path,
        output: &Path,
        progress_tx: mpsc::Sender<u8>,
    ) -> Result<(), EncoderError> {
        let params = self.settings.read().await.params();
        self.run(input, output, &params, progress_tx).await
    }
}

#[async_trait]
impl Transcoder for FfmpegEncoder {
    async fn decode_to_wav(
        &self,
        input: &Path,
        output: &Path,
        progress_tx: mpsc::Sender<u8>,
    ) -> Result<(), EncoderError> {
        let params: Vec<String> = WAV_PARAMS.iter().map(|s| s.to_string()).collect();
        self.run(input, output, &params, progress_tx).await
    }

    async fn probe(&self, path: &Path) -> Result<MediaInfo, EncoderError> {
        ensure_input(path).await?;

        // Without an output file ffmpeg exits non-zero; the banner is all we need.
        let output = Command::new(&self.exe)
            .arg("-hide_banner")
            .arg("-i")
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| spawn_error(ENCODER_NAME, &self.exe, e))?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        parse_banner(path, &stderr).ok_or_else(|| {
            EncoderError::probe_failed(format!("no duration reported for {}", path.display()))
        })
    }
}
