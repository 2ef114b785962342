//! qaac, the dedicated AAC encoder.
//!
//! qaac only reads PCM input here, so the pipeline decodes to WAV first.
//! Progress comes from `[NN.N%]` status tokens on stderr, which qaac rewrites
//! in place with carriage returns.

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
use super::probe::parse_bracket_percent;
use super::process::{ensure_input, ensure_output, ensure_parent, spawn_error, Diagnostics};
use super::settings::{
    apply_settings, as_bool, as_int, as_text, EncoderSettings, Field, SampleRate, SettingValue,
    SettingsMap, ValueKind,
};
use super::traits::Encoder;
use super::types::{Availability, VersionInfo};
use crate::config::ConverterConfig;

const ENCODER_NAME: &str = "qaac";

/// Containers qaac can write.
pub const QAAC_FORMATS: [&str; 3] = ["m4a", "aac", "mp4"];

/// qaac rate control mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QaacMode {
    Cbr,
    Abr,
    Cvbr,
    Tvbr,
}

impl QaacMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cbr => "cbr",
            Self::Abr => "abr",
            Self::Cvbr => "cvbr",
            Self::Tvbr => "tvbr",
        }
    }

    /// Accepted `bitrate` values for this mode. For tvbr it is a quality scale.
    pub fn bitrate_range(&self) -> (u32, u32) {
        match self {
            Self::Tvbr => (0, 127),
            _ => (8, 320),
        }
    }
}

impl FromStr for QaacMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cbr" => Ok(Self::Cbr),
            "abr" => Ok(Self::Abr),
            "cvbr" => Ok(Self::Cvbr),
            "tvbr" => Ok(Self::Tvbr),
            other => Err(format!("unknown mode '{}'", other)),
        }
    }
}

impl fmt::Display for QaacMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Settings for the qaac backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QaacSettings {
    pub mode: QaacMode,
    pub bitrate: u32,
    /// HE-AAC; not available with tvbr and only below 80 kbps.
    pub he: bool,
    /// Encoder quality, 0..=2 where 2 is best.
    pub quality: u8,
    pub rate: SampleRate,
    pub format: String,
}

impl Default for QaacSettings {
    fn default() -> Self {
        Self {
            mode: QaacMode::Cbr,
            bitrate: 320,
            he: false,
            quality: 2,
            rate: SampleRate::Auto,
            format: "m4a".to_string(),
        }
    }
}

static QAAC_FIELDS: [Field<QaacSettings>; 6] = [
    Field {
        name: "mode",
        kind: ValueKind::Text,
        set: set_mode,
        get: get_mode,
    },
    Field {
        name: "bitrate",
        kind: ValueKind::Int,
        set: set_bitrate,
        get: get_bitrate,
    },
    Field {
        name: "he",
        kind: ValueKind::Bool,
        set: set_he,
        get: get_he,
    },
    Field {
        name: "quality",
        kind: ValueKind::Int,
        set: set_quality,
        get: get_quality,
    },
    Field {
        name: "rate",
        kind: ValueKind::Text,
        set: set_rate,
        get: get_rate,
    },
    Field {
        name: "format",
        kind: ValueKind::Text,
        set: set_format,
        get: get_format,
    },
];

fn set_mode(s: &mut QaacSettings, v: &SettingValue) -> Result<(), String> {
    s.mode = as_text(v)?.parse()?;
    Ok(())
}

fn get_mode(s: &QaacSettings) -> SettingValue {
    SettingValue::Text(s.mode.to_string())
}

fn set_bitrate(s: &mut QaacSettings, v: &SettingValue) -> Result<(), String> {
    s.bitrate = as_int(v)?;
    Ok(())
}

fn get_bitrate(s: &QaacSettings) -> SettingValue {
    SettingValue::Int(i64::from(s.bitrate))
}

fn set_he(s: &mut QaacSettings, v: &SettingValue) -> Result<(), String> {
    s.he = as_bool(v)?;
    Ok(())
}

fn get_he(s: &QaacSettings) -> SettingValue {
    SettingValue::Bool(s.he)
}

fn set_quality(s: &mut QaacSettings, v: &SettingValue) -> Result<(), String> {
    s.quality = as_int(v)?;
    Ok(())
}

fn get_quality(s: &QaacSettings) -> SettingValue {
    SettingValue::Int(i64::from(s.quality))
}

fn set_rate(s: &mut QaacSettings, v: &SettingValue) -> Result<(), String> {
    s.rate = as_text(v)?.parse()?;
    Ok(())
}

fn get_rate(s: &QaacSettings) -> SettingValue {
    SettingValue::Text(s.rate.to_string())
}

fn set_format(s: &mut QaacSettings, v: &SettingValue) -> Result<(), String> {
    s.format = as_text(v)?.to_ascii_lowercase();
    Ok(())
}

fn get_format(s: &QaacSettings) -> SettingValue {
    SettingValue::Text(s.format.clone())
}

impl EncoderSettings for QaacSettings {
    const ENCODER: &'static str = ENCODER_NAME;

    fn fields() -> &'static [Field<Self>] {
        &QAAC_FIELDS
    }

    fn validate(&self) -> Vec<SettingsIssue> {
        let mut issues = Vec::new();

        let (min, max) = self.mode.bitrate_range();
        if !(min..=max).contains(&self.bitrate) {
            issues.push(SettingsIssue::new(
                "bitrate",
                format!("must be within {}..={} for {}", min, max, self.mode),
            ));
        }

        if self.quality > 2 {
            issues.push(SettingsIssue::new("quality", "must be within 0..=2"));
        }

        if self.he {
            if self.mode == QaacMode::Tvbr {
                issues.push(SettingsIssue::new("he", "cannot be used with tvbr"));
            } else if !(1..80).contains(&self.bitrate) {
                issues.push(SettingsIssue::new("he", "requires a bitrate below 80"));
            }
        }

        if !self.rate.is_supported() {
            issues.push(SettingsIssue::new(
                "rate",
                format!("unsupported sample rate {}", self.rate),
            ));
        }

        if !QAAC_FORMATS.contains(&self.format.as_str()) {
            issues.push(SettingsIssue::new(
                "format",
                format!("'{}' is not one of {}", self.format, QAAC_FORMATS.join(", ")),
            ));
        }

        issues
    }

    fn output_extension(&self) -> &str {
        &self.format
    }
}

impl QaacSettings {
    /// Encoder arguments placed before the input and output paths.
    pub fn args(&self) -> Vec<String> {
        let mut args = vec![
            format!("--{}", self.mode),
            self.bitrate.to_string(),
            "--ignorelength".to_string(),
            "-n".to_string(),
            "--text-codepage".to_string(),
            "65001".to_string(),
            "-q".to_string(),
            self.quality.to_string(),
            "--rate".to_string(),
            self.rate.to_string(),
        ];
        if self.he {
            args.push("--he".to_string());
        }
        args
    }
}

/// qaac encoder backend.
pub struct QaacEncoder {
    exe: PathBuf,
    settings: RwLock<QaacSettings>,
    availability: RwLock<Availability>,
}

impl QaacEncoder {
    /// Creates the encoder and runs its availability check.
    ///
    /// A failed check is logged and leaves the encoder marked unavailable.
    pub async fn new(config: &ConverterConfig) -> Self {
        let encoder = Self::unchecked(config.qaac_path.clone());
        let availability = match encoder.check_available().await {
            Ok(version) => {
                info!(version = %version.version, "qaac available");
                Availability::Ready(version)
            }
            Err(e) => {
                warn!(error = %e, "qaac unavailable");
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
            settings: RwLock::new(QaacSettings::default()),
            availability: RwLock::new(Availability::Unchecked),
        }
    }

    pub async fn availability(&self) -> Availability {
        self.availability.read().await.clone()
    }

    fn build_args(settings: &QaacSettings, input: &Path, output: &Path) -> Vec<String> {
        let mut args = settings.args();
        args.push(input.to_string_lossy().to_string());
        args.push("-o".to_string());
        args.push(output.to_string_lossy().to_string());
        args
    }
}

#[async_trait]
impl Encoder for QaacEncoder {
    fn name(&self) -> &str {
        ENCODER_NAME
    }

    fn needs_wav(&self) -> bool {
        true
    }

    async fn output_extension(&self) -> String {
        self.settings.read().await.format.clone()
    }

    async fn is_available(&self) -> bool {
        self.availability.read().await.is_usable()
    }

    async fn check_available(&self) -> Result<VersionInfo, EncoderError> {
        let output = Command::new(&self.exe)
            .arg("--check")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| spawn_error(ENCODER_NAME, &self.exe, e))?;

        // qaac prints its banner and library versions on stderr.
        let stderr = String::from_utf8_lossy(&output.stderr);
        let mut lines = stderr.lines().map(str::trim).filter(|l| !l.is_empty());
        let Some(version) = lines.next() else {
            return Err(EncoderError::unavailable(
                ENCODER_NAME,
                &self.exe,
                "no response to --check",
            ));
        };
        let details = lines.collect::<Vec<_>>().join("\n");

        Ok(VersionInfo {
            encoder: ENCODER_NAME.to_string(),
            version: version.to_string(),
            details: (!details.is_empty()).then_some(details),
        })
    }

    async fn load_settings(&self, params: &SettingsMap) -> Result<(), EncoderError> {
        let mut settings = self.settings.write().await;
        *settings = apply_settings(&*settings, params)?;
        debug!(settings = ?*settings, "qaac settings loaded");
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
        ensure_input(input).await?;
        ensure_parent(output).await?;

        let settings = self.settings.read().await.clone();
        let args = Self::build_args(&settings, input, output);
        debug!(exe = %self.exe.display(), ?args, "running qaac");

        let mut child = Command::new(&self.exe)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| spawn_error(ENCODER_NAME, &self.exe, e))?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| EncoderError::encode_failed("qaac stderr not captured", None))?;
        let mut reader = BufReader::new(stderr);
        let mut buf = Vec::new();
        let mut diagnostics = Diagnostics::default();
        let mut last = 0u8;

        loop {
            buf.clear();
            if reader.read_until(b'\r', &mut buf).await? == 0 {
                break;
            }
            let chunk = String::from_utf8_lossy(&buf);
            for line in chunk.split(['\r', '\n']) {
                match parse_bracket_percent(line) {
                    Some(percent) => {
                        last = last.max(percent);
                        let _ = progress_tx.try_send(last);
                    }
                    None => diagnostics.push(line),
                }
            }
        }

        let status = child.wait().await?;
        let diagnostics = diagnostics.into_text();
        if !status.success() {
            return Err(EncoderError::encode_failed(
                format!("qaac exited with code: {:?}", status.code()),
                diagnostics,
            ));
        }

        ensure_output(output, diagnostics).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, SettingValue)]) -> SettingsMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_default_args() {
        let args = QaacSettings::default().args();
        assert_eq!(
            args,
            vec![
                "--cbr",
                "320",
                "--ignorelength",
                "-n",
                "--text-codepage",
                "65001",
                "-q",
                "2",
                "--rate",
                "auto",
            ]
        );
    }

    #[test]
    fn test_he_args() {
        let settings = QaacSettings {
            mode: QaacMode::Abr,
            bitrate: 64,
            he: true,
            rate: SampleRate::Hz(44100),
            ..Default::default()
        };
        let args = settings.args();
        assert_eq!(&args[..2], &["--abr", "64"]);
        assert!(args.contains(&"44100".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("--he"));
    }

    #[test]
    fn test_build_args_places_paths_last() {
        let args = QaacEncoder::build_args(
            &QaacSettings::default(),
            Path::new("/tmp/track.wav"),
            Path::new("/out/track.m4a"),
        );
        let n = args.len();
        assert_eq!(&args[n - 3..], &["/tmp/track.wav", "-o", "/out/track.m4a"]);
    }

    #[test]
    fn test_tvbr_bitrate_out_of_range() {
        let err = apply_settings(
            &QaacSettings::default(),
            &params(&[("mode", "tvbr".into()), ("bitrate", 200i64.into())]),
        )
        .unwrap_err();
        assert_eq!(err.invalid_fields(), vec!["bitrate"]);
    }

    #[test]
    fn test_tvbr_bitrate_in_range() {
        let settings = apply_settings(
            &QaacSettings::default(),
            &params(&[("mode", "tvbr".into()), ("bitrate", 91i64.into())]),
        )
        .unwrap();
        assert_eq!(settings.mode, QaacMode::Tvbr);
        assert_eq!(settings.bitrate, 91);
    }

    #[test]
    fn test_he_rules() {
        let err = apply_settings(
            &QaacSettings::default(),
            &params(&[("he", true.into())]),
        )
        .unwrap_err();
        assert_eq!(err.invalid_fields(), vec!["he"]);

        let err = apply_settings(
            &QaacSettings::default(),
            &params(&[
                ("he", true.into()),
                ("mode", "tvbr".into()),
                ("bitrate", 60i64.into()),
            ]),
        )
        .unwrap_err();
        assert_eq!(err.invalid_fields(), vec!["he"]);

        assert!(apply_settings(
            &QaacSettings::default(),
            &params(&[("he", true.into()), ("bitrate", 64i64.into())]),
        )
        .is_ok());
    }

    #[test]
    fn test_type_mismatch_and_unknown_key_aggregate() {
        let err = apply_settings(
            &QaacSettings::default(),
            &params(&[
                ("bitrate", "320".into()),
                ("codec", "aac".into()),
                ("quality", 1i64.into()),
            ]),
        )
        .unwrap_err();
        let mut fields = err.invalid_fields();
        fields.sort();
        assert_eq!(fields, vec!["bitrate", "codec"]);
    }

    #[test]
    fn test_rate_and_format_validation() {
        let err = apply_settings(
            &QaacSettings::default(),
            &params(&[
                ("rate", "96000".into()),
                ("format", "ogg".into()),
                ("quality", 3i64.into()),
            ]),
        )
        .unwrap_err();
        assert_eq!(err.invalid_fields(), vec!["quality", "rate", "format"]);

        let err = apply_settings(
            &QaacSettings::default(),
            &params(&[("rate", "fast".into())]),
        )
        .unwrap_err();
        assert_eq!(err.invalid_fields(), vec!["rate"]);
    }

    #[test]
    fn test_to_map_round_trips_through_load() {
        let settings = QaacSettings {
            mode: QaacMode::Cvbr,
            bitrate: 192,
            rate: SampleRate::Keep,
            format: "mp4".to_string(),
            ..Default::default()
        };
        let map = settings.to_map();
        assert_eq!(map["mode"], SettingValue::Text("cvbr".into()));
        assert_eq!(map["rate"], SettingValue::Text("keep".into()));
        assert_eq!(apply_settings(&QaacSettings::default(), &map).unwrap(), settings);
    }

    #[tokio::test]
    async fn test_invalid_load_keeps_previous_settings() {
        let encoder = QaacEncoder::unchecked(PathBuf::from("qaac64"));
        encoder
            .load_settings(&params(&[("bitrate", 256i64.into())]))
            .await
            .unwrap();

        let err = encoder
            .load_settings(&params(&[("mode", "tvbr".into()), ("bitrate", 200i64.into())]))
            .await
            .unwrap_err();
        assert!(matches!(err, EncoderError::InvalidSettings { .. }));

        let current = encoder.settings().await;
        assert_eq!(current["mode"], SettingValue::Text("cbr".into()));
        assert_eq!(current["bitrate"], SettingValue::Int(256));
    }

    #[tokio::test]
    async fn test_missing_binary_is_unavailable() {
        let config = ConverterConfig::with_paths(
            PathBuf::from("ffmpeg"),
            PathBuf::from("/nonexistent/qaac64"),
        );
        let encoder = QaacEncoder::new(&config).await;
        assert!(!encoder.is_available().await);
        assert!(matches!(
            encoder.availability().await,
            Availability::Unavailable(_)
        ));
        assert!(encoder.needs_wav());
        assert_eq!(encoder.output_extension().await, "m4a");
    }

    #[tokio::test]
    async fn test_process_missing_input() {
        let encoder = QaacEncoder::unchecked(PathBuf::from("/nonexistent/qaac64"));
        let err = encoder
            .process(Path::new("/nonexistent/in.wav"), Path::new("/tmp/out.m4a"))
            .await
            .unwrap_err();
        assert!(matches!(err, EncoderError::InputNotFound { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_reports_bracket_progress() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let exe = dir.path().join("qaac64");
        let script = r#"#!/bin/sh
for last; do :; done
printf 'qaac 2.80\r\n[10.0%%] 0:18/3:00\r[55.5%%] 1:40/3:00\r[100.0%%] 3:00/3:00\r\n' >&2
: > "$last"
"#;
        std::fs::write(&exe, script).unwrap();
        std::fs::set_permissions(&exe, std::fs::Permissions::from_mode(0o755)).unwrap();

        let input = dir.path().join("track.wav");
        std::fs::write(&input, b"RIFF").unwrap();
        let output = dir.path().join("out/track.m4a");

        let encoder = QaacEncoder::unchecked(exe);
        let (tx, mut rx) = mpsc::channel(16);
        encoder
            .process_with_progress(&input, &output, tx)
            .await
            .unwrap();

        let mut seen = Vec::new();
        while let Some(p) = rx.recv().await {
            seen.push(p);
        }
        assert_eq!(seen, vec![10, 55, 100]);
        assert!(output.exists());
    }
}
