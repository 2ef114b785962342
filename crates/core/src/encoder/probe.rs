//! Parsers for transcoder output: the `-i` banner and `-progress` lines.

use regex_lite::Regex;
use std::collections::BTreeMap;
use std::path::Path;

use super::types::MediaInfo;

/// Parses `HH:MM:SS[.frac]` into seconds.
pub fn parse_timestamp(s: &str) -> Option<f64> {
    let mut parts = s.trim().splitn(3, ':');
    let hours = parts.next()?.parse::<u64>().ok()?;
    let minutes = parts.next()?.parse::<u64>().ok()?;
    let seconds = parts.next()?.parse::<f64>().ok()?;
    if minutes >= 60 || !(0.0..60.0).contains(&seconds) {
        return None;
    }
    Some((hours * 3600 + minutes * 60) as f64 + seconds)
}

/// Extracts the duration from a `Duration: 00:03:00.05, start: ...` line.
pub fn parse_duration_line(line: &str) -> Option<f64> {
    let re = Regex::new(r"Duration:\s*(\d+:\d{2}:\d{2}(?:\.\d+)?)").ok()?;
    re.captures(line)
        .and_then(|caps| caps.get(1))
        .and_then(|m| parse_timestamp(m.as_str()))
}

/// Parses the banner `ffmpeg -i <file>` prints on stderr.
///
/// Only the first input's container metadata and first audio stream are read.
pub fn parse_banner(path: &Path, output: &str) -> Option<MediaInfo> {
    let mut info = MediaInfo {
        path: path.to_path_buf(),
        ..Default::default()
    };
    let mut duration = None;
    let mut metadata = BTreeMap::new();
    let mut in_metadata = false;

    for line in output.lines() {
        let line = line.trim();

        if line.starts_with("Metadata:") {
            // Stream metadata follows the duration line; keep container tags only.
            in_metadata = duration.is_none();
            continue;
        }

        if line.starts_with("Duration:") {
            in_metadata = false;
            duration = parse_duration_line(line);
            info.bitrate = line
                .split(", ")
                .find_map(|part| part.strip_prefix("bitrate: "))
                .map(str::to_string);
            continue;
        }

        if line.starts_with("Stream") {
            in_metadata = false;
            if let Some(idx) = line.find("Audio: ") {
                parse_audio_stream(&line[idx + "Audio: ".len()..], &mut info);
                break;
            }
            continue;
        }

        if in_metadata {
            if let Some((key, value)) = line.split_once(':') {
                metadata.insert(key.trim().to_string(), value.trim().to_string());
            }
        }
    }

    info.duration_secs = duration?;
    info.metadata = metadata;
    Some(info)
}

/// `alac (alac / 0x63616C61), 44100 Hz, stereo, s16p, 1000 kb/s (default)`
fn parse_audio_stream(spec: &str, info: &mut MediaInfo) {
    let mut parts = spec.split(", ");

    info.codec = parts
        .next()
        .and_then(|codec| codec.split_whitespace().next())
        .map(str::to_string);

    info.sample_rate = parts
        .next()
        .and_then(|rate| rate.strip_suffix(" Hz"))
        .and_then(|rate| rate.trim().parse().ok());

    info.channels = parts.next().map(|c| c.trim().to_string());

    info.sample_format = parts
        .next()
        .and_then(|fmt| fmt.split_whitespace().next())
        .map(str::to_string);
}

/// Incremental parser for `-progress` key/value lines.
///
/// Reported percentages never decrease, and `progress=end` always reports 100.
#[derive(Debug, Clone)]
pub struct ProgressParser {
    duration_secs: f64,
    last: u8,
    finished: bool,
}

impl ProgressParser {
    pub fn new(duration_secs: f64) -> Self {
        Self {
            duration_secs,
            last: 0,
            finished: false,
        }
    }

    /// Feeds one output line; returns a percentage when the line carries progress.
    pub fn feed(&mut self, line: &str) -> Option<u8> {
        let line = line.trim();

        if let Some(state) = line.strip_prefix("progress=") {
            if state == "end" {
                self.finished = true;
                self.last = 100;
                return Some(100);
            }
            return None;
        }

        let elapsed = parse_timestamp(line.strip_prefix("out_time=")?)?;
        if self.duration_secs <= 0.0 {
            return None;
        }

        let percent = ((elapsed / self.duration_secs) * 100.0).clamp(0.0, 100.0) as u8;
        self.last = self.last.max(percent);
        Some(self.last)
    }

    /// Whether `progress=end` has been seen.
    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

/// Extracts the leading percentage from a qaac status token like `[42.5%] 0:10/3:00`.
pub fn parse_bracket_percent(line: &str) -> Option<u8> {
    let rest = line.trim_start().strip_prefix('[')?;
    let end = rest.find('%')?;
    let value = rest[..end].trim().parse::<f32>().ok()?;
    Some(value.clamp(0.0, 100.0) as u8)
}
