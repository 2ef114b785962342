//! Typed encoder settings loaded from loosely typed parameter maps.
//!
//! Each backend declares a static field table: the field name, the value
//! kind it accepts and a setter. `apply_settings` checks every incoming key
//! against that table, applies it to a copy of the current settings, then runs
//! the backend's domain validation. Nothing is committed unless every check
//! passes.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use super::error::{EncoderError, SettingsIssue};

/// A loosely typed parameter value, as it arrives from config files or a UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    Bool(bool),
    Int(i64),
    Text(String),
}

impl SettingValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Bool(_) => ValueKind::Bool,
            Self::Int(_) => ValueKind::Int,
            Self::Text(_) => ValueKind::Text,
        }
    }
}

impl From<bool> for SettingValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for SettingValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<&str> for SettingValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl fmt::Display for SettingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{}", v),
            Self::Int(v) => write!(f, "{}", v),
            Self::Text(v) => write!(f, "{}", v),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Bool,
    Int,
    Text,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Bool => "bool",
            Self::Int => "integer",
            Self::Text => "string",
        };
        f.write_str(name)
    }
}

/// Parameter map keyed by field name.
pub type SettingsMap = BTreeMap<String, SettingValue>;

/// One entry of a backend's field table.
pub struct Field<S> {
    pub name: &'static str,
    pub kind: ValueKind,
    pub set: fn(&mut S, &SettingValue) -> Result<(), String>,
    pub get: fn(&S) -> SettingValue,
}

/// Settings of one encoder backend.
pub trait EncoderSettings: Clone + Send + Sync + 'static {
    /// Backend name used in error messages.
    const ENCODER: &'static str;

    /// Field table for this backend.
    fn fields() -> &'static [Field<Self>];

    /// Cross-field domain checks; empty when the settings are usable.
    fn validate(&self) -> Vec<SettingsIssue>;

    /// Container extension the backend writes.
    fn output_extension(&self) -> &str;

    /// Current values as a parameter map.
    fn to_map(&self) -> SettingsMap {
        Self::fields()
            .iter()
            .map(|f| (f.name.to_string(), (f.get)(self)))
            .collect()
    }
}

/// Applies `params` on top of `current`, returning the new settings or every
/// rejected field at once.
pub fn apply_settings<S: EncoderSettings>(
    current: &S,
    params: &SettingsMap,
) -> Result<S, EncoderError> {
    let mut next = current.clone();
    let mut issues = Vec::new();

    for (key, value) in params {
        let Some(field) = S::fields().iter().find(|f| f.name == key) else {
            issues.push(SettingsIssue::new(key.as_str(), "unknown setting"));
            continue;
        };

        if field.kind != value.kind() {
            issues.push(SettingsIssue::new(
                key.as_str(),
                format!("expected {}, got {}", field.kind, value.kind()),
            ));
            continue;
        }

        if let Err(reason) = (field.set)(&mut next, value) {
            issues.push(SettingsIssue::new(key.as_str(), reason));
        }
    }

    // Domain rules only make sense once every value has the right type.
    if issues.is_empty() {
        issues = next.validate();
    }

    if issues.is_empty() {
        Ok(next)
    } else {
        Err(EncoderError::InvalidSettings {
            encoder: S::ENCODER.to_string(),
            issues,
        })
    }
}

/// Sample rate policy shared by both backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleRate {
    /// Let the encoder pick.
    Auto,
    /// Keep the source rate.
    Keep,
    Hz(u32),
}

impl SampleRate {
    pub const ALLOWED_HZ: [u32; 9] = [
        8000, 11025, 12000, 16000, 22050, 24000, 32000, 44100, 48000,
    ];

    pub fn is_supported(&self) -> bool {
        match self {
            Self::Auto | Self::Keep => true,
            Self::Hz(hz) => Self::ALLOWED_HZ.contains(hz),
        }
    }
}

impl FromStr for SampleRate {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(Self::Auto),
            "keep" => Ok(Self::Keep),
            other => other
                .parse::<u32>()
                .map(Self::Hz)
                .map_err(|_| format!("'{}' is not auto, keep or a rate in Hz", other)),
        }
    }
}

impl fmt::Display for SampleRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => f.write_str("auto"),
            Self::Keep => f.write_str("keep"),
            Self::Hz(hz) => write!(f, "{}", hz),
        }
    }
}

pub(crate) fn as_text(value: &SettingValue) -> Result<&str, String> {
    match value {
        SettingValue::Text(s) => Ok(s.as_str()),
        other => Err(format!("expected string, got {}", other.kind())),
    }
}

pub(crate) fn as_bool(value: &SettingValue) -> Result<bool, String> {
    match value {
        SettingValue::Bool(b) => Ok(*b),
        other => Err(format!("expected bool, got {}", other.kind())),
    }
}

pub(crate) fn as_int<T: TryFrom<i64>>(value: &SettingValue) -> Result<T, String> {
    match value {
        SettingValue::Int(i) => T::try_from(*i).map_err(|_| format!("{} is out of range", i)),
        other => Err(format!("expected integer, got {}", other.kind())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_rate_parse() {
        assert_eq!("auto".parse::<SampleRate>().unwrap(), SampleRate::Auto);
        assert_eq!("keep".parse::<SampleRate>().unwrap(), SampleRate::Keep);
        assert_eq!(
            "44100".parse::<SampleRate>().unwrap(),
            SampleRate::Hz(44100)
        );
        assert!("fast".parse::<SampleRate>().is_err());
    }

    #[test]
    fn test_sample_rate_supported() {
        assert!(SampleRate::Hz(48000).is_supported());
        assert!(!SampleRate::Hz(96000).is_supported());
        assert!(SampleRate::Keep.is_supported());
    }

    #[test]
    fn test_as_int_rejects_negative_for_unsigned() {
        assert!(as_int::<u32>(&SettingValue::Int(-1)).is_err());
        assert_eq!(as_int::<u8>(&SettingValue::Int(2)).unwrap(), 2u8);
    }

    #[test]
    fn test_setting_value_deserialize_untagged() {
        let map: SettingsMap =
            serde_json::from_str(r#"{"he": true, "bitrate": 128, "mode": "abr"}"#).unwrap();
        assert_eq!(map["he"].kind(), ValueKind::Bool);
        assert_eq!(map["bitrate"].kind(), ValueKind::Int);
        assert_eq!(map["mode"], SettingValue::Text("abr".to_string()));
    }
}
