//! Tag model shared by the tag store and the convert pipeline.

use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Tag fields carried across a conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagKey {
    Artist,
    Title,
    Album,
    Genre,
    Year,
    TrackNumber,
    TotalTracks,
    AlbumArtist,
    DiscNumber,
    TotalDiscs,
    Composer,
    Compilation,
    Lyrics,
    Isrc,
    Comment,
}

/// How a field's raw text is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagKind {
    Text,
    Integer,
    Flag,
}

impl TagKey {
    pub const ALL: [TagKey; 15] = [
        Self::Artist,
        Self::Title,
        Self::Album,
        Self::Genre,
        Self::Year,
        Self::TrackNumber,
        Self::TotalTracks,
        Self::AlbumArtist,
        Self::DiscNumber,
        Self::TotalDiscs,
        Self::Composer,
        Self::Compilation,
        Self::Lyrics,
        Self::Isrc,
        Self::Comment,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Artist => "artist",
            Self::Title => "title",
            Self::Album => "album",
            Self::Genre => "genre",
            Self::Year => "year",
            Self::TrackNumber => "tracknumber",
            Self::TotalTracks => "totaltracks",
            Self::AlbumArtist => "albumartist",
            Self::DiscNumber => "discnumber",
            Self::TotalDiscs => "totaldiscs",
            Self::Composer => "composer",
            Self::Compilation => "compilation",
            Self::Lyrics => "lyrics",
            Self::Isrc => "isrc",
            Self::Comment => "comment",
        }
    }

    pub fn kind(&self) -> TagKind {
        match self {
            Self::Year
            | Self::TrackNumber
            | Self::TotalTracks
            | Self::DiscNumber
            | Self::TotalDiscs => TagKind::Integer,
            Self::Compilation => TagKind::Flag,
            _ => TagKind::Text,
        }
    }

    /// Interprets raw tag text for this field. Returns `None` for values that
    /// carry nothing usable, such as an empty track number.
    pub fn sanitize(&self, raw: &str) -> Option<TagValue> {
        let raw = raw.trim();
        match self.kind() {
            TagKind::Text => (!raw.is_empty()).then(|| TagValue::Text(raw.to_string())),
            TagKind::Integer if *self == Self::Year => parse_year(raw).map(TagValue::Integer),
            TagKind::Integer => leading_number(raw).map(TagValue::Integer),
            TagKind::Flag => parse_flag(raw).map(TagValue::Flag),
        }
    }
}

impl fmt::Display for TagKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `"3/12"` -> 3
fn leading_number(raw: &str) -> Option<u32> {
    let digits: String = raw.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

/// Accepts bare years and full dates such as `2004-05-17T00:00:00`.
fn parse_year(raw: &str) -> Option<u32> {
    let re = Regex::new(r"\d{4}").ok()?;
    re.find(raw).and_then(|m| m.as_str().parse().ok())
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Some(true),
        "0" | "false" | "no" => Some(false),
        _ => None,
    }
}

/// A sanitized tag value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TagValue {
    Text(String),
    Integer(u32),
    Flag(bool),
}

impl fmt::Display for TagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => f.write_str(s),
            Self::Integer(n) => write!(f, "{}", n),
            Self::Flag(b) => f.write_str(if *b { "1" } else { "0" }),
        }
    }
}

/// Embedded cover image.
#[derive(Clone, PartialEq, Eq)]
pub struct Artwork {
    pub mime: String,
    pub data: Vec<u8>,
}

impl Artwork {
    /// Wraps image bytes, detecting JPEG and PNG from their signatures.
    pub fn from_bytes(data: Vec<u8>) -> Self {
        let mime = if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
            "image/jpeg"
        } else if data.starts_with(&[0x89, b'P', b'N', b'G']) {
            "image/png"
        } else {
            "application/octet-stream"
        };
        Self {
            mime: mime.to_string(),
            data,
        }
    }
}

impl fmt::Debug for Artwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Artwork")
            .field("mime", &self.mime)
            .field("len", &self.data.len())
            .finish()
    }
}

/// Every field read from or written to one file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TagSet {
    pub fields: BTreeMap<TagKey, Vec<TagValue>>,
    #[serde(skip)]
    pub artwork: Option<Artwork>,
}

impl TagSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sanitizes and stores `raw` under `key`, replacing earlier values.
    pub fn set(&mut self, key: TagKey, raw: &str) -> &mut Self {
        match key.sanitize(raw) {
            Some(value) => {
                self.fields.insert(key, vec![value]);
            }
            None => {
                self.fields.remove(&key);
            }
        }
        self
    }

    /// First value stored under `key`.
    pub fn get(&self, key: TagKey) -> Option<&TagValue> {
        self.fields.get(&key).and_then(|values| values.first())
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.artwork.is_none()
    }
}
