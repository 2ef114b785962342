//! Tag store backed by lofty.

use lofty::config::WriteOptions;
use lofty::file::{AudioFile, TaggedFileExt};
use lofty::picture::{Picture, PictureType};
use lofty::tag::{ItemKey, ItemValue, Tag, TagItem};
use std::path::Path;
use tracing::{debug, warn};

use super::error::TagError;
use super::store::TagStore;
use super::types::{Artwork, TagKey, TagSet, TagValue};

/// Reads and writes tags through the file's primary tag format.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoftyTagStore;

impl LoftyTagStore {
    pub fn new() -> Self {
        Self
    }
}

/// Item keys that may hold `key`, preferred first.
fn item_keys(key: TagKey) -> Vec<ItemKey> {
    match key {
        TagKey::Artist => vec![ItemKey::TrackArtist],
        TagKey::Title => vec![ItemKey::TrackTitle],
        TagKey::Album => vec![ItemKey::AlbumTitle],
        TagKey::Genre => vec![ItemKey::Genre],
        TagKey::Year => vec![ItemKey::Year, ItemKey::RecordingDate],
        TagKey::TrackNumber => vec![ItemKey::TrackNumber],
        TagKey::TotalTracks => vec![ItemKey::TrackTotal],
        TagKey::AlbumArtist => vec![ItemKey::AlbumArtist],
        TagKey::DiscNumber => vec![ItemKey::DiscNumber],
        TagKey::TotalDiscs => vec![ItemKey::DiscTotal],
        TagKey::Composer => vec![ItemKey::Composer],
        TagKey::Compilation => vec![ItemKey::FlagCompilation],
        TagKey::Lyrics => vec![ItemKey::Lyrics],
        TagKey::Isrc => vec![ItemKey::Isrc],
        TagKey::Comment => vec![ItemKey::Comment],
    }
}

fn read_tag(tag: &Tag) -> TagSet {
    let mut set = TagSet::new();

    for key in TagKey::ALL {
        let values: Vec<TagValue> = item_keys(key)
            .iter()
            .flat_map(|item_key| tag.get_strings(item_key))
            .filter_map(|raw| key.sanitize(raw))
            .collect();
        if !values.is_empty() {
            // Year may be present under both keys; keep the first reading.
            let values = if key == TagKey::Year {
                values.into_iter().take(1).collect()
            } else {
                values
            };
            set.fields.insert(key, values);
        }
    }

    let pictures = tag.pictures();
    set.artwork = pictures
        .iter()
        .find(|p| p.pic_type() == PictureType::CoverFront)
        .or_else(|| pictures.first())
        .map(|p| Artwork::from_bytes(p.data().to_vec()));

    set
}

/// Writes `tags` into `tag`, returning the fields the format cannot hold.
fn write_tag(tag: &mut Tag, tags: &TagSet) -> Vec<TagKey> {
    let mut skipped = Vec::new();

    for (key, values) in &tags.fields {
        let candidates = item_keys(*key);
        for item_key in &candidates {
            tag.remove_key(item_key);
        }

        let stored = candidates.iter().any(|item_key| {
            values.iter().all(|value| {
                tag.push(TagItem::new(
                    item_key.clone(),
                    ItemValue::Text(value.to_string()),
                ))
            })
        });

        if !stored {
            warn!(field = %key, tag_type = ?tag.tag_type(), "tag field not supported, skipping");
            skipped.push(*key);
        }
    }

    if let Some(artwork) = &tags.artwork {
        match Picture::from_reader(&mut artwork.data.as_slice()) {
            Ok(mut picture) => {
                picture.set_pic_type(PictureType::CoverFront);
                tag.remove_picture_type(PictureType::CoverFront);
                tag.push_picture(picture);
            }
            Err(e) => warn!(mime = %artwork.mime, error = %e, "unreadable artwork, skipping"),
        }
    }

    skipped
}

impl TagStore for LoftyTagStore {
    fn load_tags(&self, path: &Path) -> Result<TagSet, TagError> {
        let tagged = lofty::read_from_path(path).map_err(|e| TagError::load(path, e))?;

        let Some(tag) = tagged.primary_tag().or_else(|| tagged.first_tag()) else {
            debug!(path = %path.display(), "no tags present");
            return Ok(TagSet::new());
        };

        Ok(read_tag(tag))
    }

    fn save_tags(&self, path: &Path, tags: &TagSet) -> Result<Vec<TagKey>, TagError> {
        let mut tagged = lofty::read_from_path(path).map_err(|e| TagError::save(path, e))?;

        if tagged.primary_tag().is_none() {
            let tag_type = tagged.primary_tag_type();
            tagged.insert_tag(Tag::new(tag_type));
        }

        let tag = tagged
            .primary_tag_mut()
            .ok_or_else(|| TagError::save(path, "file has no writable tag"))?;
        let skipped = write_tag(tag, tags);

        tagged
            .save_to_path(path, WriteOptions::default())
            .map_err(|e| TagError::save(path, e))?;

        debug!(path = %path.display(), fields = tags.fields.len(), "tags saved");
        Ok(skipped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lofty::tag::TagType;

    /// A short, silent 16-bit stereo WAV file.
    fn write_wav(path: &Path) {
        let samples = vec![0u8; 4 * 441];
        let mut wav = Vec::new();
        wav.extend_from_slice(b"RIFF");
        wav.extend_from_slice(&(36 + samples.len() as u32).to_le_bytes());
        wav.extend_from_slice(b"WAVE");
        wav.extend_from_slice(b"fmt ");
        wav.extend_from_slice(&16u32.to_le_bytes());
        wav.extend_from_slice(&1u16.to_le_bytes()); // PCM
        wav.extend_from_slice(&2u16.to_le_bytes());
        wav.extend_from_slice(&44100u32.to_le_bytes());
        wav.extend_from_slice(&(44100u32 * 4).to_le_bytes());
        wav.extend_from_slice(&4u16.to_le_bytes());
        wav.extend_from_slice(&16u16.to_le_bytes());
        wav.extend_from_slice(b"data");
        wav.extend_from_slice(&(samples.len() as u32).to_le_bytes());
        wav.extend_from_slice(&samples);
        std::fs::write(path, wav).unwrap();
    }

    #[test]
    fn test_read_tag_sanitizes_values() {
        let mut tag = Tag::new(TagType::Id3v2);
        tag.insert_text(ItemKey::TrackArtist, "Some Artist".to_string());
        tag.insert_text(ItemKey::TrackNumber, "3".to_string());
        tag.insert_text(ItemKey::Genre, "   ".to_string());

        let set = read_tag(&tag);
        assert_eq!(
            set.get(TagKey::Artist),
            Some(&TagValue::Text("Some Artist".to_string()))
        );
        assert_eq!(set.get(TagKey::TrackNumber), Some(&TagValue::Integer(3)));
        assert!(set.get(TagKey::Genre).is_none());
        assert!(set.artwork.is_none());
    }

    #[test]
    fn test_write_tag_replaces_values() {
        let mut tag = Tag::new(TagType::Id3v2);
        tag.insert_text(ItemKey::TrackTitle, "Old".to_string());

        let mut tags = TagSet::new();
        tags.set(TagKey::Title, "New").set(TagKey::Album, "Album");
        let skipped = write_tag(&mut tag, &tags);

        assert!(skipped.is_empty());
        assert_eq!(tag.get_string(&ItemKey::TrackTitle), Some("New"));
        assert_eq!(tag.get_strings(&ItemKey::TrackTitle).count(), 1);
        assert_eq!(tag.get_string(&ItemKey::AlbumTitle), Some("Album"));
    }

    #[test]
    fn test_save_and_load_wav() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("track.wav");
        write_wav(&path);

        let store = LoftyTagStore::new();
        assert!(store.load_tags(&path).unwrap().fields.is_empty());

        let mut tags = TagSet::new();
        tags.set(TagKey::Artist, "Some Artist")
            .set(TagKey::Title, "Some Song")
            .set(TagKey::Album, "Some Album");
        store.save_tags(&path, &tags).unwrap();

        let loaded = store.load_tags(&path).unwrap();
        assert_eq!(
            loaded.get(TagKey::Title),
            Some(&TagValue::Text("Some Song".to_string()))
        );
        assert_eq!(
            loaded.get(TagKey::Album),
            Some(&TagValue::Text("Some Album".to_string()))
        );
    }

    #[test]
    fn test_load_missing_file() {
        let err = LoftyTagStore::new()
            .load_tags(Path::new("/nonexistent/track.mp3"))
            .unwrap_err();
        assert!(matches!(err, TagError::Load { .. }));
    }
}
