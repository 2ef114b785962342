//! Two-stage convert pipeline: optional WAV decode, encode, tag copy.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use super::error::ConvertError;
use crate::encoder::{Encoder, EncoderError, Transcoder};
use crate::tags::{copy_tags, TagKey, TagStore};

/// Percent of overall progress taken by the intermediate decode.
pub const DECODE_SHARE: u8 = 30;

/// Result of a successful conversion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConvertReport {
    /// Whether a WAV intermediate was produced.
    pub decoded: bool,
    /// Tag fields the output format could not hold.
    pub skipped_tags: Vec<TagKey>,
}

/// Runs one file through decode, encode and tag copy.
pub struct Converter {
    transcoder: Arc<dyn Transcoder>,
    tags: Arc<dyn TagStore>,
    temp_dir: PathBuf,
}

impl Converter {
    pub fn new(transcoder: Arc<dyn Transcoder>, tags: Arc<dyn TagStore>, temp_dir: PathBuf) -> Self {
        Self {
            transcoder,
            tags,
            temp_dir,
        }
    }

    pub fn transcoder(&self) -> &Arc<dyn Transcoder> {
        &self.transcoder
    }

    /// Intermediate file for one task. The task id keeps same-named sources
    /// from different directories apart.
    pub fn temp_path(&self, task_id: Uuid, input: &Path) -> PathBuf {
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "track".to_string());
        self.temp_dir.join(format!("{}-{}.wav", stem, task_id))
    }

    /// Converts `input` into `output` with `encoder`, reporting overall
    /// progress in `[0, 100]`.
    ///
    /// The intermediate WAV, if any, is removed whatever the outcome. A tag
    /// copy failure leaves the encoded output in place.
    pub async fn convert(
        &self,
        encoder: &dyn Encoder,
        task_id: Uuid,
        input: &Path,
        output: &Path,
        progress_tx: mpsc::Sender<u8>,
    ) -> Result<ConvertReport, ConvertError> {
        let mut last = 0u8;
        let mut report = ConvertReport::default();

        let (source, temp, offset) = if encoder.needs_wav() {
            let wav = self.temp_path(task_id, input);
            tokio::fs::create_dir_all(&self.temp_dir)
                .await
                .map_err(|e| ConvertError::Decode(e.into()))?;

            debug!(input = %input.display(), wav = %wav.display(), "decoding to wav");
            let decoded = forward_progress(0, DECODE_SHARE, &progress_tx, &mut last, |tx| {
                self.transcoder.decode_to_wav(input, &wav, tx)
            })
            .await;

            if let Err(e) = decoded {
                remove_temp(&wav).await;
                return Err(ConvertError::Decode(e));
            }
            report.decoded = true;
            (wav.clone(), Some(wav), DECODE_SHARE)
        } else {
            (input.to_path_buf(), None, 0)
        };

        debug!(encoder = encoder.name(), source = %source.display(), output = %output.display(), "encoding");
        let encoded = forward_progress(offset, 100 - offset, &progress_tx, &mut last, |tx| {
            encoder.process_with_progress(&source, output, tx)
        })
        .await;

        if let Some(wav) = &temp {
            remove_temp(wav).await;
        }
        encoded.map_err(ConvertError::Encode)?;

        report.skipped_tags = copy_tags(
            self.tags.clone(),
            input.to_path_buf(),
            output.to_path_buf(),
        )
        .await
        .map_err(ConvertError::Tags)?;

        Ok(report)
    }
}

/// Runs one stage, mapping its `[0, 100]` progress to
/// `offset + share * percent / 100` on `out`. Reported values never decrease.
async fn forward_progress<F, Fut>(
    offset: u8,
    share: u8,
    out: &mpsc::Sender<u8>,
    last: &mut u8,
    stage: F,
) -> Result<(), EncoderError>
where
    F: FnOnce(mpsc::Sender<u8>) -> Fut,
    Fut: Future<Output = Result<(), EncoderError>>,
{
    let (tx, mut rx) = mpsc::channel(32);
    let work = stage(tx);

    let forward = async {
        while let Some(percent) = rx.recv().await {
            let scaled = u16::from(share) * u16::from(percent.min(100)) / 100;
            let overall = (u16::from(offset) + scaled).min(100) as u8;
            if overall > *last {
                *last = overall;
                let _ = out.try_send(overall);
            }
        }
    };

    let (result, ()) = tokio::join!(work, forward);
    result
}

async fn remove_temp(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "failed to remove intermediate file");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tags::{TagKey, TagSet, TagValue};
    use crate::testing::{MockEncoder, MockTagStore, MockTranscoder};

    struct Fixture {
        dir: tempfile::TempDir,
        transcoder: Arc<MockTranscoder>,
        tags: Arc<MockTagStore>,
        converter: Converter,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let transcoder = Arc::new(MockTranscoder::new());
        let tags = Arc::new(MockTagStore::new());
        let converter = Converter::new(
            transcoder.clone(),
            tags.clone(),
            dir.path().join("tmp"),
        );
        Fixture {
            dir,
            transcoder,
            tags,
            converter,
        }
    }

    async fn drain(mut rx: mpsc::Receiver<u8>) -> Vec<u8> {
        let mut seen = Vec::new();
        while let Some(p) = rx.recv().await {
            seen.push(p);
        }
        seen
    }

    #[tokio::test]
    async fn test_two_stage_progress_is_scaled_and_monotonic() {
        let f = fixture();
        let input = crate::testing::fixtures::write_file(f.dir.path(), "src/track.flac", b"fLaC");
        let output = f.dir.path().join("out/track.m4a");
        let encoder = MockEncoder::new("mock-aac", true);

        let (tx, rx) = mpsc::channel(64);
        let report = f
            .converter
            .convert(&encoder, Uuid::new_v4(), &input, &output, tx)
            .await
            .unwrap();
        let seen = drain(rx).await;

        assert!(report.decoded);
        // Decode 0/50/100 -> 0/15/30, encode 0..100 -> 30..100.
        assert_eq!(seen, vec![15, 30, 47, 65, 82, 100]);
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
        assert!(output.exists());

        let decodes = f.transcoder.recorded_decodes().await;
        assert_eq!(decodes.len(), 1);
        let encodes = encoder.recorded_encodes().await;
        assert_eq!(encodes[0].input, decodes[0].1);
    }

    #[tokio::test]
    async fn test_temp_file_removed_after_encode_failure() {
        let f = fixture();
        let input = crate::testing::fixtures::write_file(f.dir.path(), "track.flac", b"fLaC");
        let output = f.dir.path().join("out/track.m4a");
        let encoder = MockEncoder::new("mock-aac", true);
        encoder
            .set_next_error(EncoderError::encode_failed("boom", None))
            .await;

        let (tx, _rx) = mpsc::channel(64);
        let err = f
            .converter
            .convert(&encoder, Uuid::new_v4(), &input, &output, tx)
            .await
            .unwrap_err();

        assert!(matches!(err, ConvertError::Encode(_)));
        let (_, wav) = &f.transcoder.recorded_decodes().await[0];
        assert!(!wav.exists());
        assert!(f.tags.recorded_saves().is_empty());
    }

    #[tokio::test]
    async fn test_decode_failure_skips_encode() {
        let f = fixture();
        let input = crate::testing::fixtures::write_file(f.dir.path(), "track.ape", b"MAC ");
        let encoder = MockEncoder::new("mock-aac", true);
        f.transcoder
            .set_next_error(EncoderError::encode_failed("bad input", None))
            .await;

        let (tx, _rx) = mpsc::channel(64);
        let err = f
            .converter
            .convert(&encoder, Uuid::new_v4(), &input, &f.dir.path().join("o.m4a"), tx)
            .await
            .unwrap_err();

        assert!(matches!(err, ConvertError::Decode(_)));
        assert_eq!(encoder.encode_count().await, 0);
    }

    #[tokio::test]
    async fn test_single_stage_encoder_reads_source_directly() {
        let f = fixture();
        let input = crate::testing::fixtures::write_file(f.dir.path(), "track.wma", b"WMA");
        let output = f.dir.path().join("track.m4a");
        let encoder = MockEncoder::new("mock-ffmpeg", false);

        let (tx, rx) = mpsc::channel(64);
        let report = f
            .converter
            .convert(&encoder, Uuid::new_v4(), &input, &output, tx)
            .await
            .unwrap();

        assert!(!report.decoded);
        assert!(f.transcoder.recorded_decodes().await.is_empty());
        assert_eq!(encoder.recorded_encodes().await[0].input, input);
        assert_eq!(drain(rx).await, vec![25, 50, 75, 100]);
    }

    #[tokio::test]
    async fn test_tags_copied_to_output() {
        let f = fixture();
        let input = crate::testing::fixtures::write_file(f.dir.path(), "track.flac", b"fLaC");
        let output = f.dir.path().join("track.m4a");
        let mut tags = TagSet::new();
        tags.set(TagKey::Title, "Neck").set(TagKey::TrackNumber, "4/9");
        f.tags.insert(&input, tags);
        f.tags.set_unsupported(vec![TagKey::TrackNumber]);

        let encoder = MockEncoder::new("mock-aac", true);
        let (tx, _rx) = mpsc::channel(64);
        let report = f
            .converter
            .convert(&encoder, Uuid::new_v4(), &input, &output, tx)
            .await
            .unwrap();

        assert_eq!(report.skipped_tags, vec![TagKey::TrackNumber]);
        let copied = f.tags.get(&output).unwrap();
        assert_eq!(
            copied.get(TagKey::Title),
            Some(&TagValue::Text("Neck".to_string()))
        );
    }

    #[tokio::test]
    async fn test_tag_failure_keeps_audio() {
        let f = fixture();
        let input = crate::testing::fixtures::write_file(f.dir.path(), "track.flac", b"fLaC");
        let output = f.dir.path().join("track.m4a");
        f.tags.fail_next_save();

        let encoder = MockEncoder::new("mock-aac", true);
        let (tx, _rx) = mpsc::channel(64);
        let err = f
            .converter
            .convert(&encoder, Uuid::new_v4(), &input, &output, tx)
            .await
            .unwrap_err();

        assert!(err.is_metadata_only());
        assert!(output.exists());
    }

    #[test]
    fn test_temp_path_unique_per_task() {
        let f = fixture();
        let a = f.converter.temp_path(Uuid::new_v4(), Path::new("/a/song.flac"));
        let b = f.converter.temp_path(Uuid::new_v4(), Path::new("/b/song.flac"));
        assert_ne!(a, b);
        assert!(a.starts_with(f.dir.path().join("tmp")));
        assert!(a.file_name().unwrap().to_string_lossy().starts_with("song-"));
        assert_eq!(a.extension().unwrap(), "wav");
    }
}
