//! Routing policy: skip, copy or transcode.

use std::collections::BTreeSet;
use std::path::Path;
use tracing::debug;

use super::task::ConversionTask;
use crate::config::FormatsConfig;
use crate::encoder::{EncoderError, Transcoder};

/// What a worker does with one source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Extension outside the known set; the task is dropped.
    Unknown,
    /// Lossy source accepted as-is; copied byte for byte.
    Copy,
    /// Re-encoded through the active encoder.
    Transcode {
        /// Whether the source holds lossless audio.
        lossless: bool,
    },
}

/// Extension sets resolved from configuration. All entries are lowercase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatPolicy {
    known: BTreeSet<String>,
    lossless: BTreeSet<String>,
    passthrough: BTreeSet<String>,
    probe: BTreeSet<String>,
}

fn lowercase(set: &BTreeSet<String>) -> BTreeSet<String> {
    set.iter()
        .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
        .collect()
}

impl FormatPolicy {
    pub fn from_config(config: &FormatsConfig) -> Self {
        let known = lowercase(&config.known);
        let lossless = lowercase(&config.lossless);
        let passthrough = match &config.passthrough {
            Some(set) => lowercase(set),
            None => known.difference(&lossless).cloned().collect(),
        };

        Self {
            known,
            lossless,
            passthrough,
            probe: lowercase(&config.probe),
        }
    }

    pub fn is_known(&self, ext: &str) -> bool {
        self.known.contains(ext)
    }

    pub fn is_lossless(&self, ext: &str) -> bool {
        self.lossless.contains(ext)
    }

    /// Whether a lossy source with this extension is copied unchanged.
    pub fn accepts_as_is(&self, ext: &str) -> bool {
        self.passthrough.contains(ext)
    }

    /// Whether the container can hold either lossy or lossless audio.
    pub fn needs_probe(&self, ext: &str) -> bool {
        self.probe.contains(ext)
    }

    /// Relative destination of a task that has not been routed yet.
    ///
    /// Sources accepted as-is keep their name, including ambiguous containers
    /// that would only be transcoded after a probe.
    pub fn planned_path(&self, task: &ConversionTask) -> String {
        match task.source_extension() {
            Some(ext) if !self.is_lossless(&ext) && self.accepts_as_is(&ext) => task.copy_path(),
            _ => task.destination_path(),
        }
    }

    /// Decides the route for `source` with lowercase extension `ext`.
    ///
    /// Ambiguous containers are probed through `transcoder`; a probe failure
    /// is returned to the caller.
    pub async fn route(
        &self,
        ext: &str,
        source: &Path,
        transcoder: &dyn Transcoder,
    ) -> Result<Route, EncoderError> {
        if !self.is_known(ext) {
            return Ok(Route::Unknown);
        }
        if self.is_lossless(ext) {
            return Ok(Route::Transcode { lossless: true });
        }
        if self.needs_probe(ext) {
            let info = transcoder.probe(source).await?;
            debug!(path = %source.display(), codec = ?info.codec, "probed container");
            if info.is_alac() {
                return Ok(Route::Transcode { lossless: true });
            }
        }
        if self.accepts_as_is(ext) {
            Ok(Route::Copy)
        } else {
            Ok(Route::Transcode { lossless: false })
        }
    }
}

impl Default for FormatPolicy {
    fn default() -> Self {
        Self::from_config(&FormatsConfig::default())
    }
}
