//! Batch events, log entries and reports.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Background for error entries.
pub const COLOR_RED: &str = "#de5d70";
/// Background for entries that were skipped because the output exists.
pub const COLOR_BLUE: &str = "#badeff";
/// Background for cancelled tasks and metadata-only failures.
pub const COLOR_YELLOW: &str = "#faef5a";

/// Kind of a user-facing log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogKind {
    Done,
    Copy,
    Exists,
    Cancel,
    Error,
    /// Audio written, tags could not be copied.
    Tags,
}

impl LogKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Done => "Done",
            Self::Copy => "Copy",
            Self::Exists => "Exists",
            Self::Cancel => "Cancel",
            Self::Error => "Error",
            Self::Tags => "Tags",
        }
    }

    /// Background color, `None` for transparent.
    pub fn color(&self) -> Option<&'static str> {
        match self {
            Self::Done | Self::Copy => None,
            Self::Exists => Some(COLOR_BLUE),
            Self::Cancel | Self::Tags => Some(COLOR_YELLOW),
            Self::Error => Some(COLOR_RED),
        }
    }
}

/// One colored line in the batch log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub kind: LogKind,
    /// Relative destination path the entry is about.
    pub subject: String,
    pub detail: Option<String>,
}

impl LogEntry {
    pub fn new(kind: LogKind, subject: impl Into<String>) -> Self {
        Self {
            kind,
            subject: subject.into(),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn color(&self) -> Option<&'static str> {
        self.kind.color()
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.label(), self.subject)?;
        if let Some(detail) = &self.detail {
            write!(f, ": {}", detail)?;
        }
        Ok(())
    }
}

/// Progress of one worker slot. Last write wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressReport {
    pub worker: usize,
    pub percent: u8,
}

/// Events emitted while a batch runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BatchEvent {
    /// A worker picked up a task.
    Started { worker: usize, path: String },
    Progress(ProgressReport),
    Log(LogEntry),
}

/// Final disposition of one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    Done,
    Copied,
    Exists,
    Unknown,
    Cancelled,
    Failed,
    MetadataFailed,
}

/// Outcome counts for one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    pub enqueued: usize,
    pub done: usize,
    pub copied: usize,
    pub exists: usize,
    pub unknown: usize,
    pub cancelled: usize,
    pub failed: usize,
    pub metadata_failed: usize,
}

impl BatchReport {
    /// Tasks a worker actually handled.
    pub fn processed(&self) -> usize {
        self.done + self.copied + self.unknown + self.failed + self.metadata_failed
    }

    /// Every task accounted for, whatever its outcome.
    pub fn total(&self) -> usize {
        self.processed() + self.exists + self.cancelled
    }
}

/// Shared outcome counters for a running batch.
#[derive(Debug, Default)]
pub(crate) struct BatchStats {
    done: AtomicUsize,
    copied: AtomicUsize,
    exists: AtomicUsize,
    unknown: AtomicUsize,
    cancelled: AtomicUsize,
    failed: AtomicUsize,
    metadata_failed: AtomicUsize,
}

impl BatchStats {
    fn counter(&self, outcome: TaskOutcome) -> &AtomicUsize {
        match outcome {
            TaskOutcome::Done => &self.done,
            TaskOutcome::Copied => &self.copied,
            TaskOutcome::Exists => &self.exists,
            TaskOutcome::Unknown => &self.unknown,
            TaskOutcome::Cancelled => &self.cancelled,
            TaskOutcome::Failed => &self.failed,
            TaskOutcome::MetadataFailed => &self.metadata_failed,
        }
    }

    pub fn record(&self, outcome: TaskOutcome) {
        self.counter(outcome).fetch_add(1, Ordering::Relaxed);
    }

    pub fn reset(&self) {
        for outcome in [
            TaskOutcome::Done,
            TaskOutcome::Copied,
            TaskOutcome::Exists,
            TaskOutcome::Unknown,
            TaskOutcome::Cancelled,
            TaskOutcome::Failed,
            TaskOutcome::MetadataFailed,
        ] {
            self.counter(outcome).store(0, Ordering::Relaxed);
        }
    }

    pub fn to_report(&self, enqueued: usize) -> BatchReport {
        BatchReport {
            enqueued,
            done: self.done.load(Ordering::Relaxed),
            copied: self.copied.load(Ordering::Relaxed),
            exists: self.exists.load(Ordering::Relaxed),
            unknown: self.unknown.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            metadata_failed: self.metadata_failed.load(Ordering::Relaxed),
        }
    }
}
