//! Concurrent batch conversion.
//!
//! A [`BatchCoordinator`] fills a [`JobQueue`] with [`ConversionTask`]s
//! followed by one stop sentinel per worker, then waits until every item has
//! been acknowledged. Workers route each task through the [`FormatPolicy`]:
//! unknown extensions are dropped, accepted lossy formats are copied and the
//! rest go through the [`Converter`](crate::converter::Converter).
//!
//! # Example
//!
//! ```rust,ignore
//! let coordinator = Arc::new(
//!     BatchCoordinator::new(converter, encoder, FormatPolicy::default(), config.batch)
//!         .with_events(events_tx),
//! );
//! let tasks = scan_tree(Path::new("/music"))?;
//! let report = coordinator.process(tasks, Path::new("/sync")).await?;
//! println!("{} done, {} copied", report.done, report.copied);
//! ```

mod coordinator;
mod copy;
mod error;
mod formats;
mod queue;
mod scan;
mod task;
mod types;
mod worker;

pub use coordinator::BatchCoordinator;
pub use copy::{copy_file, sha256_file};
pub use error::{BatchError, CopyError, QueueError, TaskError};
pub use formats::{FormatPolicy, Route};
pub use queue::{AckGuard, JobQueue, QueueItem};
pub use scan::scan_tree;
pub use task::{normalize_relative_dir, ConversionTask};
pub use types::{
    BatchEvent, BatchReport, LogEntry, LogKind, ProgressReport, TaskOutcome, COLOR_BLUE,
    COLOR_RED, COLOR_YELLOW,
};
