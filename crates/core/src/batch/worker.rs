//! Worker loop: take a task, route it, report progress and one log entry.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::copy::copy_file;
use super::error::TaskError;
use super::formats::{FormatPolicy, Route};
use super::queue::{AckGuard, JobQueue, QueueItem};
use super::task::ConversionTask;
use super::types::{BatchEvent, BatchStats, LogEntry, LogKind, ProgressReport, TaskOutcome};
use crate::converter::Converter;
use crate::encoder::Encoder;

/// State shared by every worker of one batch.
pub(crate) struct WorkerContext {
    pub queue: Arc<JobQueue>,
    pub converter: Arc<Converter>,
    pub encoder: Arc<dyn Encoder>,
    pub policy: Arc<FormatPolicy>,
    pub output_dir: PathBuf,
    pub overwrite: bool,
    pub verify_copies: bool,
    pub events: Option<mpsc::Sender<BatchEvent>>,
    pub stats: Arc<BatchStats>,
    pub stop_requested: Arc<AtomicBool>,
}

impl WorkerContext {
    /// Intermediate progress; dropped when the event channel is full.
    fn progress(&self, worker: usize, percent: u8) {
        if let Some(tx) = &self.events {
            let _ = tx.try_send(BatchEvent::Progress(ProgressReport { worker, percent }));
        }
    }

    /// Terminal progress for the slot, delivered like log entries.
    async fn finished(&self, worker: usize) {
        if let Some(tx) = &self.events {
            let report = ProgressReport {
                worker,
                percent: 100,
            };
            let _ = tx.send(BatchEvent::Progress(report)).await;
        }
    }

    async fn log(&self, entry: LogEntry) {
        if let Some(tx) = &self.events {
            let _ = tx.send(BatchEvent::Log(entry)).await;
        }
    }

    async fn started(&self, worker: usize, path: String) {
        if let Some(tx) = &self.events {
            let _ = tx.send(BatchEvent::Started { worker, path }).await;
        }
    }
}

pub(crate) struct Worker {
    id: usize,
    ctx: Arc<WorkerContext>,
}

impl Worker {
    pub fn new(id: usize, ctx: Arc<WorkerContext>) -> Self {
        Self { id, ctx }
    }

    /// Runs until a stop sentinel is taken. Every item is acknowledged.
    pub async fn run(self) {
        info!(worker = self.id, "worker ready");

        loop {
            let item = self.ctx.queue.get().await;
            let _ack = AckGuard::new(&self.ctx.queue);

            match item {
                QueueItem::Stop => {
                    info!(worker = self.id, "worker closed");
                    break;
                }
                QueueItem::Task(task) => self.handle(task).await,
            }
        }
    }

    async fn handle(&self, task: ConversionTask) {
        let ctx = &self.ctx;

        if ctx.stop_requested.load(Ordering::SeqCst) {
            debug!(worker = self.id, path = %task.source_path().display(), "cancelled");
            ctx.log(LogEntry::new(LogKind::Cancel, ctx.policy.planned_path(&task)))
                .await;
            ctx.stats.record(TaskOutcome::Cancelled);
            ctx.finished(self.id).await;
            return;
        }

        let Some(ext) = task
            .source_extension()
            .filter(|ext| ctx.policy.is_known(ext))
        else {
            debug!(
                worker = self.id,
                path = %task.source_path().display(),
                "unknown extension, skipping"
            );
            ctx.stats.record(TaskOutcome::Unknown);
            return;
        };

        ctx.started(self.id, task.copy_path()).await;
        ctx.progress(self.id, 0);

        let outcome = match self.process(&task, &ext).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(
                    worker = self.id,
                    task = %task.id(),
                    path = %task.source_path().display(),
                    error = %e,
                    "task failed"
                );
                let entry = LogEntry::new(LogKind::Error, task.destination_path())
                    .with_detail(e.to_string());
                ctx.log(entry).await;
                TaskOutcome::Failed
            }
        };

        ctx.stats.record(outcome);
        ctx.finished(self.id).await;
    }

    async fn process(&self, task: &ConversionTask, ext: &str) -> Result<TaskOutcome, TaskError> {
        let ctx = &self.ctx;
        let route = ctx
            .policy
            .route(ext, task.source_path(), ctx.converter.transcoder().as_ref())
            .await
            .map_err(TaskError::Probe)?;

        let relative = match route {
            Route::Copy => task.copy_path(),
            _ => task.destination_path(),
        };
        let destination = ctx.output_dir.join(&relative);

        let exists = !ctx.overwrite
            && tokio::fs::try_exists(&destination)
                .await
                .map_err(|e| TaskError::CheckDestination {
                    path: destination.clone(),
                    reason: e.to_string(),
                })?;
        if exists {
            info!(worker = self.id, path = %destination.display(), "destination exists");
            ctx.log(LogEntry::new(LogKind::Exists, relative)).await;
            return Ok(TaskOutcome::Exists);
        }

        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| TaskError::CreateDir {
                    path: parent.to_path_buf(),
                    reason: e.to_string(),
                })?;
        }

        match route {
            Route::Unknown => Ok(TaskOutcome::Unknown),
            Route::Copy => {
                info!(worker = self.id, source = %task.source_path().display(), "copy");
                copy_file(task.source_path(), &destination, ctx.verify_copies).await?;
                ctx.log(LogEntry::new(LogKind::Copy, relative)).await;
                Ok(TaskOutcome::Copied)
            }
            Route::Transcode { lossless } => {
                info!(
                    worker = self.id,
                    source = %task.source_path().display(),
                    output = %destination.display(),
                    lossless,
                    "convert"
                );
                self.transcode(task, &destination, relative).await
            }
        }
    }

    async fn transcode(
        &self,
        task: &ConversionTask,
        destination: &Path,
        relative: String,
    ) -> Result<TaskOutcome, TaskError> {
        let ctx = &self.ctx;
        let (tx, mut rx) = mpsc::channel(32);

        let convert = ctx.converter.convert(
            ctx.encoder.as_ref(),
            task.id(),
            task.source_path(),
            destination,
            tx,
        );
        let forward = async {
            // 100 is reserved for the terminal report sent by `handle`.
            while let Some(percent) = rx.recv().await {
                ctx.progress(self.id, percent.min(99));
            }
        };
        let (result, ()) = tokio::join!(convert, forward);

        match result {
            Ok(report) => {
                if !report.skipped_tags.is_empty() {
                    warn!(
                        worker = self.id,
                        path = %destination.display(),
                        skipped = ?report.skipped_tags,
                        "tags not supported by output format"
                    );
                }
                info!(worker = self.id, path = %relative, "done");
                ctx.log(LogEntry::new(LogKind::Done, relative)).await;
                Ok(TaskOutcome::Done)
            }
            Err(e) if e.is_metadata_only() => {
                warn!(worker = self.id, path = %destination.display(), error = %e, "tags not copied");
                let entry = LogEntry::new(LogKind::Tags, relative).with_detail(e.to_string());
                ctx.log(entry).await;
                Ok(TaskOutcome::MetadataFailed)
            }
            Err(e) => Err(e.into()),
        }
    }
}
