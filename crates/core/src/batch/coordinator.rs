//! Batch lifecycle: fill the queue, run the worker pool, wait for drain.

use futures::future::join_all;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

use super::error::BatchError;
use super::formats::FormatPolicy;
use super::queue::{JobQueue, QueueItem};
use super::task::ConversionTask;
use super::types::{BatchEvent, BatchReport, BatchStats, LogEntry, LogKind, TaskOutcome};
use super::worker::{Worker, WorkerContext};
use crate::config::BatchConfig;
use crate::converter::Converter;
use crate::encoder::Encoder;

/// Clears the running flag when a batch ends, however it ends.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Runs one batch at a time through a pool of workers.
///
/// `process` and `break_convert_files` both take `&self`, so a coordinator
/// shared behind an `Arc` can be cancelled from another task while a batch is
/// running.
pub struct BatchCoordinator {
    converter: Arc<Converter>,
    encoder: Arc<dyn Encoder>,
    policy: Arc<FormatPolicy>,
    config: BatchConfig,
    events: Option<mpsc::Sender<BatchEvent>>,
    queue: Arc<JobQueue>,
    stats: Arc<BatchStats>,
    running: AtomicBool,
    stop_requested: Arc<AtomicBool>,
    all_done: AtomicBool,
    workers: AtomicUsize,
}

impl BatchCoordinator {
    pub fn new(
        converter: Arc<Converter>,
        encoder: Arc<dyn Encoder>,
        policy: FormatPolicy,
        config: BatchConfig,
    ) -> Self {
        Self {
            converter,
            encoder,
            policy: Arc::new(policy),
            config,
            events: None,
            queue: Arc::new(JobQueue::new()),
            stats: Arc::new(BatchStats::default()),
            running: AtomicBool::new(false),
            stop_requested: Arc::new(AtomicBool::new(false)),
            all_done: AtomicBool::new(false),
            workers: AtomicUsize::new(0),
        }
    }

    /// Sends progress and log events to `tx`.
    pub fn with_events(mut self, tx: mpsc::Sender<BatchEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Whether the last batch drained completely.
    pub fn all_done(&self) -> bool {
        self.all_done.load(Ordering::SeqCst)
    }

    pub fn stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }

    /// Converts or copies `tasks` into `output_dir` and waits for the batch
    /// to finish.
    ///
    /// Tasks are queued in the given order, followed by one stop sentinel per
    /// worker. Per-task failures are reported through events and the returned
    /// counts; only setup problems fail the call.
    pub async fn process(
        &self,
        tasks: Vec<ConversionTask>,
        output_dir: &Path,
    ) -> Result<BatchReport, BatchError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(BatchError::AlreadyRunning);
        }
        let _running = RunningGuard(&self.running);

        if self.queue.unfinished() > 0 {
            return Err(BatchError::AlreadyRunning);
        }

        self.stop_requested.store(false, Ordering::SeqCst);
        self.all_done.store(false, Ordering::SeqCst);
        self.stats.reset();

        if output_dir.as_os_str().is_empty() {
            return Err(BatchError::invalid_output(output_dir, "empty path"));
        }
        tokio::fs::create_dir_all(output_dir)
            .await
            .map_err(|e| BatchError::invalid_output(output_dir, e))?;

        if !self.encoder.is_available().await {
            warn!(
                encoder = self.encoder.name(),
                "encoder unavailable, transcodes in this batch will fail"
            );
        }

        let extension = self.encoder.output_extension().await;
        let threads = self.config.threads.max(1);
        let enqueued = tasks.len();
        self.workers.store(threads, Ordering::SeqCst);

        info!(
            tasks = enqueued,
            workers = threads,
            encoder = self.encoder.name(),
            output = %output_dir.display(),
            "batch started"
        );

        let ctx = Arc::new(WorkerContext {
            queue: self.queue.clone(),
            converter: self.converter.clone(),
            encoder: self.encoder.clone(),
            policy: self.policy.clone(),
            output_dir: output_dir.to_path_buf(),
            overwrite: self.config.overwrite,
            verify_copies: self.config.verify_copies,
            events: self.events.clone(),
            stats: self.stats.clone(),
            stop_requested: self.stop_requested.clone(),
        });

        let handles: Vec<_> = (0..threads)
            .map(|id| tokio::spawn(Worker::new(id, ctx.clone()).run()))
            .collect();

        self.queue.put_all(
            tasks
                .into_iter()
                .map(|task| QueueItem::Task(task.with_extension(&extension)))
                .chain(std::iter::repeat(QueueItem::Stop).take(threads)),
        );

        self.queue.join().await;

        for (id, result) in join_all(handles).await.into_iter().enumerate() {
            if let Err(e) = result {
                return Err(BatchError::Worker {
                    worker: id,
                    reason: e.to_string(),
                });
            }
        }

        self.all_done.store(true, Ordering::SeqCst);
        let report = self.stats.to_report(enqueued);
        info!(
            done = report.done,
            copied = report.copied,
            exists = report.exists,
            cancelled = report.cancelled,
            failed = report.failed,
            "batch finished"
        );
        Ok(report)
    }

    /// Cancels every queued task that has not started.
    ///
    /// Each cancelled task gets a "Cancel" log entry and is acknowledged
    /// without running. Tasks queued after the drain are cancelled by the
    /// worker that takes them. Stop sentinels stay queued, so every worker still
    /// exits; in-flight tasks run to completion. Returns the number of tasks
    /// cancelled once the queue has drained. Calling it again while the same
    /// batch is stopping returns 0 immediately.
    pub async fn break_convert_files(&self) -> usize {
        if !self.is_running() || self.stop_requested.swap(true, Ordering::SeqCst) {
            return 0;
        }

        let cancelled = self.queue.cancel_pending();
        info!(
            cancelled = cancelled.len(),
            workers = self.workers.load(Ordering::SeqCst),
            "cancelling batch"
        );

        for task in &cancelled {
            if let Some(tx) = &self.events {
                let entry = LogEntry::new(LogKind::Cancel, self.policy.planned_path(task));
                let _ = tx.send(BatchEvent::Log(entry)).await;
            }
            self.stats.record(TaskOutcome::Cancelled);
            if let Err(e) = self.queue.task_done() {
                warn!(error = %e, "cancelled task acknowledgement rejected");
            }
        }

        self.queue.join().await;
        cancelled.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::ProgressReport;
    use crate::testing::{fixtures, MockEncoder, MockTagStore, MockTranscoder};
    use std::time::Duration;
    use tempfile::TempDir;

    struct Harness {
        dir: TempDir,
        encoder: Arc<MockEncoder>,
        transcoder: Arc<MockTranscoder>,
        coordinator: Arc<BatchCoordinator>,
    }

    fn harness(threads: usize, overwrite: bool) -> Harness {
        build(threads, overwrite, None)
    }

    fn build(threads: usize, overwrite: bool, events: Option<mpsc::Sender<BatchEvent>>) -> Harness {
        let dir = TempDir::new().unwrap();
        let encoder = Arc::new(MockEncoder::new("mock-aac", true));
        let transcoder = Arc::new(MockTranscoder::new());
        let converter = Arc::new(Converter::new(
            transcoder.clone(),
            Arc::new(MockTagStore::new()),
            dir.path().join("tmp"),
        ));
        let config = BatchConfig {
            threads,
            overwrite,
            verify_copies: true,
        };
        let mut coordinator =
            BatchCoordinator::new(converter, encoder.clone(), FormatPolicy::default(), config);
        if let Some(tx) = events {
            coordinator = coordinator.with_events(tx);
        }
        let coordinator = Arc::new(coordinator);
        Harness {
            dir,
            encoder,
            transcoder,
            coordinator,
        }
    }

    fn tasks(root: &Path, files: &[&str]) -> Vec<ConversionTask> {
        fixtures::source_tree(root, files)
            .into_iter()
            .zip(files)
            .map(|(path, rel)| {
                let dir = Path::new(rel)
                    .parent()
                    .map(|p| p.to_string_lossy().to_string())
                    .unwrap_or_default();
                ConversionTask::new(path, &dir, "")
            })
            .collect()
    }

    #[tokio::test]
    async fn test_two_workers_consume_everything() {
        let h = harness(2, true);
        let src = h.dir.path().join("src");
        let out = h.dir.path().join("out");
        let batch = tasks(
            &src,
            &["a.flac", "b.flac", "c.wav", "d/e.flac", "d/f.aiff"],
        );

        let report = h.coordinator.process(batch, &out).await.unwrap();

        assert_eq!(report.done, 5);
        assert_eq!(report.total(), 5);
        assert_eq!(h.encoder.encode_count().await, 5);
        assert!(out.join("d/e.m4a").exists());
        assert!(out.join("c.m4a").exists());
        assert!(h.coordinator.all_done());
        assert!(!h.coordinator.is_running());
        assert_eq!(h.coordinator.queue.unfinished(), 0);
        assert!(h.coordinator.queue.is_empty());
    }

    #[tokio::test]
    async fn test_second_run_without_overwrite_reports_exists() {
        let h = harness(2, false);
        let src = h.dir.path().join("src");
        let out = h.dir.path().join("out");
        let files = ["a.flac", "b.mp3", "sub/c.wav"];

        let first = h
            .coordinator
            .process(tasks(&src, &files), &out)
            .await
            .unwrap();
        assert_eq!(first.done, 2);
        assert_eq!(first.copied, 1);
        let encodes = h.encoder.encode_count().await;
        let before = std::fs::read(out.join("b.mp3")).unwrap();

        let second = h
            .coordinator
            .process(tasks(&src, &files), &out)
            .await
            .unwrap();

        assert_eq!(second.exists, 3);
        assert_eq!(second.processed(), 0);
        assert_eq!(h.encoder.encode_count().await, encodes);
        assert_eq!(std::fs::read(out.join("b.mp3")).unwrap(), before);
    }

    #[tokio::test]
    async fn test_mp3_is_copied_without_encoder() {
        let (tx, mut rx) = mpsc::channel(64);
        let h = build(1, true, Some(tx));
        let src = h.dir.path().join("src");
        let out = h.dir.path().join("out");

        let report = h
            .coordinator
            .process(tasks(&src, &["track.mp3"]), &out)
            .await
            .unwrap();
        let Harness {
            dir: _dir,
            encoder,
            transcoder,
            coordinator,
        } = h;
        drop(coordinator);

        let mut logs = Vec::new();
        let mut last_progress = None;
        while let Some(event) = rx.recv().await {
            match event {
                BatchEvent::Log(entry) => logs.push(entry.to_string()),
                BatchEvent::Progress(p) => last_progress = Some(p),
                BatchEvent::Started { .. } => {}
            }
        }

        assert_eq!(report.copied, 1);
        assert_eq!(logs, vec!["Copy: track.mp3"]);
        assert_eq!(last_progress.map(|p| p.percent), Some(100));
        assert_eq!(encoder.encode_count().await, 0);
        assert!(transcoder.recorded_decodes().await.is_empty());
        assert_eq!(
            std::fs::read(out.join("track.mp3")).unwrap(),
            std::fs::read(src.join("track.mp3")).unwrap()
        );
    }

    #[tokio::test]
    async fn test_alac_m4a_is_transcoded() {
        let h = harness(1, true);
        let src = h.dir.path().join("src");
        let out = h.dir.path().join("out");
        let batch = tasks(&src, &["track.m4a"]);
        h.transcoder.set_codec(src.join("track.m4a"), "alac").await;

        let report = h.coordinator.process(batch, &out).await.unwrap();

        assert_eq!(report.done, 1);
        assert_eq!(report.copied, 0);
        assert_eq!(h.encoder.encode_count().await, 1);
        assert_eq!(
            std::fs::read_to_string(out.join("track.m4a")).unwrap(),
            "encoded by mock-aac"
        );
    }

    #[tokio::test]
    async fn test_unknown_extension_is_skipped() {
        let h = harness(2, true);
        let src = h.dir.path().join("src");
        let out = h.dir.path().join("out");

        let report = h
            .coordinator
            .process(tasks(&src, &["cover.jpg", "notes.txt", "a.flac"]), &out)
            .await
            .unwrap();

        assert_eq!(report.unknown, 2);
        assert_eq!(report.done, 1);
        assert!(!out.join("cover.jpg").exists());
        assert_eq!(h.coordinator.queue.unfinished(), 0);
    }

    #[tokio::test]
    async fn test_failure_does_not_abort_batch() {
        let h = harness(1, true);
        let src = h.dir.path().join("src");
        let out = h.dir.path().join("out");
        h.encoder
            .set_next_error(crate::encoder::EncoderError::encode_failed("boom", None))
            .await;

        let report = h
            .coordinator
            .process(tasks(&src, &["a.flac", "b.flac", "c.flac"]), &out)
            .await
            .unwrap();

        assert_eq!(report.failed, 1);
        assert_eq!(report.done, 2);
    }

    #[tokio::test]
    async fn test_unavailable_encoder_does_not_block_setup() {
        let h = harness(2, true);
        let src = h.dir.path().join("src");
        let out = h.dir.path().join("out");
        h.encoder.set_available(false).await;
        h.encoder.set_extension("aac").await;

        let report = h
            .coordinator
            .process(tasks(&src, &["a.flac", "b.mp3"]), &out)
            .await
            .unwrap();

        assert_eq!(report.copied, 1);
        assert_eq!(report.done, 1);
        assert!(out.join("a.aac").exists());
        assert!(out.join("b.mp3").exists());
    }

    #[tokio::test]
    async fn test_concurrent_process_is_rejected() {
        let h = harness(1, true);
        let gate = h.encoder.hold_encodes().await;
        let src = h.dir.path().join("src");
        let out = h.dir.path().join("out");
        let batch = tasks(&src, &["a.flac"]);

        let running = {
            let coordinator = h.coordinator.clone();
            let out = out.clone();
            tokio::spawn(async move { coordinator.process(batch, &out).await })
        };
        while h.encoder.encode_count().await == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let err = h.coordinator.process(Vec::new(), &out).await.unwrap_err();
        assert!(matches!(err, BatchError::AlreadyRunning));

        gate.add_permits(1);
        let report = running.await.unwrap().unwrap();
        assert_eq!(report.done, 1);
    }

    #[tokio::test]
    async fn test_cancellation_accounting() {
        let h = harness(1, true);
        let gate = h.encoder.hold_encodes().await;
        let src = h.dir.path().join("src");
        let out = h.dir.path().join("out");
        let batch = tasks(&src, &["1.flac", "2.flac", "3.flac", "4.flac", "5.flac"]);

        let running = {
            let coordinator = h.coordinator.clone();
            let out = out.clone();
            tokio::spawn(async move { coordinator.process(batch, &out).await })
        };
        while h.encoder.encode_count().await == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let breaker = {
            let coordinator = h.coordinator.clone();
            tokio::spawn(async move { coordinator.break_convert_files().await })
        };
        // Only the stop sentinel is left once pending tasks are drained.
        while !h.coordinator.stop_requested() || h.coordinator.queue.len() != 1 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(h.coordinator.break_convert_files().await, 0);

        gate.add_permits(1);
        let cancelled = tokio::time::timeout(Duration::from_secs(5), breaker)
            .await
            .unwrap()
            .unwrap();
        let report = running.await.unwrap().unwrap();

        assert_eq!(cancelled, 4);
        assert_eq!(report.done, 1);
        assert_eq!(report.cancelled, 4);
        assert_eq!(report.processed() + report.cancelled, report.enqueued - report.exists);
        assert_eq!(h.encoder.encode_count().await, 1);
    }

    #[tokio::test]
    async fn test_worker_cancels_task_taken_after_stop() {
        let (tx, mut rx) = mpsc::channel(64);
        let h = build(1, true, Some(tx));
        let gate = h.encoder.hold_encodes().await;
        let src = h.dir.path().join("src");
        let out = h.dir.path().join("out");
        let batch = tasks(&src, &["a.flac", "b.mp3"]);

        let running = {
            let coordinator = h.coordinator.clone();
            let out = out.clone();
            tokio::spawn(async move { coordinator.process(batch, &out).await })
        };
        while h.encoder.encode_count().await == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        // Stop observed by the worker itself, with b.mp3 still queued.
        h.coordinator.stop_requested.store(true, Ordering::SeqCst);
        gate.add_permits(1);
        let report = running.await.unwrap().unwrap();

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        let logs: Vec<String> = events
            .iter()
            .filter_map(|e| match e {
                BatchEvent::Log(entry) => Some(entry.to_string()),
                _ => None,
            })
            .collect();
        let terminal = events
            .iter()
            .filter(|e| matches!(e, BatchEvent::Progress(p) if p.percent == 100 && p.worker == 0))
            .count();

        assert_eq!(report.done, 1);
        assert_eq!(report.cancelled, 1);
        assert_eq!(logs, vec!["Done: a.m4a", "Cancel: b.mp3"]);
        assert_eq!(terminal, 2);
        assert!(matches!(
            events.last(),
            Some(BatchEvent::Progress(ProgressReport { worker: 0, percent: 100 }))
        ));
        assert!(!out.join("b.mp3").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unreadable_destination_is_an_error_not_absent() {
        let (tx, mut rx) = mpsc::channel(64);
        let h = build(1, false, Some(tx));
        let src = h.dir.path().join("src");
        let out = h.dir.path().join("out");
        let batch = tasks(&src, &["Artist/a.mp3"]);
        // A regular file where the artist directory should be.
        std::fs::create_dir_all(&out).unwrap();
        std::fs::write(out.join("Artist"), b"not a directory").unwrap();

        let report = h.coordinator.process(batch, &out).await.unwrap();

        let mut logs = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let BatchEvent::Log(entry) = event {
                logs.push(entry);
            }
        }
        assert_eq!(report.failed, 1);
        assert_eq!(report.exists, 0);
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].kind, LogKind::Error);
        assert!(logs[0]
            .detail
            .as_deref()
            .is_some_and(|d| d.starts_with("Failed to check destination")));
    }

    #[tokio::test]
    async fn test_break_without_batch_is_noop() {
        let h = harness(2, true);
        assert_eq!(h.coordinator.break_convert_files().await, 0);
        assert!(!h.coordinator.stop_requested());
    }
}
