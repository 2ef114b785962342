//! FIFO job queue shared by the worker pool and the coordinator.
//!
//! Every item taken with [`JobQueue::get`] must be acknowledged exactly once
//! with [`JobQueue::task_done`]; [`JobQueue::join`] resolves when the number of
//! acknowledgements matches the number of items ever put.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::Notify;
use tracing::warn;

use super::error::QueueError;
use super::task::ConversionTask;

/// A queue entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueItem {
    Task(ConversionTask),
    /// Tells the worker that takes it to exit.
    Stop,
}

#[derive(Debug, Default)]
struct QueueState {
    items: VecDeque<QueueItem>,
    unfinished: usize,
}

#[derive(Debug, Default)]
pub struct JobQueue {
    state: Mutex<QueueState>,
    available: Notify,
    drained: Notify,
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        // No code path panics while holding the lock.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Appends one item.
    pub fn put(&self, item: QueueItem) {
        self.put_all([item]);
    }

    /// Appends items in order.
    pub fn put_all(&self, items: impl IntoIterator<Item = QueueItem>) {
        {
            let mut state = self.lock();
            let before = state.items.len();
            state.items.extend(items);
            let added = state.items.len() - before;
            state.unfinished += added;
        }
        self.available.notify_waiters();
    }

    /// Removes and returns the next item, waiting until one is available.
    pub async fn get(&self) -> QueueItem {
        loop {
            let notified = self.available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(item) = self.lock().items.pop_front() {
                return item;
            }
            notified.await;
        }
    }

    /// Removes the next item without waiting.
    pub fn try_get(&self) -> Option<QueueItem> {
        self.lock().items.pop_front()
    }

    /// Acknowledges one item taken from the queue.
    pub fn task_done(&self) -> Result<(), QueueError> {
        let drained = {
            let mut state = self.lock();
            if state.unfinished == 0 {
                return Err(QueueError::Overacknowledged);
            }
            state.unfinished -= 1;
            state.unfinished == 0
        };
        if drained {
            self.drained.notify_waiters();
        }
        Ok(())
    }

    /// Waits until every item put on the queue has been acknowledged.
    pub async fn join(&self) {
        loop {
            let notified = self.drained.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.lock().unfinished == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Atomically removes every queued task, keeping stop sentinels in place.
    ///
    /// The removed tasks still count as unfinished; the caller acknowledges
    /// each one.
    pub fn cancel_pending(&self) -> Vec<ConversionTask> {
        let mut state = self.lock();
        let mut cancelled = Vec::new();
        state.items.retain(|item| match item {
            QueueItem::Task(task) => {
                cancelled.push(task.clone());
                false
            }
            QueueItem::Stop => true,
        });
        cancelled
    }

    /// Number of items waiting to be taken.
    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }

    /// Items put but not yet acknowledged.
    pub fn unfinished(&self) -> usize {
        self.lock().unfinished
    }
}

/// Acknowledges one queue item when dropped.
pub struct AckGuard<'a> {
    queue: &'a JobQueue,
}

impl<'a> AckGuard<'a> {
    pub fn new(queue: &'a JobQueue) -> Self {
        Self { queue }
    }
}

impl Drop for AckGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.queue.task_done() {
            warn!(error = %e, "queue acknowledgement rejected");
        }
    }
}
