//! Deduplicating work queue.
//!
//! Semantics follow the usual controller work queue:
//!
//! - an item already waiting is not queued twice
//! - an item being processed is never handed to a second worker; adding it
//!   again marks it dirty and it is re-queued on [`DedupWorkQueue::done`]
//! - failed items are retried with exponential backoff until the retry
//!   budget is spent

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use backon::{BackoffBuilder, ExponentialBuilder};
use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::{debug, warn};

use super::WorkItem;

/// Sink for work items. Adding never fails.
pub trait WorkQueue: Send + Sync {
    fn add(&self, item: WorkItem);
}

/// Retry policy for failed items.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueBackoff {
    pub min_delay: Duration,
    pub max_delay: Duration,
    pub max_retries: usize,
}

impl Default for QueueBackoff {
    fn default() -> Self {
        Self {
            min_delay: Duration::from_millis(5),
            max_delay: Duration::from_secs(300),
            max_retries: 15,
        }
    }
}

impl QueueBackoff {
    fn builder(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.min_delay)
            .with_max_delay(self.max_delay)
            .with_max_times(self.max_retries)
    }

    /// Delay before retry number `attempt` (1-based), `None` once the budget
    /// is spent.
    pub fn delay(&self, attempt: usize) -> Option<Duration> {
        if attempt == 0 {
            return Some(Duration::ZERO);
        }
        self.builder().build().nth(attempt - 1)
    }
}

#[derive(Default)]
struct QueueState {
    queue: VecDeque<WorkItem>,
    dirty: HashSet<WorkItem>,
    processing: HashSet<WorkItem>,
    failures: HashMap<WorkItem, usize>,
    shutting_down: bool,
}

pub struct DedupWorkQueue {
    state: Mutex<QueueState>,
    notify: Notify,
    backoff: QueueBackoff,
}

impl Default for DedupWorkQueue {
    fn default() -> Self {
        Self::new(QueueBackoff::default())
    }
}

impl DedupWorkQueue {
    pub fn new(backoff: QueueBackoff) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
            backoff,
        }
    }

    /// Wait for the next item. Returns `None` once the queue is shut down
    /// and drained.
    pub async fn get(&self) -> Option<WorkItem> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.state.lock();
                if let Some(item) = state.queue.pop_front() {
                    state.dirty.remove(&item);
                    state.processing.insert(item.clone());
                    if !state.queue.is_empty() {
                        self.notify.notify_one();
                    }
                    return Some(item);
                }
                if state.shutting_down {
                    return None;
                }
            }

            notified.await;
        }
    }

    /// Mark `item` as finished; re-queues it if it was added meanwhile.
    pub fn done(&self, item: &WorkItem) {
        let mut state = self.state.lock();
        state.processing.remove(item);
        if state.dirty.contains(item) {
            state.queue.push_back(item.clone());
            drop(state);
            self.notify.notify_one();
        }
    }

    /// Re-add `item` after its backoff delay. Gives up once the retry budget
    /// is spent.
    pub fn add_rate_limited(self: &Arc<Self>, item: WorkItem) {
        let attempt = {
            let mut state = self.state.lock();
            let failures = state.failures.entry(item.clone()).or_insert(0);
            *failures += 1;
            *failures
        };

        match self.backoff.delay(attempt) {
            Some(delay) => {
                debug!(item = %item, attempt = attempt, delay = ?delay, "Requeueing with backoff");
                self.add_after(item, delay);
            }
            None => {
                warn!(item = %item, attempts = attempt, "Retry budget exhausted, dropping item");
                self.forget(&item);
            }
        }
    }

    /// Add `item` once `delay` has elapsed.
    pub fn add_after(self: &Arc<Self>, item: WorkItem, delay: Duration) {
        if delay.is_zero() {
            self.add(item);
            return;
        }
        let queue = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            queue.add(item);
        });
    }

    /// Clear the failure history of `item`.
    pub fn forget(&self, item: &WorkItem) {
        self.state.lock().failures.remove(item);
    }

    /// Failures recorded for `item` since it was last forgotten.
    pub fn retries(&self, item: &WorkItem) -> usize {
        self.state.lock().failures.get(item).copied().unwrap_or(0)
    }

    /// Items waiting to be handed out.
    pub fn len(&self) -> usize {
        self.state.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stop accepting items and wake all waiting workers.
    pub fn shutdown(&self) {
        self.state.lock().shutting_down = true;
        self.notify.notify_waiters();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.state.lock().shutting_down
    }
}

impl WorkQueue for DedupWorkQueue {
    fn add(&self, item: WorkItem) {
        let mut state = self.state.lock();
        if state.shutting_down || !state.dirty.insert(item.clone()) {
            return;
        }
        if state.processing.contains(&item) {
            return;
        }
        state.queue.push_back(item);
        drop(state);
        self.notify.notify_one();
    }
}
