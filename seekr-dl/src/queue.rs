//! Deduplicating retry queue
//!
//! Two FIFO tiers. First-time items go to the main tier; any item whose key
//! has been enqueued before lands in the retry tier. Once the main tier is
//! drained, [`RetryableQueue::try_dequeue`] waits `retry_wait` and promotes
//! the whole retry tier to a new main tier.
//!
//! The queue is owned by a single worker and takes `&mut self`; wrap it in a
//! mutex before sharing it between producers.

use seekr_common::Album;
use std::collections::{HashSet, VecDeque};
use std::hash::Hash;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

/// Default wait before the retry tier is promoted
pub const DEFAULT_RETRY_WAIT: Duration = Duration::from_secs(300);

/// Value identity of a queued job
pub trait QueueItem {
    type Key: Hash + Eq + Clone;

    fn queue_key(&self) -> Self::Key;
}

impl QueueItem for Album {
    type Key = Uuid;

    fn queue_key(&self) -> Uuid {
        self.id
    }
}

/// Which tier an enqueued item landed in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Main,
    Retry,
}

pub struct RetryableQueue<T: QueueItem> {
    seen: HashSet<T::Key>,
    main: VecDeque<T>,
    retry: VecDeque<T>,
    retry_wait: Duration,
}

impl<T: QueueItem> RetryableQueue<T> {
    pub fn new(retry_wait: Duration) -> Self {
        Self {
            seen: HashSet::new(),
            main: VecDeque::new(),
            retry: VecDeque::new(),
            retry_wait,
        }
    }

    /// Add an item; items seen before go to the retry tier
    pub fn enqueue(&mut self, item: T) -> Tier {
        if self.seen.insert(item.queue_key()) {
            self.main.push_back(item);
            Tier::Main
        } else {
            self.retry.push_back(item);
            Tier::Retry
        }
    }

    /// Enqueue each item in input order
    pub fn enqueue_many(&mut self, items: impl IntoIterator<Item = T>) {
        for item in items {
            self.enqueue(item);
        }
    }

    /// Next item, or `None` when both tiers are empty
    ///
    /// Suspends for `retry_wait` when only the retry tier has items. The
    /// wait happens before any mutation, so dropping the future (e.g. in a
    /// `select!` against a cancellation token) leaves the queue untouched.
    pub async fn try_dequeue(&mut self) -> Option<T> {
        if self.main.is_empty() && !self.retry.is_empty() {
            info!(
                deferred = self.retry.len(),
                wait_secs = self.retry_wait.as_secs(),
                "Waiting before retrying deferred items"
            );
            tokio::time::sleep(self.retry_wait).await;

            self.main = std::mem::take(&mut self.retry);
            debug!(items = self.main.len(), "Promoted retry tier");
        }

        self.main.pop_front()
    }

    pub fn main_len(&self) -> usize {
        self.main.len()
    }

    pub fn retry_len(&self) -> usize {
        self.retry.len()
    }

    pub fn len(&self) -> usize {
        self.main.len() + self.retry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.main.is_empty() && self.retry.is_empty()
    }

    pub fn retry_wait(&self) -> Duration {
        self.retry_wait
    }
}

impl<T: QueueItem> Default for RetryableQueue<T> {
    fn default() -> Self {
        Self::new(DEFAULT_RETRY_WAIT)
    }
}
