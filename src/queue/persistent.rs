use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_lock::{Mutex, MutexGuard};

use crate::client::Diagnostics;
use crate::config::{BackoffStrategy, ObservabilityConfig};
use crate::persistence::{serialization_error, StorageHandle, StorageResult};
use crate::platform::runtime;
use crate::queue::item::{ItemState, QueueItemKind, QueuedItem, QueuedPayload};
use crate::transport::Dispatcher;
use crate::util::{now_millis, BackoffPolicy};

pub const QUEUE_STORAGE_KEY: &str = "observability_event_queue";
pub const QUEUE_CAPACITY: usize = 100;
/// Items kept when a write hits the storage quota.
pub const QUOTA_FALLBACK_LEN: usize = 50;
pub const DEFAULT_DRAIN_BATCH: usize = 10;

/// Retry rules applied by [`PersistentQueue::drain`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DrainPolicy {
    pub retry_attempts: u32,
    pub backoff: BackoffPolicy,
    pub strategy: BackoffStrategy,
}

impl DrainPolicy {
    pub fn from_config(config: &ObservabilityConfig, backoff_unit: Duration) -> Self {
        Self {
            retry_attempts: config.retry_attempts,
            backoff: BackoffPolicy::new(backoff_unit, config.retry_backoff),
            strategy: config.backoff_strategy,
        }
    }
}

/// Result of one drain pass: the state each visited item ended the pass in.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub visited: Vec<(String, ItemState)>,
    /// Set when another pass was already running; nothing was visited.
    pub skipped: bool,
}

impl DrainReport {
    pub fn delivered(&self) -> Vec<&str> {
        self.with_state(|state| matches!(state, ItemState::Delivered))
    }

    pub fn dropped(&self) -> Vec<&str> {
        self.with_state(|state| matches!(state, ItemState::Dropped(_)))
    }

    pub fn retrying(&self) -> Vec<&str> {
        self.with_state(|state| matches!(state, ItemState::Retrying { .. }))
    }

    fn with_state(&self, predicate: impl Fn(&ItemState) -> bool) -> Vec<&str> {
        self.visited
            .iter()
            .filter(|(_, state)| predicate(state))
            .map(|(id, _)| id.as_str())
            .collect()
    }
}

/// Bounded, storage-backed FIFO of failed deliveries.
///
/// Storage under [`QUEUE_STORAGE_KEY`] is authoritative: every access re-reads it under an async
/// mutex and every mutation writes the full list back. The in-memory copy only covers storage
/// that cannot be read. The lock is never held across a network attempt.
pub struct PersistentQueue {
    storage: StorageHandle,
    items: Mutex<Vec<QueuedItem>>,
    capacity: usize,
    draining: AtomicBool,
    diagnostics: Diagnostics,
}

impl PersistentQueue {
    /// Restores the queue persisted by a previous run. Unreadable data starts an empty queue.
    pub fn load(storage: StorageHandle, diagnostics: Diagnostics) -> Self {
        Self::with_capacity(storage, diagnostics, QUEUE_CAPACITY)
    }

    pub fn with_capacity(storage: StorageHandle, diagnostics: Diagnostics, capacity: usize) -> Self {
        let items = read_persisted(&storage, &diagnostics).unwrap_or_default();
        Self {
            storage,
            items: Mutex::new(items),
            capacity: capacity.max(1),
            draining: AtomicBool::new(false),
            diagnostics,
        }
    }

    /// Locks the list after re-reading it from storage, so writers sharing the same storage
    /// (another client or process) are never overwritten with a stale copy.
    async fn synced(&self) -> MutexGuard<'_, Vec<QueuedItem>> {
        let mut items = self.items.lock().await;
        if let Some(persisted) = read_persisted(&self.storage, &self.diagnostics) {
            *items = persisted;
        }
        items
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Appends a fresh item, evicting the oldest quarter first when the queue is full.
    pub async fn enqueue(&self, kind: QueueItemKind, payload: QueuedPayload) -> QueuedItem {
        let item = QueuedItem::new(kind, payload);
        let mut items = self.synced().await;
        if items.len() >= self.capacity {
            let evict = (self.capacity / 4).max(1).min(items.len());
            items.drain(..evict);
            self.diagnostics
                .warn(format!("event queue full, evicted {evict} oldest items"));
        }
        items.push(item.clone());
        self.persist(&mut items);
        item
    }

    pub async fn snapshot(&self) -> Vec<QueuedItem> {
        self.synced().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.synced().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.synced().await.is_empty()
    }

    pub async fn get(&self, id: &str) -> Option<QueuedItem> {
        self.synced()
            .await
            .iter()
            .find(|item| item.id == id)
            .cloned()
    }

    pub async fn clear(&self) {
        let mut items = self.items.lock().await;
        items.clear();
        self.persist(&mut items);
    }

    /// Removes the item with `id`. Returns `false` when it was already gone.
    pub async fn remove(&self, id: &str) -> bool {
        let mut items = self.synced().await;
        let before = items.len();
        items.retain(|item| item.id != id);
        let removed = items.len() != before;
        if removed {
            self.persist(&mut items);
        }
        removed
    }

    /// Counts a failed retry of `id` and optionally schedules its next attempt. Returns the new
    /// retry count, or `None` if the item is no longer queued.
    pub async fn record_failure(&self, id: &str, next_attempt_at: Option<i64>) -> Option<u32> {
        let mut items = self.synced().await;
        let item = items.iter_mut().find(|item| item.id == id)?;
        item.retry_count = item.retry_count.saturating_add(1);
        item.next_attempt_at = next_attempt_at;
        let retry_count = item.retry_count;
        self.persist(&mut items);
        Some(retry_count)
    }

    /// Attempts delivery of up to `max_items` of the oldest queued items.
    ///
    /// Items at the retry ceiling are dropped, successes and blocked requests are removed, and
    /// retryable failures bump `retry_count`. Under [`BackoffStrategy::Serial`] the pass sleeps
    /// `unit * factor^retry_count` after each such failure; under [`BackoffStrategy::Deferred`]
    /// the item instead records when it is next due and passes skip it until then.
    pub async fn drain(
        &self,
        dispatcher: &Dispatcher,
        policy: &DrainPolicy,
        max_items: usize,
    ) -> DrainReport {
        if self
            .draining
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return DrainReport {
                skipped: true,
                ..DrainReport::default()
            };
        }
        let _running = DrainGuard(&self.draining);

        let now = now_millis();
        let candidates: Vec<String> = self
            .synced()
            .await
            .iter()
            .filter(|item| policy.strategy == BackoffStrategy::Serial || item.is_due(now))
            .take(max_items)
            .map(|item| item.id.clone())
            .collect();

        let mut report = DrainReport::default();
        for id in candidates {
            let Some(item) = self.get(&id).await else {
                continue;
            };

            if let state @ ItemState::Dropped(_) = item.state(policy.retry_attempts) {
                self.remove(&id).await;
                self.diagnostics.debug(format!(
                    "dropping {} after {} failed retries",
                    item.payload.endpoint, item.retry_count
                ));
                report.visited.push((id, state));
                continue;
            }

            let attempt = dispatcher
                .attempt(&item.payload.endpoint, &item.payload.body)
                .await;
            let state = item.after_attempt(&attempt);
            match state {
                ItemState::Delivered => {
                    self.remove(&id).await;
                }
                ItemState::Dropped(reason) => {
                    self.remove(&id).await;
                    self.diagnostics.debug(format!(
                        "discarding queued {} ({reason})",
                        item.payload.endpoint
                    ));
                }
                ItemState::Retrying { retry_count } => {
                    if let Err(failure) = &attempt {
                        self.diagnostics.debug(format!(
                            "retry {retry_count} of {} failed: {failure}",
                            item.payload.endpoint
                        ));
                    }
                    let delay = policy.backoff.delay_for(retry_count);
                    match policy.strategy {
                        BackoffStrategy::Serial => {
                            self.record_failure(&id, None).await;
                            runtime::sleep(delay).await;
                        }
                        BackoffStrategy::Deferred => {
                            let due = now_millis().saturating_add(delay.as_millis() as i64);
                            self.record_failure(&id, Some(due)).await;
                        }
                    }
                }
                ItemState::Enqueued => {}
            }
            report.visited.push((id, state));
        }
        report
    }

    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::Acquire)
    }

    /// Writes `items` through to storage, trimming progressively when the quota is exhausted.
    fn persist(&self, items: &mut Vec<QueuedItem>) {
        let err = match self.write(items) {
            Ok(()) => return,
            Err(err) => err,
        };
        if !err.is_quota_exceeded() {
            self.diagnostics
                .warn(format!("failed to persist event queue: {err}"));
            return;
        }

        let keep_from = items.len().saturating_sub(QUOTA_FALLBACK_LEN);
        let trimmed = items[keep_from..].to_vec();
        if self.write(&trimmed).is_ok() {
            self.diagnostics.warn(format!(
                "storage quota exceeded, kept the newest {} queued items",
                trimmed.len()
            ));
            *items = trimmed;
            return;
        }

        items.clear();
        if let Err(err) = self.storage.remove(QUEUE_STORAGE_KEY) {
            self.diagnostics
                .warn(format!("failed to clear event queue: {err}"));
        }
        self.diagnostics
            .warn("storage quota exceeded, cleared the event queue");
    }

    fn write(&self, items: &[QueuedItem]) -> StorageResult<()> {
        let raw = serde_json::to_string(items)
            .map_err(|err| serialization_error(format!("failed to encode event queue: {err}")))?;
        self.storage.set(QUEUE_STORAGE_KEY, &raw)
    }
}

/// The persisted list, `Some(vec![])` when nothing is stored, `None` when it cannot be read.
fn read_persisted(storage: &StorageHandle, diagnostics: &Diagnostics) -> Option<Vec<QueuedItem>> {
    match storage.get(QUEUE_STORAGE_KEY) {
        Ok(Some(raw)) => match serde_json::from_str::<Vec<QueuedItem>>(&raw) {
            Ok(items) => Some(items),
            Err(err) => {
                diagnostics.warn(format!("ignoring unreadable event queue: {err}"));
                None
            }
        },
        Ok(None) => Some(Vec::new()),
        Err(err) => {
            diagnostics.warn(format!("failed to read event queue: {err}"));
            None
        }
    }
}

struct DrainGuard<'a>(&'a AtomicBool);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
