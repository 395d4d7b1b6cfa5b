use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::client::DropReason;
use crate::transport::DeliveryFailure;
use crate::util::{now_millis, random_base36};

/// Collector endpoint family of a queued payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueItemKind {
    Event,
    UiEvent,
    UiError,
    ServiceError,
}

impl QueueItemKind {
    pub const ALL: [QueueItemKind; 4] = [
        QueueItemKind::Event,
        QueueItemKind::UiEvent,
        QueueItemKind::UiError,
        QueueItemKind::ServiceError,
    ];

    pub fn endpoint(&self) -> &'static str {
        match self {
            QueueItemKind::Event => "/events",
            QueueItemKind::UiEvent => "/ui-events",
            QueueItemKind::UiError => "/errors/ui",
            QueueItemKind::ServiceError => "/errors/services",
        }
    }

    /// Maps a collector path back to its kind. Unknown paths are not queueable.
    pub fn from_endpoint(endpoint: &str) -> Option<Self> {
        let path = endpoint.split('?').next().unwrap_or(endpoint);
        let normalized = format!("/{}", path.trim_matches('/'));
        Self::ALL
            .into_iter()
            .find(|kind| kind.endpoint() == normalized)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QueuedPayload {
    pub endpoint: String,
    pub body: Value,
}

/// One not-yet-confirmed delivery, as persisted under the queue storage key.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QueuedItem {
    pub id: String,
    pub kind: QueueItemKind,
    pub payload: QueuedPayload,
    /// Milliseconds since the Unix epoch.
    pub enqueued_at: i64,
    pub retry_count: u32,
    /// Earliest retry time under the deferred backoff strategy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_attempt_at: Option<i64>,
}

impl QueuedItem {
    pub fn new(kind: QueueItemKind, payload: QueuedPayload) -> Self {
        let enqueued_at = now_millis();
        Self {
            id: format!("{}_{}", enqueued_at, random_base36(9)),
            kind,
            payload,
            enqueued_at,
            retry_count: 0,
            next_attempt_at: None,
        }
    }

    /// Current state given the configured retry ceiling.
    pub fn state(&self, retry_attempts: u32) -> ItemState {
        if self.retry_count >= retry_attempts {
            ItemState::Dropped(DropReason::RetriesExhausted)
        } else if self.retry_count == 0 {
            ItemState::Enqueued
        } else {
            ItemState::Retrying {
                retry_count: self.retry_count,
            }
        }
    }

    pub fn is_due(&self, now_ms: i64) -> bool {
        self.next_attempt_at.map_or(true, |due| due <= now_ms)
    }

    /// State the item moves to after one delivery attempt.
    pub fn after_attempt(&self, attempt: &Result<u16, DeliveryFailure>) -> ItemState {
        match attempt {
            Ok(_) => ItemState::Delivered,
            Err(failure) if !failure.is_retryable() => ItemState::Dropped(DropReason::Blocked),
            Err(_) => ItemState::Retrying {
                retry_count: self.retry_count.saturating_add(1),
            },
        }
    }
}

/// Lifecycle of a queued item: `Enqueued -> (Retrying)* -> Delivered | Dropped`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ItemState {
    Enqueued,
    Retrying { retry_count: u32 },
    Delivered,
    Dropped(DropReason),
}

impl ItemState {
    /// `true` once the item has left the queue.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ItemState::Delivered | ItemState::Dropped(_))
    }
}
