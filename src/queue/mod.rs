//! Durable retry queue for deliveries that failed with a retryable error.
mod item;
mod persistent;

pub use item::{ItemState, QueueItemKind, QueuedItem, QueuedPayload};
pub use persistent::{
    DrainPolicy, DrainReport, PersistentQueue, DEFAULT_DRAIN_BATCH, QUEUE_CAPACITY,
    QUEUE_STORAGE_KEY, QUOTA_FALLBACK_LEN,
};
