//! Delivery client: batching, immediate sends, durable retries and the diagnostics sink.
mod delivery;
mod diagnostics;
mod outcome;

pub use delivery::{DeliveryClient, DeliveryClientBuilder, DEFAULT_BACKOFF_UNIT, DRAIN_INTERVAL};
pub use diagnostics::{Diagnostics, DIAGNOSTICS_LOGGER};
pub use outcome::{DeliveryOutcome, DropReason, SendOptions};
