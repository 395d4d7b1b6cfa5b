//! Fire-and-forget event, UI interaction and error tracking with a durable retry queue.
//!
//! Tracking calls never fail. Payloads are batched in memory, sent to a collector over HTTP, and
//! on retryable failures parked in a bounded, storage-backed queue that a periodic job drains
//! with exponential backoff.
//!
//! ```no_run
//! use observability_client::{initialize_observability, ObservabilityOptions};
//! use serde_json::json;
//!
//! # async fn run() {
//! let observability = initialize_observability(&ObservabilityOptions {
//!     service_url: Some("https://collector.example.com".into()),
//!     service_name: Some("checkout".into()),
//!     ..Default::default()
//! });
//! observability
//!     .tracker()
//!     .track_event("order_placed", "user_action", json!({"items": 3}))
//!     .await;
//! observability.shutdown().await;
//! # }
//! ```

pub mod client;
pub mod config;
pub mod instrumentation;
pub mod logger;
pub mod observability;
pub mod persistence;
pub mod platform;
pub mod queue;
pub mod session;
pub mod tracking;
pub mod transport;
pub mod util;

pub use client::{DeliveryClient, DeliveryOutcome, DropReason, SendOptions};
pub use config::{merge_config, ObservabilityConfig, ObservabilityOptions};
pub use observability::{initialize_observability, ObservabilityClient};
pub use tracking::{ServiceErrorReport, Severity, Tracker, UiErrorReport, UiInteraction};

#[cfg(test)]
pub mod test_support;
