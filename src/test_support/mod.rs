//! Test utilities shared across crate-level unit tests.

#[cfg(not(target_arch = "wasm32"))]
pub mod http;

use std::sync::Arc;
use std::time::Duration;

use crate::client::DeliveryClient;
use crate::config::{merge_config, ObservabilityOptions};
use crate::persistence::InMemoryStorage;
use crate::transport::TransportHandle;

#[cfg(not(target_arch = "wasm32"))]
pub use http::start_mock_server;

/// Collector URL used by scripted-transport tests.
pub const TEST_SERVICE_URL: &str = "http://collector.test";

/// Delivery client over `transport` with in-memory storage and no backoff delay. The service URL
/// defaults to [`TEST_SERVICE_URL`] unless `options` sets one.
pub fn in_memory_client(options: ObservabilityOptions, transport: TransportHandle) -> DeliveryClient {
    let options = ObservabilityOptions {
        service_url: options
            .service_url
            .clone()
            .or_else(|| Some(TEST_SERVICE_URL.to_string())),
        ..options
    };
    DeliveryClient::builder(merge_config(&options))
        .transport(transport)
        .local_storage(Arc::new(InMemoryStorage::new()))
        .session_storage(Arc::new(InMemoryStorage::new()))
        .backoff_unit(Duration::ZERO)
        .build()
}
