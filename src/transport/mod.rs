//! Collector transports and delivery-attempt classification.
mod dispatcher;
mod error;
mod http;
mod mock;

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

pub use dispatcher::{DeliveryFailure, Dispatcher, HEALTH_CHECK_TIMEOUT, HEALTH_PATH};
pub use error::{
    blocked_error, connectivity_error, internal_error, timeout_error, TransportError,
    TransportErrorCode, TransportResult,
};
pub use http::HttpTransport;
pub use mock::{MockReply, MockTransport, RecordedRequest};

/// Status and (best effort) body of a collector response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: Option<String>,
}

impl TransportResponse {
    pub fn new(status: u16) -> Self {
        Self { status, body: None }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Network seam used by the delivery client. Errors are reserved for attempts that produced no
/// HTTP status; any response, including 4xx/5xx, is returned as `Ok`.
#[cfg_attr(target_arch = "wasm32", async_trait::async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait::async_trait)]
pub trait Transport: Send + Sync {
    async fn post_json(
        &self,
        url: &str,
        body: &Value,
        timeout: Duration,
    ) -> TransportResult<TransportResponse>;

    async fn get(&self, url: &str, timeout: Duration) -> TransportResult<TransportResponse>;
}

pub type TransportHandle = Arc<dyn Transport>;
