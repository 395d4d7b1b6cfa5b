use std::fmt;
use std::time::Duration;

use serde_json::Value;

use crate::config::ObservabilityConfig;
use crate::transport::{TransportErrorCode, TransportHandle};

pub const HEALTH_PATH: &str = "/health";
pub const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// Why a single delivery attempt did not succeed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeliveryFailure {
    /// The collector answered with a non-2xx status.
    Http { status: u16, body: Option<String> },
    Connectivity(String),
    Timeout(String),
    /// Refused by the platform before reaching the collector (CORS). Never succeeds on retry.
    Blocked(String),
}

impl DeliveryFailure {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, DeliveryFailure::Blocked(_))
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            DeliveryFailure::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl fmt::Display for DeliveryFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryFailure::Http { status, body } => match body {
                Some(body) => write!(f, "collector responded with status {status}: {body}"),
                None => write!(f, "collector responded with status {status}"),
            },
            DeliveryFailure::Connectivity(message) => write!(f, "collector unreachable: {message}"),
            DeliveryFailure::Timeout(message) => write!(f, "collector timed out: {message}"),
            DeliveryFailure::Blocked(message) => write!(f, "request blocked: {message}"),
        }
    }
}

/// Performs single delivery attempts against the configured collector.
#[derive(Clone)]
pub struct Dispatcher {
    transport: TransportHandle,
    service_url: String,
    timeout: Duration,
}

impl Dispatcher {
    pub fn new(transport: TransportHandle, config: &ObservabilityConfig) -> Self {
        Self {
            transport,
            service_url: config.service_url.clone(),
            timeout: config.timeout,
        }
    }

    pub fn url_for(&self, endpoint: &str) -> String {
        format!(
            "{}/{}",
            self.service_url.trim_end_matches('/'),
            endpoint.trim_start_matches('/')
        )
    }

    /// One POST of `body` to `endpoint`. Returns the 2xx status on success.
    pub async fn attempt(&self, endpoint: &str, body: &Value) -> Result<u16, DeliveryFailure> {
        let url = self.url_for(endpoint);
        match self.transport.post_json(&url, body, self.timeout).await {
            Ok(response) if response.is_success() => Ok(response.status),
            Ok(response) => Err(DeliveryFailure::Http {
                status: response.status,
                body: response.body,
            }),
            Err(err) => Err(match err.code {
                TransportErrorCode::Blocked => DeliveryFailure::Blocked(err.to_string()),
                TransportErrorCode::Timeout => DeliveryFailure::Timeout(err.to_string()),
                TransportErrorCode::Connectivity | TransportErrorCode::Internal => {
                    DeliveryFailure::Connectivity(err.to_string())
                }
            }),
        }
    }

    /// `GET /health` with a short timeout; any failure or non-2xx reads as unhealthy.
    pub async fn health(&self) -> bool {
        let url = self.url_for(HEALTH_PATH);
        matches!(
            self.transport.get(&url, HEALTH_CHECK_TIMEOUT).await,
            Ok(response) if response.is_success()
        )
    }
}
