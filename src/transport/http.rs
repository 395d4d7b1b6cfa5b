use std::time::Duration;

use reqwest::Client;
use serde_json::Value;

use crate::platform::runtime::with_timeout;
use crate::transport::error::{connectivity_error, timeout_error, TransportError, TransportResult};
use crate::transport::{Transport, TransportResponse};

/// `reqwest`-backed transport used outside of tests.
#[derive(Clone, Debug, Default)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    async fn execute(
        &self,
        request: reqwest::RequestBuilder,
        url: &str,
        timeout: Duration,
    ) -> TransportResult<TransportResponse> {
        let exchange = async {
            let response = request.send().await.map_err(classify_request_error)?;
            let status = response.status().as_u16();
            let body = response.text().await.ok().filter(|text| !text.is_empty());
            Ok::<_, TransportError>(TransportResponse { status, body })
        };
        match with_timeout(exchange, timeout).await {
            Ok(result) => {
                if let Err(err) = &result {
                    log::debug!("observability transport request to {url} failed: {err}");
                }
                result
            }
            Err(_) => {
                log::debug!("observability transport request to {url} timed out after {timeout:?}");
                Err(timeout_error(format!(
                    "request to {url} timed out after {} ms",
                    timeout.as_millis()
                )))
            }
        }
    }
}

#[cfg_attr(target_arch = "wasm32", async_trait::async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait::async_trait)]
impl Transport for HttpTransport {
    async fn post_json(
        &self,
        url: &str,
        body: &Value,
        timeout: Duration,
    ) -> TransportResult<TransportResponse> {
        self.execute(self.client.post(url).json(body), url, timeout)
            .await
    }

    async fn get(&self, url: &str, timeout: Duration) -> TransportResult<TransportResponse> {
        self.execute(self.client.get(url), url, timeout).await
    }
}

fn classify_request_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        return timeout_error(err.to_string());
    }

    #[cfg(target_arch = "wasm32")]
    {
        // A fetch rejection carries no status; browsers report CORS refusals this way.
        let message = err.to_string();
        if message.contains("Failed to fetch")
            || message.contains("CORS")
            || message.contains("NetworkError")
        {
            return crate::transport::error::blocked_error(message);
        }
    }

    connectivity_error(err.to_string())
}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod tests {
    use super::*;
    use crate::test_support::start_mock_server;
    use crate::transport::TransportErrorCode;
    use httpmock::prelude::*;
    use serde_json::json;

    #[tokio::test(flavor = "current_thread")]
    async fn posts_json_and_reports_status() {
        let server = start_mock_server();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/events")
                .json_body(json!({"event_type": "signup"}));
            then.status(201).body("{\"id\": 1}");
        });

        let transport = HttpTransport::new();
        let response = transport
            .post_json(
                &server.url("/events"),
                &json!({"event_type": "signup"}),
                Duration::from_secs(5),
            )
            .await
            .unwrap();

        mock.assert();
        assert_eq!(response.status, 201);
        assert!(response.is_success());
        assert_eq!(response.body.as_deref(), Some("{\"id\": 1}"));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn error_statuses_are_responses_not_errors() {
        let server = start_mock_server();
        server.mock(|when, then| {
            when.method(GET).path("/health");
            then.status(503);
        });

        let response = HttpTransport::new()
            .get(&server.url("/health"), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(response.status, 503);
        assert!(!response.is_success());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn refused_connection_is_connectivity_failure() {
        let err = HttpTransport::new()
            .post_json(
                "http://127.0.0.1:9/events",
                &json!({}),
                Duration::from_secs(5),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err.code,
            TransportErrorCode::Connectivity | TransportErrorCode::Timeout
        ));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn slow_collector_times_out() {
        let server = start_mock_server();
        server.mock(|when, then| {
            when.method(POST).path("/events");
            then.status(200).delay(Duration::from_millis(500));
        });

        let err = HttpTransport::new()
            .post_json(&server.url("/events"), &json!({}), Duration::from_millis(50))
            .await
            .unwrap_err();
        assert_eq!(err.code, TransportErrorCode::Timeout);
    }
}
