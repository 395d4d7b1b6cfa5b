use reqwest::{Client, Method, Request, RequestBuilder, Response};

use crate::instrumentation::auto::{ApiCallRecord, AutoInstrumentation};
use crate::platform::runtime;
use crate::util::now_millis;

/// `reqwest::Client` wrapper that reports every call to [`AutoInstrumentation::record_api_call`].
///
/// Responses and errors are returned untouched, as soon as they arrive; the report is delivered
/// in the background.
#[derive(Clone)]
pub struct InstrumentedHttpClient {
    client: Client,
    instrumentation: AutoInstrumentation,
}

impl InstrumentedHttpClient {
    pub fn new(instrumentation: AutoInstrumentation) -> Self {
        Self::with_client(Client::new(), instrumentation)
    }

    pub fn with_client(client: Client, instrumentation: AutoInstrumentation) -> Self {
        Self {
            client,
            instrumentation,
        }
    }

    pub fn inner(&self) -> &Client {
        &self.client
    }

    pub fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.client.request(method, url)
    }

    pub fn get(&self, url: &str) -> RequestBuilder {
        self.client.get(url)
    }

    pub fn post(&self, url: &str) -> RequestBuilder {
        self.client.post(url)
    }

    /// Builds and executes `builder`.
    pub async fn send(&self, builder: RequestBuilder) -> reqwest::Result<Response> {
        let request = builder.build()?;
        self.execute(request).await
    }

    pub async fn execute(&self, request: Request) -> reqwest::Result<Response> {
        let method = request.method().to_string();
        let url = request.url().to_string();
        let started = now_millis();
        let result = self.client.execute(request).await;
        let duration_ms = now_millis().saturating_sub(started).max(0) as u64;

        let record = match &result {
            Ok(response) => ApiCallRecord {
                method,
                url,
                status: Some(response.status().as_u16()),
                duration_ms,
                error: None,
                response_body: None,
            },
            Err(err) => ApiCallRecord {
                method,
                url,
                status: err.status().map(|status| status.as_u16()),
                duration_ms,
                error: Some(err.to_string()),
                response_body: None,
            },
        };
        let instrumentation = self.instrumentation.clone();
        runtime::spawn_detached(async move {
            instrumentation.record_api_call(record).await;
        });
        result
    }
}
