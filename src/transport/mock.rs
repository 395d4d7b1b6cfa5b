use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use serde_json::Value;

use crate::platform::runtime;

use crate::transport::error::{
    blocked_error, connectivity_error, timeout_error, TransportResult,
};
use crate::transport::{Transport, TransportResponse};

/// Scripted outcome for one request handled by [`MockTransport`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MockReply {
    Status(u16),
    Connectivity,
    Timeout,
    Blocked,
}

impl MockReply {
    fn into_result(self, url: &str) -> TransportResult<TransportResponse> {
        match self {
            MockReply::Status(status) => Ok(TransportResponse::new(status)),
            MockReply::Connectivity => Err(connectivity_error(format!(
                "connection to {url} refused"
            ))),
            MockReply::Timeout => Err(timeout_error(format!("request to {url} timed out"))),
            MockReply::Blocked => Err(blocked_error(format!(
                "Failed to fetch {url}: blocked by CORS policy"
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct RecordedRequest {
    pub method: &'static str,
    pub url: String,
    pub body: Option<Value>,
}

type Matcher = Box<dyn Fn(&str, Option<&Value>) -> bool + Send + Sync>;

struct Rule {
    matcher: Matcher,
    replies: VecDeque<MockReply>,
}

struct MockState {
    rules: Vec<Rule>,
    default_reply: MockReply,
    latency: Duration,
    requests: Vec<RecordedRequest>,
}

/// In-memory [`Transport`] that records every request and answers from a script.
///
/// Scripted replies are consumed in order by the first rule that matches a request; once a rule
/// runs dry, requests fall through to later rules and finally to the default reply.
pub struct MockTransport {
    state: Mutex<MockState>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::with_default(MockReply::Status(200))
    }
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default(reply: MockReply) -> Self {
        Self {
            state: Mutex::new(MockState {
                rules: Vec::new(),
                default_reply: reply,
                latency: Duration::ZERO,
                requests: Vec::new(),
            }),
        }
    }

    pub fn set_default(&self, reply: MockReply) {
        self.lock().default_reply = reply;
    }

    /// Delays every reply by `latency`, like a slow or unresponsive collector.
    pub fn set_latency(&self, latency: Duration) {
        self.lock().latency = latency;
    }

    fn latency(&self) -> Duration {
        self.lock().latency
    }

    /// Queues replies for requests whose URL ends with `path`.
    pub fn script<I>(&self, path: &str, replies: I)
    where
        I: IntoIterator<Item = MockReply>,
    {
        let path = path.to_string();
        self.script_matching(move |url, _| url.ends_with(&path), replies);
    }

    /// Queues replies for requests accepted by `matcher` (URL and JSON body).
    pub fn script_matching<F, I>(&self, matcher: F, replies: I)
    where
        F: Fn(&str, Option<&Value>) -> bool + Send + Sync + 'static,
        I: IntoIterator<Item = MockReply>,
    {
        self.lock().rules.push(Rule {
            matcher: Box::new(matcher),
            replies: replies.into_iter().collect(),
        });
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.lock().requests.clone()
    }

    pub fn request_count(&self) -> usize {
        self.lock().requests.len()
    }

    /// Requests whose URL ends with `path`.
    pub fn requests_to(&self, path: &str) -> Vec<RecordedRequest> {
        self.lock()
            .requests
            .iter()
            .filter(|request| request.url.ends_with(path))
            .cloned()
            .collect()
    }

    pub fn clear_requests(&self) {
        self.lock().requests.clear();
    }

    fn respond(
        &self,
        method: &'static str,
        url: &str,
        body: Option<&Value>,
    ) -> TransportResult<TransportResponse> {
        let reply = {
            let mut state = self.lock();
            state.requests.push(RecordedRequest {
                method,
                url: url.to_string(),
                body: body.cloned(),
            });
            let scripted = state
                .rules
                .iter_mut()
                .filter(|rule| !rule.replies.is_empty())
                .find(|rule| (rule.matcher)(url, body))
                .and_then(|rule| rule.replies.pop_front());
            scripted.unwrap_or_else(|| state.default_reply.clone())
        };
        reply.into_result(url)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg_attr(target_arch = "wasm32", async_trait::async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait::async_trait)]
impl Transport for MockTransport {
    async fn post_json(
        &self,
        url: &str,
        body: &Value,
        _timeout: Duration,
    ) -> TransportResult<TransportResponse> {
        runtime::sleep(self.latency()).await;
        self.respond("POST", url, Some(body))
    }

    async fn get(&self, url: &str, _timeout: Duration) -> TransportResult<TransportResponse> {
        runtime::sleep(self.latency()).await;
        self.respond("GET", url, None)
    }
}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod tests {
    use super::*;
    use crate::transport::TransportErrorCode;
    use serde_json::json;

    #[tokio::test(flavor = "current_thread")]
    async fn scripted_replies_are_consumed_then_default_applies() {
        let transport = MockTransport::new();
        transport.script("/events", [MockReply::Status(500), MockReply::Blocked]);
        let timeout = Duration::from_secs(1);

        let first = transport
            .post_json("http://c/events", &json!({"n": 1}), timeout)
            .await
            .unwrap();
        assert_eq!(first.status, 500);

        let second = transport
            .post_json("http://c/events", &json!({"n": 2}), timeout)
            .await
            .unwrap_err();
        assert_eq!(second.code, TransportErrorCode::Blocked);

        let third = transport
            .post_json("http://c/events", &json!({"n": 3}), timeout)
            .await
            .unwrap();
        assert_eq!(third.status, 200);

        assert_eq!(transport.request_count(), 3);
        assert_eq!(transport.requests()[1].body, Some(json!({"n": 2})));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn body_matchers_target_individual_payloads() {
        let transport = MockTransport::new();
        transport.script_matching(
            |_, body| body.map(|b| b["event_type"] == "flaky").unwrap_or(false),
            [MockReply::Connectivity],
        );
        let timeout = Duration::from_secs(1);

        assert!(transport
            .post_json("http://c/events", &json!({"event_type": "stable"}), timeout)
            .await
            .is_ok());
        assert!(transport
            .post_json("http://c/events", &json!({"event_type": "flaky"}), timeout)
            .await
            .is_err());
        assert_eq!(transport.requests_to("/events").len(), 2);
    }
}
