use std::fmt::Display;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use serde_json::{json, Value};

use crate::client::{DeliveryClient, DeliveryOutcome, SendOptions};
use crate::platform::runtime;
use crate::session::SessionResolver;
use crate::tracking::environment::EnvironmentInfo;
use crate::tracking::payloads::{
    metadata_object, EventPayload, ServiceErrorPayload, ServiceErrorReport, UiErrorPayload,
    UiErrorReport, UiEventPayload, UiInteraction, EVENTS_ENDPOINT, SERVICE_ERRORS_ENDPOINT,
    UI_ERRORS_ENDPOINT, UI_EVENTS_ENDPOINT,
};
use crate::util::now_millis;

pub const DEFAULT_EVENT_CATEGORY: &str = "user_action";
pub const REQUEST_EVENT_TYPE: &str = "request";
pub const REQUEST_EVENT_CATEGORY: &str = "api_request";
const TELEMETRY_TARGET: &str = "observability::telemetry";

/// Typed tracking functions. Each one stamps session, user and environment data onto a payload
/// and hands it to the [`DeliveryClient`]; none of them can fail.
#[derive(Clone)]
pub struct Tracker {
    client: DeliveryClient,
    session: SessionResolver,
    environment: Arc<RwLock<EnvironmentInfo>>,
    send_options: SendOptions,
}

impl Tracker {
    pub fn new(client: DeliveryClient) -> Self {
        Self::with_environment(client, EnvironmentInfo::detect())
    }

    pub fn with_environment(client: DeliveryClient, environment: EnvironmentInfo) -> Self {
        Self {
            session: client.session_resolver(),
            client,
            environment: Arc::new(RwLock::new(environment)),
            send_options: SendOptions::batched(),
        }
    }

    /// Delivery flags used by every tracking call. Batched with queue-on-failure by default.
    pub fn with_send_options(mut self, options: SendOptions) -> Self {
        self.send_options = options;
        self
    }

    pub fn client(&self) -> &DeliveryClient {
        &self.client
    }

    pub fn session(&self) -> &SessionResolver {
        &self.session
    }

    pub fn environment(&self) -> EnvironmentInfo {
        self.environment
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_page_path(&self, path: impl Into<String>) {
        self.environment
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .page_path = path.into();
    }

    pub fn set_viewport(&self, width: u32, height: u32) {
        let mut environment = self
            .environment
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        environment.viewport_width = width;
        environment.viewport_height = height;
    }

    pub fn set_user_agent(&self, user_agent: impl Into<String>) {
        self.environment
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .user_agent = user_agent.into();
    }

    pub fn get_session_id(&self) -> String {
        self.session.get_session_id()
    }

    pub fn reset_session(&self) -> String {
        self.session.reset_session()
    }

    pub fn get_user_id(&self) -> Option<i64> {
        self.session.get_user_id()
    }

    pub fn set_user_id(&self, user_id: Option<i64>) {
        self.session.set_user_id(user_id);
    }

    pub async fn track_event(
        &self,
        event_type: &str,
        category: &str,
        metadata: Value,
    ) -> DeliveryOutcome {
        let payload = EventPayload {
            user_id: self.session.get_user_id(),
            session_id: self.session.get_session_id(),
            event_type: event_type.to_string(),
            event_category: category.to_string(),
            event_metadata: metadata_object(metadata),
            user_agent: self.environment().user_agent,
            service_name: self.client.config().service_name.clone(),
        };
        self.client
            .send_serializable(EVENTS_ENDPOINT, &payload, self.send_options)
            .await
    }

    pub async fn track_ui_event(&self, interaction: UiInteraction) -> DeliveryOutcome {
        let environment = self.environment();
        let payload = UiEventPayload {
            user_id: self.session.get_user_id(),
            session_id: self.session.get_session_id(),
            interaction_type: interaction.interaction_type,
            element_type: interaction.element_type,
            element_name: interaction.element_name,
            element_id: interaction.element_id,
            page_path: environment.page_path.clone(),
            page_context: interaction.page_context,
            route_name: interaction.route_name,
            event_value: interaction.event_value,
            event_metadata: metadata_object(interaction.metadata),
            device_type: environment.device_type(),
            user_agent: environment.user_agent,
            viewport_width: environment.viewport_width,
            viewport_height: environment.viewport_height,
            time_to_interaction_ms: interaction.time_to_interaction_ms,
        };
        self.client
            .send_serializable(UI_EVENTS_ENDPOINT, &payload, self.send_options)
            .await
    }

    pub async fn track_ui_error(&self, report: UiErrorReport) -> DeliveryOutcome {
        let environment = self.environment();
        let payload = UiErrorPayload {
            user_id: self.session.get_user_id(),
            session_id: self.session.get_session_id(),
            error_message: report.error_message,
            error_type: report.error_type,
            error_stack: report.error_stack,
            error_source: report.error_source,
            line_number: report.line_number,
            column_number: report.column_number,
            page_path: environment.page_path.clone(),
            page_context: report.page_context,
            route_name: report.route_name,
            error_metadata: metadata_object(report.metadata),
            device_type: environment.device_type(),
            user_agent: environment.user_agent,
            viewport_width: environment.viewport_width,
            viewport_height: environment.viewport_height,
        };
        self.client
            .send_serializable(UI_ERRORS_ENDPOINT, &payload, self.send_options)
            .await
    }

    pub async fn track_service_error(&self, report: ServiceErrorReport) -> DeliveryOutcome {
        let payload = ServiceErrorPayload {
            user_id: self.session.get_user_id(),
            session_id: self.session.get_session_id(),
            severity: report.severity(),
            error_message: report.error_message,
            error_type: report.error_type,
            status_code: report.status_code,
            request_url: report.request_url,
            request_method: report.request_method,
            request_headers: report.request_headers,
            request_body: report.request_body,
            response_body: report.response_body,
            service_name: self.client.config().service_name.clone(),
            endpoint: report.endpoint,
            error_code: report.error_code,
            timeout_ms: report.timeout_ms,
            error_metadata: metadata_object(report.metadata),
            user_agent: self.environment().user_agent,
        };
        self.client
            .send_serializable(SERVICE_ERRORS_ENDPOINT, &payload, self.send_options)
            .await
    }

    /// Records an event through the `log` facade only; nothing reaches the collector.
    pub fn track_telemetry_only(&self, event_type: &str, metadata: Value) {
        log::info!(
            target: TELEMETRY_TARGET,
            "{event_type} service={} session={} metadata={}",
            self.client.config().service_name,
            self.session.get_session_id(),
            metadata_object(metadata)
        );
    }

    /// Awaits `operation` and records a service error if it fails. The result is returned as is.
    pub async fn capture_errors<F, T, E>(&self, operation: &str, future: F) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
        E: Display,
    {
        let result = future.await;
        if let Err(err) = &result {
            let report = ServiceErrorReport::new(short_type_name::<E>(), err.to_string())
                .with_metadata(json!({ "function": operation }));
            self.track_service_error(report).await;
        }
        result
    }

    /// Awaits `operation`, then records `event_type` with its duration in milliseconds.
    pub async fn track_operation<F, T>(&self, event_type: &str, category: &str, future: F) -> T
    where
        F: Future<Output = T>,
    {
        let started = now_millis();
        let output = future.await;
        let duration_ms = now_millis().saturating_sub(started).max(0);
        self.track_event(event_type, category, json!({ "duration_ms": duration_ms }))
            .await;
        output
    }

    /// Records one handled inbound request as a `request` event in the `api_request` category.
    pub async fn track_request(
        &self,
        method: &str,
        path: &str,
        status: u16,
        duration: Duration,
    ) -> DeliveryOutcome {
        let metadata = json!({
            "request_path": path,
            "request_method": method,
            "status_code": status,
            "duration_ms": duration_millis(duration),
        });
        self.track_event(REQUEST_EVENT_TYPE, REQUEST_EVENT_CATEGORY, metadata)
            .await
    }

    /// Records an inbound request whose handler failed before producing a response.
    pub async fn track_request_failure(
        &self,
        method: &str,
        path: &str,
        error_type: &str,
        message: &str,
        duration: Duration,
    ) -> DeliveryOutcome {
        let mut report = ServiceErrorReport::new(error_type, message)
            .with_endpoint(path)
            .with_metadata(json!({ "duration_ms": duration_millis(duration) }));
        report.request_method = Some(method.to_string());
        self.track_service_error(report).await
    }

    /// Runs an inbound request `handler` and reports it in the background: a `request` event with
    /// the status picked by `status_of` on success, a service error on failure. The handler's
    /// result is returned as soon as it is ready.
    pub async fn observe_request<F, T, E, S>(
        &self,
        method: &str,
        path: &str,
        status_of: S,
        handler: F,
    ) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
        S: FnOnce(&T) -> u16,
        E: Display,
    {
        let started = now_millis();
        let result = handler.await;
        let duration = Duration::from_millis(now_millis().saturating_sub(started).max(0) as u64);

        let tracker = self.clone();
        let (method, path) = (method.to_string(), path.to_string());
        match &result {
            Ok(response) => {
                let status = status_of(response);
                runtime::spawn_detached(async move {
                    tracker.track_request(&method, &path, status, duration).await;
                });
            }
            Err(err) => {
                let (error_type, message) = (short_type_name::<E>(), err.to_string());
                runtime::spawn_detached(async move {
                    tracker
                        .track_request_failure(&method, &path, &error_type, &message, duration)
                        .await;
                });
            }
        }
        result
    }
}

/// Milliseconds with two decimals.
fn duration_millis(duration: Duration) -> f64 {
    (duration.as_secs_f64() * 100_000.0).round() / 100.0
}

fn short_type_name<T: ?Sized>() -> String {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base).to_string()
}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod tests {
    use super::*;
    use crate::config::{merge_config, ObservabilityOptions};
    use crate::persistence::{InMemoryStorage, KeyValueStorage};
    use crate::session::USER_ID_KEY;
    use crate::transport::{MockReply, MockTransport};

    struct Fixture {
        tracker: Tracker,
        transport: Arc<MockTransport>,
        local: Arc<InMemoryStorage>,
    }

    fn fixture() -> Fixture {
        let transport = Arc::new(MockTransport::new());
        let local = Arc::new(InMemoryStorage::new());
        let config = merge_config(&ObservabilityOptions {
            service_url: Some("http://collector.test".into()),
            service_name: Some("checkout".into()),
            ..Default::default()
        });
        let client = DeliveryClient::builder(config)
            .transport(transport.clone())
            .local_storage(local.clone())
            .session_storage(Arc::new(InMemoryStorage::new()))
            .backoff_unit(Duration::ZERO)
            .build();
        let tracker = Tracker::with_environment(
            client,
            EnvironmentInfo {
                user_agent: "test-agent".into(),
                viewport_width: 800,
                viewport_height: 600,
                page_path: "/cart".into(),
            },
        )
        .with_send_options(SendOptions::immediate());
        Fixture {
            tracker,
            transport,
            local,
        }
    }

    fn last_body(transport: &MockTransport, path: &str) -> Value {
        transport
            .requests_to(path)
            .pop()
            .and_then(|request| request.body)
            .unwrap()
    }

    #[tokio::test(flavor = "current_thread")]
    async fn event_payload_carries_session_and_user() {
        let fx = fixture();
        fx.local.set(USER_ID_KEY, "77").unwrap();
        let outcome = fx
            .tracker
            .track_event("signup", DEFAULT_EVENT_CATEGORY, json!({"plan": "pro"}))
            .await;
        assert!(outcome.is_delivered());

        let body = last_body(&fx.transport, "/events");
        assert_eq!(body["user_id"], 77);
        assert_eq!(body["session_id"], fx.tracker.get_session_id());
        assert_eq!(body["event_category"], "user_action");
        assert_eq!(body["event_metadata"]["plan"], "pro");
        assert_eq!(body["service_name"], "checkout");
        assert_eq!(body["user_agent"], "test-agent");
    }

    #[tokio::test(flavor = "current_thread")]
    async fn ui_event_uses_environment() {
        let fx = fixture();
        fx.tracker.set_page_path("/checkout");
        fx.tracker
            .track_ui_event(
                UiInteraction::new("click", "button")
                    .with_element_name("Pay")
                    .with_route_name("checkout")
                    .with_time_to_interaction(1200),
            )
            .await;

        let body = last_body(&fx.transport, "/ui-events");
        assert_eq!(body["page_path"], "/checkout");
        assert_eq!(body["device_type"], "tablet");
        assert_eq!(body["viewport_width"], 800);
        assert_eq!(body["route_name"], "checkout");
        assert_eq!(body["time_to_interaction_ms"], 1200);
        assert!(body["user_id"].is_null());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn service_error_severity_from_status() {
        let fx = fixture();
        for (status, expected) in [(404, "INFO"), (503, "ERROR"), (401, "WARNING")] {
            fx.tracker
                .track_service_error(
                    ServiceErrorReport::new("HttpError", "request failed")
                        .with_status(status)
                        .with_request("GET", "https://api.example.com/items"),
                )
                .await;
            let body = last_body(&fx.transport, "/errors/services");
            assert_eq!(body["status_code"], status);
            assert_eq!(body["severity"], expected);
        }
    }

    #[tokio::test(flavor = "current_thread")]
    async fn ui_error_includes_route_and_location() {
        let fx = fixture();
        fx.tracker
            .track_ui_error(
                UiErrorReport::new("TypeError", "x is undefined")
                    .with_location("app.js", Some(10), Some(4))
                    .with_route_name("cart"),
            )
            .await;
        let body = last_body(&fx.transport, "/errors/ui");
        assert_eq!(body["error_type"], "TypeError");
        assert_eq!(body["line_number"], 10);
        assert_eq!(body["route_name"], "cart");
        assert_eq!(body["page_path"], "/cart");
        assert!(body.get("error_stack").is_none());
    }

    #[derive(Debug)]
    struct PaymentDeclined;

    impl std::fmt::Display for PaymentDeclined {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str("card declined")
        }
    }

    #[tokio::test(flavor = "current_thread")]
    async fn capture_errors_reports_and_passes_through() {
        let fx = fixture();
        let ok: Result<u8, PaymentDeclined> =
            fx.tracker.capture_errors("charge", async { Ok(1) }).await;
        assert_eq!(ok.unwrap(), 1);
        assert_eq!(fx.transport.request_count(), 0);

        let err: Result<u8, PaymentDeclined> = fx
            .tracker
            .capture_errors("charge", async { Err(PaymentDeclined) })
            .await;
        assert!(err.is_err());
        let body = last_body(&fx.transport, "/errors/services");
        assert_eq!(body["error_type"], "PaymentDeclined");
        assert_eq!(body["error_message"], "card declined");
        assert_eq!(body["error_metadata"]["function"], "charge");
        assert_eq!(body["severity"], "ERROR");
    }

    #[tokio::test(flavor = "current_thread")]
    async fn track_operation_records_duration() {
        let fx = fixture();
        let value = fx
            .tracker
            .track_operation("report_generated", "backend", async { 5 })
            .await;
        assert_eq!(value, 5);
        let body = last_body(&fx.transport, "/events");
        assert_eq!(body["event_type"], "report_generated");
        assert!(body["event_metadata"]["duration_ms"].as_i64().unwrap() >= 0);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn track_request_records_api_request_event() {
        let fx = fixture();
        fx.tracker
            .track_request("GET", "/orders/7", 200, Duration::from_micros(12_341))
            .await;
        let body = last_body(&fx.transport, "/events");
        assert_eq!(body["event_type"], REQUEST_EVENT_TYPE);
        assert_eq!(body["event_category"], REQUEST_EVENT_CATEGORY);
        let metadata = &body["event_metadata"];
        assert_eq!(metadata["request_path"], "/orders/7");
        assert_eq!(metadata["request_method"], "GET");
        assert_eq!(metadata["status_code"], 200);
        assert_eq!(metadata["duration_ms"], 12.34);
    }

    async fn settle(transport: &MockTransport, expected: usize) {
        for _ in 0..200 {
            if transport.request_count() >= expected {
                return;
            }
            runtime::sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test(flavor = "current_thread")]
    async fn observe_request_reports_success_and_failure() {
        let fx = fixture();

        let ok: Result<(u16, &str), PaymentDeclined> = fx
            .tracker
            .observe_request("POST", "/checkout", |response| response.0, async {
                Ok((201, "created"))
            })
            .await;
        assert_eq!(ok.unwrap(), (201, "created"));
        settle(&fx.transport, 1).await;
        let event = last_body(&fx.transport, "/events");
        assert_eq!(event["event_type"], "request");
        assert_eq!(event["event_metadata"]["status_code"], 201);
        assert_eq!(event["event_metadata"]["request_method"], "POST");

        let failed: Result<(u16, &str), PaymentDeclined> = fx
            .tracker
            .observe_request("POST", "/checkout", |response: &(u16, &str)| response.0, async {
                Err(PaymentDeclined)
            })
            .await;
        assert!(failed.is_err());
        settle(&fx.transport, 2).await;
        let error = last_body(&fx.transport, "/errors/services");
        assert_eq!(error["error_type"], "PaymentDeclined");
        assert_eq!(error["error_message"], "card declined");
        assert_eq!(error["endpoint"], "/checkout");
        assert_eq!(error["request_method"], "POST");
        assert_eq!(error["severity"], "ERROR");
        assert!(error["error_metadata"]["duration_ms"].is_number());
        assert_eq!(fx.transport.requests_to("/events").len(), 1);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn failed_tracking_calls_never_surface() {
        let fx = fixture();
        fx.transport.set_default(MockReply::Connectivity);
        let outcome = fx
            .tracker
            .track_event("offline", DEFAULT_EVENT_CATEGORY, Value::Null)
            .await;
        assert!(outcome.queued_item_id().is_some());
        fx.tracker.track_telemetry_only("cache_warm", json!({"hits": 3}));
        assert_eq!(fx.transport.requests_to("/events").len(), 1);
    }
}
