use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use serde_json::json;

use crate::client::DeliveryOutcome;
use crate::config::AutoTrackSettings;
use crate::instrumentation::selector::{path_excluded, ElementDescriptor, SelectorList};
use crate::platform::runtime;
use crate::tracking::{ServiceErrorReport, Tracker, UiErrorReport, UiInteraction};

const MAX_VALUE_CHARS: usize = 100;

/// One outbound HTTP call observed by the host or by [`InstrumentedHttpClient`].
///
/// [`InstrumentedHttpClient`]: crate::instrumentation::InstrumentedHttpClient
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ApiCallRecord {
    pub method: String,
    pub url: String,
    /// `None` when no response was received.
    pub status: Option<u16>,
    pub duration_ms: u64,
    pub error: Option<String>,
    pub response_body: Option<String>,
}

impl ApiCallRecord {
    pub fn succeeded(&self) -> bool {
        matches!(self.status, Some(status) if (200..300).contains(&status))
    }
}

/// Automatic tracking of page views, panics, clicks, form changes and API calls.
///
/// Each signal is gated by its [`AutoTrackSettings`] toggle, which can be changed at runtime.
#[derive(Clone)]
pub struct AutoInstrumentation {
    inner: Arc<AutoInner>,
}

struct AutoInner {
    tracker: Tracker,
    settings: RwLock<AutoTrackSettings>,
    click_selectors: SelectorList,
    excluded_selectors: SelectorList,
    excluded_paths: Vec<String>,
    last_path: Mutex<Option<String>>,
    panic_hook_installed: AtomicBool,
}

impl AutoInstrumentation {
    pub fn new(tracker: Tracker) -> Self {
        let config = tracker.client().config().clone();
        Self {
            inner: Arc::new(AutoInner {
                settings: RwLock::new(config.auto_track),
                click_selectors: SelectorList::parse(&config.click_selectors),
                excluded_selectors: SelectorList::parse(&config.exclude.selectors),
                excluded_paths: config.exclude.paths,
                last_path: Mutex::new(None),
                panic_hook_installed: AtomicBool::new(false),
                tracker,
            }),
        }
    }

    pub fn tracker(&self) -> &Tracker {
        &self.inner.tracker
    }

    pub fn settings(&self) -> AutoTrackSettings {
        *self
            .inner
            .settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn update_settings(&self, settings: AutoTrackSettings) {
        *self
            .inner
            .settings
            .write()
            .unwrap_or_else(PoisonError::into_inner) = settings;
    }

    /// Turns every auto-tracking signal on or off.
    pub fn set_auto_tracking(&self, enabled: bool) {
        self.update_settings(AutoTrackSettings::all(enabled));
    }

    fn current_path_excluded(&self) -> bool {
        path_excluded(
            &self.inner.excluded_paths,
            &self.inner.tracker.environment().page_path,
        )
    }

    /// Records a page view when the path changes. Repeated paths and excluded paths are ignored.
    pub async fn record_navigation(&self, path: &str) -> Option<DeliveryOutcome> {
        let previous = {
            let mut last = self
                .inner
                .last_path
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if last.as_deref() == Some(path) {
                return None;
            }
            last.replace(path.to_string())
        };
        self.inner.tracker.set_page_path(path);

        if !self.settings().page_views || path_excluded(&self.inner.excluded_paths, path) {
            return None;
        }
        let interaction = UiInteraction::new("page_view", "page").with_metadata(json!({
            "previous_path": previous,
        }));
        Some(self.inner.tracker.track_ui_event(interaction).await)
    }

    pub async fn record_click(&self, element: &ElementDescriptor) -> Option<DeliveryOutcome> {
        if !self.settings().clicks
            || !self.inner.click_selectors.matches(element)
            || self.inner.excluded_selectors.matches(element)
            || self.current_path_excluded()
        {
            return None;
        }
        let interaction = describe(UiInteraction::new("click", &element.tag), element);
        Some(self.inner.tracker.track_ui_event(interaction).await)
    }

    /// Records a form field change. Values of password fields are never reported.
    pub async fn record_form_change(
        &self,
        element: &ElementDescriptor,
        value: Option<&str>,
    ) -> Option<DeliveryOutcome> {
        if !self.settings().form_changes
            || self.inner.excluded_selectors.matches(element)
            || self.current_path_excluded()
        {
            return None;
        }
        let mut interaction = describe(UiInteraction::new("form_change", &element.tag), element);
        if let (Some(value), false) = (value, element.is_password()) {
            interaction = interaction.with_value(value.chars().take(MAX_VALUE_CHARS).collect::<String>());
        }
        Some(self.inner.tracker.track_ui_event(interaction).await)
    }

    /// Records an `api_call` event and, for failed calls, a service error. Calls to the
    /// collector itself are ignored.
    pub async fn record_api_call(&self, call: ApiCallRecord) -> Vec<DeliveryOutcome> {
        let tracker = &self.inner.tracker;
        if tracker.client().config().is_collector_url(&call.url) {
            return Vec::new();
        }

        let settings = self.settings();
        let mut outcomes = Vec::new();
        if settings.api_calls {
            let metadata = json!({
                "method": &call.method,
                "url": &call.url,
                "status": call.status,
                "duration_ms": call.duration_ms,
            });
            outcomes.push(tracker.track_event("api_call", "api", metadata).await);
        }

        if settings.api_errors && !call.succeeded() {
            let (error_type, message) = match (call.status, &call.error) {
                (Some(status), _) => (
                    "HttpError",
                    format!("{} {} returned {status}", call.method, call.url),
                ),
                (None, Some(error)) => ("NetworkError", error.clone()),
                (None, None) => (
                    "NetworkError",
                    format!("{} {} failed without a response", call.method, call.url),
                ),
            };
            let mut report = ServiceErrorReport::new(error_type, message)
                .with_request(call.method.clone(), call.url.clone())
                .with_metadata(json!({ "duration_ms": call.duration_ms }));
            if let Some(status) = call.status {
                report = report.with_status(status);
            }
            if let Some(body) = call.response_body {
                report = report.with_response_body(body);
            }
            outcomes.push(tracker.track_service_error(report).await);
        }
        outcomes
    }

    /// Chains a panic hook that reports panics as UI errors. Installs at most once.
    pub fn install_panic_hook(&self) {
        if self.inner.panic_hook_installed.swap(true, Ordering::AcqRel) {
            return;
        }
        let this = self.clone();
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            previous(info);
            if !this.settings().errors {
                return;
            }
            let message = info
                .payload()
                .downcast_ref::<&str>()
                .map(|message| message.to_string())
                .or_else(|| info.payload().downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "panic".to_string());
            let mut report = UiErrorReport::new("panic", message);
            if let Some(location) = info.location() {
                report = report.with_location(
                    location.file(),
                    Some(location.line()),
                    Some(location.column()),
                );
            }
            let tracker = this.inner.tracker.clone();
            runtime::spawn_detached(async move {
                tracker.track_ui_error(report).await;
            });
        }));
    }

    /// Drains the queue whenever the page becomes visible again.
    #[cfg(all(target_arch = "wasm32", feature = "wasm-web"))]
    pub fn install_visibility_listener(&self) -> Option<crate::platform::browser::VisibilityListener> {
        let client = self.inner.tracker.client().clone();
        crate::platform::browser::on_visible(move || client.notify_foreground())
    }
}

fn describe(interaction: UiInteraction, element: &ElementDescriptor) -> UiInteraction {
    let mut interaction = interaction;
    if let Some(name) = element.display_name() {
        interaction = interaction.with_element_name(name);
    }
    if let Some(id) = &element.id {
        interaction = interaction.with_element_id(id.clone());
    }
    if !element.classes.is_empty() {
        interaction = interaction.with_metadata(json!({ "classes": element.classes }));
    }
    interaction
}
