//! Process-wide entry point wiring configuration, delivery, tracking and auto-instrumentation.

use crate::client::{DeliveryClient, DeliveryOutcome};
use crate::config::{ObservabilityConfig, ObservabilityOptions};
use crate::instrumentation::AutoInstrumentation;
use crate::platform::runtime;
use crate::tracking::Tracker;

/// Everything a host needs, built from one effective configuration.
#[derive(Clone)]
pub struct ObservabilityClient {
    tracker: Tracker,
    instrumentation: AutoInstrumentation,
    #[cfg(all(target_arch = "wasm32", feature = "wasm-web"))]
    _visibility: Option<std::rc::Rc<crate::platform::browser::VisibilityListener>>,
}

impl ObservabilityClient {
    pub fn new(config: ObservabilityConfig) -> Self {
        Self::from_delivery(DeliveryClient::new(config))
    }

    pub fn from_delivery(delivery: DeliveryClient) -> Self {
        let tracker = Tracker::new(delivery);
        Self {
            instrumentation: AutoInstrumentation::new(tracker.clone()),
            tracker,
            #[cfg(all(target_arch = "wasm32", feature = "wasm-web"))]
            _visibility: None,
        }
    }

    pub fn config(&self) -> &ObservabilityConfig {
        self.tracker.client().config()
    }

    pub fn tracker(&self) -> &Tracker {
        &self.tracker
    }

    pub fn delivery(&self) -> &DeliveryClient {
        self.tracker.client()
    }

    pub fn instrumentation(&self) -> &AutoInstrumentation {
        &self.instrumentation
    }

    pub async fn check_health(&self) -> bool {
        self.delivery().check_health().await
    }

    /// Stops the timers and flushes the batch buffer.
    pub async fn shutdown(&self) -> Vec<DeliveryOutcome> {
        self.delivery().shutdown().await
    }
}

/// Merges environment options under `options`, starts the delivery timers and installs the
/// enabled auto-instrumentation.
pub fn initialize_observability(options: &ObservabilityOptions) -> ObservabilityClient {
    let config = ObservabilityConfig::from_env_and(options);
    #[allow(unused_mut)]
    let mut client = ObservabilityClient::new(config);
    client.delivery().start();

    let settings = client.instrumentation().settings();
    if settings.errors {
        client.instrumentation().install_panic_hook();
    }

    #[cfg(all(target_arch = "wasm32", feature = "wasm-web"))]
    {
        client._visibility = client
            .instrumentation()
            .install_visibility_listener()
            .map(std::rc::Rc::new);
    }

    if settings.page_views {
        let instrumentation = client.instrumentation().clone();
        let path = client.tracker().environment().page_path;
        runtime::spawn_detached(async move {
            instrumentation.record_navigation(&path).await;
        });
    }

    client
        .delivery()
        .diagnostics()
        .debug(format!("observability initialized for {}", client.config().service_name));
    client
}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod tests {
    use super::*;
    use crate::client::SendOptions;
    use crate::config::AutoTrackOptions;
    use crate::tracking::DEFAULT_EVENT_CATEGORY;
    use serde_json::json;

    #[tokio::test(flavor = "current_thread")]
    async fn initialize_in_test_mode() {
        let client = initialize_observability(&ObservabilityOptions {
            service_name: Some("billing".into()),
            test_mode: Some(true),
            auto_track: Some(AutoTrackOptions {
                errors: Some(false),
                ..Default::default()
            }),
            ..Default::default()
        });

        assert_eq!(client.config().service_name, "billing");
        assert!(client.config().test_mode);
        assert!(client.delivery().is_running());
        assert!(client.check_health().await);

        let tracker = client.tracker().clone().with_send_options(SendOptions::immediate());
        let outcome = tracker
            .track_event("invoice_sent", DEFAULT_EVENT_CATEGORY, json!({}))
            .await;
        assert!(outcome.is_delivered());

        client.shutdown().await;
        assert!(!client.delivery().is_running());
    }
}
