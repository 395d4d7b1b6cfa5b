use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::error::{invalid_options, ConfigResult};
use crate::platform::environment::{is_loopback_host, options_from_env};

pub const DEFAULT_SERVICE_URL: &str = "http://localhost:8006";
pub const DEFAULT_SERVICE_NAME: &str = "rust-service";
pub const DEFAULT_BATCH_SIZE: usize = 10;
pub const DEFAULT_BATCH_INTERVAL_MS: u64 = 5_000;
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_RETRY_BACKOFF: f64 = 2.0;
pub const DEFAULT_CLICK_SELECTORS: &[&str] = &["button", "a", "[role=button]", "[data-track]"];

/// Partial options supplied by the host. Every key is optional; absent keys keep the defaults.
///
/// Deserializes from camelCase JSON (`{"serviceUrl": ..., "autoTrack": {"clicks": true}}`);
/// unrecognised keys are ignored.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ObservabilityOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_track: Option<AutoTrackOptions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_track_selectors: Option<AutoTrackSelectorOptions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exclude: Option<ExcludeOptions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<usize>,
    /// Milliseconds between periodic batch flushes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_interval: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_attempts: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dev_mode: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_mode: Option<bool>,
    /// Per-request HTTP timeout in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    /// Exponential base used between queue retries.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_backoff: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backoff_strategy: Option<BackoffStrategy>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AutoTrackOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_views: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_errors: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clicks: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub form_changes: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_calls: Option<bool>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AutoTrackSelectorOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clicks: Option<Vec<String>>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExcludeOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paths: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selectors: Option<Vec<String>>,
}

/// How the queue drain waits after a failed retry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffStrategy {
    /// Sleep inside the drain pass before moving to the next item.
    #[default]
    Serial,
    /// Record a per-item due time and skip the item on passes that run before it.
    Deferred,
}

/// Effective auto-tracking toggles.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AutoTrackSettings {
    pub page_views: bool,
    pub errors: bool,
    pub api_errors: bool,
    pub clicks: bool,
    pub form_changes: bool,
    pub api_calls: bool,
}

impl Default for AutoTrackSettings {
    fn default() -> Self {
        Self {
            page_views: true,
            errors: true,
            api_errors: true,
            clicks: false,
            form_changes: false,
            api_calls: false,
        }
    }
}

impl AutoTrackSettings {
    pub fn all(enabled: bool) -> Self {
        Self {
            page_views: enabled,
            errors: enabled,
            api_errors: enabled,
            clicks: enabled,
            form_changes: enabled,
            api_calls: enabled,
        }
    }

    fn apply(mut self, options: &AutoTrackOptions) -> Self {
        self.page_views = options.page_views.unwrap_or(self.page_views);
        self.errors = options.errors.unwrap_or(self.errors);
        self.api_errors = options.api_errors.unwrap_or(self.api_errors);
        self.clicks = options.clicks.unwrap_or(self.clicks);
        self.form_changes = options.form_changes.unwrap_or(self.form_changes);
        self.api_calls = options.api_calls.unwrap_or(self.api_calls);
        self
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExcludeSettings {
    pub paths: Vec<String>,
    pub selectors: Vec<String>,
}

/// Merged, read-only configuration shared by the delivery client, session resolver and
/// auto-instrumentation.
#[derive(Clone, Debug, PartialEq)]
pub struct ObservabilityConfig {
    pub service_url: String,
    pub service_name: String,
    pub auto_track: AutoTrackSettings,
    pub click_selectors: Vec<String>,
    pub exclude: ExcludeSettings,
    pub batch_size: usize,
    pub batch_interval: Duration,
    pub retry_attempts: u32,
    pub dev_mode: bool,
    pub test_mode: bool,
    pub timeout: Duration,
    pub retry_backoff: f64,
    pub backoff_strategy: BackoffStrategy,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        merge_config(&ObservabilityOptions::default())
    }
}

impl ObservabilityConfig {
    /// Layers environment-provided options under `overrides`, then merges onto the defaults.
    pub fn from_env_and(overrides: &ObservabilityOptions) -> Self {
        merge_config(&ObservabilityOptions::from_env().merged_with(overrides))
    }

    /// Name of the storage namespace holding this client's durable state: the service name plus
    /// the collector origin, so services sharing a host never share a queue.
    pub fn storage_scope(&self) -> String {
        let collector = url::Url::parse(&self.service_url)
            .map(|url| url.origin().ascii_serialization())
            .unwrap_or_else(|_| self.service_url.trim_end_matches('/').to_string());
        format!("{}@{}", self.service_name, collector)
    }

    /// Returns `true` when `url` points at the collector itself (same origin, under the
    /// configured base path).
    pub fn is_collector_url(&self, url: &str) -> bool {
        let (Ok(collector), Ok(target)) = (url::Url::parse(&self.service_url), url::Url::parse(url))
        else {
            return false;
        };
        if collector.origin() != target.origin() {
            return false;
        }
        let base = collector.path().trim_end_matches('/');
        match target.path().strip_prefix(base) {
            Some(rest) => rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }

    /// Builds the collector URL for `endpoint` (`/events`, `/health`, ...).
    pub fn endpoint_url(&self, endpoint: &str) -> String {
        format!(
            "{}/{}",
            self.service_url.trim_end_matches('/'),
            endpoint.trim_start_matches('/')
        )
    }
}

/// Merges `overrides` onto the built-in defaults, key by key.
///
/// Nested groups (`autoTrack`, `exclude`, `autoTrackSelectors`) merge per key, so setting one
/// auto-track flag keeps the defaults of the others.
pub fn merge_config(overrides: &ObservabilityOptions) -> ObservabilityConfig {
    let service_url = overrides
        .service_url
        .clone()
        .filter(|url| !url.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_SERVICE_URL.to_string());
    let dev_mode = overrides
        .dev_mode
        .unwrap_or_else(|| targets_loopback(&service_url));

    let auto_track = overrides
        .auto_track
        .as_ref()
        .map(|options| AutoTrackSettings::default().apply(options))
        .unwrap_or_default();

    let click_selectors = overrides
        .auto_track_selectors
        .as_ref()
        .and_then(|selectors| selectors.clicks.clone())
        .unwrap_or_else(|| DEFAULT_CLICK_SELECTORS.iter().map(|s| s.to_string()).collect());

    let exclude = overrides
        .exclude
        .as_ref()
        .map(|exclude| ExcludeSettings {
            paths: exclude.paths.clone().unwrap_or_default(),
            selectors: exclude.selectors.clone().unwrap_or_default(),
        })
        .unwrap_or_default();

    ObservabilityConfig {
        service_url,
        service_name: overrides
            .service_name
            .clone()
            .unwrap_or_else(|| DEFAULT_SERVICE_NAME.to_string()),
        auto_track,
        click_selectors,
        exclude,
        batch_size: overrides.batch_size.unwrap_or(DEFAULT_BATCH_SIZE).max(1),
        batch_interval: Duration::from_millis(
            overrides
                .batch_interval
                .unwrap_or(DEFAULT_BATCH_INTERVAL_MS)
                .max(1),
        ),
        retry_attempts: overrides.retry_attempts.unwrap_or(DEFAULT_RETRY_ATTEMPTS),
        dev_mode,
        test_mode: overrides.test_mode.unwrap_or(false),
        timeout: Duration::from_millis(overrides.timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS)),
        retry_backoff: overrides.retry_backoff.unwrap_or(DEFAULT_RETRY_BACKOFF),
        backoff_strategy: overrides.backoff_strategy.unwrap_or_default(),
    }
}

fn targets_loopback(service_url: &str) -> bool {
    url::Url::parse(service_url)
        .ok()
        .and_then(|url| url.host_str().map(is_loopback_host))
        .unwrap_or(false)
}

impl ObservabilityOptions {
    pub fn from_json(raw: &str) -> ConfigResult<Self> {
        serde_json::from_str(raw)
            .map_err(|err| invalid_options(format!("Failed to parse observability options: {err}")))
    }

    pub fn from_value(value: Value) -> ConfigResult<Self> {
        serde_json::from_value(value)
            .map_err(|err| invalid_options(format!("Failed to parse observability options: {err}")))
    }

    /// Options read from `OBSERVABILITY_*` environment variables. Malformed sources are ignored.
    pub fn from_env() -> Self {
        match options_from_env() {
            Some(map) => Self::from_value(Value::Object(map)).unwrap_or_else(|err| {
                log::warn!("ignoring environment observability options: {err}");
                Self::default()
            }),
            None => Self::default(),
        }
    }

    /// Returns a copy of `self` with every key present in `other` taking precedence.
    pub fn merged_with(&self, other: &ObservabilityOptions) -> ObservabilityOptions {
        ObservabilityOptions {
            service_url: other.service_url.clone().or_else(|| self.service_url.clone()),
            service_name: other.service_name.clone().or_else(|| self.service_name.clone()),
            auto_track: merge_nested(&self.auto_track, &other.auto_track, |base, top| {
                AutoTrackOptions {
                    page_views: top.page_views.or(base.page_views),
                    errors: top.errors.or(base.errors),
                    api_errors: top.api_errors.or(base.api_errors),
                    clicks: top.clicks.or(base.clicks),
                    form_changes: top.form_changes.or(base.form_changes),
                    api_calls: top.api_calls.or(base.api_calls),
                }
            }),
            auto_track_selectors: merge_nested(
                &self.auto_track_selectors,
                &other.auto_track_selectors,
                |base, top| AutoTrackSelectorOptions {
                    clicks: top.clicks.clone().or_else(|| base.clicks.clone()),
                },
            ),
            exclude: merge_nested(&self.exclude, &other.exclude, |base, top| ExcludeOptions {
                paths: top.paths.clone().or_else(|| base.paths.clone()),
                selectors: top.selectors.clone().or_else(|| base.selectors.clone()),
            }),
            batch_size: other.batch_size.or(self.batch_size),
            batch_interval: other.batch_interval.or(self.batch_interval),
            retry_attempts: other.retry_attempts.or(self.retry_attempts),
            dev_mode: other.dev_mode.or(self.dev_mode),
            test_mode: other.test_mode.or(self.test_mode),
            timeout_ms: other.timeout_ms.or(self.timeout_ms),
            retry_backoff: other.retry_backoff.or(self.retry_backoff),
            backoff_strategy: other.backoff_strategy.or(self.backoff_strategy),
        }
    }
}

fn merge_nested<T: Clone>(
    base: &Option<T>,
    top: &Option<T>,
    merge: impl FnOnce(&T, &T) -> T,
) -> Option<T> {
    match (base, top) {
        (Some(base), Some(top)) => Some(merge(base, top)),
        (None, Some(top)) => Some(top.clone()),
        (base, None) => base.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = ObservabilityConfig::default();
        assert_eq!(config.service_url, DEFAULT_SERVICE_URL);
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.batch_interval, Duration::from_millis(5_000));
        assert_eq!(config.retry_attempts, 3);
        assert!(!config.test_mode);
        assert!(config.dev_mode, "default collector is on loopback");
        assert_eq!(config.auto_track, AutoTrackSettings::default());
        assert_eq!(config.backoff_strategy, BackoffStrategy::Serial);
    }

    #[test]
    fn dev_mode_defaults_off_for_remote_collectors() {
        let config = merge_config(&ObservabilityOptions {
            service_url: Some("https://collector.example.com".into()),
            ..Default::default()
        });
        assert!(!config.dev_mode);
    }

    #[test]
    fn nested_auto_track_flags_merge_per_key() {
        let options = ObservabilityOptions::from_json(r#"{"autoTrack": {"clicks": true}}"#).unwrap();
        let config = merge_config(&options);
        assert!(config.auto_track.clicks);
        assert!(config.auto_track.page_views);
        assert!(config.auto_track.errors);
        assert!(!config.auto_track.form_changes);
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let options = ObservabilityOptions::from_json(
            r#"{"batchSize": 4, "someFutureFlag": {"nested": true}, "exclude": {"paths": ["/admin"]}}"#,
        )
        .unwrap();
        let config = merge_config(&options);
        assert_eq!(config.batch_size, 4);
        assert_eq!(config.exclude.paths, vec!["/admin".to_string()]);
        assert!(config.exclude.selectors.is_empty());
    }

    #[test]
    fn later_sources_win_per_key() {
        let env = ObservabilityOptions {
            service_url: Some("https://env.example.com".into()),
            batch_size: Some(20),
            auto_track: Some(AutoTrackOptions {
                clicks: Some(true),
                ..Default::default()
            }),
            ..Default::default()
        };
        let host = ObservabilityOptions {
            batch_size: Some(5),
            auto_track: Some(AutoTrackOptions {
                page_views: Some(false),
                ..Default::default()
            }),
            ..Default::default()
        };

        let merged = env.merged_with(&host);
        assert_eq!(merged.service_url.as_deref(), Some("https://env.example.com"));
        assert_eq!(merged.batch_size, Some(5));
        let auto = merged.auto_track.unwrap();
        assert_eq!(auto.clicks, Some(true));
        assert_eq!(auto.page_views, Some(false));
    }

    #[test]
    fn endpoint_url_joins_without_double_slash() {
        let config = merge_config(&ObservabilityOptions {
            service_url: Some("http://localhost:8006/".into()),
            ..Default::default()
        });
        assert_eq!(config.endpoint_url("/events"), "http://localhost:8006/events");
    }

    #[test]
    fn storage_scope_separates_services_and_collectors() {
        let scope = |name: &str, url: &str| {
            merge_config(&ObservabilityOptions {
                service_name: Some(name.into()),
                service_url: Some(url.into()),
                ..Default::default()
            })
            .storage_scope()
        };
        assert_eq!(scope("billing", "http://localhost:8006/"), "billing@http://localhost:8006");
        assert_ne!(scope("billing", "http://localhost:8006"), scope("search", "http://localhost:8006"));
        assert_ne!(scope("billing", "http://localhost:8006"), scope("billing", "http://localhost:9000"));
    }

    #[test]
    fn collector_url_requires_matching_origin_and_path_boundary() {
        let config = merge_config(&ObservabilityOptions {
            service_url: Some("http://localhost:8006".into()),
            ..Default::default()
        });
        assert!(config.is_collector_url("http://localhost:8006/events"));
        assert!(config.is_collector_url("http://localhost:8006"));
        assert!(!config.is_collector_url("http://localhost:80060/items"));
        assert!(!config.is_collector_url("http://localhost:8006.evil.test/events"));
        assert!(!config.is_collector_url("not a url"));

        let nested = merge_config(&ObservabilityOptions {
            service_url: Some("https://gw.example.com/observability/".into()),
            ..Default::default()
        });
        assert!(nested.is_collector_url("https://gw.example.com/observability/events"));
        assert!(!nested.is_collector_url("https://gw.example.com/observability-admin/x"));
        assert!(!nested.is_collector_url("https://gw.example.com/orders"));
    }

    #[test]
    fn backoff_strategy_parses_lowercase() {
        let options = ObservabilityOptions::from_json(r#"{"backoffStrategy": "deferred"}"#).unwrap();
        assert_eq!(options.backoff_strategy, Some(BackoffStrategy::Deferred));
    }
}
