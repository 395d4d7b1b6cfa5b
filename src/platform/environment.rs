//! Runtime environment detection and environment-variable option sources.

use std::env;
use std::fs;

use serde_json::{Map, Value};

pub const ENV_SERVICE_URL: &str = "OBSERVABILITY_SERVICE_URL";
pub const ENV_SERVICE_NAME: &str = "OBSERVABILITY_SERVICE_NAME";
pub const ENV_DEV_MODE: &str = "OBSERVABILITY_DEV_MODE";
pub const ENV_TEST_MODE: &str = "OBSERVABILITY_TEST_MODE";
/// JSON options object, or a path to a file containing one.
pub const ENV_CONFIG: &str = "OBSERVABILITY_CONFIG";
pub const ENV_STORAGE_DIR: &str = "OBSERVABILITY_STORAGE_DIR";

/// Collects option overrides from the process environment as a camelCase JSON object.
///
/// `OBSERVABILITY_CONFIG` provides the base object; the dedicated variables win over it.
pub fn options_from_env() -> Option<Map<String, Value>> {
    let mut map = env::var(ENV_CONFIG)
        .ok()
        .and_then(|raw| parse_config_source(&raw))
        .and_then(|value| value.as_object().cloned())
        .unwrap_or_default();

    if let Some(url) = non_empty_var(ENV_SERVICE_URL) {
        map.insert("serviceUrl".into(), Value::String(url));
    }
    if let Some(name) = non_empty_var(ENV_SERVICE_NAME) {
        map.insert("serviceName".into(), Value::String(name));
    }
    if let Some(flag) = non_empty_var(ENV_DEV_MODE) {
        map.insert("devMode".into(), Value::Bool(parse_flag(&flag)));
    }
    if let Some(flag) = non_empty_var(ENV_TEST_MODE) {
        map.insert("testMode".into(), Value::Bool(parse_flag(&flag)));
    }

    if map.is_empty() {
        None
    } else {
        Some(map)
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

fn parse_flag(raw: &str) -> bool {
    matches!(raw.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes" | "on")
}

fn parse_config_source(raw: &str) -> Option<Value> {
    if let Ok(json) = serde_json::from_str::<Value>(raw) {
        if json.is_object() {
            return Some(json);
        }
    }

    let contents = treat_as_path(raw).and_then(|path| fs::read_to_string(path).ok())?;
    serde_json::from_str::<Value>(&contents)
        .ok()
        .filter(Value::is_object)
}

#[cfg(not(target_arch = "wasm32"))]
fn treat_as_path(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if std::path::Path::new(trimmed).is_file() {
        Some(trimmed.to_string())
    } else {
        None
    }
}

#[cfg(target_arch = "wasm32")]
fn treat_as_path(_raw: &str) -> Option<String> {
    None
}

/// Returns `true` if the runtime should behave as a browser environment.
pub fn is_browser() -> bool {
    #[cfg(all(target_arch = "wasm32", feature = "wasm-web"))]
    {
        web_sys::window().is_some()
    }

    #[cfg(not(all(target_arch = "wasm32", feature = "wasm-web")))]
    {
        false
    }
}

/// Returns `true` for loopback hosts (`localhost`, `127.0.0.0/8`, `::1`).
pub fn is_loopback_host(host: &str) -> bool {
    let host = host.trim_start_matches('[').trim_end_matches(']');
    if host.eq_ignore_ascii_case("localhost") || host.ends_with(".localhost") {
        return true;
    }
    host.parse::<std::net::IpAddr>()
        .map(|addr| addr.is_loopback())
        .unwrap_or(false)
}
