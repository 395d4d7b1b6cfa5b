//! Request bodies accepted by the collector endpoints.
//!
//! `user_id` is always present (serialized as `null` when unknown); other optional fields are
//! omitted when unset.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::tracking::environment::DeviceType;
use crate::tracking::severity::Severity;

pub const EVENTS_ENDPOINT: &str = "/events";
pub const UI_EVENTS_ENDPOINT: &str = "/ui-events";
pub const UI_ERRORS_ENDPOINT: &str = "/errors/ui";
pub const SERVICE_ERRORS_ENDPOINT: &str = "/errors/services";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventPayload {
    pub user_id: Option<i64>,
    pub session_id: String,
    pub event_type: String,
    pub event_category: String,
    pub event_metadata: Value,
    pub user_agent: String,
    pub service_name: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UiEventPayload {
    pub user_id: Option<i64>,
    pub session_id: String,
    pub interaction_type: String,
    pub element_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element_id: Option<String>,
    pub page_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_context: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_value: Option<String>,
    pub event_metadata: Value,
    pub user_agent: String,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub device_type: DeviceType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_to_interaction_ms: Option<u64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UiErrorPayload {
    pub user_id: Option<i64>,
    pub session_id: String,
    pub error_message: String,
    pub error_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_stack: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_number: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column_number: Option<u32>,
    pub page_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_context: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route_name: Option<String>,
    pub error_metadata: Value,
    pub user_agent: String,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub device_type: DeviceType,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ServiceErrorPayload {
    pub user_id: Option<i64>,
    pub session_id: String,
    pub error_message: String,
    pub error_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_headers: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_body: Option<String>,
    pub service_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    pub error_metadata: Value,
    pub user_agent: String,
}

/// A UI interaction as reported by the host (click, submit, navigation, ...).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct UiInteraction {
    pub interaction_type: String,
    pub element_type: String,
    pub element_name: Option<String>,
    pub element_id: Option<String>,
    pub page_context: Option<String>,
    pub route_name: Option<String>,
    pub event_value: Option<String>,
    pub metadata: Value,
    pub time_to_interaction_ms: Option<u64>,
}

impl UiInteraction {
    pub fn new(interaction_type: impl Into<String>, element_type: impl Into<String>) -> Self {
        Self {
            interaction_type: interaction_type.into(),
            element_type: element_type.into(),
            ..Default::default()
        }
    }

    pub fn with_element_name(mut self, name: impl Into<String>) -> Self {
        self.element_name = Some(name.into());
        self
    }

    pub fn with_element_id(mut self, id: impl Into<String>) -> Self {
        self.element_id = Some(id.into());
        self
    }

    pub fn with_page_context(mut self, context: impl Into<String>) -> Self {
        self.page_context = Some(context.into());
        self
    }

    pub fn with_route_name(mut self, route: impl Into<String>) -> Self {
        self.route_name = Some(route.into());
        self
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.event_value = Some(value.into());
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_time_to_interaction(mut self, millis: u64) -> Self {
        self.time_to_interaction_ms = Some(millis);
        self
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct UiErrorReport {
    pub error_message: String,
    pub error_type: String,
    pub error_stack: Option<String>,
    pub error_source: Option<String>,
    pub line_number: Option<u32>,
    pub column_number: Option<u32>,
    pub page_context: Option<String>,
    pub route_name: Option<String>,
    pub metadata: Value,
}

impl UiErrorReport {
    pub fn new(error_type: impl Into<String>, error_message: impl Into<String>) -> Self {
        Self {
            error_type: error_type.into(),
            error_message: error_message.into(),
            ..Default::default()
        }
    }

    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.error_stack = Some(stack.into());
        self
    }

    pub fn with_location(
        mut self,
        source: impl Into<String>,
        line_number: Option<u32>,
        column_number: Option<u32>,
    ) -> Self {
        self.error_source = Some(source.into());
        self.line_number = line_number;
        self.column_number = column_number;
        self
    }

    pub fn with_page_context(mut self, context: impl Into<String>) -> Self {
        self.page_context = Some(context.into());
        self
    }

    pub fn with_route_name(mut self, route: impl Into<String>) -> Self {
        self.route_name = Some(route.into());
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ServiceErrorReport {
    pub error_message: String,
    pub error_type: String,
    pub status_code: Option<u16>,
    pub request_url: Option<String>,
    pub request_method: Option<String>,
    pub request_headers: Option<Map<String, Value>>,
    pub request_body: Option<String>,
    pub response_body: Option<String>,
    pub endpoint: Option<String>,
    pub error_code: Option<String>,
    pub timeout_ms: Option<u64>,
    pub metadata: Value,
}

impl ServiceErrorReport {
    pub fn new(error_type: impl Into<String>, error_message: impl Into<String>) -> Self {
        Self {
            error_type: error_type.into(),
            error_message: error_message.into(),
            ..Default::default()
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status_code = Some(status);
        self
    }

    pub fn with_request(mut self, method: impl Into<String>, url: impl Into<String>) -> Self {
        self.request_method = Some(method.into());
        self.request_url = Some(url.into());
        self
    }

    pub fn with_request_headers(mut self, headers: Map<String, Value>) -> Self {
        self.request_headers = Some(headers);
        self
    }

    pub fn with_request_body(mut self, body: impl Into<String>) -> Self {
        self.request_body = Some(body.into());
        self
    }

    pub fn with_response_body(mut self, body: impl Into<String>) -> Self {
        self.response_body = Some(body.into());
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn with_error_code(mut self, code: impl Into<String>) -> Self {
        self.error_code = Some(code.into());
        self
    }

    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn severity(&self) -> Severity {
        Severity::from_status(self.status_code)
    }
}

/// Metadata is always sent as an object: `null` becomes `{}`, scalars are wrapped in `{"value"}`.
pub fn metadata_object(metadata: Value) -> Value {
    match metadata {
        Value::Object(_) => metadata,
        Value::Null => Value::Object(Map::new()),
        other => {
            let mut map = Map::new();
            map.insert("value".into(), other);
            Value::Object(map)
        }
    }
}
