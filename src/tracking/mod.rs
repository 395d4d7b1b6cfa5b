//! Typed tracking API and the payload shapes sent to the collector.
mod environment;
mod payloads;
mod severity;
mod tracker;

pub use environment::{
    DeviceType, EnvironmentInfo, DEFAULT_VIEWPORT, MOBILE_MAX_WIDTH, TABLET_MAX_WIDTH,
};
pub use payloads::{
    metadata_object, EventPayload, ServiceErrorPayload, ServiceErrorReport, UiErrorPayload,
    UiErrorReport, UiEventPayload, UiInteraction, EVENTS_ENDPOINT, SERVICE_ERRORS_ENDPOINT,
    UI_ERRORS_ENDPOINT, UI_EVENTS_ENDPOINT,
};
pub use severity::Severity;
pub use tracker::{Tracker, DEFAULT_EVENT_CATEGORY, REQUEST_EVENT_CATEGORY, REQUEST_EVENT_TYPE};
