//! Automatic page view, error, interaction and API call tracking.
mod auto;
mod http;
mod selector;

pub use auto::{ApiCallRecord, AutoInstrumentation};
pub use http::InstrumentedHttpClient;
pub use selector::{path_excluded, ElementDescriptor, Selector, SelectorList};
