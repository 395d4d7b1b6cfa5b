//! Option parsing and merging.
mod error;
mod options;

pub use error::{invalid_options, ConfigError, ConfigErrorCode, ConfigResult};
pub use options::{
    merge_config, AutoTrackOptions, AutoTrackSelectorOptions, AutoTrackSettings, BackoffStrategy,
    ExcludeOptions, ExcludeSettings, ObservabilityConfig, ObservabilityOptions,
    DEFAULT_BATCH_INTERVAL_MS, DEFAULT_BATCH_SIZE, DEFAULT_CLICK_SELECTORS, DEFAULT_RETRY_ATTEMPTS,
    DEFAULT_RETRY_BACKOFF, DEFAULT_SERVICE_NAME, DEFAULT_SERVICE_URL, DEFAULT_TIMEOUT_MS,
};
