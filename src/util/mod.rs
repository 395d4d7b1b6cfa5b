pub mod backoff;
pub mod ids;

pub use backoff::{BackoffPolicy, MAX_BACKOFF_MILLIS};
pub use ids::{now_millis, random_base36};
