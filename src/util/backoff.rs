use std::time::Duration;

pub const DEFAULT_UNIT_MILLIS: u64 = 1_000;
pub const DEFAULT_BACKOFF_FACTOR: f64 = 2.0;
pub const MAX_BACKOFF_MILLIS: u64 = 4 * 60 * 60 * 1_000;

/// Exponential delay applied after a failed retry of a queued item: `unit * factor^retry_count`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    pub unit: Duration,
    pub factor: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            unit: Duration::from_millis(DEFAULT_UNIT_MILLIS),
            factor: DEFAULT_BACKOFF_FACTOR,
        }
    }
}

impl BackoffPolicy {
    pub fn new(unit: Duration, factor: f64) -> Self {
        Self { unit, factor }
    }

    pub fn delay_for(&self, retry_count: u32) -> Duration {
        Duration::from_millis(self.delay_millis(retry_count))
    }

    pub fn delay_millis(&self, retry_count: u32) -> u64 {
        let factor = if self.factor.is_finite() && self.factor > 0.0 {
            self.factor
        } else {
            DEFAULT_BACKOFF_FACTOR
        };
        let exponent = retry_count.min(i32::MAX as u32) as i32;
        let value = (self.unit.as_millis() as f64) * factor.powi(exponent);
        value.round().clamp(0.0, MAX_BACKOFF_MILLIS as f64) as u64
    }
}
