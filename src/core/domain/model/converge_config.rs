//! Tunables for polling and the HTTP gateway.

use crate::core::domain::value_object::serde_helpers::duration_millis;
use serde::Deserialize;
use std::time::Duration;

/// Client-side rate limit applied by the HTTP gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct RateLimitConfig {
    pub requests_per_second: u32,
    pub burst_size: u32,
}

/// Convergence configuration.
///
/// Durations deserialize from milliseconds.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ConvergeConfig {
    /// Upper bound on the power-state poll interval.
    #[serde(with = "duration_millis")]
    pub poll_interval: Duration,
    /// Lower bound on the power-state poll interval.
    #[serde(with = "duration_millis")]
    pub min_poll_interval: Duration,
    /// The interval never exceeds `timeout / poll_divisor`.
    pub poll_divisor: u32,
    /// Interval between job status checks in the HTTP gateway.
    #[serde(with = "duration_millis")]
    pub job_poll_interval: Duration,
    pub rate_limit: Option<RateLimitConfig>,
}

impl Default for ConvergeConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            min_poll_interval: Duration::from_millis(100),
            poll_divisor: 10,
            job_poll_interval: Duration::from_secs(1),
            rate_limit: None,
        }
    }
}

impl ConvergeConfig {
    /// The interval at which to poll for a stable state within `timeout`:
    /// `max(min(poll_interval, timeout / poll_divisor), min_poll_interval)`.
    #[must_use]
    pub fn poll_interval_for(&self, timeout: Duration) -> Duration {
        let scaled = timeout / self.poll_divisor.max(1);
        scaled.min(self.poll_interval).max(self.min_poll_interval)
    }
}
