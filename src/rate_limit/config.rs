//! Adaptive rate limiter configuration.

use std::time::Duration;

/// Configuration for adaptive pacing.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Delay before the first request.
    pub initial_delay: Duration,
    /// Minimum delay (floor).
    pub min_delay: Duration,
    /// Maximum delay (ceiling for backoff).
    pub max_delay: Duration,
    /// Multiplier applied on every rate-limited response.
    pub backoff_multiplier: f64,
    /// Multiplier for recovery on success (< 1.0 to decrease delay).
    pub recovery_multiplier: f64,
    /// Number of consecutive successes before reducing delay.
    pub recovery_threshold: u32,
    /// Consecutive rate-limited responses that end the run.
    pub stop_threshold: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            min_delay: Duration::from_millis(300),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            recovery_multiplier: 0.8,
            recovery_threshold: 5,
            stop_threshold: 3,
        }
    }
}
