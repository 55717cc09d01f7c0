//! Pacing for upstream requests.
//!
//! [`AdaptiveRateLimiter`] spaces out bursts of requests made by one
//! reconstruction run. Per-request retry backoff lives in the transport and
//! uses [`backoff_delay`].

mod config;
mod limiter;

use std::time::Duration;

pub use config::RateLimitConfig;
pub use limiter::{AdaptiveRateLimiter, LimiterSignal, RateLimiterState};

/// Parse Retry-After header value (seconds).
/// Returns duration to wait, or None if header is missing/invalid.
pub fn parse_retry_after(header_value: Option<&str>) -> Option<Duration> {
    let value = header_value?;
    value
        .trim()
        .parse::<u64>()
        .ok()
        .map(|secs| Duration::from_secs(secs.min(60)))
}

/// Exponential backoff: `base * 2^attempt`, capped at five minutes.
pub fn backoff_delay(attempt: u32, base: Duration) -> Duration {
    let factor = 2u32.saturating_pow(attempt);
    base.saturating_mul(factor).min(Duration::from_secs(300))
}
