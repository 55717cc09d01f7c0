//! Per-run adaptive limiter.

use std::time::Duration;

use tracing::{debug, info, warn};

use super::RateLimitConfig;

/// Whether the owning run may keep issuing requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimiterSignal {
    Continue,
    Stop,
}

/// Snapshot of limiter state.
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimiterState {
    pub delay: Duration,
    pub min_delay: Duration,
    pub max_delay: Duration,
    pub consecutive_successes: u32,
    pub consecutive_failures: u32,
}

/// Inter-request pacing owned by a single reconstruction run.
///
/// Not shared: each run creates its own limiter, so no locking is needed.
#[derive(Debug)]
pub struct AdaptiveRateLimiter {
    config: RateLimitConfig,
    delay: Duration,
    consecutive_successes: u32,
    consecutive_failures: u32,
    stopped: bool,
}

impl AdaptiveRateLimiter {
    pub fn new() -> Self {
        Self::with_config(RateLimitConfig::default())
    }

    pub fn with_config(config: RateLimitConfig) -> Self {
        let delay = config
            .initial_delay
            .clamp(config.min_delay, config.max_delay);
        Self {
            config,
            delay,
            consecutive_successes: 0,
            consecutive_failures: 0,
            stopped: false,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// True once the failure threshold has been reached.
    pub fn should_stop(&self) -> bool {
        self.stopped
    }

    pub fn state(&self) -> RateLimiterState {
        RateLimiterState {
            delay: self.delay,
            min_delay: self.config.min_delay,
            max_delay: self.config.max_delay,
            consecutive_successes: self.consecutive_successes,
            consecutive_failures: self.consecutive_failures,
        }
    }

    /// Sleep for the current delay.
    pub async fn wait(&self) {
        if self.delay > Duration::ZERO {
            debug!("Pacing: waiting {:?}", self.delay);
            tokio::time::sleep(self.delay).await;
        }
    }

    /// Report a successful request - may decrease delay.
    pub fn report_success(&mut self) {
        self.consecutive_failures = 0;
        self.consecutive_successes += 1;

        if self.consecutive_successes >= self.config.recovery_threshold {
            let reduced = self.delay.mul_f64(self.config.recovery_multiplier);
            self.delay = reduced.max(self.config.min_delay);
            self.consecutive_successes = 0;
            debug!("Pacing delay reduced to {:?}", self.delay);
        }
    }

    /// Report a rate-limited response - increases delay, may signal stop.
    pub fn report_rate_limit(&mut self) -> LimiterSignal {
        self.consecutive_successes = 0;
        self.consecutive_failures += 1;

        let increased = self.delay.mul_f64(self.config.backoff_multiplier);
        self.delay = increased.min(self.config.max_delay);

        if self.consecutive_failures >= self.config.stop_threshold {
            if !self.stopped {
                warn!(
                    "Rate limited {} times in a row, stopping run",
                    self.consecutive_failures
                );
            }
            self.stopped = true;
            LimiterSignal::Stop
        } else {
            info!("Rate limited, pacing delay now {:?}", self.delay);
            LimiterSignal::Continue
        }
    }
}

impl Default for AdaptiveRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}
