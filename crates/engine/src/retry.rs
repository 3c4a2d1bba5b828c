//! Retry classification and backoff for provider calls.

use narrator_core::config::RetryConfig;
use narrator_core::request::PROGRESS_DISPATCHED;
use narrator_provider::ProviderError;
use std::time::Duration;

// Attempt progress stays well below PROGRESS_AUDIO_RECEIVED.
const RETRY_PROGRESS_SPAN: u32 = 60;

/// Exponential backoff bounded by an attempt cap.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
        }
    }

    /// Whether a failure on attempt `attempt` (1-based) should be retried.
    pub fn should_retry(&self, attempt: u32, err: &ProviderError) -> bool {
        err.is_retryable() && attempt < self.max_attempts
    }

    /// Delay before the attempt following `attempt` (1-based).
    ///
    /// `base * 2^(attempt-1)` capped at `max_delay`, then raised to any
    /// retry-after hint carried by the error.
    pub fn delay_after(&self, attempt: u32, err: &ProviderError) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let backoff = self
            .base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay);
        match err.retry_after() {
            Some(hint) => backoff.max(hint),
            None => backoff,
        }
    }

    /// Progress reported while attempt `attempt` (1-based) is in flight.
    pub fn progress_for(&self, attempt: u32) -> u8 {
        let done = attempt.saturating_sub(1).min(self.max_attempts);
        let step = RETRY_PROGRESS_SPAN * done / self.max_attempts;
        PROGRESS_DISPATCHED + step as u8
    }
}
