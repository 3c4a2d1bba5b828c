//! Outage detection in front of a provider.

use crate::error::{ProviderError, ProviderResult};
use crate::traits::{SpeechProvider, Synthesis, SynthesisRequest};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Default)]
struct GuardState {
    consecutive_failures: u32,
    down_until: Option<Instant>,
    rate_limited_until: Option<Instant>,
    last_error: Option<String>,
}

/// Point-in-time view of provider health.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ProviderHealth {
    pub provider: &'static str,
    pub available: bool,
    pub consecutive_failures: u32,
    /// Seconds until the outage cooldown ends, while one is active.
    pub unavailable_for_secs: Option<u64>,
    /// Seconds until the provider's rate limit resets, while one is active.
    pub rate_limited_for_secs: Option<u64>,
    pub last_error: Option<String>,
}

/// Wraps a provider and fails fast while it is known to be down or rate limited.
///
/// After `threshold` consecutive retryable failures the provider is treated as
/// down for `cooldown`. A rate-limit response blocks calls until its reset time.
pub struct OutageGuard {
    inner: Arc<dyn SpeechProvider>,
    threshold: u32,
    cooldown: Duration,
    state: Mutex<GuardState>,
}

fn remaining_secs(until: Instant, now: Instant) -> u64 {
    until.saturating_duration_since(now).as_secs_f64().ceil() as u64
}

impl OutageGuard {
    pub fn new(inner: Arc<dyn SpeechProvider>, threshold: u32, cooldown: Duration) -> Self {
        Self {
            inner,
            threshold: threshold.max(1),
            cooldown,
            state: Mutex::new(GuardState::default()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, GuardState> {
        self.state.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("provider guard lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Current health snapshot.
    pub fn health(&self) -> ProviderHealth {
        let now = Instant::now();
        let state = self.lock();
        let unavailable_for_secs = state
            .down_until
            .filter(|until| *until > now)
            .map(|until| remaining_secs(until, now));
        let rate_limited_for_secs = state
            .rate_limited_until
            .filter(|until| *until > now)
            .map(|until| remaining_secs(until, now));
        ProviderHealth {
            provider: self.inner.provider_name(),
            available: unavailable_for_secs.is_none() && rate_limited_for_secs.is_none(),
            consecutive_failures: state.consecutive_failures,
            unavailable_for_secs,
            rate_limited_for_secs,
            last_error: state.last_error.clone(),
        }
    }

    fn check_open(&self) -> ProviderResult<()> {
        let now = Instant::now();
        let state = self.lock();
        if let Some(until) = state.down_until.filter(|until| *until > now) {
            return Err(ProviderError::ProviderUnavailable(format!(
                "provider marked down after {} consecutive failures, retry in {}s",
                state.consecutive_failures,
                remaining_secs(until, now)
            )));
        }
        if let Some(until) = state.rate_limited_until.filter(|until| *until > now) {
            return Err(ProviderError::RateLimited {
                retry_after_secs: remaining_secs(until, now).max(1),
            });
        }
        Ok(())
    }

    fn record(&self, result: &ProviderResult<Synthesis>) {
        let now = Instant::now();
        let mut state = self.lock();
        match result {
            Ok(_) => {
                if state.consecutive_failures > 0 {
                    tracing::info!(
                        failures = state.consecutive_failures,
                        "provider recovered"
                    );
                }
                state.consecutive_failures = 0;
                state.down_until = None;
                state.rate_limited_until = None;
            }
            Err(err) => {
                state.last_error = Some(err.to_string());
                if let Some(wait) = err.retry_after() {
                    state.rate_limited_until = Some(now + wait);
                }
                // Bad input or credentials say nothing about provider availability.
                if !err.is_retryable() {
                    return;
                }
                state.consecutive_failures += 1;
                if state.consecutive_failures >= self.threshold {
                    state.down_until = Some(now + self.cooldown);
                    tracing::error!(
                        failures = state.consecutive_failures,
                        cooldown_secs = self.cooldown.as_secs(),
                        "provider marked down"
                    );
                }
            }
        }
    }
}

#[async_trait]
impl SpeechProvider for OutageGuard {
    async fn generate(&self, request: &SynthesisRequest) -> ProviderResult<Synthesis> {
        self.check_open()?;
        let result = self.inner.generate(request).await;
        self.record(&result);
        result
    }

    fn provider_name(&self) -> &'static str {
        self.inner.provider_name()
    }
}
