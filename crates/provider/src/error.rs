//! Typed provider outcomes.

use std::time::Duration;
use thiserror::Error;

/// Every way a provider call can fail.
///
/// The generation queue classifies retries purely on the variant, so this set
/// is closed: anything a backend reports must be mapped onto one of these.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// The provider asked us to back off.
    #[error("rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("provider call timed out")]
    Timeout,

    /// The provider rejected the request itself; retrying will not help.
    #[error("provider rejected input: {0}")]
    InvalidInput(String),

    #[error("provider authentication failed: {0}")]
    Unauthorized(String),

    /// Server-side or transport failure.
    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),
}

impl ProviderError {
    /// Whether a later attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited { .. } | Self::Timeout | Self::ProviderUnavailable(_) => true,
            Self::InvalidInput(_) | Self::Unauthorized(_) => false,
        }
    }

    /// Minimum wait the provider asked for, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after_secs } => Some(Duration::from_secs(*retry_after_secs)),
            _ => None,
        }
    }

    /// Short label for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RateLimited { .. } => "rate_limited",
            Self::Timeout => "timeout",
            Self::InvalidInput(_) => "invalid_input",
            Self::Unauthorized(_) => "unauthorized",
            Self::ProviderUnavailable(_) => "unavailable",
        }
    }
}

/// Result type for provider calls.
pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classification() {
        assert!(ProviderError::RateLimited { retry_after_secs: 1 }.is_retryable());
        assert!(ProviderError::Timeout.is_retryable());
        assert!(ProviderError::ProviderUnavailable("502".into()).is_retryable());
        assert!(!ProviderError::InvalidInput("too long".into()).is_retryable());
        assert!(!ProviderError::Unauthorized("bad key".into()).is_retryable());
    }

    #[test]
    fn test_retry_after_only_for_rate_limits() {
        assert_eq!(
            ProviderError::RateLimited { retry_after_secs: 30 }.retry_after(),
            Some(Duration::from_secs(30))
        );
        assert_eq!(ProviderError::Timeout.retry_after(), None);
    }
}
