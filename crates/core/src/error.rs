//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid fingerprint: {0}")]
    InvalidFingerprint(String),

    #[error("invalid request id: {0}")]
    InvalidRequestId(String),

    #[error("invalid voice style: {0}")]
    InvalidVoiceStyle(String),

    #[error("invalid intensity: {0} (must be between {min} and {max})", min = crate::voice::Intensity::MIN, max = crate::voice::Intensity::MAX)]
    InvalidIntensity(i64),

    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_intensity_message_names_bounds() {
        let msg = Error::InvalidIntensity(9).to_string();
        assert_eq!(msg, "invalid intensity: 9 (must be between 1 and 5)");
    }

    #[test]
    fn test_invalid_transition_message() {
        let err = Error::InvalidTransition {
            from: "completed".to_string(),
            to: "generating".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "invalid status transition: completed -> generating"
        );
    }
}
