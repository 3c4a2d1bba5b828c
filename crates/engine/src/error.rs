//! Engine error types.

use narrator_provider::ProviderError;
use narrator_storage::StorageError;
use thiserror::Error;

/// Errors surfaced by the cache manager, queue and cleanup service.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Unknown request id (or already reaped), or a cache miss where a hit was required.
    #[error("not found: {0}")]
    NotFound(String),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A single blob larger than the whole cache budget.
    #[error("entry of {size} bytes exceeds cache budget of {budget} bytes")]
    EntryTooLarge { size: u64, budget: u64 },

    /// The operation is not valid for the request's current status.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// The access journal could not be encoded.
    #[error("access journal error: {0}")]
    Journal(#[from] serde_json::Error),
}

impl From<narrator_core::Error> for EngineError {
    fn from(err: narrator_core::Error) -> Self {
        match err {
            narrator_core::Error::InvalidTransition { .. } => Self::InvalidState(err.to_string()),
            other => Self::InvalidInput(other.to_string()),
        }
    }
}

/// Result type alias for engine operations.
pub type EngineResult<T> = std::result::Result<T, EngineError>;
