//! API error types.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use narrator_engine::EngineError;
use narrator_provider::ProviderError;
use serde::Serialize;

/// API error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
}

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("storage error: {0}")]
    Storage(#[from] narrator_storage::StorageError),

    #[error("core error: {0}")]
    Core(#[from] narrator_core::Error),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl ApiError {
    /// Get the error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::Storage(_) => "storage_error",
            Self::Core(_) => "bad_request",
            Self::Engine(e) => match e {
                EngineError::NotFound(_) => "not_found",
                EngineError::InvalidInput(_) => "bad_request",
                EngineError::InvalidState(_) => "conflict",
                EngineError::EntryTooLarge { .. } => "entry_too_large",
                EngineError::Storage(_) => "storage_error",
                EngineError::Journal(_) => "journal_error",
                EngineError::Provider(ProviderError::RateLimited { .. }) => "rate_limited",
                EngineError::Provider(_) => "provider_error",
            },
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Storage(e) if e.is_not_found() => StatusCode::NOT_FOUND,
            Self::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Core(_) => StatusCode::BAD_REQUEST,
            Self::Engine(e) => match e {
                EngineError::NotFound(_) => StatusCode::NOT_FOUND,
                EngineError::InvalidInput(_) => StatusCode::BAD_REQUEST,
                EngineError::InvalidState(_) => StatusCode::CONFLICT,
                EngineError::EntryTooLarge { .. } => StatusCode::INTERNAL_SERVER_ERROR,
                EngineError::Storage(e) if e.is_not_found() => StatusCode::NOT_FOUND,
                EngineError::Storage(_) | EngineError::Journal(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
                EngineError::Provider(ProviderError::RateLimited { .. }) => {
                    StatusCode::TOO_MANY_REQUESTS
                }
                EngineError::Provider(_) => StatusCode::SERVICE_UNAVAILABLE,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body = ErrorResponse {
            code: self.code().to_string(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = std::result::Result<T, ApiError>;
