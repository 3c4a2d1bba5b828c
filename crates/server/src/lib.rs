//! HTTP API server for narration generation.
//!
//! This crate provides the HTTP surface over the engine:
//! - Narration submission, status polling, cancellation and acknowledgement
//! - Cached audio download and the voice catalogue
//! - Cleanup administration and provider health
//! - Health and Prometheus endpoints

pub mod error;
pub mod handlers;
pub mod metrics;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use routes::create_router;
pub use state::{AppState, HealthSource};
