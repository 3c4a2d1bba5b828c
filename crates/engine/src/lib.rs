//! Narration generation engine.
//!
//! This crate provides:
//! - `CacheManager`: fingerprint-keyed audio cache with TTL and LRU size budget
//! - `GenerationQueue`: concurrency-capped, prioritized generation with retries
//! - `CleanupService`: scheduled cache expiry and abandoned-request sweep
//! - Prometheus metrics for all three

pub mod cache;
pub mod cleanup;
pub mod error;
pub mod metrics;
pub mod queue;
pub mod retry;

pub use cache::{CacheEntry, CacheManager, CacheStats, ExpireOutcome, StoreOutcome};
pub use cleanup::{CleanupRun, CleanupService, CleanupSettings, CleanupStats};
pub use error::{EngineError, EngineResult};
pub use queue::{AbandonOutcome, GenerationQueue, QueueSettings, QueueStats, SubmitReceipt};
pub use retry::RetryPolicy;
