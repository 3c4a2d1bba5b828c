//! Blob storage for cached narration audio.
//!
//! This crate provides:
//! - The `BlobStore` trait: get/put/delete/list-by-age over opaque keys
//! - Backends: local filesystem (atomic writes) and in-memory

pub mod backends;
pub mod error;
pub mod traits;

pub use backends::{filesystem::FilesystemBackend, memory::MemoryBackend};
pub use error::{StorageError, StorageResult};
pub use traits::{BlobListing, BlobMeta, BlobStore};

use narrator_core::config::StorageConfig;
use std::sync::Arc;

/// Create a blob store from configuration.
pub async fn from_config(config: &StorageConfig) -> StorageResult<Arc<dyn BlobStore>> {
    config.validate().map_err(StorageError::Config)?;

    match config {
        StorageConfig::Filesystem { path } => {
            let backend = FilesystemBackend::new(path).await?;
            tracing::info!(path = %path.display(), "using filesystem blob store");
            Ok(Arc::new(backend))
        }
        StorageConfig::Memory => {
            tracing::warn!("using in-memory blob store; cached audio will not survive restarts");
            Ok(Arc::new(MemoryBackend::new()))
        }
    }
}
