//! Storage trait definitions.

use crate::error::StorageResult;
use async_trait::async_trait;
use bytes::Bytes;
use time::OffsetDateTime;

/// Byte store holding cached audio blobs.
///
/// The store enforces no policy: TTL, size budgets and the index of which
/// blob belongs to which fingerprint live one layer up.
#[async_trait]
pub trait BlobStore: Send + Sync + 'static {
    /// Check if a blob exists.
    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Get a blob's size and modification time without fetching content.
    async fn head(&self, key: &str) -> StorageResult<BlobMeta>;

    /// Get a blob's content.
    async fn get(&self, key: &str) -> StorageResult<Bytes>;

    /// Put a blob atomically, replacing any previous content.
    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()>;

    /// Delete a blob. Deleting a missing blob fails with `NotFound`.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// List blob keys under a prefix, in no particular order.
    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>>;

    /// List blobs under a prefix with their metadata, oldest first.
    ///
    /// Blobs without a modification time sort first. Blobs that vanish
    /// between listing and `head` are skipped.
    async fn list_by_age(&self, prefix: &str) -> StorageResult<Vec<BlobListing>> {
        let keys = self.list(prefix).await?;
        let mut listings = Vec::with_capacity(keys.len());
        for key in keys {
            match self.head(&key).await {
                Ok(meta) => listings.push(BlobListing { key, meta }),
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e),
            }
        }
        listings.sort_by(|a, b| {
            a.meta
                .last_modified
                .cmp(&b.meta.last_modified)
                .then_with(|| a.key.cmp(&b.key))
        });
        Ok(listings)
    }

    /// Get the name of this storage backend, for metrics and logging.
    fn backend_name(&self) -> &'static str;

    /// Verify the backend is reachable and usable.
    async fn health_check(&self) -> StorageResult<()> {
        Ok(())
    }
}

/// Metadata about a stored blob.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlobMeta {
    /// Blob size in bytes.
    pub size: u64,
    /// Last modification time (if available).
    pub last_modified: Option<OffsetDateTime>,
}

/// A key returned by [`BlobStore::list_by_age`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlobListing {
    pub key: String,
    pub meta: BlobMeta,
}
