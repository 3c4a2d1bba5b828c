//! In-process blob store.

use crate::error::{StorageError, StorageResult};
use crate::traits::{BlobMeta, BlobStore};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::BTreeMap;
use std::sync::RwLock;
use time::OffsetDateTime;
use tracing::instrument;

#[derive(Clone)]
struct StoredBlob {
    data: Bytes,
    modified: OffsetDateTime,
}

/// Blob store kept entirely in memory. Contents are lost when the process exits.
#[derive(Default)]
pub struct MemoryBackend {
    blobs: RwLock<BTreeMap<String, StoredBlob>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a blob with an explicit modification time.
    pub fn put_with_modified(&self, key: &str, data: Bytes, modified: OffsetDateTime) {
        let mut blobs = self.write_guard();
        blobs.insert(key.to_string(), StoredBlob { data, modified });
    }

    /// Number of stored blobs.
    pub fn len(&self) -> usize {
        self.read_guard().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read_guard(&self) -> std::sync::RwLockReadGuard<'_, BTreeMap<String, StoredBlob>> {
        self.blobs.read().unwrap_or_else(|poisoned| {
            tracing::warn!("memory store lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn write_guard(&self) -> std::sync::RwLockWriteGuard<'_, BTreeMap<String, StoredBlob>> {
        self.blobs.write().unwrap_or_else(|poisoned| {
            tracing::warn!("memory store lock poisoned, recovering");
            poisoned.into_inner()
        })
    }
}

fn validate_key(key: &str) -> StorageResult<()> {
    if key.is_empty() || key.starts_with('/') || key.split('/').any(|c| c == "..") {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    Ok(())
}

#[async_trait]
impl BlobStore for MemoryBackend {
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        validate_key(key)?;
        Ok(self.read_guard().contains_key(key))
    }

    async fn head(&self, key: &str) -> StorageResult<BlobMeta> {
        validate_key(key)?;
        self.read_guard()
            .get(key)
            .map(|blob| BlobMeta {
                size: blob.data.len() as u64,
                last_modified: Some(blob.modified),
            })
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        validate_key(key)?;
        self.read_guard()
            .get(key)
            .map(|blob| blob.data.clone())
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    #[instrument(skip(self, data), fields(backend = "memory", size = data.len()))]
    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()> {
        validate_key(key)?;
        self.put_with_modified(key, data, OffsetDateTime::now_utc());
        Ok(())
    }

    #[instrument(skip(self), fields(backend = "memory"))]
    async fn delete(&self, key: &str) -> StorageResult<()> {
        validate_key(key)?;
        self.write_guard()
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        Ok(self
            .read_guard()
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
