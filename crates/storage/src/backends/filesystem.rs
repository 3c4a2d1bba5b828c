//! Local filesystem blob store.

use crate::error::{StorageError, StorageResult};
use crate::traits::{BlobMeta, BlobStore};
use async_trait::async_trait;
use bytes::Bytes;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::instrument;
use uuid::Uuid;

/// Marker embedded in the names of in-progress writes.
const TEMP_MARKER: &str = ".tmp.";

/// Blob store rooted at a local directory. Keys map to relative paths.
pub struct FilesystemBackend {
    root: PathBuf,
}

impl FilesystemBackend {
    /// Create the backend, creating the root directory if needed.
    pub async fn new(root: impl AsRef<Path>) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    /// Resolve a key to a path below the root.
    ///
    /// Canonicalisation touches the filesystem, so it runs on the blocking pool.
    async fn key_path(&self, key: &str) -> StorageResult<PathBuf> {
        let root = self.root.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || resolve_key(&root, &key))
            .await
            .map_err(|e| StorageError::Io(std::io::Error::other(format!("spawn_blocking failed: {e}"))))?
    }

    async fn ensure_parent(&self, path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }
}

fn not_found_or_io(key: &str) -> impl FnOnce(std::io::Error) -> StorageError + '_ {
    move |e| {
        if e.kind() == ErrorKind::NotFound {
            StorageError::NotFound(key.to_string())
        } else {
            StorageError::Io(e)
        }
    }
}

/// Map `key` onto `root`, refusing anything that would land outside it.
///
/// Rejects `..`, absolute keys and any non-normal component up front, then
/// checks the nearest existing ancestor (or the path itself) still resolves
/// inside the root so symlinks cannot be used to escape.
fn resolve_key(root: &Path, key: &str) -> StorageResult<PathBuf> {
    if key.is_empty() {
        return Ok(root.to_path_buf());
    }
    if key.contains("..") || key.starts_with('/') || key.starts_with('\\') {
        return Err(StorageError::InvalidKey(format!(
            "path traversal not allowed: {key}"
        )));
    }
    if !Path::new(key)
        .components()
        .all(|c| matches!(c, Component::Normal(_)))
    {
        return Err(StorageError::InvalidKey(format!(
            "contains unsafe path component: {key}"
        )));
    }

    let path = root.join(key);
    let root_canonical = root.canonicalize()?;

    let mut probe = Some(path.as_path());
    while let Some(candidate) = probe {
        match std::fs::symlink_metadata(candidate) {
            Ok(meta) => {
                let canonical = candidate.canonicalize().map_err(|e| {
                    if meta.file_type().is_symlink() {
                        StorageError::InvalidKey(format!("dangling symlink in key: {key}"))
                    } else {
                        StorageError::Io(e)
                    }
                })?;
                if !canonical.starts_with(&root_canonical) {
                    return Err(StorageError::InvalidKey(format!(
                        "resolved path escapes storage root: {key}"
                    )));
                }
                return Ok(path);
            }
            Err(e) if e.kind() == ErrorKind::NotFound => probe = candidate.parent(),
            Err(e) => return Err(StorageError::Io(e)),
        }
    }

    Ok(path)
}

#[async_trait]
impl BlobStore for FilesystemBackend {
    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let path = self.key_path(key).await?;
        fs::try_exists(&path).await.map_err(StorageError::Io)
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn head(&self, key: &str) -> StorageResult<BlobMeta> {
        let path = self.key_path(key).await?;
        let metadata = fs::metadata(&path).await.map_err(not_found_or_io(key))?;
        if !metadata.is_file() {
            return Err(StorageError::NotFound(key.to_string()));
        }
        Ok(BlobMeta {
            size: metadata.len(),
            last_modified: metadata.modified().ok().map(Into::into),
        })
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        let path = self.key_path(key).await?;
        let data = fs::read(&path).await.map_err(not_found_or_io(key))?;
        Ok(Bytes::from(data))
    }

    #[instrument(skip(self, data), fields(backend = "filesystem", size = data.len()))]
    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()> {
        if key.contains(TEMP_MARKER) {
            return Err(StorageError::InvalidKey(format!(
                "reserved marker in key: {key}"
            )));
        }
        let path = self.key_path(key).await?;
        self.ensure_parent(&path).await?;

        // Unique temp name, fsync, then rename so readers never see a partial blob.
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let temp_path = path.with_file_name(format!("{file_name}{TEMP_MARKER}{}", Uuid::new_v4()));
        {
            let mut file = fs::File::create(&temp_path).await?;
            file.write_all(&data).await?;
            file.sync_all().await?;
        }
        if let Err(e) = fs::rename(&temp_path, &path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(StorageError::Io(e));
        }
        Ok(())
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn delete(&self, key: &str) -> StorageResult<()> {
        let path = self.key_path(key).await?;
        fs::remove_file(&path).await.map_err(not_found_or_io(key))?;

        // Prune now-empty parent directories up to the root; failures are harmless.
        let mut dir = path.parent();
        while let Some(current) = dir {
            if current == self.root || fs::remove_dir(current).await.is_err() {
                break;
            }
            dir = current.parent();
        }
        Ok(())
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let base = self.key_path(prefix).await?;
        let mut keys = Vec::new();

        match fs::try_exists(&base).await {
            Ok(true) => {}
            Ok(false) => return Ok(keys),
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(keys),
            Err(e) => return Err(StorageError::Io(e)),
        }

        let mut stack = vec![base];
        while let Some(dir) = stack.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                // Raced with a delete pruning the directory.
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(StorageError::Io(e)),
            };
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                // file_type() does not follow symlinks; symlinks are never listed.
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    stack.push(path);
                } else if file_type.is_file()
                    && !entry.file_name().to_string_lossy().contains(TEMP_MARKER)
                    && let Ok(rel) = path.strip_prefix(&self.root)
                {
                    keys.push(rel.to_string_lossy().into_owned());
                }
            }
        }

        Ok(keys)
    }

    fn backend_name(&self) -> &'static str {
        "filesystem"
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn health_check(&self) -> StorageResult<()> {
        let metadata = fs::metadata(&self.root).await?;
        if !metadata.is_dir() {
            return Err(StorageError::Config(format!(
                "storage root is not a directory: {}",
                self.root.display()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_head() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBackend::new(dir.path()).await.unwrap();

        let key = "audio/abc/1.mp3";
        backend.put(key, Bytes::from("hello world")).await.unwrap();

        assert!(backend.exists(key).await.unwrap());
        assert_eq!(backend.get(key).await.unwrap(), Bytes::from("hello world"));
        let meta = backend.head(key).await.unwrap();
        assert_eq!(meta.size, 11);
        assert!(meta.last_modified.is_some());
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBackend::new(dir.path()).await.unwrap();

        backend.put("k", Bytes::from("first")).await.unwrap();
        backend.put("k", Bytes::from("second")).await.unwrap();
        assert_eq!(backend.get("k").await.unwrap(), Bytes::from("second"));
        assert_eq!(backend.list("").await.unwrap(), vec!["k".to_string()]);
    }

    #[tokio::test]
    async fn test_delete_missing_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBackend::new(dir.path()).await.unwrap();

        let err = backend.delete("audio/missing").await.unwrap_err();
        assert!(err.is_not_found());
        assert!(backend.get("audio/missing").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_delete_prunes_empty_directories() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBackend::new(dir.path()).await.unwrap();

        backend.put("audio/fp/blob", Bytes::from("x")).await.unwrap();
        backend.delete("audio/fp/blob").await.unwrap();
        assert!(!dir.path().join("audio").exists());
        assert!(dir.path().exists());
    }

    #[tokio::test]
    async fn test_list_skips_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBackend::new(dir.path()).await.unwrap();

        backend.put("audio/a/1", Bytes::from("1")).await.unwrap();
        backend.put("audio/b/2", Bytes::from("2")).await.unwrap();
        std::fs::write(dir.path().join("audio/a/1.tmp.leftover"), b"partial").unwrap();

        let mut keys = backend.list("audio").await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["audio/a/1".to_string(), "audio/b/2".to_string()]);
        assert!(backend.list("nothing-here").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_by_age_orders_oldest_first() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBackend::new(dir.path()).await.unwrap();

        backend.put("audio/old", Bytes::from("1")).await.unwrap();
        let old = std::fs::File::options()
            .write(true)
            .open(dir.path().join("audio/old"))
            .unwrap();
        old.set_modified(std::time::SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(1_000))
            .unwrap();
        backend.put("audio/new", Bytes::from("22")).await.unwrap();

        let listed = backend.list_by_age("audio").await.unwrap();
        let keys: Vec<_> = listed.iter().map(|l| l.key.as_str()).collect();
        assert_eq!(keys, vec!["audio/old", "audio/new"]);
        assert_eq!(listed[1].meta.size, 2);
    }

    #[tokio::test]
    async fn test_path_traversal_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBackend::new(dir.path()).await.unwrap();

        assert!(backend.exists("../escape").await.is_err());
        assert!(backend.exists("/absolute/path").await.is_err());
        assert!(backend.exists("foo/../../etc/passwd").await.is_err());
        assert!(backend.put("a.tmp.b", Bytes::from("x")).await.is_err());
        assert!(backend.exists("valid/nested/key").await.is_ok());
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn test_symlink_escape_rejected() {
        use std::os::unix::fs::symlink;

        let dir = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        std::fs::write(outside.path().join("secret.txt"), "secret").unwrap();

        let backend = FilesystemBackend::new(dir.path()).await.unwrap();
        symlink(outside.path(), dir.path().join("escape")).unwrap();

        match backend.get("escape/secret.txt").await {
            Err(StorageError::InvalidKey(msg)) => assert!(msg.contains("escapes storage root")),
            other => panic!("expected InvalidKey, got {other:?}"),
        }
        assert!(
            backend
                .put("escape/nested/file", Bytes::from("x"))
                .await
                .is_err()
        );
        assert!(!outside.path().join("nested").exists());
    }

    #[tokio::test]
    async fn test_health_check() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBackend::new(dir.path().join("store")).await.unwrap();
        backend.health_check().await.unwrap();
        assert_eq!(backend.backend_name(), "filesystem");
    }
}
