mod common;

use async_trait::async_trait;
use bytes::Bytes;
use common::{Engine, GatedProvider, ScriptedProvider, cache_config, queue_settings, wait_until};
use narrator_core::{Fingerprint, GenerationStatus, Intensity, Priority, VoiceStyle};
use narrator_storage::{BlobMeta, BlobStore, MemoryBackend, StorageError, StorageResult};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Semaphore;

const WAIT: Duration = Duration::from_secs(5);

fn fingerprint(text: &str) -> Fingerprint {
    Fingerprint::derive(text, VoiceStyle::PossessedChild, Intensity::default())
}

/// Memory store whose deletes fail while `broken` is set.
struct BrokenDeletes {
    inner: MemoryBackend,
    broken: AtomicBool,
}

#[async_trait]
impl BlobStore for BrokenDeletes {
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        self.inner.exists(key).await
    }
    async fn head(&self, key: &str) -> StorageResult<BlobMeta> {
        self.inner.head(key).await
    }
    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        self.inner.get(key).await
    }
    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()> {
        self.inner.put(key, data).await
    }
    async fn delete(&self, key: &str) -> StorageResult<()> {
        if self.broken.load(Ordering::SeqCst) {
            return Err(StorageError::Io(std::io::Error::other("read-only filesystem")));
        }
        self.inner.delete(key).await
    }
    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        self.inner.list(prefix).await
    }
    fn backend_name(&self) -> &'static str {
        "broken-deletes"
    }
}

/// Memory store whose deletes block until released.
struct GatedDeletes {
    inner: MemoryBackend,
    gate: Semaphore,
    started: AtomicUsize,
}

impl GatedDeletes {
    fn new() -> Self {
        Self {
            inner: MemoryBackend::new(),
            gate: Semaphore::new(0),
            started: AtomicUsize::new(0),
        }
    }

    fn deletes_started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    fn release(&self) {
        self.gate.add_permits(1);
    }
}

#[async_trait]
impl BlobStore for GatedDeletes {
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        self.inner.exists(key).await
    }
    async fn head(&self, key: &str) -> StorageResult<BlobMeta> {
        self.inner.head(key).await
    }
    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        self.inner.get(key).await
    }
    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()> {
        self.inner.put(key, data).await
    }
    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.started.fetch_add(1, Ordering::SeqCst);
        let _permit = self
            .gate
            .acquire()
            .await
            .map_err(|_| StorageError::Backend("gate closed".into()))?;
        self.inner.delete(key).await
    }
    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        self.inner.list(prefix).await
    }
    fn backend_name(&self) -> &'static str {
        "gated-deletes"
    }
}

#[tokio::test]
async fn test_run_once_expires_eight_day_old_entry() {
    let engine = Engine::new(ScriptedProvider::succeeding(), queue_settings(3));
    engine
        .cache
        .store(fingerprint("old"), Bytes::from(vec![0u8; 4096]))
        .await
        .unwrap();
    engine.clock.advance(time::Duration::days(6));
    engine
        .cache
        .store(fingerprint("recent"), Bytes::from(vec![0u8; 100]))
        .await
        .unwrap();
    engine.clock.advance(time::Duration::days(2));

    let run = engine.cleanup.run_once().await;
    assert_eq!(run.expired_entries, 1);
    assert_eq!(run.bytes_freed, 4096);
    assert!(!run.has_errors());
    assert!(run.finished_at >= run.started_at);

    let stats = engine.cleanup.stats();
    assert_eq!(stats.cache.entry_count, 1);
    assert_eq!(stats.cache.total_size_bytes, 100);

    let again = engine.cleanup.run_once().await;
    assert_eq!(again.expired_entries, 0);
    assert_eq!(again.bytes_freed, 0);
}

#[tokio::test]
async fn test_run_once_cancels_abandoned_generation() {
    let provider = GatedProvider::new();
    let engine = Engine::new(provider.clone(), queue_settings(1));
    let stuck = engine
        .queue
        .submit(
            "never finishes",
            VoiceStyle::AncientEntity,
            Intensity::default(),
            Priority::Normal,
        )
        .await
        .unwrap()
        .request_id;
    let waiting = engine
        .queue
        .submit(
            "also old",
            VoiceStyle::AncientEntity,
            Intensity::default(),
            Priority::Normal,
        )
        .await
        .unwrap()
        .request_id;
    wait_until(WAIT, || provider.started_count() == 1).await;

    // Not yet abandoned.
    engine.clock.advance(time::Duration::minutes(30));
    assert_eq!(engine.cleanup.run_once().await.abandoned_cancelled, 0);
    let before = engine.cleanup.stats().queue.by_status["cancelled"];

    engine.clock.advance(time::Duration::minutes(31));
    let run = engine.cleanup.run_once().await;
    assert_eq!(run.abandoned_cancelled, 2);

    let stats = engine.cleanup.stats();
    assert_eq!(stats.queue.by_status["cancelled"], before + 2);
    assert_eq!(stats.queue.queued, 0);
    assert_eq!(
        engine.queue.status(&stuck).unwrap().status,
        GenerationStatus::Cancelled
    );
    assert_eq!(
        engine.queue.status(&waiting).unwrap().status,
        GenerationStatus::Cancelled
    );
    wait_until(WAIT, || engine.queue.stats().active == 0).await;
}

#[tokio::test]
async fn test_cache_errors_do_not_stop_request_sweep() {
    let store = Arc::new(BrokenDeletes {
        inner: MemoryBackend::new(),
        broken: AtomicBool::new(true),
    });
    let provider = GatedProvider::new();
    let engine = Engine::with_store(store.clone(), cache_config(), provider.clone(), queue_settings(3));

    engine
        .cache
        .store(fingerprint("stale"), Bytes::from(vec![1u8; 256]))
        .await
        .unwrap();
    engine
        .queue
        .submit(
            "stuck",
            VoiceStyle::GhostlyWhisper,
            Intensity::default(),
            Priority::Normal,
        )
        .await
        .unwrap();
    engine.clock.advance(time::Duration::days(8));

    let run = engine.cleanup.run_once().await;
    assert_eq!(run.expired_entries, 1);
    assert_eq!(run.bytes_freed, 0);
    assert_eq!(run.cache_errors.len(), 1);
    assert!(run.cache_errors[0].contains("read-only filesystem"));
    assert_eq!(run.abandoned_cancelled, 1);
    assert!(run.queue_errors.is_empty());
    assert_eq!(engine.cleanup.stats().cache.pending_delete_count, 1);

    store.broken.store(false, Ordering::SeqCst);
    let retry = engine.cleanup.run_once().await;
    assert_eq!(retry.expired_entries, 0);
    assert_eq!(retry.bytes_freed, 256);
    assert!(!retry.has_errors());
    assert!(store.inner.is_empty());
}

#[tokio::test]
async fn test_stats_do_not_trigger_a_run() {
    let engine = Engine::new(ScriptedProvider::succeeding(), queue_settings(3));
    let stats = engine.cleanup.stats();
    assert!(!stats.running);
    assert_eq!(stats.interval_secs, None);
    assert_eq!(stats.runs_completed, 0);
    assert!(stats.last_run.is_none());
    assert_eq!(stats.ttl_secs, 7 * 24 * 3600);
    assert_eq!(stats.abandoned_timeout_secs, 3600);
    assert_eq!(engine.cleanup.stats().runs_completed, 0);

    let json = serde_json::to_value(&stats).unwrap();
    assert_eq!(json["running"], false);
    assert_eq!(json["queue"]["by_status"]["queued"], 0);
    assert_eq!(json["cache"]["max_size_bytes"], 1024 * 1024);
}

#[tokio::test(start_paused = true)]
async fn test_schedule_runs_immediately_then_every_interval() {
    let engine = Engine::new(ScriptedProvider::succeeding(), queue_settings(3));
    let cleanup = &engine.cleanup;
    let hour = Duration::from_secs(3600);

    assert!(cleanup.start(hour));
    assert!(!cleanup.start(hour));
    assert!(cleanup.is_running());

    wait_until(WAIT, || cleanup.stats().runs_completed == 1).await;
    let stats = cleanup.stats();
    assert!(stats.running);
    assert_eq!(stats.interval_secs, Some(3600));
    assert!(stats.last_run.is_some());

    tokio::time::sleep(hour).await;
    wait_until(WAIT, || cleanup.stats().runs_completed == 2).await;

    assert!(cleanup.stop().await);
    assert!(!cleanup.is_running());
    let runs = cleanup.stats().runs_completed;

    tokio::time::sleep(hour * 5).await;
    assert_eq!(cleanup.stats().runs_completed, runs);
    assert!(!cleanup.stop().await);

    // A stopped service can be started again.
    assert!(cleanup.start(hour));
    assert!(cleanup.stop().await);
}

#[tokio::test]
async fn test_stop_waits_for_run_in_progress_and_manual_run_queues_behind_it() {
    let store = Arc::new(GatedDeletes::new());
    let engine = Engine::with_store(
        store.clone(),
        cache_config(),
        ScriptedProvider::succeeding(),
        queue_settings(3),
    );
    engine
        .cache
        .store(fingerprint("old"), Bytes::from(vec![0u8; 128]))
        .await
        .unwrap();
    engine.clock.advance(time::Duration::days(8));

    let cleanup = engine.cleanup.clone();
    assert!(cleanup.start(Duration::from_secs(3600)));
    // The first scheduled run starts at once and blocks deleting the blob.
    wait_until(WAIT, || store.deletes_started() == 1).await;

    let stopping = {
        let cleanup = cleanup.clone();
        tokio::spawn(async move { cleanup.stop().await })
    };
    let manual = {
        let cleanup = cleanup.clone();
        tokio::spawn(async move { cleanup.run_once().await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!stopping.is_finished());
    assert!(!manual.is_finished());
    assert_eq!(cleanup.stats().runs_completed, 0);
    // The manual run has not reached the cache while the scheduled one holds the run lock.
    assert_eq!(store.deletes_started(), 1);

    store.release();
    assert!(stopping.await.unwrap());
    let manual_run = manual.await.unwrap();
    assert_eq!(manual_run.expired_entries, 0);
    assert_eq!(manual_run.bytes_freed, 0);

    let stats = cleanup.stats();
    assert!(!stats.running);
    assert_eq!(stats.runs_completed, 2);
    assert_eq!(stats.cache.entry_count, 0);
    assert!(store.inner.is_empty());
}

#[tokio::test]
async fn test_stale_blob_bytes_reported_apart_from_expiry() {
    let store = Arc::new(BrokenDeletes {
        inner: MemoryBackend::new(),
        broken: AtomicBool::new(true),
    });
    let engine = Engine::with_store(
        store.clone(),
        cache_config(),
        ScriptedProvider::succeeding(),
        queue_settings(3),
    );
    let fp = fingerprint("revised");
    engine.cache.store(fp, Bytes::from(vec![0u8; 300])).await.unwrap();
    let replaced = engine.cache.store(fp, Bytes::from(vec![0u8; 200])).await.unwrap();
    assert_eq!(replaced.delete_errors.len(), 1);
    store.broken.store(false, Ordering::SeqCst);

    let run = engine.cleanup.run_once().await;
    assert_eq!(run.expired_entries, 0);
    assert_eq!(run.bytes_freed, 0);
    assert_eq!(run.stale_bytes_freed, 300);
    assert!(!run.has_errors());
    assert_eq!(store.inner.len(), 1);
}
