//! Cache manager: TTL and size-budget policy over a [`BlobStore`].
//!
//! The manager is the only writer of the cache index. Blobs are written under
//! fresh keys (`audio/{fingerprint}/{uuid}`), so an upsert never overwrites
//! bytes a reader might be streaming; the replaced blob is deleted afterwards.
//!
//! Entries leave the index atomically under the index lock. Their blobs are
//! then deleted outside the lock. A blob whose delete fails, or whose delete
//! was abandoned because the caller went away, stays in a pending-delete set,
//! invisible to lookups, and is retried by the next `store` or
//! `expire_older_than`.
//!
//! Last-access times live in the index and are written to an access journal
//! in the store, so least-recently-used order survives a restart.

use crate::error::{EngineError, EngineResult};
use crate::metrics::{
    CACHE_BYTES_EVICTED, CACHE_DELETE_FAILURES, CACHE_ENTRIES, CACHE_EVICTIONS, CACHE_EXPIRED,
    CACHE_LOOKUPS, CACHE_SIZE_BYTES,
};
use bytes::Bytes;
use narrator_core::config::CacheConfig;
use narrator_core::{Clock, Fingerprint};
use narrator_storage::BlobStore;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use time::OffsetDateTime;
use tracing::instrument;
use uuid::Uuid;

/// Key prefix of every cached audio blob.
pub const BLOB_PREFIX: &str = "audio/";

/// Key of the last-access journal. Kept outside [`BLOB_PREFIX`].
pub const ACCESS_JOURNAL_KEY: &str = "index/last-access.json";

/// One cached audio blob.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CacheEntry {
    pub fingerprint: Fingerprint,
    pub blob_ref: String,
    pub size_bytes: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub last_accessed_at: OffsetDateTime,
}

/// Result of [`CacheManager::store`].
#[derive(Clone, Debug)]
pub struct StoreOutcome {
    pub entry: CacheEntry,
    /// Fingerprints evicted to make room, least recently used first.
    pub evicted: Vec<Fingerprint>,
    pub bytes_evicted: u64,
    /// Blob deletes that failed and remain pending.
    pub delete_errors: Vec<String>,
}

/// Result of [`CacheManager::expire_older_than`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ExpireOutcome {
    /// Entries removed from the index because they outlived the TTL.
    pub removed: usize,
    /// Bytes of expired blobs actually deleted during this call, including
    /// expired blobs whose earlier delete had failed.
    pub bytes_freed: u64,
    /// Bytes of evicted or replaced blobs whose earlier delete is retried
    /// and succeeded during this call.
    pub stale_bytes_freed: u64,
    pub errors: Vec<String>,
}

/// Point-in-time view of the cache.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entry_count: usize,
    pub total_size_bytes: u64,
    pub max_size_bytes: u64,
    pub ttl_secs: u64,
    /// Blobs removed from the index whose delete has not succeeded yet.
    pub pending_delete_count: usize,
    pub pending_delete_bytes: u64,
}

/// Why a blob left the index.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum DeleteCause {
    Expired,
    Evicted,
    Replaced,
}

#[derive(Debug)]
struct PendingDelete {
    fingerprint: Fingerprint,
    size_bytes: u64,
    cause: DeleteCause,
    in_flight: bool,
}

/// A pending delete taken by one caller.
#[derive(Debug)]
struct Claim {
    key: String,
    size_bytes: u64,
    cause: DeleteCause,
}

#[derive(Debug, Default)]
struct DeleteReport {
    expired_bytes: u64,
    stale_bytes: u64,
    errors: Vec<String>,
}

#[derive(Debug, Default)]
struct CacheIndex {
    entries: HashMap<Fingerprint, CacheEntry>,
    live_bytes: u64,
    pending: HashMap<String, PendingDelete>,
    /// Bumped whenever an entry or its access time changes.
    version: u64,
}

impl CacheIndex {
    /// Upsert, returning the replaced entry.
    fn insert(&mut self, entry: CacheEntry) -> Option<CacheEntry> {
        self.live_bytes += entry.size_bytes;
        self.version += 1;
        let replaced = self.entries.insert(entry.fingerprint, entry);
        if let Some(old) = &replaced {
            self.live_bytes -= old.size_bytes;
        }
        replaced
    }

    fn remove(&mut self, fingerprint: &Fingerprint) -> Option<CacheEntry> {
        let entry = self.entries.remove(fingerprint)?;
        self.live_bytes -= entry.size_bytes;
        self.version += 1;
        Some(entry)
    }

    fn mark_for_delete(&mut self, entry: &CacheEntry, cause: DeleteCause) {
        self.pending.insert(
            entry.blob_ref.clone(),
            PendingDelete {
                fingerprint: entry.fingerprint,
                size_bytes: entry.size_bytes,
                cause,
                in_flight: false,
            },
        );
    }

    /// Evict least recently used entries until within `budget`, never touching `keep`.
    fn evict_to_budget(&mut self, budget: u64, keep: Option<&Fingerprint>) -> Vec<CacheEntry> {
        if self.live_bytes <= budget {
            return Vec::new();
        }
        let mut candidates: Vec<(OffsetDateTime, OffsetDateTime, Fingerprint)> = self
            .entries
            .values()
            .filter(|e| Some(&e.fingerprint) != keep)
            .map(|e| (e.last_accessed_at, e.created_at, e.fingerprint))
            .collect();
        candidates.sort();

        let mut evicted = Vec::new();
        for (_, _, fingerprint) in candidates {
            if self.live_bytes <= budget {
                break;
            }
            if let Some(entry) = self.remove(&fingerprint) {
                self.mark_for_delete(&entry, DeleteCause::Evicted);
                evicted.push(entry);
            }
        }
        evicted
    }

    /// Claim one pending delete unless another caller holds it.
    fn claim(&mut self, key: &str) -> Option<Claim> {
        let pending = self.pending.get_mut(key).filter(|p| !p.in_flight)?;
        pending.in_flight = true;
        Some(Claim {
            key: key.to_string(),
            size_bytes: pending.size_bytes,
            cause: pending.cause,
        })
    }

    /// Claim every pending delete not already being attempted by another caller.
    fn claim_pending(&mut self) -> Vec<Claim> {
        self.pending
            .iter_mut()
            .filter(|(_, p)| !p.in_flight)
            .map(|(key, p)| {
                p.in_flight = true;
                Claim {
                    key: key.clone(),
                    size_bytes: p.size_bytes,
                    cause: p.cause,
                }
            })
            .collect()
    }

    fn publish(&self) {
        CACHE_SIZE_BYTES.set(self.live_bytes as i64);
        CACHE_ENTRIES.set(self.entries.len() as i64);
    }
}

fn lock_index(index: &Mutex<CacheIndex>) -> MutexGuard<'_, CacheIndex> {
    index.lock().unwrap_or_else(|poisoned| {
        tracing::warn!("cache index lock poisoned, recovering");
        poisoned.into_inner()
    })
}

/// Claims a caller has taken but not settled.
///
/// Dropping it returns whatever is left to the pending set, so a delete
/// abandoned by a cancelled caller is picked up by the next sweep.
struct ClaimedDeletes<'a> {
    index: &'a Mutex<CacheIndex>,
    remaining: Vec<Claim>,
}

impl Drop for ClaimedDeletes<'_> {
    fn drop(&mut self) {
        if self.remaining.is_empty() {
            return;
        }
        let mut index = lock_index(self.index);
        for claim in self.remaining.drain(..) {
            if let Some(pending) = index.pending.get_mut(&claim.key) {
                pending.in_flight = false;
            }
        }
    }
}

/// Last-access times of entries read since they were stored.
#[derive(Debug, Default, Serialize, Deserialize)]
struct AccessJournal {
    /// Blob key to last access, in unix milliseconds.
    entries: HashMap<String, i64>,
}

#[derive(Debug, Default)]
struct JournalState {
    /// Index version last written.
    version: u64,
    exists: bool,
}

fn unix_millis(at: OffsetDateTime) -> i64 {
    (at.unix_timestamp_nanos() / 1_000_000) as i64
}

fn from_unix_millis(millis: i64) -> Option<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000).ok()
}

/// Build a fresh blob key for a fingerprint.
fn blob_key(fingerprint: &Fingerprint) -> String {
    format!("{BLOB_PREFIX}{}/{}", fingerprint.to_hex(), Uuid::new_v4())
}

/// Recover the fingerprint from a blob key written by [`blob_key`].
fn parse_blob_key(key: &str) -> Option<Fingerprint> {
    let rest = key.strip_prefix(BLOB_PREFIX)?;
    let (fingerprint, id) = rest.split_once('/')?;
    Uuid::parse_str(id).ok()?;
    Fingerprint::parse(fingerprint).ok()
}

fn to_time_duration(duration: std::time::Duration) -> time::Duration {
    time::Duration::try_from(duration).unwrap_or(time::Duration::MAX)
}

/// Owns the cache index and the TTL and size-budget policy.
pub struct CacheManager {
    store: Arc<dyn BlobStore>,
    clock: Arc<dyn Clock>,
    max_size_bytes: u64,
    ttl: std::time::Duration,
    index: Mutex<CacheIndex>,
    journal: tokio::sync::Mutex<JournalState>,
}

impl std::fmt::Debug for CacheManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheManager")
            .field("backend", &self.store.backend_name())
            .field("max_size_bytes", &self.max_size_bytes)
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl CacheManager {
    /// Create a manager with an empty index.
    pub fn new(store: Arc<dyn BlobStore>, config: &CacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            max_size_bytes: config.max_size_bytes,
            ttl: config.ttl(),
            index: Mutex::new(CacheIndex::default()),
            journal: tokio::sync::Mutex::new(JournalState::default()),
        }
    }

    /// Create a manager and rebuild its index from blobs already in the store.
    ///
    /// Entry ages come from blob modification times and access times from
    /// the access journal, falling back to the age. When several blobs exist
    /// for one fingerprint the newest wins and the rest are deleted. The size
    /// budget is enforced before returning.
    pub async fn open(
        store: Arc<dyn BlobStore>,
        config: &CacheConfig,
        clock: Arc<dyn Clock>,
    ) -> EngineResult<Self> {
        let manager = Self::new(store, config, clock);
        let journal = manager.read_journal().await;
        let listings = manager.store.list_by_age(BLOB_PREFIX).await?;
        let now = manager.clock.now();

        let (claims, evicted) = {
            let mut index = manager.lock();
            let mut skipped = 0usize;
            for listing in listings {
                let Some(fingerprint) = parse_blob_key(&listing.key) else {
                    skipped += 1;
                    continue;
                };
                let created_at = listing.meta.last_modified.unwrap_or(now);
                let last_accessed_at = journal
                    .as_ref()
                    .and_then(|j| j.entries.get(&listing.key))
                    .and_then(|millis| from_unix_millis(*millis))
                    .map_or(created_at, |at| at.max(created_at));
                let entry = CacheEntry {
                    fingerprint,
                    blob_ref: listing.key,
                    size_bytes: listing.meta.size,
                    created_at,
                    last_accessed_at,
                };
                // Listings are oldest first, so a replaced entry is the stale one.
                if let Some(old) = index.insert(entry) {
                    index.mark_for_delete(&old, DeleteCause::Replaced);
                }
            }
            if skipped > 0 {
                tracing::warn!(skipped, "ignored unrecognised keys under cache prefix");
            }
            let evicted = index.evict_to_budget(manager.max_size_bytes, None);
            index.publish();
            (index.claim_pending(), evicted)
        };
        manager.journal.lock().await.exists = journal.is_some();

        let report = manager.delete_claimed(claims).await;
        let stats = manager.stats();
        tracing::info!(
            entries = stats.entry_count,
            bytes = stats.total_size_bytes,
            evicted = evicted.len(),
            delete_errors = report.errors.len(),
            "cache index recovered"
        );
        Ok(manager)
    }

    fn lock(&self) -> MutexGuard<'_, CacheIndex> {
        lock_index(&self.index)
    }

    fn is_fresh(&self, entry: &CacheEntry, now: OffsetDateTime) -> bool {
        now - entry.created_at < to_time_duration(self.ttl)
    }

    /// Look up a fresh entry, refreshing its access time.
    ///
    /// An expired entry is removed and reported as a miss. Only that entry's
    /// blob is deleted here; failing to delete it leaves it pending and never
    /// turns the miss into an error.
    pub async fn lookup(&self, fingerprint: &Fingerprint) -> Option<CacheEntry> {
        let now = self.clock.now();
        let claims = {
            let mut index = self.lock();
            match index.entries.get_mut(fingerprint) {
                None => {
                    CACHE_LOOKUPS.with_label_values(&["miss"]).inc();
                    return None;
                }
                Some(entry) if self.is_fresh(entry, now) => {
                    entry.last_accessed_at = now;
                    let hit = entry.clone();
                    index.version += 1;
                    CACHE_LOOKUPS.with_label_values(&["hit"]).inc();
                    return Some(hit);
                }
                Some(_) => {}
            }
            CACHE_LOOKUPS.with_label_values(&["expired"]).inc();
            let mut claims = Vec::new();
            if let Some(entry) = index.remove(fingerprint) {
                index.mark_for_delete(&entry, DeleteCause::Expired);
                CACHE_EXPIRED.inc();
                claims.extend(index.claim(&entry.blob_ref));
            }
            index.publish();
            claims
        };

        let report = self.delete_claimed(claims).await;
        if !report.errors.is_empty() {
            tracing::warn!(
                fingerprint = %fingerprint,
                errors = report.errors.len(),
                "lazy expiry left blob pending delete"
            );
        }
        None
    }

    /// Store audio for `fingerprint`, replacing any previous entry, then evict
    /// least recently used entries until the cache fits its budget.
    ///
    /// Fails with [`EngineError::EntryTooLarge`] when the blob alone exceeds
    /// the budget and with [`EngineError::Storage`] when the write fails.
    /// Failed eviction deletes do not fail the store; they are reported in
    /// the outcome and retried later.
    #[instrument(skip(self, audio), fields(fingerprint = %fingerprint, size = audio.len()))]
    pub async fn store(&self, fingerprint: Fingerprint, audio: Bytes) -> EngineResult<StoreOutcome> {
        let size_bytes = audio.len() as u64;
        if size_bytes > self.max_size_bytes {
            return Err(EngineError::EntryTooLarge {
                size: size_bytes,
                budget: self.max_size_bytes,
            });
        }

        let blob_ref = blob_key(&fingerprint);
        self.store.put(&blob_ref, audio).await?;

        let now = self.clock.now();
        let entry = CacheEntry {
            fingerprint,
            blob_ref,
            size_bytes,
            created_at: now,
            last_accessed_at: now,
        };

        let (evicted, claims) = {
            let mut index = self.lock();
            if let Some(old) = index.insert(entry.clone()) {
                index.mark_for_delete(&old, DeleteCause::Replaced);
            }
            let evicted = index.evict_to_budget(self.max_size_bytes, Some(&fingerprint));
            index.publish();
            (evicted, index.claim_pending())
        };

        let bytes_evicted: u64 = evicted.iter().map(|e| e.size_bytes).sum();
        if !evicted.is_empty() {
            CACHE_EVICTIONS.inc_by(evicted.len() as u64);
            CACHE_BYTES_EVICTED.inc_by(bytes_evicted);
            tracing::info!(
                evicted = evicted.len(),
                bytes_evicted,
                "evicted least recently used entries"
            );
        }

        let report = self.delete_claimed(claims).await;
        if let Err(e) = self.persist_access_times().await {
            tracing::warn!(error = %e, "failed to write access journal");
        }
        Ok(StoreOutcome {
            entry,
            evicted: evicted.into_iter().map(|e| e.fingerprint).collect(),
            bytes_evicted,
            delete_errors: report.errors,
        })
    }

    /// Remove every entry older than `ttl` and retry pending deletes.
    ///
    /// Idempotent: a second call right after the first removes nothing.
    #[instrument(skip(self))]
    pub async fn expire_older_than(&self, ttl: std::time::Duration) -> ExpireOutcome {
        let now = self.clock.now();
        let ttl = to_time_duration(ttl);

        let (removed, claims) = {
            let mut index = self.lock();
            let expired: Vec<Fingerprint> = index
                .entries
                .values()
                .filter(|e| now - e.created_at > ttl)
                .map(|e| e.fingerprint)
                .collect();
            for fingerprint in &expired {
                if let Some(entry) = index.remove(fingerprint) {
                    index.mark_for_delete(&entry, DeleteCause::Expired);
                }
            }
            index.publish();
            (expired.len(), index.claim_pending())
        };

        CACHE_EXPIRED.inc_by(removed as u64);
        let mut report = self.delete_claimed(claims).await;
        if let Err(e) = self.persist_access_times().await {
            report.errors.push(format!("{ACCESS_JOURNAL_KEY}: {e}"));
        }
        if removed > 0 || report.expired_bytes > 0 || report.stale_bytes > 0 {
            tracing::info!(
                removed,
                bytes_freed = report.expired_bytes,
                stale_bytes_freed = report.stale_bytes,
                "expired cache entries"
            );
        }
        ExpireOutcome {
            removed,
            bytes_freed: report.expired_bytes,
            stale_bytes_freed: report.stale_bytes,
            errors: report.errors,
        }
    }

    /// Delete claimed blobs one at a time.
    ///
    /// A blob that is already gone counts as deleted. If this future is
    /// dropped, unsettled claims go back to the pending set.
    async fn delete_claimed(&self, claims: Vec<Claim>) -> DeleteReport {
        let mut report = DeleteReport::default();
        let mut claims = ClaimedDeletes {
            index: &self.index,
            remaining: claims,
        };

        while let Some(next) = claims.remaining.last() {
            let result = self.store.delete(&next.key).await;
            let Some(claim) = claims.remaining.pop() else {
                break;
            };
            let deleted = match result {
                Ok(()) => true,
                Err(e) if e.is_not_found() => {
                    tracing::debug!(key = %claim.key, "blob already gone");
                    true
                }
                Err(e) => {
                    CACHE_DELETE_FAILURES.inc();
                    tracing::warn!(key = %claim.key, error = %e, "blob delete failed, will retry");
                    report.errors.push(format!("{}: {e}", claim.key));
                    false
                }
            };

            let mut index = self.lock();
            if deleted {
                index.pending.remove(&claim.key);
                match claim.cause {
                    DeleteCause::Expired => report.expired_bytes += claim.size_bytes,
                    DeleteCause::Evicted | DeleteCause::Replaced => {
                        report.stale_bytes += claim.size_bytes
                    }
                }
            } else if let Some(pending) = index.pending.get_mut(&claim.key) {
                pending.in_flight = false;
            }
        }
        report
    }

    /// Read the access journal. A missing or unreadable journal yields `None`.
    async fn read_journal(&self) -> Option<AccessJournal> {
        let bytes = match self.store.get(ACCESS_JOURNAL_KEY).await {
            Ok(bytes) => bytes,
            Err(e) if e.is_not_found() => return None,
            Err(e) => {
                tracing::warn!(error = %e, "failed to read access journal, using blob ages");
                return None;
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(journal) => Some(journal),
            Err(e) => {
                tracing::warn!(error = %e, "corrupt access journal, using blob ages");
                None
            }
        }
    }

    /// Write last-access times to the access journal.
    ///
    /// Only entries read since they were stored are recorded. Returns false
    /// without touching the store when nothing changed since the last write,
    /// or when there is nothing to record and no journal exists yet.
    pub async fn persist_access_times(&self) -> EngineResult<bool> {
        let mut state = self.journal.lock().await;
        let (version, journal) = {
            let index = self.lock();
            if index.version == state.version {
                return Ok(false);
            }
            let entries = index
                .entries
                .values()
                .filter(|e| e.last_accessed_at > e.created_at)
                .map(|e| (e.blob_ref.clone(), unix_millis(e.last_accessed_at)))
                .collect();
            (index.version, AccessJournal { entries })
        };
        if journal.entries.is_empty() && !state.exists {
            state.version = version;
            return Ok(false);
        }

        let body = serde_json::to_vec(&journal)?;
        self.store.put(ACCESS_JOURNAL_KEY, Bytes::from(body)).await?;
        state.version = version;
        state.exists = true;
        tracing::debug!(entries = journal.entries.len(), "access journal written");
        Ok(true)
    }

    /// Fetch the blob of a fresh entry.
    ///
    /// Fails with [`EngineError::NotFound`] on a miss. If the index points at
    /// a blob the store no longer has, the entry is dropped.
    pub async fn fetch(&self, fingerprint: &Fingerprint) -> EngineResult<(CacheEntry, Bytes)> {
        let entry = self
            .lookup(fingerprint)
            .await
            .ok_or_else(|| EngineError::NotFound(format!("no cached audio for {fingerprint}")))?;

        match self.store.get(&entry.blob_ref).await {
            Ok(bytes) => Ok((entry, bytes)),
            Err(e) if e.is_not_found() => {
                tracing::warn!(
                    fingerprint = %fingerprint,
                    blob_ref = %entry.blob_ref,
                    "indexed blob missing from store, dropping entry"
                );
                self.forget(&entry);
                Err(EngineError::NotFound(format!(
                    "no cached audio for {fingerprint}"
                )))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn forget(&self, entry: &CacheEntry) {
        let mut index = self.lock();
        if index
            .entries
            .get(&entry.fingerprint)
            .is_some_and(|current| current.blob_ref == entry.blob_ref)
        {
            index.remove(&entry.fingerprint);
            index.publish();
        }
    }

    /// Current index statistics. Does not touch the store.
    pub fn stats(&self) -> CacheStats {
        let index = self.lock();
        CacheStats {
            entry_count: index.entries.len(),
            total_size_bytes: index.live_bytes,
            max_size_bytes: self.max_size_bytes,
            ttl_secs: self.ttl.as_secs(),
            pending_delete_count: index.pending.len(),
            pending_delete_bytes: index.pending.values().map(|p| p.size_bytes).sum(),
        }
    }

    /// Configured time-to-live.
    pub fn ttl(&self) -> std::time::Duration {
        self.ttl
    }

    /// Whether `fingerprint` has a fresh entry, without refreshing its access time.
    pub fn contains(&self, fingerprint: &Fingerprint) -> bool {
        let now = self.clock.now();
        self.lock()
            .entries
            .get(fingerprint)
            .is_some_and(|e| self.is_fresh(e, now))
    }

    /// Fingerprints of blobs awaiting a delete retry.
    pub fn pending_deletes(&self) -> Vec<Fingerprint> {
        self.lock().pending.values().map(|p| p.fingerprint).collect()
    }
}
