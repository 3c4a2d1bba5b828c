//! Cleanup service: periodic cache expiry and abandoned-request sweep.
//!
//! The service owns no data. Each run calls the cache manager and the queue
//! and reports what they did. Runs never overlap: a scheduled run and a
//! manual trigger serialize on a run lock, and `stop` waits for any run in
//! progress before returning.

use crate::cache::{CacheManager, CacheStats};
use crate::metrics::{CLEANUP_ABANDONED_CANCELLED, CLEANUP_DURATION, CLEANUP_RUNS};
use crate::queue::{GenerationQueue, QueueStats};
use narrator_core::Clock;
use narrator_core::config::AppConfig;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use time::OffsetDateTime;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Cleanup tuning, usually built from [`AppConfig`].
#[derive(Clone, Debug)]
pub struct CleanupSettings {
    /// Maximum cache entry age.
    pub ttl: Duration,
    /// Age after which a queued or generating request is cancelled.
    pub abandoned_timeout: Duration,
    /// Default interval for [`CleanupService::start`].
    pub interval: Duration,
}

impl CleanupSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            ttl: config.cache.ttl(),
            abandoned_timeout: config.cleanup.abandoned_timeout(),
            interval: config.cleanup.interval(),
        }
    }
}

/// Report of one cleanup run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CleanupRun {
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub finished_at: OffsetDateTime,
    pub expired_entries: usize,
    /// Bytes of expired audio deleted.
    pub bytes_freed: u64,
    /// Bytes of earlier evicted or replaced audio whose delete was retried.
    pub stale_bytes_freed: u64,
    pub abandoned_cancelled: usize,
    /// Terminal requests dropped after their retention window.
    pub records_reaped: usize,
    pub cache_errors: Vec<String>,
    pub queue_errors: Vec<String>,
}

impl CleanupRun {
    pub fn has_errors(&self) -> bool {
        !self.cache_errors.is_empty() || !self.queue_errors.is_empty()
    }
}

/// Snapshot for monitoring. Reading it never triggers a run.
#[derive(Clone, Debug, Serialize)]
pub struct CleanupStats {
    pub running: bool,
    pub interval_secs: Option<u64>,
    pub ttl_secs: u64,
    pub abandoned_timeout_secs: u64,
    /// Runs completed since the service was created.
    pub runs_completed: u64,
    pub last_run: Option<CleanupRun>,
    pub cache: CacheStats,
    pub queue: QueueStats,
}

struct Schedule {
    token: CancellationToken,
    handle: JoinHandle<()>,
    interval: Duration,
}

struct CleanupInner {
    cache: Arc<CacheManager>,
    queue: GenerationQueue,
    clock: Arc<dyn Clock>,
    settings: CleanupSettings,
    run_lock: tokio::sync::Mutex<()>,
    schedule: Mutex<Option<Schedule>>,
    last_run: Mutex<Option<CleanupRun>>,
    runs_completed: AtomicU64,
}

/// Recurring janitor over the cache and the queue.
#[derive(Clone)]
pub struct CleanupService {
    inner: Arc<CleanupInner>,
}

impl CleanupService {
    pub fn new(
        cache: Arc<CacheManager>,
        queue: GenerationQueue,
        clock: Arc<dyn Clock>,
        settings: CleanupSettings,
    ) -> Self {
        Self {
            inner: Arc::new(CleanupInner {
                cache,
                queue,
                clock,
                settings,
                run_lock: tokio::sync::Mutex::new(()),
                schedule: Mutex::new(None),
                last_run: Mutex::new(None),
                runs_completed: AtomicU64::new(0),
            }),
        }
    }

    fn schedule(&self) -> MutexGuard<'_, Option<Schedule>> {
        self.inner.schedule.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("cleanup schedule lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn last_run(&self) -> MutexGuard<'_, Option<CleanupRun>> {
        self.inner.last_run.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("cleanup report lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    pub fn settings(&self) -> &CleanupSettings {
        &self.inner.settings
    }

    /// Run one cleanup pass.
    ///
    /// Cache expiry and the abandoned-request sweep both run even if the
    /// other reports errors; their errors are recorded separately.
    pub async fn run_once(&self) -> CleanupRun {
        let _running = self.inner.run_lock.lock().await;
        let timer = std::time::Instant::now();
        let started_at = self.inner.clock.now();

        let expired = self.inner.cache.expire_older_than(self.inner.settings.ttl).await;
        let abandoned = self
            .inner
            .queue
            .cancel_abandoned(self.inner.settings.abandoned_timeout);
        let records_reaped = self.inner.queue.reap_terminal();

        let run = CleanupRun {
            started_at,
            finished_at: self.inner.clock.now(),
            expired_entries: expired.removed,
            bytes_freed: expired.bytes_freed,
            stale_bytes_freed: expired.stale_bytes_freed,
            abandoned_cancelled: abandoned.cancelled.len(),
            records_reaped,
            cache_errors: expired.errors,
            queue_errors: abandoned.errors,
        };

        CLEANUP_RUNS.inc();
        CLEANUP_ABANDONED_CANCELLED.inc_by(run.abandoned_cancelled as u64);
        CLEANUP_DURATION.observe(timer.elapsed().as_secs_f64());
        if run.has_errors() {
            tracing::warn!(
                expired = run.expired_entries,
                bytes_freed = run.bytes_freed,
                abandoned = run.abandoned_cancelled,
                cache_errors = run.cache_errors.len(),
                queue_errors = run.queue_errors.len(),
                "cleanup run finished with errors"
            );
        } else {
            tracing::info!(
                expired = run.expired_entries,
                bytes_freed = run.bytes_freed,
                stale_bytes_freed = run.stale_bytes_freed,
                abandoned = run.abandoned_cancelled,
                reaped = run.records_reaped,
                "cleanup run finished"
            );
        }

        *self.last_run() = Some(run.clone());
        self.inner.runs_completed.fetch_add(1, Ordering::SeqCst);
        run
    }

    /// Start running cleanup every `interval`, beginning immediately.
    ///
    /// Returns false and changes nothing if a schedule is already running.
    pub fn start(&self, interval: Duration) -> bool {
        let mut schedule = self.schedule();
        if schedule.is_some() {
            tracing::warn!("cleanup schedule already running");
            return false;
        }
        let interval = interval.max(Duration::from_secs(1));

        let token = CancellationToken::new();
        let service = self.clone();
        let loop_token = token.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    biased;
                    _ = loop_token.cancelled() => break,
                    _ = ticker.tick() => {
                        // Runs to completion even if stop is requested meanwhile.
                        service.run_once().await;
                    }
                }
            }
            tracing::debug!("cleanup schedule loop exited");
        });

        tracing::info!(interval_secs = interval.as_secs(), "cleanup schedule started");
        *schedule = Some(Schedule {
            token,
            handle,
            interval,
        });
        true
    }

    /// Start with the configured interval.
    pub fn start_default(&self) -> bool {
        self.start(self.inner.settings.interval)
    }

    /// Stop the schedule and wait for any run in progress to finish.
    ///
    /// Returns false if no schedule was running.
    pub async fn stop(&self) -> bool {
        let Some(schedule) = self.schedule().take() else {
            return false;
        };
        schedule.token.cancel();
        if let Err(e) = schedule.handle.await {
            tracing::error!(error = %e, "cleanup schedule task failed");
        }
        // A manual run may still be in progress.
        drop(self.inner.run_lock.lock().await);
        tracing::info!("cleanup schedule stopped");
        true
    }

    pub fn is_running(&self) -> bool {
        self.schedule().is_some()
    }

    /// Current state of the service, the cache and the queue.
    pub fn stats(&self) -> CleanupStats {
        let interval_secs = self.schedule().as_ref().map(|s| s.interval.as_secs());
        CleanupStats {
            running: interval_secs.is_some(),
            interval_secs,
            ttl_secs: self.inner.settings.ttl.as_secs(),
            abandoned_timeout_secs: self.inner.settings.abandoned_timeout.as_secs(),
            runs_completed: self.inner.runs_completed.load(Ordering::SeqCst),
            last_run: self.last_run().clone(),
            cache: self.inner.cache.stats(),
            queue: self.inner.queue.stats(),
        }
    }
}
