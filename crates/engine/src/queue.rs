//! Generation queue: admission, the concurrency-capped worker pool,
//! per-request status and cancellation.
//!
//! All request state lives in one table behind a std mutex that is never
//! held across an await. Workers are plain tokio tasks; each is paired with
//! a monitor task on a [`TaskTracker`] that frees the slot when the worker
//! exits, including when it panics.

use crate::cache::CacheManager;
use crate::error::{EngineError, EngineResult};
use crate::metrics::{
    GENERATION_DURATION, GENERATIONS_FINISHED, PROVIDER_ATTEMPTS, QUEUE_GENERATING,
    QUEUE_WAITING, RETRY_DELAY, WORKERS_PANICKED,
};
use crate::retry::RetryPolicy;
use narrator_core::config::AppConfig;
use narrator_core::request::PROGRESS_AUDIO_RECEIVED;
use narrator_core::{
    AudioRef, Clock, FailureSummary, Fingerprint, GenerationRequest, GenerationStatus, Intensity,
    Priority, RequestId, VoiceStyle,
};
use narrator_provider::{ProviderError, SpeechProvider, Synthesis, SynthesisRequest};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::instrument;

/// Seconds a single generation is assumed to take, for wait estimates.
const ESTIMATED_SECS_PER_REQUEST: u64 = 10;

/// Queue tuning, usually built from [`AppConfig`].
#[derive(Clone, Debug)]
pub struct QueueSettings {
    pub max_concurrent: usize,
    /// How long terminal requests stay pollable.
    pub retention: Duration,
    /// Upper bound on a single provider call.
    pub call_timeout: Duration,
    /// Longest accepted content, in characters.
    pub max_content_length: usize,
    pub retry: RetryPolicy,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

impl QueueSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            max_concurrent: config.queue.max_concurrent.max(1),
            retention: config.queue.retention(),
            call_timeout: config.provider.timeout(),
            max_content_length: config.server.max_content_length,
            retry: RetryPolicy::from_config(&config.retry),
        }
    }
}

/// Returned by [`GenerationQueue::submit`].
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SubmitReceipt {
    pub request_id: RequestId,
    pub status: GenerationStatus,
    /// Present only while the request waits for a slot.
    pub queue_position: Option<usize>,
    /// Rough seconds until audio is ready; absent for cache hits.
    pub estimated_wait_secs: Option<u64>,
}

/// Result of [`GenerationQueue::cancel_abandoned`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct AbandonOutcome {
    pub cancelled: Vec<RequestId>,
    pub errors: Vec<String>,
}

/// Point-in-time view of the request table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub total: usize,
    /// Count per status; every status is present, possibly with zero.
    pub by_status: BTreeMap<String, usize>,
    /// Requests holding a worker slot.
    pub active: usize,
    /// Requests waiting for a worker slot.
    pub queued: usize,
    pub max_concurrent: usize,
}

struct Tracked {
    record: GenerationRequest,
    /// Source text, held only until a worker picks the request up.
    content: Option<String>,
    cancel: CancellationToken,
    wait_key: Option<(Priority, u64)>,
}

#[derive(Default)]
struct QueueState {
    requests: HashMap<RequestId, Tracked>,
    /// Waiting requests in dispatch order: priority, then submission sequence.
    waiting: BTreeMap<(Priority, u64), RequestId>,
    generating: usize,
    next_seq: u64,
    closed: bool,
}

impl QueueState {
    fn publish(&self) {
        QUEUE_GENERATING.set(self.generating as i64);
        QUEUE_WAITING.set(self.waiting.len() as i64);
    }

    fn position_of(&self, key: &(Priority, u64)) -> usize {
        self.waiting.range(..*key).count()
    }

    fn snapshot(&self, id: &RequestId) -> Option<GenerationRequest> {
        let tracked = self.requests.get(id)?;
        let mut record = tracked.record.clone();
        record.queue_position = tracked.wait_key.as_ref().map(|key| self.position_of(key));
        Some(record)
    }

    /// Cancel one request. Returns whether its status changed.
    fn cancel(&mut self, id: &RequestId, now: time::OffsetDateTime) -> EngineResult<bool> {
        let tracked = self
            .requests
            .get_mut(id)
            .ok_or_else(|| EngineError::NotFound(format!("request {id}")))?;
        match tracked.record.status {
            GenerationStatus::Queued => {
                if let Some(key) = tracked.wait_key.take() {
                    self.waiting.remove(&key);
                }
                tracked.content = None;
                tracked.record.transition(GenerationStatus::Cancelled, now)?;
            }
            GenerationStatus::Generating => {
                tracked.record.transition(GenerationStatus::Cancelled, now)?;
                // The worker sees this and drops the in-flight call.
                tracked.cancel.cancel();
            }
            _ => return Ok(false),
        }
        GENERATIONS_FINISHED
            .with_label_values(&[GenerationStatus::Cancelled.as_str()])
            .inc();
        Ok(true)
    }
}

/// Cancel a queued request that dispatch cannot hand to a worker.
fn settle_unstartable(tracked: &mut Tracked, now: time::OffsetDateTime) {
    tracked.content = None;
    if tracked
        .record
        .transition(GenerationStatus::Cancelled, now)
        .is_ok()
    {
        GENERATIONS_FINISHED
            .with_label_values(&[GenerationStatus::Cancelled.as_str()])
            .inc();
    }
}

struct Job {
    id: RequestId,
    fingerprint: Fingerprint,
    request: SynthesisRequest,
    cancel: CancellationToken,
}

enum JobOutcome {
    Succeeded(Synthesis),
    Failed(ProviderError),
    Cancelled,
}

struct QueueInner {
    state: Mutex<QueueState>,
    cache: Arc<CacheManager>,
    provider: Arc<dyn SpeechProvider>,
    clock: Arc<dyn Clock>,
    settings: QueueSettings,
    tracker: TaskTracker,
    shutdown: CancellationToken,
}

/// Admits generation requests and runs at most `max_concurrent` of them at once.
///
/// Cheap to clone; clones share the same table and worker pool.
#[derive(Clone)]
pub struct GenerationQueue {
    inner: Arc<QueueInner>,
}

impl std::fmt::Debug for GenerationQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationQueue")
            .field("provider", &self.inner.provider.provider_name())
            .field("settings", &self.inner.settings)
            .finish()
    }
}

impl GenerationQueue {
    pub fn new(
        cache: Arc<CacheManager>,
        provider: Arc<dyn SpeechProvider>,
        clock: Arc<dyn Clock>,
        settings: QueueSettings,
    ) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                state: Mutex::new(QueueState::default()),
                cache,
                provider,
                clock,
                settings,
                tracker: TaskTracker::new(),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.inner.state.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("queue state lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    pub fn settings(&self) -> &QueueSettings {
        &self.inner.settings
    }

    fn validate_content(&self, content: &str) -> EngineResult<()> {
        if content.trim().is_empty() {
            return Err(EngineError::InvalidInput(
                "content must not be empty".to_string(),
            ));
        }
        let length = content.chars().count();
        if length > self.inner.settings.max_content_length {
            return Err(EngineError::InvalidInput(format!(
                "content is {length} characters, limit is {}",
                self.inner.settings.max_content_length
            )));
        }
        Ok(())
    }

    /// Admit a request.
    ///
    /// A cache hit completes immediately without taking a slot. A miss is
    /// queued and dispatched right away when a slot is free.
    #[instrument(skip(self, content), fields(voice_style = %voice_style, intensity = intensity.get(), priority = priority.as_str()))]
    pub async fn submit(
        &self,
        content: &str,
        voice_style: VoiceStyle,
        intensity: Intensity,
        priority: Priority,
    ) -> EngineResult<SubmitReceipt> {
        self.validate_content(content)?;
        if self.inner.shutdown.is_cancelled() {
            return Err(EngineError::InvalidState(
                "queue is shutting down".to_string(),
            ));
        }

        let fingerprint = Fingerprint::derive(content, voice_style, intensity);

        if let Some(entry) = self.inner.cache.lookup(&fingerprint).await {
            let audio = AudioRef {
                fingerprint,
                duration_seconds: narrator_core::estimate_duration_seconds(entry.size_bytes),
                size_bytes: entry.size_bytes,
                blob_ref: entry.blob_ref,
                cached: true,
            };
            let record = GenerationRequest::cached(
                fingerprint,
                voice_style,
                intensity,
                priority,
                audio,
                self.inner.clock.now(),
            );
            let request_id = record.id;
            self.lock().requests.insert(
                request_id,
                Tracked {
                    record,
                    content: None,
                    cancel: CancellationToken::new(),
                    wait_key: None,
                },
            );
            GENERATIONS_FINISHED
                .with_label_values(&[GenerationStatus::Completed.as_str()])
                .inc();
            tracing::info!(request_id = %request_id, fingerprint = %fingerprint, "served from cache");
            return Ok(SubmitReceipt {
                request_id,
                status: GenerationStatus::Completed,
                queue_position: None,
                estimated_wait_secs: None,
            });
        }

        let record = GenerationRequest::queued(
            fingerprint,
            voice_style,
            intensity,
            priority,
            self.inner.clock.now(),
        );
        let request_id = record.id;

        let mut guard = self.lock();
        let state = &mut *guard;
        if state.closed {
            return Err(EngineError::InvalidState(
                "queue is shutting down".to_string(),
            ));
        }
        let key = (priority, state.next_seq);
        state.next_seq += 1;
        state.waiting.insert(key, request_id);
        state.requests.insert(
            request_id,
            Tracked {
                record,
                content: Some(content.to_string()),
                cancel: self.inner.shutdown.child_token(),
                wait_key: Some(key),
            },
        );
        self.dispatch(state);

        let snapshot = state
            .snapshot(&request_id)
            .ok_or_else(|| EngineError::NotFound(format!("request {request_id}")))?;
        let estimated_wait_secs = match snapshot.queue_position {
            Some(position) => ESTIMATED_SECS_PER_REQUEST * (position as u64 + 1),
            None => ESTIMATED_SECS_PER_REQUEST,
        };
        tracing::info!(
            request_id = %request_id,
            status = %snapshot.status,
            queue_position = ?snapshot.queue_position,
            "request admitted"
        );
        Ok(SubmitReceipt {
            request_id,
            status: snapshot.status,
            queue_position: snapshot.queue_position,
            estimated_wait_secs: Some(estimated_wait_secs),
        })
    }

    /// Move waiting requests into free slots, in priority then submission order.
    fn dispatch(&self, state: &mut QueueState) {
        while !state.closed && state.generating < self.inner.settings.max_concurrent {
            let Some((_, id)) = state.waiting.pop_first() else {
                break;
            };
            let Some(tracked) = state.requests.get_mut(&id) else {
                continue;
            };
            tracked.wait_key = None;
            if tracked.record.status != GenerationStatus::Queued {
                continue;
            }
            let now = self.inner.clock.now();
            let Some(content) = tracked.content.take() else {
                // Nothing to narrate; settle the record so it cannot sit queued forever.
                tracing::warn!(request_id = %id, "queued request has no content, cancelling");
                settle_unstartable(tracked, now);
                continue;
            };
            if let Err(e) = tracked.record.transition(GenerationStatus::Generating, now) {
                tracing::warn!(request_id = %id, error = %e, "request cannot start, cancelling");
                settle_unstartable(tracked, now);
                continue;
            }
            let job = Job {
                id,
                fingerprint: tracked.record.fingerprint,
                request: SynthesisRequest::new(
                    content,
                    tracked.record.voice_style,
                    tracked.record.intensity,
                ),
                cancel: tracked.cancel.clone(),
            };
            state.generating += 1;
            self.spawn_worker(job);
        }
        state.publish();
    }

    fn spawn_worker(&self, job: Job) {
        let id = job.id;
        let worker = self.clone();
        let handle = tokio::spawn(async move { worker.run_job(job).await });

        let monitor = self.clone();
        self.inner.tracker.spawn(async move {
            match handle.await {
                Err(join_err) if join_err.is_panic() => {
                    WORKERS_PANICKED.inc();
                    tracing::error!(request_id = %id, "generation worker panicked");
                    monitor.finish(id, GenerationStatus::Failed, |record| {
                        record.error = Some(FailureSummary {
                            message: "generation worker panicked".to_string(),
                            retry_after_secs: None,
                        });
                    });
                }
                Err(join_err) => {
                    tracing::warn!(request_id = %id, error = %join_err, "generation worker aborted");
                }
                Ok(()) => {}
            }
            monitor.release_slot();
        });
    }

    fn release_slot(&self) {
        let mut guard = self.lock();
        let state = &mut *guard;
        state.generating = state.generating.saturating_sub(1);
        self.dispatch(state);
    }

    #[instrument(skip(self, job), fields(request_id = %job.id, fingerprint = %job.fingerprint))]
    async fn run_job(&self, job: Job) {
        match self.call_provider(&job).await {
            JobOutcome::Cancelled => {
                tracing::info!("generation cancelled");
            }
            JobOutcome::Failed(err) => {
                tracing::warn!(error = %err, kind = err.kind(), "generation failed");
                self.finish(job.id, GenerationStatus::Failed, |record| {
                    record.error = Some(FailureSummary {
                        message: err.to_string(),
                        retry_after_secs: err.retry_after().map(|d| d.as_secs()),
                    });
                });
            }
            JobOutcome::Succeeded(synthesis) => {
                self.update_generating(&job.id, |record| {
                    record.advance_progress(PROGRESS_AUDIO_RECEIVED);
                });
                let duration_seconds = synthesis.duration_seconds;
                match self.inner.cache.store(job.fingerprint, synthesis.audio).await {
                    Ok(stored) => {
                        let audio = AudioRef {
                            fingerprint: job.fingerprint,
                            blob_ref: stored.entry.blob_ref,
                            size_bytes: stored.entry.size_bytes,
                            duration_seconds,
                            cached: false,
                        };
                        if self.finish(job.id, GenerationStatus::Completed, |record| {
                            record.audio = Some(audio);
                        }) {
                            tracing::info!(duration_seconds, "generation completed");
                        }
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "failed to cache generated audio");
                        self.finish(job.id, GenerationStatus::Failed, |record| {
                            record.error = Some(FailureSummary {
                                message: format!("failed to cache generated audio: {e}"),
                                retry_after_secs: None,
                            });
                        });
                    }
                }
            }
        }
    }

    /// Call the provider, retrying retryable failures with backoff.
    async fn call_provider(&self, job: &Job) -> JobOutcome {
        let policy = &self.inner.settings.retry;
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let progress = policy.progress_for(attempt);
            let still_generating = self.update_generating(&job.id, |record| {
                record.attempts = attempt;
                record.advance_progress(progress);
            });
            if !still_generating {
                return JobOutcome::Cancelled;
            }

            let call = tokio::time::timeout(
                self.inner.settings.call_timeout,
                self.inner.provider.generate(&job.request),
            );
            let result = tokio::select! {
                biased;
                _ = job.cancel.cancelled() => return JobOutcome::Cancelled,
                result = call => result.unwrap_or(Err(ProviderError::Timeout)),
            };

            let err = match result {
                Ok(synthesis) => {
                    PROVIDER_ATTEMPTS.with_label_values(&["success"]).inc();
                    return JobOutcome::Succeeded(synthesis);
                }
                Err(err) => err,
            };
            PROVIDER_ATTEMPTS.with_label_values(&[err.kind()]).inc();

            if !policy.should_retry(attempt, &err) {
                return JobOutcome::Failed(err);
            }
            let delay = policy.delay_after(attempt, &err);
            RETRY_DELAY.observe(delay.as_secs_f64());
            tracing::warn!(
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "provider call failed, retrying"
            );
            tokio::select! {
                biased;
                _ = job.cancel.cancelled() => return JobOutcome::Cancelled,
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Mutate a record that is still generating. Returns false otherwise.
    fn update_generating(&self, id: &RequestId, apply: impl FnOnce(&mut GenerationRequest)) -> bool {
        let mut state = self.lock();
        match state.requests.get_mut(id) {
            Some(tracked) if tracked.record.status == GenerationStatus::Generating => {
                apply(&mut tracked.record);
                true
            }
            _ => false,
        }
    }

    /// Move a generating record to a terminal status.
    ///
    /// Returns false when the record already left `generating`, e.g. it was
    /// cancelled while the provider call was finishing.
    fn finish(
        &self,
        id: RequestId,
        next: GenerationStatus,
        apply: impl FnOnce(&mut GenerationRequest),
    ) -> bool {
        let now = self.inner.clock.now();
        let mut state = self.lock();
        let Some(tracked) = state.requests.get_mut(&id) else {
            return false;
        };
        if tracked.record.status != GenerationStatus::Generating {
            tracing::debug!(request_id = %id, status = %tracked.record.status, "ignoring late result");
            return false;
        }
        apply(&mut tracked.record);
        if let Err(e) = tracked.record.transition(next, now) {
            tracing::warn!(request_id = %id, error = %e, "unexpected transition failure");
            return false;
        }
        GENERATIONS_FINISHED.with_label_values(&[next.as_str()]).inc();
        if let Some(started_at) = tracked.record.started_at {
            GENERATION_DURATION.observe((now - started_at).as_seconds_f64().max(0.0));
        }
        true
    }

    /// Snapshot of a request, with its current queue position while queued.
    pub fn status(&self, id: &RequestId) -> EngineResult<GenerationRequest> {
        self.lock()
            .snapshot(id)
            .ok_or_else(|| EngineError::NotFound(format!("request {id}")))
    }

    /// Cancel a request.
    ///
    /// A queued request is cancelled and leaves the queue without reaching
    /// the provider. A generating request is cancelled and its in-flight call
    /// is dropped; its slot frees once the worker returns. Cancelling a
    /// terminal request changes nothing and succeeds.
    pub fn cancel(&self, id: &RequestId) -> EngineResult<GenerationRequest> {
        let now = self.inner.clock.now();
        let mut guard = self.lock();
        let state = &mut *guard;
        if state.cancel(id, now)? {
            tracing::info!(request_id = %id, "request cancelled");
        }
        state.publish();
        state
            .snapshot(id)
            .ok_or_else(|| EngineError::NotFound(format!("request {id}")))
    }

    /// Drop a terminal request from tracking, returning its final snapshot.
    pub fn acknowledge(&self, id: &RequestId) -> EngineResult<GenerationRequest> {
        let mut state = self.lock();
        let tracked = state
            .requests
            .get(id)
            .ok_or_else(|| EngineError::NotFound(format!("request {id}")))?;
        if !tracked.record.status.is_terminal() {
            return Err(EngineError::InvalidState(format!(
                "request {id} is still {}",
                tracked.record.status
            )));
        }
        state
            .requests
            .remove(id)
            .map(|tracked| tracked.record)
            .ok_or_else(|| EngineError::NotFound(format!("request {id}")))
    }

    /// Cancel every queued or generating request created more than `timeout` ago.
    pub fn cancel_abandoned(&self, timeout: Duration) -> AbandonOutcome {
        let now = self.inner.clock.now();
        let limit = time::Duration::try_from(timeout).unwrap_or(time::Duration::MAX);
        let mut guard = self.lock();
        let state = &mut *guard;

        let stale: Vec<RequestId> = state
            .requests
            .values()
            .filter(|t| t.record.status.is_active() && t.record.age(now) > limit)
            .map(|t| t.record.id)
            .collect();

        let mut outcome = AbandonOutcome::default();
        for id in stale {
            match state.cancel(&id, now) {
                Ok(true) => {
                    tracing::warn!(request_id = %id, "cancelled abandoned request");
                    outcome.cancelled.push(id);
                }
                Ok(false) => {}
                Err(e) => outcome.errors.push(format!("{id}: {e}")),
            }
        }
        state.publish();
        outcome
    }

    /// Drop terminal requests whose retention window has passed.
    pub fn reap_terminal(&self) -> usize {
        let now = self.inner.clock.now();
        let retention =
            time::Duration::try_from(self.inner.settings.retention).unwrap_or(time::Duration::MAX);
        let mut state = self.lock();
        let before = state.requests.len();
        state.requests.retain(|_, tracked| {
            match (tracked.record.status.is_terminal(), tracked.record.completed_at) {
                (true, Some(completed_at)) => now - completed_at < retention,
                _ => true,
            }
        });
        let reaped = before - state.requests.len();
        if reaped > 0 {
            tracing::debug!(reaped, "reaped terminal requests");
        }
        reaped
    }

    /// Counts over the request table.
    pub fn stats(&self) -> QueueStats {
        let state = self.lock();
        let mut by_status: BTreeMap<String, usize> = GenerationStatus::ALL
            .iter()
            .map(|status| (status.as_str().to_string(), 0))
            .collect();
        for tracked in state.requests.values() {
            *by_status
                .entry(tracked.record.status.as_str().to_string())
                .or_default() += 1;
        }
        QueueStats {
            total: state.requests.len(),
            by_status,
            active: state.generating,
            queued: state.waiting.len(),
            max_concurrent: self.inner.settings.max_concurrent,
        }
    }

    /// Stop admitting requests, cancel everything in flight and wait for workers to exit.
    pub async fn shutdown(&self) {
        let cancelled = {
            let now = self.inner.clock.now();
            let mut guard = self.lock();
            let state = &mut *guard;
            state.closed = true;
            let active: Vec<RequestId> = state
                .requests
                .values()
                .filter(|t| t.record.status.is_active())
                .map(|t| t.record.id)
                .collect();
            let mut cancelled = 0usize;
            for id in active {
                if matches!(state.cancel(&id, now), Ok(true)) {
                    cancelled += 1;
                }
            }
            state.publish();
            cancelled
        };
        self.inner.shutdown.cancel();
        self.inner.tracker.close();
        self.inner.tracker.wait().await;
        tracing::info!(cancelled, "generation queue stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bytes::Bytes;
    use narrator_core::ManualClock;
    use narrator_core::config::CacheConfig;
    use narrator_provider::ProviderResult;
    use narrator_storage::MemoryBackend;

    struct SilentProvider;

    #[async_trait]
    impl SpeechProvider for SilentProvider {
        async fn generate(&self, _request: &SynthesisRequest) -> ProviderResult<Synthesis> {
            Ok(Synthesis {
                audio: Bytes::from_static(b"ID3"),
                duration_seconds: 1.0,
            })
        }

        fn provider_name(&self) -> &'static str {
            "silent"
        }
    }

    fn queue() -> GenerationQueue {
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(time::OffsetDateTime::UNIX_EPOCH));
        let cache = Arc::new(CacheManager::new(
            Arc::new(MemoryBackend::new()),
            &CacheConfig::default(),
            clock.clone(),
        ));
        GenerationQueue::new(cache, Arc::new(SilentProvider), clock, QueueSettings::default())
    }

    #[tokio::test]
    async fn test_dispatch_cancels_queued_request_without_content() {
        let queue = queue();
        let style = VoiceStyle::EerieNarrator;
        let record = GenerationRequest::queued(
            Fingerprint::derive("lost", style, Intensity::default()),
            style,
            Intensity::default(),
            Priority::Normal,
            queue.inner.clock.now(),
        );
        let id = record.id;
        {
            let mut guard = queue.lock();
            let state = &mut *guard;
            let key = (Priority::Normal, 0);
            state.waiting.insert(key, id);
            state.requests.insert(
                id,
                Tracked {
                    record,
                    content: None,
                    cancel: CancellationToken::new(),
                    wait_key: Some(key),
                },
            );
            queue.dispatch(state);
        }

        let settled = queue.status(&id).unwrap();
        assert_eq!(settled.status, GenerationStatus::Cancelled);
        assert!(settled.completed_at.is_some());
        assert_eq!(settled.queue_position, None);
        let stats = queue.stats();
        assert_eq!(stats.queued, 0);
        assert_eq!(stats.active, 0);
    }
}
