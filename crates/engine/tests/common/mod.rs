//! Common test utilities: scripted providers and a wired-up engine.

pub mod providers;

#[allow(unused_imports)]
pub use providers::*;

use narrator_core::config::CacheConfig;
use narrator_core::{Clock, ManualClock};
use narrator_engine::{
    CacheManager, CleanupService, CleanupSettings, GenerationQueue, QueueSettings, RetryPolicy,
};
use narrator_provider::SpeechProvider;
use narrator_storage::{BlobStore, MemoryBackend};
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;

/// Queue settings with the documented defaults and a fixed retry policy.
#[allow(dead_code)]
pub fn queue_settings(max_concurrent: usize) -> QueueSettings {
    QueueSettings {
        max_concurrent,
        retention: Duration::from_secs(3600),
        call_timeout: Duration::from_secs(60),
        max_content_length: 10_000,
        retry: RetryPolicy {
            max_attempts: 4,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(32),
        },
    }
}

#[allow(dead_code)]
pub fn cache_config() -> CacheConfig {
    CacheConfig {
        max_size_bytes: 1024 * 1024,
        ttl_secs: 7 * 24 * 3600,
    }
}

/// A cache, queue and cleanup service sharing one manual clock.
#[allow(dead_code)]
pub struct Engine {
    pub store: Arc<dyn BlobStore>,
    pub clock: Arc<ManualClock>,
    pub cache: Arc<CacheManager>,
    pub queue: GenerationQueue,
    pub cleanup: CleanupService,
}

#[allow(dead_code)]
impl Engine {
    pub fn new(provider: Arc<dyn SpeechProvider>, settings: QueueSettings) -> Self {
        Self::with_store(Arc::new(MemoryBackend::new()), cache_config(), provider, settings)
    }

    pub fn with_store(
        store: Arc<dyn BlobStore>,
        cache_config: CacheConfig,
        provider: Arc<dyn SpeechProvider>,
        settings: QueueSettings,
    ) -> Self {
        let clock = Arc::new(ManualClock::new(
            OffsetDateTime::UNIX_EPOCH + time::Duration::days(10_000),
        ));
        let dyn_clock: Arc<dyn Clock> = clock.clone();
        let cache = Arc::new(CacheManager::new(
            store.clone(),
            &cache_config,
            dyn_clock.clone(),
        ));
        let queue = GenerationQueue::new(cache.clone(), provider, dyn_clock.clone(), settings);
        let cleanup = CleanupService::new(
            cache.clone(),
            queue.clone(),
            dyn_clock,
            CleanupSettings {
                ttl: cache_config.ttl(),
                abandoned_timeout: Duration::from_secs(3600),
                interval: Duration::from_secs(6 * 3600),
            },
        );
        Self {
            store,
            clock,
            cache,
            queue,
            cleanup,
        }
    }
}

/// Poll `condition` until it holds, failing the test after `timeout`.
///
/// Under a paused runtime the sleeps auto-advance virtual time.
#[allow(dead_code)]
pub async fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + timeout;
    while !condition() {
        if tokio::time::Instant::now() >= deadline {
            panic!("condition not met within {timeout:?}");
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
