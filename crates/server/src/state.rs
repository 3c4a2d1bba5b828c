//! Application state.

use narrator_core::config::AppConfig;
use narrator_core::{Clock, SystemClock};
use narrator_engine::{
    CacheManager, CleanupService, CleanupSettings, EngineResult, GenerationQueue, QueueSettings,
};
use narrator_provider::{OutageGuard, ProviderHealth, SpeechProvider};
use narrator_storage::BlobStore;
use std::sync::Arc;

/// Reports provider availability for the admin endpoints.
///
/// Implemented by [`OutageGuard`]; tests may plug in their own.
pub trait HealthSource: Send + Sync {
    fn health(&self) -> ProviderHealth;
}

impl HealthSource for OutageGuard {
    fn health(&self) -> ProviderHealth {
        OutageGuard::health(self)
    }
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// Blob store backing the audio cache.
    pub storage: Arc<dyn BlobStore>,
    /// Fingerprint-keyed audio cache.
    pub cache: Arc<CacheManager>,
    /// Generation scheduler.
    pub queue: GenerationQueue,
    /// Cache expiry and abandoned-request janitor.
    pub cleanup: CleanupService,
    /// Provider availability, when the provider reports it.
    pub provider_health: Option<Arc<dyn HealthSource>>,
}

impl AppState {
    /// Assemble the engine on top of an existing store and provider.
    ///
    /// The cache index is rebuilt from blobs already in the store.
    pub async fn build(
        config: AppConfig,
        storage: Arc<dyn BlobStore>,
        provider: Arc<dyn SpeechProvider>,
        clock: Arc<dyn Clock>,
    ) -> EngineResult<Self> {
        let cache =
            Arc::new(CacheManager::open(storage.clone(), &config.cache, clock.clone()).await?);
        let queue = GenerationQueue::new(
            cache.clone(),
            provider,
            clock.clone(),
            QueueSettings::from_config(&config),
        );
        let cleanup = CleanupService::new(
            cache.clone(),
            queue.clone(),
            clock,
            CleanupSettings::from_config(&config),
        );

        Ok(Self {
            config: Arc::new(config),
            storage,
            cache,
            queue,
            cleanup,
            provider_health: None,
        })
    }

    /// Production wiring: wall clock and a provider behind an outage guard.
    pub async fn new(
        config: AppConfig,
        storage: Arc<dyn BlobStore>,
        provider: Arc<OutageGuard>,
    ) -> EngineResult<Self> {
        let health: Arc<dyn HealthSource> = provider.clone();
        let state = Self::build(config, storage, provider, Arc::new(SystemClock)).await?;
        Ok(state.with_provider_health(health))
    }

    pub fn with_provider_health(mut self, health: Arc<dyn HealthSource>) -> Self {
        self.provider_health = Some(health);
        self
    }

    /// Stop background work: the cleanup schedule first, then the queue,
    /// then flush cache access times.
    pub async fn shutdown(&self) {
        self.cleanup.stop().await;
        self.queue.shutdown().await;
        if let Err(e) = self.cache.persist_access_times().await {
            tracing::warn!(error = %e, "failed to flush cache access times");
        }
    }
}
