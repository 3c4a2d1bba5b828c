//! Server test utilities.

use crate::common::FixtureProvider;
use narrator_core::config::{AppConfig, StorageConfig};
use narrator_core::{Clock, ManualClock};
use narrator_server::{AppState, create_router};
use narrator_storage::{BlobStore, FilesystemBackend};
use std::sync::Arc;
use tempfile::TempDir;
use time::OffsetDateTime;

/// A test server wrapper with all dependencies.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct TestServer {
    pub router: axum::Router,
    pub state: AppState,
    pub provider: Arc<FixtureProvider>,
    pub clock: Arc<ManualClock>,
    _temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestServer {
    /// Create a test server with filesystem storage and a succeeding provider.
    pub async fn new() -> Self {
        Self::with_provider(FixtureProvider::succeeding(), |_| {}).await
    }

    /// Create a test server with a custom provider and config modifications.
    pub async fn with_provider<F>(provider: FixtureProvider, modifier: F) -> Self
    where
        F: FnOnce(&mut AppConfig),
    {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");
        let storage_path = temp_dir.path().join("storage");
        let storage: Arc<dyn BlobStore> = Arc::new(
            FilesystemBackend::new(&storage_path)
                .await
                .expect("Failed to create storage backend"),
        );

        let mut config = AppConfig {
            storage: StorageConfig::Filesystem { path: storage_path },
            ..AppConfig::for_testing()
        };
        // Keep retries fast.
        config.retry.base_delay_ms = 10;
        config.retry.max_delay_ms = 40;
        modifier(&mut config);

        let clock = Arc::new(ManualClock::new(
            OffsetDateTime::UNIX_EPOCH + time::Duration::days(20_000),
        ));
        let dyn_clock: Arc<dyn Clock> = clock.clone();
        let provider = Arc::new(provider);

        let state = AppState::build(config, storage, provider.clone(), dyn_clock)
            .await
            .expect("Failed to build app state");
        let router = create_router(state.clone());

        Self {
            router,
            state,
            provider,
            clock,
            _temp_dir: temp_dir,
        }
    }
}
