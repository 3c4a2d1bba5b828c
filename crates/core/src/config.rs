//! Configuration types shared across crates.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// HTTP server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Longest narration text accepted, in characters.
    #[serde(default = "default_max_content_length")]
    pub max_content_length: usize,
    /// Enable the /metrics endpoint for Prometheus scraping (default: true).
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_max_content_length() -> usize {
    10_000
}

fn default_metrics_enabled() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_content_length: default_max_content_length(),
            metrics_enabled: default_metrics_enabled(),
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_content_length == 0 {
            return Err("server.max_content_length must be at least 1".to_string());
        }
        Ok(())
    }
}

/// Cache store backend configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Local filesystem storage.
    Filesystem {
        /// Root directory for cached audio.
        path: PathBuf,
    },
    /// Process-local storage, lost on restart. Intended for tests and demos.
    Memory,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::Filesystem {
            path: PathBuf::from("./cache/narration"),
        }
    }
}

impl StorageConfig {
    pub fn validate(&self) -> Result<(), String> {
        match self {
            StorageConfig::Filesystem { path } if path.as_os_str().is_empty() => {
                Err("storage.path must not be empty".to_string())
            }
            _ => Ok(()),
        }
    }
}

/// Cache policy configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Total size budget for cached audio, in bytes.
    #[serde(default = "default_cache_max_size_bytes")]
    pub max_size_bytes: u64,
    /// Maximum entry age in seconds.
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,
}

fn default_cache_max_size_bytes() -> u64 {
    500 * 1024 * 1024
}

fn default_cache_ttl_secs() -> u64 {
    7 * 24 * 3600 // 7 days
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size_bytes: default_cache_max_size_bytes(),
            ttl_secs: default_cache_ttl_secs(),
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_size_bytes == 0 {
            return Err("cache.max_size_bytes must be greater than 0".to_string());
        }
        if self.ttl_secs == 0 {
            return Err("cache.ttl_secs must be greater than 0".to_string());
        }
        if self.ttl_secs > i64::MAX as u64 {
            return Err(format!(
                "cache.ttl_secs {} exceeds maximum value {}",
                self.ttl_secs,
                i64::MAX
            ));
        }
        Ok(())
    }
}

/// Generation queue configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Maximum number of requests generating at once.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    /// How long terminal requests stay pollable, in seconds.
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,
}

fn default_max_concurrent() -> usize {
    3
}

fn default_retention_secs() -> u64 {
    3600 // 1 hour
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            retention_secs: default_retention_secs(),
        }
    }
}

impl QueueConfig {
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_concurrent == 0 {
            return Err("queue.max_concurrent must be at least 1".to_string());
        }
        Ok(())
    }
}

/// Provider retry configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total provider attempts per request, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay before the second attempt, in milliseconds.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Upper bound for the exponential delay, in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    4
}

fn default_base_delay_ms() -> u64 {
    1_000
}

fn default_max_delay_ms() -> u64 {
    32_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl RetryConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("retry.max_attempts must be at least 1".to_string());
        }
        if self.base_delay_ms > self.max_delay_ms {
            return Err(format!(
                "retry.base_delay_ms ({}) must not exceed retry.max_delay_ms ({})",
                self.base_delay_ms, self.max_delay_ms
            ));
        }
        Ok(())
    }
}

/// Cleanup service configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CleanupConfig {
    /// Start the recurring schedule when the server boots (default: true).
    #[serde(default = "default_cleanup_enabled")]
    pub enabled: bool,
    /// Interval in seconds between scheduled runs (default: 6 hours).
    #[serde(default = "default_cleanup_interval_secs")]
    pub interval_secs: u64,
    /// Age in seconds after which a queued or generating request is considered abandoned.
    #[serde(default = "default_abandoned_timeout_secs")]
    pub abandoned_timeout_secs: u64,
}

fn default_cleanup_enabled() -> bool {
    true
}

fn default_cleanup_interval_secs() -> u64 {
    6 * 3600
}

fn default_abandoned_timeout_secs() -> u64 {
    3600
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            enabled: default_cleanup_enabled(),
            interval_secs: default_cleanup_interval_secs(),
            abandoned_timeout_secs: default_abandoned_timeout_secs(),
        }
    }
}

impl CleanupConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn abandoned_timeout(&self) -> Duration {
        Duration::from_secs(self.abandoned_timeout_secs)
    }

    pub fn validate(&self) -> Result<(), String> {
        // tokio::time::interval panics on a zero period
        if self.interval_secs == 0 {
            return Err("cleanup.interval_secs cannot be 0".to_string());
        }
        if self.abandoned_timeout_secs > i64::MAX as u64 {
            return Err(format!(
                "cleanup.abandoned_timeout_secs {} exceeds maximum value {}",
                self.abandoned_timeout_secs,
                i64::MAX
            ));
        }
        Ok(())
    }
}

/// Text-to-speech provider configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Provider API root.
    #[serde(default = "default_provider_base_url")]
    pub base_url: String,
    /// API key. Prefer NARRATOR_PROVIDER__API_KEY over storing it in a config file.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_model_id")]
    pub model_id: String,
    #[serde(default = "default_output_format")]
    pub output_format: String,
    /// Per-call timeout in seconds. Also bounds how long a cancelled call can hold a slot.
    #[serde(default = "default_provider_timeout_secs")]
    pub timeout_secs: u64,
    /// Consecutive failures before the provider is treated as down.
    #[serde(default = "default_outage_threshold")]
    pub outage_threshold: u32,
    /// How long calls fail fast once the provider is treated as down, in seconds.
    #[serde(default = "default_outage_cooldown_secs")]
    pub outage_cooldown_secs: u64,
    /// Wait assumed for a 429 response without a retry-after header, in seconds.
    #[serde(default = "default_retry_after_secs")]
    pub default_retry_after_secs: u64,
}

fn default_provider_base_url() -> String {
    "https://api.elevenlabs.io".to_string()
}

fn default_model_id() -> String {
    "eleven_turbo_v2_5".to_string()
}

fn default_output_format() -> String {
    "mp3_44100_128".to_string()
}

fn default_provider_timeout_secs() -> u64 {
    60
}

fn default_outage_threshold() -> u32 {
    5
}

fn default_outage_cooldown_secs() -> u64 {
    300
}

fn default_retry_after_secs() -> u64 {
    60
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_provider_base_url(),
            api_key: None,
            model_id: default_model_id(),
            output_format: default_output_format(),
            timeout_secs: default_provider_timeout_secs(),
            outage_threshold: default_outage_threshold(),
            outage_cooldown_secs: default_outage_cooldown_secs(),
            default_retry_after_secs: default_retry_after_secs(),
        }
    }
}

impl ProviderConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn outage_cooldown(&self) -> Duration {
        Duration::from_secs(self.outage_cooldown_secs)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.base_url.trim().is_empty() {
            return Err("provider.base_url must not be empty".to_string());
        }
        if self.timeout_secs == 0 {
            return Err("provider.timeout_secs must be greater than 0".to_string());
        }
        if self.outage_threshold == 0 {
            return Err("provider.outage_threshold must be at least 1".to_string());
        }
        Ok(())
    }
}

/// Complete application configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub cleanup: CleanupConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
}

impl AppConfig {
    /// Create a test configuration with in-memory storage and no schedule.
    ///
    /// **For testing only.**
    pub fn for_testing() -> Self {
        Self {
            storage: StorageConfig::Memory,
            cleanup: CleanupConfig {
                enabled: false,
                ..CleanupConfig::default()
            },
            ..Self::default()
        }
    }

    /// Validate every section, returning the first problem found.
    pub fn validate(&self) -> Result<(), String> {
        self.server.validate()?;
        self.storage.validate()?;
        self.cache.validate()?;
        self.queue.validate()?;
        self.retry.validate()?;
        self.cleanup.validate()?;
        self.provider.validate()?;
        Ok(())
    }
}
