//! Narration server binary.

use anyhow::{Context, Result};
use clap::Parser;
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use narrator_core::config::AppConfig;
use narrator_server::{AppState, create_router};
use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// narratord - narration generation and audio cache server
#[derive(Parser, Debug)]
#[command(name = "narratord")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(
        short,
        long,
        env = "NARRATOR_CONFIG",
        default_value = "config/narrator.toml"
    )]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("narratord v{}", env!("CARGO_PKG_VERSION"));

    // The file is optional; env vars can provide or override everything.
    let config_path = std::path::Path::new(&args.config);
    let mut figment = Figment::new();
    let has_config_file = config_path.exists();

    if has_config_file {
        tracing::info!(config_path = %args.config, "Loading configuration from file");
        figment = figment.merge(Toml::file(&args.config));
    } else {
        tracing::debug!("No config file found at {}", args.config);
    }

    let has_env_config = std::env::vars()
        .any(|(key, _)| key.starts_with("NARRATOR_") && key != "NARRATOR_CONFIG");

    if !has_config_file && !has_env_config {
        anyhow::bail!(
            "No configuration provided.\n\n\
             Provide configuration via one of:\n  \
             1. Config file: narratord --config /path/to/narrator.toml\n  \
             2. Environment variables: NARRATOR_PROVIDER__API_KEY=... \
             NARRATOR_STORAGE__TYPE=filesystem \
             NARRATOR_STORAGE__PATH=/var/cache/narration narratord\n\n\
             See config/narrator.example.toml for example configuration.\n\
             Set NARRATOR_CONFIG env var to specify a default config file path."
        );
    }

    let config: AppConfig = figment
        .merge(Env::prefixed("NARRATOR_").split("__"))
        .extract()
        .context("failed to load configuration")?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;

    narrator_server::metrics::register_metrics();
    tracing::info!("Prometheus metrics registered");

    let storage = narrator_storage::from_config(&config.storage)
        .await
        .context("failed to initialize storage")?;
    // Refuse to start against an unreachable store.
    storage
        .health_check()
        .await
        .context("storage health check failed")?;
    tracing::info!(backend = storage.backend_name(), "Storage initialized");

    let provider =
        narrator_provider::from_config(&config.provider).context("failed to build provider")?;

    let state = AppState::new(config.clone(), storage, provider)
        .await
        .context("failed to open audio cache")?;
    let cache_stats = state.cache.stats();
    tracing::info!(
        entries = cache_stats.entry_count,
        bytes = cache_stats.total_size_bytes,
        max_bytes = cache_stats.max_size_bytes,
        "Audio cache ready"
    );

    if config.cleanup.enabled {
        state.cleanup.start_default();
    } else {
        tracing::info!("Scheduled cleanup disabled");
    }

    let app = create_router(state.clone());

    let addr: SocketAddr = config.server.bind.parse().context("invalid bind address")?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutting down background tasks");
    state.shutdown().await;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
