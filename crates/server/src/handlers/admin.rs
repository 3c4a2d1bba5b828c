//! Administrative endpoints.

use crate::error::ApiResult;
use crate::state::AppState;
use axum::Json;
use axum::extract::State;
use narrator_engine::{CleanupRun, CleanupStats};
use narrator_provider::ProviderHealth;
use serde::Serialize;

/// POST /v1/admin/cleanup/run - Run one cleanup pass now.
///
/// Waits for a scheduled run in progress instead of overlapping it.
pub async fn run_cleanup(State(state): State<AppState>) -> ApiResult<Json<CleanupRun>> {
    tracing::info!("manual cleanup run requested");
    let run = state.cleanup.run_once().await;
    Ok(Json(run))
}

/// Cleanup statistics plus provider health.
#[derive(Debug, Serialize)]
pub struct AdminStatsResponse {
    #[serde(flatten)]
    pub cleanup: CleanupStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<ProviderHealth>,
}

/// GET /v1/admin/cleanup/stats - Cache, queue and schedule state.
///
/// Reading the stats never triggers a cleanup run.
pub async fn cleanup_stats(State(state): State<AppState>) -> ApiResult<Json<AdminStatsResponse>> {
    Ok(Json(AdminStatsResponse {
        cleanup: state.cleanup.stats(),
        provider: state.provider_health.as_ref().map(|source| source.health()),
    }))
}
