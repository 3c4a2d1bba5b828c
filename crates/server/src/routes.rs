//! Route configuration.

use crate::handlers;
use crate::metrics::metrics_handler;
use crate::state::AppState;
use axum::Router;
use axum::routing::{delete, get, post};
use tower_http::trace::TraceLayer;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let api_routes = Router::new()
        // Health check (unauthenticated for load balancers/k8s probes)
        .route("/v1/health", get(handlers::health_check))
        // Narration
        .route("/v1/narration/generate", post(handlers::generate))
        .route("/v1/narration/status/{request_id}", get(handlers::get_status))
        .route("/v1/narration/cancel/{request_id}", delete(handlers::cancel))
        .route(
            "/v1/narration/acknowledge/{request_id}",
            post(handlers::acknowledge),
        )
        .route("/v1/narration/audio/{fingerprint}", get(handlers::get_audio))
        .route("/v1/narration/voices", get(handlers::list_voices))
        // Cleanup administration
        .route("/v1/admin/cleanup/run", post(handlers::run_cleanup))
        .route("/v1/admin/cleanup/stats", get(handlers::cleanup_stats));

    let mut router = Router::new().merge(api_routes);

    if state.config.server.metrics_enabled {
        router = router.route("/metrics", get(metrics_handler));
    }

    router.layer(TraceLayer::new_for_http()).with_state(state)
}
