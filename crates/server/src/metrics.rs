//! Prometheus metrics for the HTTP layer and the `/metrics` endpoint.
//!
//! Engine metrics (cache, queue, cleanup) live in `narrator_engine::metrics`;
//! this module adds API counters to the same registry and serves it.
//!
//! The `/metrics` endpoint is unauthenticated to allow Prometheus scraping.
//! It exposes aggregate usage only, never request content or fingerprints.
//! Restrict it to the scraper's network at the infrastructure level.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use narrator_engine::metrics::REGISTRY;
use prometheus::{self, Encoder, IntCounter, IntCounterVec, Opts, TextEncoder};
use std::sync::{LazyLock, Once};

pub static NARRATION_SUBMISSIONS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "narrator_api_submissions_total",
            "Generation submissions by outcome (queued, cached, rejected)",
        ),
        &["outcome"],
    )
    .expect("metric creation failed")
});

pub static AUDIO_BYTES_SERVED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "narrator_api_audio_bytes_served_total",
        "Bytes of cached audio served to clients",
    )
    .expect("metric creation failed")
});

static REGISTER_ONCE: Once = Once::new();

/// Register engine and API metrics with the shared registry.
pub fn register_metrics() {
    narrator_engine::metrics::register_metrics();
    REGISTER_ONCE.call_once(|| {
        REGISTRY
            .register(Box::new(NARRATION_SUBMISSIONS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(AUDIO_BYTES_SERVED.clone()))
            .expect("metric registration failed");
    });
}

/// Handler for the `/metrics` endpoint.
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = Vec::new();
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            format!("Failed to encode metrics: {e}").into_bytes(),
        ),
    }
}

pub fn record_submission(outcome: &str) {
    NARRATION_SUBMISSIONS.with_label_values(&[outcome]).inc();
}
