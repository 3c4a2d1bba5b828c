//! Prometheus metrics for the cache, queue and cleanup service.
//!
//! Metrics live in a process-wide registry; the server exposes it at `/metrics`.

use prometheus::{
    Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
};
use std::sync::{LazyLock, Once};

/// Global Prometheus registry for all metrics.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// Cache metrics
pub static CACHE_LOOKUPS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "narrator_cache_lookups_total",
            "Cache lookups by result (hit, miss, expired)",
        ),
        &["result"],
    )
    .expect("metric creation failed")
});

pub static CACHE_EVICTIONS: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "narrator_cache_evictions_total",
        "Entries evicted to stay within the size budget",
    )
    .expect("metric creation failed")
});

pub static CACHE_BYTES_EVICTED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "narrator_cache_bytes_evicted_total",
        "Bytes evicted to stay within the size budget",
    )
    .expect("metric creation failed")
});

pub static CACHE_EXPIRED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "narrator_cache_expired_total",
        "Entries removed because they outlived the TTL",
    )
    .expect("metric creation failed")
});

pub static CACHE_DELETE_FAILURES: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "narrator_cache_delete_failures_total",
        "Blob deletes that failed and were left pending for retry",
    )
    .expect("metric creation failed")
});

pub static CACHE_SIZE_BYTES: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new("narrator_cache_size_bytes", "Bytes held by live cache entries")
        .expect("metric creation failed")
});

pub static CACHE_ENTRIES: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new("narrator_cache_entries", "Number of live cache entries")
        .expect("metric creation failed")
});

// Generation metrics
pub static GENERATIONS_FINISHED: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "narrator_generations_finished_total",
            "Generation requests reaching a terminal status, by status",
        ),
        &["status"],
    )
    .expect("metric creation failed")
});

pub static PROVIDER_ATTEMPTS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "narrator_provider_attempts_total",
            "Provider calls by outcome (success or error kind)",
        ),
        &["outcome"],
    )
    .expect("metric creation failed")
});

pub static RETRY_DELAY: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "narrator_retry_delay_seconds",
            "Backoff delay before a provider retry",
        )
        .buckets(vec![0.5, 1.0, 2.0, 4.0, 8.0, 16.0, 32.0, 60.0, 120.0]),
    )
    .expect("metric creation failed")
});

pub static GENERATION_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "narrator_generation_duration_seconds",
            "Time from dispatch to completion of a generation",
        )
        .buckets(vec![1.0, 2.5, 5.0, 10.0, 20.0, 30.0, 60.0, 120.0, 300.0]),
    )
    .expect("metric creation failed")
});

pub static QUEUE_GENERATING: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "narrator_queue_generating",
        "Worker slots currently occupied",
    )
    .expect("metric creation failed")
});

pub static QUEUE_WAITING: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "narrator_queue_waiting",
        "Requests waiting for a worker slot",
    )
    .expect("metric creation failed")
});

pub static WORKERS_PANICKED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "narrator_workers_panicked_total",
        "Generation workers that panicked",
    )
    .expect("metric creation failed")
});

// Cleanup metrics
pub static CLEANUP_RUNS: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new("narrator_cleanup_runs_total", "Completed cleanup runs")
        .expect("metric creation failed")
});

pub static CLEANUP_ABANDONED_CANCELLED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "narrator_cleanup_abandoned_cancelled_total",
        "Requests cancelled by the abandonment sweep",
    )
    .expect("metric creation failed")
});

pub static CLEANUP_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "narrator_cleanup_duration_seconds",
            "Duration of a cleanup run",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0, 120.0]),
    )
    .expect("metric creation failed")
});

/// Guard to ensure metrics are only registered once.
static REGISTER_ONCE: Once = Once::new();

/// Register all metrics with the global registry.
///
/// Idempotent, so tests and embedded routers can call it freely.
pub fn register_metrics() {
    REGISTER_ONCE.call_once(|| {
        let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
            Box::new(CACHE_LOOKUPS.clone()),
            Box::new(CACHE_EVICTIONS.clone()),
            Box::new(CACHE_BYTES_EVICTED.clone()),
            Box::new(CACHE_EXPIRED.clone()),
            Box::new(CACHE_DELETE_FAILURES.clone()),
            Box::new(CACHE_SIZE_BYTES.clone()),
            Box::new(CACHE_ENTRIES.clone()),
            Box::new(GENERATIONS_FINISHED.clone()),
            Box::new(PROVIDER_ATTEMPTS.clone()),
            Box::new(RETRY_DELAY.clone()),
            Box::new(GENERATION_DURATION.clone()),
            Box::new(QUEUE_GENERATING.clone()),
            Box::new(QUEUE_WAITING.clone()),
            Box::new(WORKERS_PANICKED.clone()),
            Box::new(CLEANUP_RUNS.clone()),
            Box::new(CLEANUP_ABANDONED_CANCELLED.clone()),
            Box::new(CLEANUP_DURATION.clone()),
        ];
        for collector in collectors {
            REGISTRY
                .register(collector)
                .expect("metric registration failed");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_registration() {
        register_metrics();
        register_metrics();
        CACHE_LOOKUPS.with_label_values(&["hit"]).inc();
        assert!(
            REGISTRY
                .gather()
                .iter()
                .any(|family| family.get_name() == "narrator_cache_lookups_total")
        );
    }
}
