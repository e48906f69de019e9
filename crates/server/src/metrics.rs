//! Prometheus metrics for observability.
//!
//! This module provides metrics for monitoring the daemon:
//! - HTTP request metrics for the status endpoint
//! - Worker and search state (collected dynamically)
//! - Core metrics from `arrwarden_core::metrics`

use once_cell::sync::Lazy;
use prometheus::{
    self, core::Collector, Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec,
    IntGauge, IntGaugeVec, Opts, Registry, TextEncoder,
};
use tracing::warn;

use crate::state::AppState;

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

// =============================================================================
// HTTP Request Metrics
// =============================================================================

/// HTTP request duration in seconds.
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "arrwarden_http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests total count.
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("arrwarden_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests currently in flight.
pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "arrwarden_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
    )
    .unwrap()
});

// =============================================================================
// Worker Metrics (collected dynamically)
// =============================================================================

/// Instances with a running worker.
pub static WORKERS_RUNNING: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("arrwarden_workers_running", "Instances with a running worker").unwrap()
});

/// Configured instances that were not started.
pub static INSTANCES_SKIPPED: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "arrwarden_instances_skipped",
        "Managed instances whose worker did not start",
    )
    .unwrap()
});

/// Search items currently cooling down, per instance.
pub static SEARCH_COOLDOWNS: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new(
            "arrwarden_search_cooldowns",
            "Search items currently cooling down",
        ),
        &["instance"],
    )
    .unwrap()
});

/// Requested media waiting for a search slot, per instance.
pub static SEARCH_PENDING_REQUESTS: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new(
            "arrwarden_search_pending_requests",
            "Requested media queued for search",
        ),
        &["instance"],
    )
    .unwrap()
});

/// Catalog health per instance (1 = last read succeeded).
pub static CATALOG_HEALTHY: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new(
            "arrwarden_catalog_healthy",
            "Whether the last catalog read succeeded (1) or not (0)",
        ),
        &["instance"],
    )
    .unwrap()
});

/// Self-restarts since the process started.
pub static RESTARTS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "arrwarden_restarts_total",
        "Worker restarts triggered by the restart timer",
    )
    .unwrap()
});

// =============================================================================
// Registration
// =============================================================================

fn register(registry: &Registry, collector: Box<dyn Collector>) {
    if let Err(e) = registry.register(collector) {
        warn!("Failed to register metric: {}", e);
    }
}

fn register_metrics(registry: &Registry) {
    // HTTP
    register(registry, Box::new(HTTP_REQUEST_DURATION.clone()));
    register(registry, Box::new(HTTP_REQUESTS_TOTAL.clone()));
    register(registry, Box::new(HTTP_REQUESTS_IN_FLIGHT.clone()));

    // Workers
    register(registry, Box::new(WORKERS_RUNNING.clone()));
    register(registry, Box::new(INSTANCES_SKIPPED.clone()));
    register(registry, Box::new(SEARCH_COOLDOWNS.clone()));
    register(registry, Box::new(SEARCH_PENDING_REQUESTS.clone()));
    register(registry, Box::new(CATALOG_HEALTHY.clone()));
    register(registry, Box::new(RESTARTS_TOTAL.clone()));

    // Core metrics (monitor, search, cycles, connectivity)
    for metric in arrwarden_core::metrics::all_metrics() {
        register(registry, metric);
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        warn!("Failed to encode metrics: {}", e);
    }
    String::from_utf8(buffer).unwrap_or_default()
}

/// Collect dynamic metrics from the current supervisor.
///
/// This is called before encoding metrics so the gauges reflect the
/// workers of the current run.
pub fn collect_dynamic_metrics(state: &AppState) {
    let status = state.supervisor().status();
    WORKERS_RUNNING.set(status.workers.len() as i64);
    INSTANCES_SKIPPED.set(status.skipped.len() as i64);

    // Instances may disappear across restarts.
    SEARCH_COOLDOWNS.reset();
    SEARCH_PENDING_REQUESTS.reset();
    CATALOG_HEALTHY.reset();
    for worker in &status.workers {
        if let Some(search) = &worker.search {
            let labels = [worker.instance.as_str()];
            SEARCH_COOLDOWNS
                .with_label_values(&labels)
                .set(search.tracked_cooldowns as i64);
            SEARCH_PENDING_REQUESTS
                .with_label_values(&labels)
                .set(search.pending_requests as i64);
            CATALOG_HEALTHY
                .with_label_values(&labels)
                .set(if search.catalog_healthy { 1 } else { 0 });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_metrics_returns_prometheus_format() {
        HTTP_REQUESTS_TOTAL
            .with_label_values(&["GET", "/test", "200"])
            .inc();

        let output = encode_metrics();
        assert!(output.contains("arrwarden_http_requests_total"));
        assert!(output.contains("# HELP"));
        assert!(output.contains("# TYPE"));
    }

    #[test]
    fn test_registry_contains_worker_and_core_metrics() {
        // Prometheus only outputs vectors that have been accessed
        WORKERS_RUNNING.set(0);
        INSTANCES_SKIPPED.set(0);
        RESTARTS_TOTAL.inc_by(0);
        SEARCH_COOLDOWNS.with_label_values(&["tv"]).set(0);
        arrwarden_core::metrics::CYCLE_FAILURES
            .with_label_values(&["tv", "rss_sync"])
            .inc_by(0);

        let output = encode_metrics();
        assert!(output.contains("arrwarden_workers_running"));
        assert!(output.contains("arrwarden_instances_skipped"));
        assert!(output.contains("arrwarden_restarts_total"));
        assert!(output.contains("arrwarden_search_cooldowns"));
        assert!(output.contains("arrwarden_cycle_failures_total"));
        assert!(output.contains("arrwarden_connectivity_online"));
    }
}
