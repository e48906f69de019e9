//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Transfer monitor (decisions, client commands, probes)
//! - Search scheduler (dispatches, in-flight searches)
//! - Worker cycles and connectivity

use once_cell::sync::Lazy;
use prometheus::{
    HistogramOpts, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec, Opts,
};

// =============================================================================
// Transfer Monitor
// =============================================================================

/// Classification decisions by instance and decision.
pub static TRANSFER_DECISIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "arrwarden_transfer_decisions_total",
            "Transfer classification decisions",
        ),
        &["instance", "decision"],
    )
    .unwrap()
});

/// Commands issued by the monitor, by target command and result.
pub static CLIENT_COMMANDS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "arrwarden_monitor_commands_total",
            "Commands issued by the transfer monitor",
        ),
        &["instance", "command", "result"], // result: "ok", "error"
    )
    .unwrap()
});

/// Media probe outcomes.
pub static PROBES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("arrwarden_probes_total", "Media probe outcomes"),
        &["result"], // "valid", "invalid", "skipped"
    )
    .unwrap()
});

// =============================================================================
// Search Scheduler
// =============================================================================

/// Search dispatches by result.
pub static SEARCHES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("arrwarden_searches_total", "Search commands dispatched"),
        &["instance", "result"], // "dispatched", "failed"
    )
    .unwrap()
});

/// Searches currently holding a budget slot.
pub static SEARCHES_IN_FLIGHT: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new(
            "arrwarden_searches_in_flight",
            "Search commands still running on the back-end",
        ),
        &["instance"],
    )
    .unwrap()
});

// =============================================================================
// Workers
// =============================================================================

/// Cycle duration in seconds.
pub static CYCLE_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new("arrwarden_cycle_duration_seconds", "Duration of worker cycles")
            .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 300.0]),
        &["instance", "cycle"],
    )
    .unwrap()
});

/// Failed cycles.
pub static CYCLE_FAILURES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("arrwarden_cycle_failures_total", "Worker cycles that failed"),
        &["instance", "cycle"],
    )
    .unwrap()
});

/// Connectivity state (1 = online).
pub static CONNECTIVITY_ONLINE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "arrwarden_connectivity_online",
        "Whether any connectivity target is reachable (1) or not (0)",
    )
    .unwrap()
});

/// Get all core metrics for registration.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Monitor
        Box::new(TRANSFER_DECISIONS.clone()),
        Box::new(CLIENT_COMMANDS.clone()),
        Box::new(PROBES_TOTAL.clone()),
        // Search
        Box::new(SEARCHES_TOTAL.clone()),
        Box::new(SEARCHES_IN_FLIGHT.clone()),
        // Workers
        Box::new(CYCLE_DURATION.clone()),
        Box::new(CYCLE_FAILURES.clone()),
        Box::new(CONNECTIVITY_ONLINE.clone()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus::Registry;

    #[test]
    fn test_all_metrics_register_without_conflicts() {
        let registry = Registry::new();
        for metric in all_metrics() {
            registry.register(metric).unwrap();
        }

        TRANSFER_DECISIONS
            .with_label_values(&["sonarr", "healthy"])
            .inc();
        let names: Vec<String> = registry
            .gather()
            .iter()
            .map(|family| family.get_name().to_string())
            .collect();
        assert!(names.contains(&"arrwarden_transfer_decisions_total".to_string()));
        assert!(names.contains(&"arrwarden_connectivity_online".to_string()));
    }
}
