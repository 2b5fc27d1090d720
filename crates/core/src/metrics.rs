//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Import sessions (judgments, commits, skips, merges, splits)
//! - Pipeline engine (stage latency, aborts)
//! - External services (lookup) and file placement

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts};

// =============================================================================
// Session Metrics
// =============================================================================

/// Tasks produced by the source reader.
pub static TASKS_READ: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("webimport_tasks_read_total", "Total tasks read from source paths"),
        &["kind"], // "album", "singleton", "sentinel"
    )
    .unwrap()
});

/// Judge stage outcomes.
pub static JUDGMENTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("webimport_judgments_total", "Judge stage outcomes"),
        &["outcome"], // "auto_applied", "pending", "quiet_skipped"
    )
    .unwrap()
});

/// Tasks committed to the library.
pub static TASKS_COMMITTED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("webimport_tasks_committed_total", "Total tasks committed"),
        &["kind"],
    )
    .unwrap()
});

/// Tasks skipped, by operator or policy.
pub static TASKS_SKIPPED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("webimport_tasks_skipped_total", "Total tasks skipped").unwrap()
});

/// Duplicate merges performed.
pub static MERGES: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("webimport_merges_total", "Total duplicate merges").unwrap()
});

/// Albums split into singleton tracks.
pub static SPLITS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("webimport_splits_total", "Total albums split into tracks").unwrap()
});

/// Tasks currently waiting for an operator.
pub static PENDING_TASKS: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "webimport_pending_tasks",
        "Tasks waiting for operator attention",
    )
    .unwrap()
});

// =============================================================================
// Pipeline Metrics
// =============================================================================

/// Time spent inside a single stage call.
pub static STAGE_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "webimport_stage_duration_seconds",
            "Duration of a single stage invocation",
        )
        .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0]),
        &["stage"],
    )
    .unwrap()
});

/// Pipeline runs aborted by a fatal stage error.
pub static PIPELINE_ABORTS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("webimport_pipeline_aborts_total", "Total aborted pipeline runs").unwrap()
});

/// Files placed into the library directory.
pub static FILES_PLACED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("webimport_files_placed_total", "Total file placements"),
        &["result"], // "copied", "moved", "unchanged", "failed"
    )
    .unwrap()
});

// =============================================================================
// External Service Metrics
// =============================================================================

/// External service request duration.
pub static EXTERNAL_SERVICE_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "webimport_external_service_duration_seconds",
            "Duration of external service calls",
        )
        .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        &["service", "operation"],
    )
    .unwrap()
});

/// External service requests total.
pub static EXTERNAL_SERVICE_REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "webimport_external_service_requests_total",
            "Total external service requests",
        ),
        &["service", "operation", "status"], // status: "success", "error"
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Session
        Box::new(TASKS_READ.clone()),
        Box::new(JUDGMENTS.clone()),
        Box::new(TASKS_COMMITTED.clone()),
        Box::new(TASKS_SKIPPED.clone()),
        Box::new(MERGES.clone()),
        Box::new(SPLITS.clone()),
        Box::new(PENDING_TASKS.clone()),
        // Pipeline
        Box::new(STAGE_DURATION.clone()),
        Box::new(PIPELINE_ABORTS.clone()),
        Box::new(FILES_PLACED.clone()),
        // External services
        Box::new(EXTERNAL_SERVICE_DURATION.clone()),
        Box::new(EXTERNAL_SERVICE_REQUESTS.clone()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_metrics_register_without_conflict() {
        let registry = prometheus::Registry::new();
        for metric in all_metrics() {
            registry.register(metric).unwrap();
        }
        JUDGMENTS.with_label_values(&["pending"]).inc();
        assert!(!registry.gather().is_empty());
    }
}
