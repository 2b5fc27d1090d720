//! Prometheus metrics for the HTTP surface.
//!
//! Request latency and counts are recorded by the metrics middleware. Library
//! size and session state are collected on scrape. The core's session and
//! pipeline metrics are registered into the same registry.

use once_cell::sync::Lazy;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

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
            "webimport_http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
        ]),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests total count.
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("webimport_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests currently in flight.
pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "webimport_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
    )
    .unwrap()
});

// =============================================================================
// Library Metrics (collected dynamically)
// =============================================================================

pub static LIBRARY_ITEMS: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("webimport_library_items", "Number of items in the library").unwrap()
});

pub static LIBRARY_ALBUMS: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("webimport_library_albums", "Number of albums in the library").unwrap()
});

// =============================================================================
// Session Metrics (collected dynamically)
// =============================================================================

/// Whether the current session's initial run is still going (1) or not (0).
pub static SESSION_RUNNING: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "webimport_session_running",
        "Whether the current import session is running (1) or idle (0)",
    )
    .unwrap()
});

// =============================================================================
// Registration
// =============================================================================

fn register_metrics(registry: &Registry) {
    // HTTP
    registry
        .register(Box::new(HTTP_REQUEST_DURATION.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_IN_FLIGHT.clone()))
        .unwrap();

    // Library
    registry.register(Box::new(LIBRARY_ITEMS.clone())).unwrap();
    registry.register(Box::new(LIBRARY_ALBUMS.clone())).unwrap();

    // Session
    registry
        .register(Box::new(SESSION_RUNNING.clone()))
        .unwrap();

    // Core metrics (session, pipeline, external services)
    for metric in webimport_core::metrics::all_metrics() {
        registry.register(metric).unwrap();
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::warn!(error = %e, "Failed to encode metrics");
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Refresh gauges that mirror application state.
pub fn collect_dynamic_metrics(state: &crate::state::AppState) {
    if let Ok(stats) = state.library().stats() {
        LIBRARY_ITEMS.set(stats.items as i64);
        LIBRARY_ALBUMS.set(stats.albums as i64);
    }

    let running = state
        .sessions()
        .current()
        .map_or(false, |session| !session.state().is_terminal());
    SESSION_RUNNING.set(i64::from(running));
}

/// Normalize a path for metric labels (replace IDs with placeholders).
pub fn normalize_path(path: &str) -> String {
    static UUID: Lazy<regex_lite::Regex> = Lazy::new(|| {
        regex_lite::Regex::new(
            r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}",
        )
        .unwrap()
    });
    static NUMERIC: Lazy<regex_lite::Regex> =
        Lazy::new(|| regex_lite::Regex::new(r"/\d+(/|$)").unwrap());

    let result = UUID.replace_all(path, "{session}");
    let result = NUMERIC.replace_all(&result, "/{id}$1");
    result.to_string()
}
