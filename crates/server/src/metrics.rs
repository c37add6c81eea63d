//! Prometheus metrics for observability.
//!
//! This module provides metrics for monitoring the triage server:
//! - HTTP request metrics (latency, counts, errors)
//! - WebSocket connection metrics
//! - Ticket, queue and worker status (collected dynamically)
//!
//! Core metrics (worker outcomes, analysis latency, events) live in
//! `triage_core::metrics` and are registered here.

use once_cell::sync::Lazy;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec,
    Opts, Registry, TextEncoder,
};
use triage_core::{TicketFilter, TicketStatus};

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
            "triage_http_request_duration_seconds",
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
        Opts::new("triage_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests currently in flight.
pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "triage_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
    )
    .unwrap()
});

/// Authentication failures.
pub static AUTH_FAILURES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("triage_auth_failures_total", "Total authentication failures"),
        &["reason"],
    )
    .unwrap()
});

// =============================================================================
// WebSocket Metrics
// =============================================================================

/// Active WebSocket connections.
pub static WS_CONNECTIONS_ACTIVE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "triage_ws_connections_active",
        "Number of active WebSocket connections",
    )
    .unwrap()
});

/// Total WebSocket connections (cumulative).
pub static WS_CONNECTIONS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "triage_ws_connections_total",
        "Total WebSocket connections since startup",
    )
    .unwrap()
});

/// WebSocket messages sent by type.
pub static WS_MESSAGES_SENT: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("triage_ws_messages_sent_total", "WebSocket messages sent"),
        &["type"],
    )
    .unwrap()
});

// =============================================================================
// Ticket / Queue / Worker Metrics (collected dynamically)
// =============================================================================

/// Tickets by current status.
pub static TICKETS_BY_STATUS: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("triage_tickets_by_status", "Current ticket count by status"),
        &["status"],
    )
    .unwrap()
});

/// Jobs by queue state.
pub static QUEUE_JOBS: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("triage_queue_jobs", "Current job count by queue state"),
        &["state"],
    )
    .unwrap()
});

/// Worker pool running state (1 = running, 0 = stopped).
pub static WORKER_RUNNING: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "triage_worker_running",
        "Whether the triage worker pool is running (1) or stopped (0)",
    )
    .unwrap()
});

/// Jobs currently being processed.
pub static WORKER_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "triage_worker_in_flight",
        "Number of triage jobs currently being processed",
    )
    .unwrap()
});

/// Connected live update sessions.
pub static LIVE_SESSIONS: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "triage_live_sessions",
        "Number of connected live update sessions",
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
    registry
        .register(Box::new(AUTH_FAILURES_TOTAL.clone()))
        .unwrap();

    // WebSocket
    registry
        .register(Box::new(WS_CONNECTIONS_ACTIVE.clone()))
        .unwrap();
    registry
        .register(Box::new(WS_CONNECTIONS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(WS_MESSAGES_SENT.clone()))
        .unwrap();

    // Tickets, queue, worker
    registry
        .register(Box::new(TICKETS_BY_STATUS.clone()))
        .unwrap();
    registry.register(Box::new(QUEUE_JOBS.clone())).unwrap();
    registry.register(Box::new(WORKER_RUNNING.clone())).unwrap();
    registry
        .register(Box::new(WORKER_IN_FLIGHT.clone()))
        .unwrap();
    registry.register(Box::new(LIVE_SESSIONS.clone())).unwrap();

    // Core metrics (worker outcomes, analysis, events)
    for metric in triage_core::metrics::all_metrics() {
        registry.register(metric).unwrap();
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}

/// Collect dynamic metrics from current application state.
///
/// Called before encoding so gauges reflect the stores, the queue and the
/// worker pool at scrape time.
pub fn collect_dynamic_metrics(state: &crate::state::AppState) {
    if let Some(pool) = state.worker_pool() {
        let status = pool.status();
        WORKER_RUNNING.set(if status.running { 1 } else { 0 });
        WORKER_IN_FLIGHT.set(status.in_flight as i64);
    } else {
        WORKER_RUNNING.set(0);
        WORKER_IN_FLIGHT.set(0);
    }

    if let Ok(counts) = state.queue().counts() {
        QUEUE_JOBS.with_label_values(&["waiting"]).set(counts.waiting);
        QUEUE_JOBS.with_label_values(&["active"]).set(counts.active);
        QUEUE_JOBS
            .with_label_values(&["completed"])
            .set(counts.completed);
        QUEUE_JOBS.with_label_values(&["failed"]).set(counts.failed);
    }

    LIVE_SESSIONS.set(state.gateway().active_sessions() as i64);

    let ticket_store = state.ticket_store();
    for status in TicketStatus::ALL {
        let filter = TicketFilter::new().with_status(status);
        if let Ok(count) = ticket_store.count(&filter) {
            TICKETS_BY_STATUS
                .with_label_values(&[status.as_str()])
                .set(count);
        }
    }
}

/// Normalize a path for metric labels (replace IDs with placeholders).
pub fn normalize_path(path: &str) -> String {
    let uuid_regex = regex_lite::Regex::new(
        r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}",
    )
    .unwrap();
    let numeric_regex = regex_lite::Regex::new(r"/\d+(/|$)").unwrap();

    let result = uuid_regex.replace_all(path, "{id}");
    let result = numeric_regex.replace_all(&result, "/{id}$1");
    result.to_string()
}
