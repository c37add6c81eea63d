//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Triage worker (job outcomes, retries, processing duration)
//! - AI analysis (provider latency and errors)
//! - Live updates (events published, events dropped for slow subscribers)

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts};

// =============================================================================
// Ticket Metrics
// =============================================================================

/// Tickets submitted total.
pub static TICKETS_SUBMITTED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("triage_tickets_submitted_total", "Total tickets submitted").unwrap()
});

/// Ticket state transitions by target status.
pub static TICKET_TRANSITIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "triage_ticket_transitions_total",
            "Total successful ticket status transitions",
        ),
        &["from", "to"],
    )
    .unwrap()
});

// =============================================================================
// Worker Metrics
// =============================================================================

/// Jobs handled by the worker, by outcome.
pub static TRIAGE_JOBS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("triage_jobs_total", "Total triage jobs handled"),
        &["outcome"], // "completed", "dropped", "retry", "failed", "abandoned"
    )
    .unwrap()
});

/// End-to-end job duration in seconds.
pub static TRIAGE_JOB_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "triage_job_duration_seconds",
            "Duration of a single triage job attempt",
        )
        .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        &["outcome"],
    )
    .unwrap()
});

/// Retries scheduled total.
pub static TRIAGE_RETRIES: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "triage_retries_total",
        "Total triage retries scheduled after a failed attempt",
    )
    .unwrap()
});

/// Stalled jobs recovered at startup.
pub static STALLED_JOBS_RECOVERED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "triage_stalled_jobs_recovered_total",
        "Total jobs found active at startup and returned to the queue",
    )
    .unwrap()
});

// =============================================================================
// Analysis Metrics
// =============================================================================

/// AI analysis call duration.
pub static ANALYSIS_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "triage_analysis_duration_seconds",
            "Duration of AI analysis calls",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 15.0, 30.0]),
        &["provider"],
    )
    .unwrap()
});

/// AI analysis calls by provider and status.
pub static ANALYSIS_REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("triage_analysis_requests_total", "Total AI analysis calls"),
        &["provider", "status"], // status: "success", "timeout", "error", "invalid"
    )
    .unwrap()
});

// =============================================================================
// Event Metrics
// =============================================================================

/// Events published on the bus.
pub static EVENTS_PUBLISHED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("triage_events_published_total", "Total events published"),
        &["channel"],
    )
    .unwrap()
});

/// Events dropped for a live session whose buffer was full or lagging.
pub static LIVE_EVENTS_DROPPED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "triage_live_events_dropped_total",
            "Total events not delivered to a live session",
        ),
        &["reason"], // "full", "lagged"
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Tickets
        Box::new(TICKETS_SUBMITTED.clone()),
        Box::new(TICKET_TRANSITIONS.clone()),
        // Worker
        Box::new(TRIAGE_JOBS.clone()),
        Box::new(TRIAGE_JOB_DURATION.clone()),
        Box::new(TRIAGE_RETRIES.clone()),
        Box::new(STALLED_JOBS_RECOVERED.clone()),
        // Analysis
        Box::new(ANALYSIS_DURATION.clone()),
        Box::new(ANALYSIS_REQUESTS.clone()),
        // Events
        Box::new(EVENTS_PUBLISHED.clone()),
        Box::new(LIVE_EVENTS_DROPPED.clone()),
    ]
}
