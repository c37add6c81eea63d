//! Worker pool configuration.

use serde::{Deserialize, Serialize};

/// Configuration for the triage worker pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Enable/disable the pool.
    /// When disabled, tickets are accepted and queued but never triaged.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Maximum jobs executing at once.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Maximum job starts per rate-limit window.
    #[serde(default = "default_rate_limit_max")]
    pub rate_limit_max: u32,

    /// Rate-limit window length (milliseconds).
    #[serde(default = "default_rate_limit_window")]
    pub rate_limit_window_ms: u64,

    /// Hard cutoff for a single analysis call (milliseconds).
    #[serde(default = "default_analysis_timeout")]
    pub analysis_timeout_ms: u64,

    /// Artificial pause between claiming a ticket and analyzing it
    /// (milliseconds). Zero in production.
    #[serde(default)]
    pub processing_delay_ms: u64,

    /// How long `stop` waits for in-flight jobs (milliseconds).
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_ms: u64,
}

fn default_enabled() -> bool {
    true
}

fn default_concurrency() -> usize {
    5
}

fn default_rate_limit_max() -> u32 {
    10
}

fn default_rate_limit_window() -> u64 {
    1000 // 1 second
}

fn default_analysis_timeout() -> u64 {
    15000 // 15 seconds
}

fn default_shutdown_grace() -> u64 {
    10000 // 10 seconds
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            concurrency: default_concurrency(),
            rate_limit_max: default_rate_limit_max(),
            rate_limit_window_ms: default_rate_limit_window(),
            analysis_timeout_ms: default_analysis_timeout(),
            processing_delay_ms: 0,
            shutdown_grace_ms: default_shutdown_grace(),
        }
    }
}
