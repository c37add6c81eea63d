//! Job queue configuration.

use serde::{Deserialize, Serialize};

/// Configuration for the triage job queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Attempts per job before the ticket is marked FAILED.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry (milliseconds). Doubles per attempt.
    #[serde(default = "default_backoff_base")]
    pub backoff_base_ms: u64,

    /// Upper bound on the retry delay (milliseconds).
    #[serde(default = "default_backoff_max")]
    pub backoff_max_ms: u64,

    /// How long completed jobs stay inspectable (seconds).
    #[serde(default = "default_retention_secs")]
    pub completed_retention_secs: u64,

    /// Maximum number of completed jobs kept.
    #[serde(default = "default_retention_count")]
    pub completed_retention_count: usize,

    /// Longest an idle worker sleeps before checking the queue again
    /// (milliseconds). Enqueues wake it immediately.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_base() -> u64 {
    2000
}

fn default_backoff_max() -> u64 {
    60_000
}

fn default_retention_secs() -> u64 {
    3600
}

fn default_retention_count() -> usize {
    1000
}

fn default_poll_interval() -> u64 {
    1000
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base(),
            backoff_max_ms: default_backoff_max(),
            completed_retention_secs: default_retention_secs(),
            completed_retention_count: default_retention_count(),
            poll_interval_ms: default_poll_interval(),
        }
    }
}
