//! Durable job storage.

use chrono::{DateTime, Utc};

use super::{JobCounts, JobFilter, QueueError, TriageJob};

/// Storage backend for triage jobs.
///
/// Claiming is atomic: a waiting job is handed to at most one caller.
pub trait JobStore: Send + Sync {
    /// Add a waiting job.
    fn insert(
        &self,
        ticket_id: &str,
        max_attempts: u32,
        available_at: DateTime<Utc>,
    ) -> Result<TriageJob, QueueError>;

    /// Claim the oldest waiting job due at `now`: it becomes active and its
    /// attempt counter is incremented.
    fn claim_next(&self, now: DateTime<Utc>) -> Result<Option<TriageJob>, QueueError>;

    /// Earliest `available_at` among waiting jobs.
    fn next_due_at(&self) -> Result<Option<DateTime<Utc>>, QueueError>;

    fn mark_completed(&self, id: &str, now: DateTime<Utc>) -> Result<(), QueueError>;

    /// Return an active job to waiting, due at `available_at`.
    fn schedule_retry(
        &self,
        id: &str,
        available_at: DateTime<Utc>,
        error: &str,
    ) -> Result<(), QueueError>;

    fn mark_failed(&self, id: &str, error: &str, now: DateTime<Utc>) -> Result<(), QueueError>;

    /// Return every active job to waiting. The interrupted attempt stays
    /// counted, so a job that was on its last attempt is failed instead.
    /// Used at startup to recover jobs orphaned by a crash; returns both
    /// kinds with their new state.
    fn requeue_active(&self, now: DateTime<Utc>) -> Result<Vec<TriageJob>, QueueError>;

    /// Delete completed jobs finished before `older_than`, then all but the
    /// newest `keep`. Returns the number deleted.
    fn purge_completed(&self, older_than: DateTime<Utc>, keep: usize) -> Result<usize, QueueError>;

    fn get(&self, id: &str) -> Result<Option<TriageJob>, QueueError>;

    fn list(&self, filter: &JobFilter) -> Result<Vec<TriageJob>, QueueError>;

    fn counts(&self) -> Result<JobCounts, QueueError>;

    /// Whether the ticket has a waiting or active job.
    fn has_open_job(&self, ticket_id: &str) -> Result<bool, QueueError>;
}
