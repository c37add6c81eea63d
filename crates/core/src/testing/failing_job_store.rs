//! Job store with switchable write failures.

use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};

use crate::queue::{JobCounts, JobFilter, JobStore, QueueError, SqliteJobStore, TriageJob};

/// In-memory job store whose `insert` and `schedule_retry` can be made to
/// fail, as a locked or unavailable database would.
///
/// Everything else is delegated to a [`SqliteJobStore`].
pub struct FailingJobStore {
    inner: SqliteJobStore,
    fail_inserts: AtomicBool,
    fail_retries: AtomicBool,
}

impl FailingJobStore {
    pub fn new() -> Self {
        Self {
            inner: SqliteJobStore::in_memory().expect("in-memory job store"),
            fail_inserts: AtomicBool::new(false),
            fail_retries: AtomicBool::new(false),
        }
    }

    /// Make subsequent inserts fail (or succeed again).
    pub fn set_fail_inserts(&self, fail: bool) {
        self.fail_inserts.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent retry scheduling fail (or succeed again).
    pub fn set_fail_retries(&self, fail: bool) {
        self.fail_retries.store(fail, Ordering::SeqCst);
    }
}

impl Default for FailingJobStore {
    fn default() -> Self {
        Self::new()
    }
}

impl JobStore for FailingJobStore {
    fn insert(
        &self,
        ticket_id: &str,
        max_attempts: u32,
        available_at: DateTime<Utc>,
    ) -> Result<TriageJob, QueueError> {
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(QueueError::Database("database is locked".to_string()));
        }
        self.inner.insert(ticket_id, max_attempts, available_at)
    }

    fn claim_next(&self, now: DateTime<Utc>) -> Result<Option<TriageJob>, QueueError> {
        self.inner.claim_next(now)
    }

    fn next_due_at(&self) -> Result<Option<DateTime<Utc>>, QueueError> {
        self.inner.next_due_at()
    }

    fn mark_completed(&self, id: &str, now: DateTime<Utc>) -> Result<(), QueueError> {
        self.inner.mark_completed(id, now)
    }

    fn schedule_retry(
        &self,
        id: &str,
        available_at: DateTime<Utc>,
        error: &str,
    ) -> Result<(), QueueError> {
        if self.fail_retries.load(Ordering::SeqCst) {
            return Err(QueueError::Database("database is locked".to_string()));
        }
        self.inner.schedule_retry(id, available_at, error)
    }

    fn mark_failed(&self, id: &str, error: &str, now: DateTime<Utc>) -> Result<(), QueueError> {
        self.inner.mark_failed(id, error, now)
    }

    fn requeue_active(&self, now: DateTime<Utc>) -> Result<Vec<TriageJob>, QueueError> {
        self.inner.requeue_active(now)
    }

    fn purge_completed(&self, older_than: DateTime<Utc>, keep: usize) -> Result<usize, QueueError> {
        self.inner.purge_completed(older_than, keep)
    }

    fn get(&self, id: &str) -> Result<Option<TriageJob>, QueueError> {
        self.inner.get(id)
    }

    fn list(&self, filter: &JobFilter) -> Result<Vec<TriageJob>, QueueError> {
        self.inner.list(filter)
    }

    fn counts(&self) -> Result<JobCounts, QueueError> {
        self.inner.counts()
    }

    fn has_open_job(&self, ticket_id: &str) -> Result<bool, QueueError> {
        self.inner.has_open_job(ticket_id)
    }
}
