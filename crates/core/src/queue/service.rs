//! Queue service: durable store + retry policy + wake-ups.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Notify;
use tracing::{debug, warn};

use super::{
    JobCounts, JobFilter, JobState, JobStore, QueueConfig, QueueError, RetryPolicy, TriageJob,
};

/// The triage job queue.
///
/// Delivery is at-least-once: a job can be seen again after a crash, so
/// consumers must be idempotent.
pub struct TriageQueue {
    store: Arc<dyn JobStore>,
    policy: RetryPolicy,
    notify: Notify,
    poll_interval: Duration,
    completed_retention: chrono::Duration,
    completed_retention_count: usize,
}

impl TriageQueue {
    pub fn new(store: Arc<dyn JobStore>, config: &QueueConfig) -> Self {
        Self {
            store,
            policy: RetryPolicy::from_config(config),
            notify: Notify::new(),
            poll_interval: Duration::from_millis(config.poll_interval_ms.max(1)),
            completed_retention: to_chrono(Duration::from_secs(config.completed_retention_secs)),
            completed_retention_count: config.completed_retention_count,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Queue a triage job for a freshly created ticket.
    pub fn enqueue(&self, ticket_id: &str) -> Result<TriageJob, QueueError> {
        let job = self
            .store
            .insert(ticket_id, self.policy.max_attempts, Utc::now())?;
        debug!(job_id = %job.id, ticket_id, "Enqueued triage job");
        self.notify.notify_one();
        Ok(job)
    }

    /// Wait for and claim the next due job.
    ///
    /// Sleeps until an enqueue, the next delayed job becoming due, or the
    /// poll interval, whichever comes first. Cancel-safe: claiming is a
    /// single synchronous store call.
    pub async fn next(&self) -> Result<TriageJob, QueueError> {
        loop {
            if let Some(job) = self.store.claim_next(Utc::now())? {
                return Ok(job);
            }

            let wait = match self.store.next_due_at()? {
                Some(due) => (due - Utc::now())
                    .to_std()
                    .unwrap_or(Duration::ZERO)
                    .min(self.poll_interval),
                None => self.poll_interval,
            };

            tokio::select! {
                _ = self.notify.notified() => {}
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }

    /// Record success and trim old completed jobs.
    pub fn complete(&self, job: &TriageJob) -> Result<(), QueueError> {
        let now = Utc::now();
        self.store.mark_completed(&job.id, now)?;

        match self
            .store
            .purge_completed(now - self.completed_retention, self.completed_retention_count)
        {
            Ok(0) => {}
            Ok(purged) => debug!(purged, "Purged completed triage jobs"),
            Err(e) => warn!(error = %e, "Failed to purge completed triage jobs"),
        }
        Ok(())
    }

    /// Put the job back to run again after `delay`.
    pub fn retry(&self, job: &TriageJob, delay: Duration, error: &str) -> Result<(), QueueError> {
        let available_at = Utc::now() + to_chrono(delay);
        self.store.schedule_retry(&job.id, available_at, error)?;
        // Let a sleeping consumer recompute its wake-up time.
        self.notify.notify_one();
        Ok(())
    }

    /// Retire the job permanently.
    pub fn fail(&self, job: &TriageJob, error: &str) -> Result<(), QueueError> {
        self.store.mark_failed(&job.id, error, Utc::now())
    }

    /// Return jobs left active by a previous process to the queue.
    ///
    /// Jobs interrupted on their final attempt come back as failed; the
    /// caller owns moving their tickets to FAILED.
    pub fn recover_stalled(&self) -> Result<Vec<TriageJob>, QueueError> {
        let jobs = self.store.requeue_active(Utc::now())?;
        if jobs.iter().any(|job| job.state == JobState::Waiting) {
            self.notify.notify_one();
        }
        Ok(jobs)
    }

    pub fn has_open_job(&self, ticket_id: &str) -> Result<bool, QueueError> {
        self.store.has_open_job(ticket_id)
    }

    pub fn get(&self, id: &str) -> Result<Option<TriageJob>, QueueError> {
        self.store.get(id)
    }

    pub fn list(&self, filter: &JobFilter) -> Result<Vec<TriageJob>, QueueError> {
        self.store.list(filter)
    }

    pub fn counts(&self) -> Result<JobCounts, QueueError> {
        self.store.counts()
    }
}

/// Out-of-range durations saturate at roughly a century.
fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration)
        .unwrap_or_else(|_| chrono::Duration::days(36_500))
        .min(chrono::Duration::days(36_500))
}
