//! Single-job triage protocol.
//!
//! A job is executed as: fetch, idempotency check, claim (PENDING to
//! PROCESSING), analyze under a hard timeout, validate, then one
//! conditional completion write followed by exactly one publish. Any
//! failure after the claim rolls the ticket back to PENDING while the retry
//! budget lasts, and to FAILED once it is spent.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use super::types::{JobOutcome, TriageError};
use super::WorkerConfig;
use crate::analysis::{AnalysisError, Analyzer, TicketAnalysis};
use crate::events::EventBus;
use crate::metrics::{
    ANALYSIS_DURATION, ANALYSIS_REQUESTS, TICKET_TRANSITIONS, TRIAGE_JOBS, TRIAGE_JOB_DURATION,
    TRIAGE_RETRIES,
};
use crate::queue::{RetryDecision, TriageJob, TriageQueue};
use crate::ticket::{Ticket, TicketStatus, TicketStore, TicketUpdate};

/// Executes triage jobs. Shared by every worker task.
pub struct TriageProcessor {
    tickets: Arc<dyn TicketStore>,
    queue: Arc<TriageQueue>,
    analyzer: Arc<dyn Analyzer>,
    bus: Arc<EventBus>,
    analysis_timeout: Duration,
    processing_delay: Duration,
}

impl TriageProcessor {
    pub fn new(
        tickets: Arc<dyn TicketStore>,
        queue: Arc<TriageQueue>,
        analyzer: Arc<dyn Analyzer>,
        bus: Arc<EventBus>,
        config: &WorkerConfig,
    ) -> Self {
        Self {
            tickets,
            queue,
            analyzer,
            bus,
            analysis_timeout: Duration::from_millis(config.analysis_timeout_ms),
            processing_delay: Duration::from_millis(config.processing_delay_ms),
        }
    }

    /// Run one job to a settled outcome.
    ///
    /// The attempt runs in its own task so a panic inside it is reported as
    /// [`TriageError::Panicked`] and goes down the normal failure path.
    pub async fn handle(self: &Arc<Self>, job: TriageJob) -> JobOutcome {
        let started = Instant::now();

        let this = Arc::clone(self);
        let attempt_job = job.clone();
        let result = match tokio::spawn(async move { this.process(&attempt_job).await }).await {
            Ok(result) => result,
            Err(e) if e.is_panic() => Err(TriageError::Panicked(panic_message(e.into_panic()))),
            Err(e) => Err(TriageError::Panicked(e.to_string())),
        };

        let outcome = self.settle(&job, result);

        let label = outcome.as_str();
        TRIAGE_JOBS.with_label_values(&[label]).inc();
        TRIAGE_JOB_DURATION
            .with_label_values(&[label])
            .observe(started.elapsed().as_secs_f64());

        outcome
    }

    /// Attempt the triage of `job.ticket_id`.
    ///
    /// Returns the COMPLETED ticket, already published.
    pub async fn process(&self, job: &TriageJob) -> Result<Ticket, TriageError> {
        let ticket_id = job.ticket_id.as_str();

        let ticket = self
            .tickets
            .find_by_id(ticket_id)?
            .ok_or_else(|| TriageError::NotFound(ticket_id.to_string()))?;

        if ticket.status.is_terminal_for_triage() {
            return Err(TriageError::AlreadyProcessed {
                ticket_id: ticket.id,
                status: ticket.status,
            });
        }
        if ticket.status != TicketStatus::Pending {
            // PROCESSING: another delivery holds the claim.
            return Err(TriageError::ClaimLost(ticket.id));
        }

        let claimed = self.tickets.conditional_update_status(
            ticket_id,
            TicketStatus::Pending,
            TicketStatus::Processing,
        )?;
        if claimed == 0 {
            return Err(TriageError::ClaimLost(ticket.id));
        }
        record_transition(TicketStatus::Pending, TicketStatus::Processing);
        debug!(ticket_id, job_id = %job.id, attempt = job.attempts_made, "Claimed ticket");

        if !self.processing_delay.is_zero() {
            tokio::time::sleep(self.processing_delay).await;
        }

        let analysis = self.analyze(&ticket).await?;

        let completed = self
            .tickets
            .conditional_update(
                ticket_id,
                TicketStatus::Processing,
                &TicketUpdate::completion(&analysis),
            )?
            .ok_or_else(|| TriageError::ClaimLost(ticket_id.to_string()))?;
        record_transition(TicketStatus::Processing, TicketStatus::Completed);

        self.bus.publish_ticket(&completed);

        info!(
            ticket_id,
            job_id = %job.id,
            urgency = %completed.urgency.map(|u| u.as_str()).unwrap_or("-"),
            category = %completed.category.map(|c| c.as_str()).unwrap_or("-"),
            "Ticket triaged"
        );

        Ok(completed)
    }

    async fn analyze(&self, ticket: &Ticket) -> Result<TicketAnalysis, TriageError> {
        let provider = self.analyzer.provider().to_string();
        let started = Instant::now();

        let result = tokio::time::timeout(
            self.analysis_timeout,
            self.analyzer.analyze(&ticket.title, &ticket.description),
        )
        .await;

        ANALYSIS_DURATION
            .with_label_values(&[provider.as_str()])
            .observe(started.elapsed().as_secs_f64());

        let analysis = match result {
            Err(_) => {
                ANALYSIS_REQUESTS
                    .with_label_values(&[provider.as_str(), "timeout"])
                    .inc();
                return Err(TriageError::AnalysisTimeout(self.analysis_timeout));
            }
            Ok(Err(e)) => {
                let status = match &e {
                    AnalysisError::Timeout(_) => "timeout",
                    AnalysisError::Validation(_) => "invalid",
                    _ => "error",
                };
                ANALYSIS_REQUESTS
                    .with_label_values(&[provider.as_str(), status])
                    .inc();
                return Err(e.into());
            }
            Ok(Ok(analysis)) => analysis,
        };

        if let Err(e) = analysis.validate() {
            ANALYSIS_REQUESTS
                .with_label_values(&[provider.as_str(), "invalid"])
                .inc();
            return Err(e.into());
        }

        ANALYSIS_REQUESTS
            .with_label_values(&[provider.as_str(), "success"])
            .inc();
        Ok(analysis)
    }

    /// Apply the retry policy to a finished attempt and retire or requeue
    /// the job.
    pub fn settle(&self, job: &TriageJob, result: Result<Ticket, TriageError>) -> JobOutcome {
        let error = match result {
            Ok(_) => {
                if let Err(e) = self.queue.complete(job) {
                    error!(job_id = %job.id, error = %e, "Failed to mark triage job completed");
                }
                return JobOutcome::Completed;
            }
            Err(error) => error,
        };

        if !error.is_retryable() {
            debug!(job_id = %job.id, ticket_id = %job.ticket_id, reason = %error, "Dropping triage job");
            if let Err(e) = self.queue.complete(job) {
                error!(job_id = %job.id, error = %e, "Failed to retire dropped triage job");
            }
            return JobOutcome::Dropped;
        }

        let message = error.to_string();

        match self.queue.policy().decide(job) {
            RetryDecision::Retry(delay) => match self.roll_back(job, TicketStatus::Pending) {
                Rollback::Lost => self.abandon(job, &message),
                Rollback::Moved | Rollback::Unclaimed => self.reschedule(job, delay, &message),
            },
            RetryDecision::Exhausted => match self.roll_back(job, TicketStatus::Failed) {
                Rollback::Lost => self.abandon(job, &message),
                Rollback::Unclaimed => {
                    // The ticket never left PENDING, so no attempt reached the analyzer.
                    debug!(
                        ticket_id = %job.ticket_id,
                        job_id = %job.id,
                        "Final attempt failed before claiming the ticket"
                    );
                    let delay = self.queue.policy().backoff(job.attempts_made);
                    self.reschedule(job, delay, &message)
                }
                Rollback::Moved => {
                    if let Err(e) = self.queue.fail(job, &message) {
                        error!(job_id = %job.id, error = %e, "Failed to mark triage job failed");
                    }
                    error!(
                        ticket_id = %job.ticket_id,
                        job_id = %job.id,
                        attempts = job.attempts_made,
                        error = %message,
                        "Triage failed, retry budget exhausted"
                    );
                    JobOutcome::Failed {
                        attempts: job.attempts_made,
                    }
                }
            },
        }
    }

    /// Put the job back in the queue with the ticket already PENDING.
    ///
    /// If the queue write fails the job is retired instead of being left
    /// active; the PENDING ticket is then re-enqueued by recovery.
    fn reschedule(&self, job: &TriageJob, delay: Duration, message: &str) -> JobOutcome {
        if let Err(e) = self.queue.retry(job, delay, message) {
            error!(job_id = %job.id, error = %e, "Failed to schedule triage retry");
            if let Err(e) = self
                .queue
                .fail(job, &format!("retry not scheduled: {}", message))
            {
                error!(job_id = %job.id, error = %e, "Failed to retire unschedulable triage job");
            }
            return JobOutcome::Abandoned;
        }

        TRIAGE_RETRIES.inc();
        warn!(
            ticket_id = %job.ticket_id,
            job_id = %job.id,
            attempt = job.attempts_made,
            max_attempts = job.max_attempts,
            retry_in_ms = delay.as_millis() as u64,
            error = %message,
            "Triage attempt failed, will retry"
        );
        JobOutcome::Retried {
            attempt: job.attempts_made,
            delay,
        }
    }

    /// Move the ticket out of PROCESSING.
    fn roll_back(&self, job: &TriageJob, to: TicketStatus) -> Rollback {
        match self
            .tickets
            .conditional_update_status(&job.ticket_id, TicketStatus::Processing, to)
        {
            Ok(0) => match self.tickets.find_by_id(&job.ticket_id) {
                Ok(Some(ticket)) if ticket.status == TicketStatus::Pending => Rollback::Unclaimed,
                _ => Rollback::Lost,
            },
            Ok(_) => {
                record_transition(TicketStatus::Processing, to);
                Rollback::Moved
            }
            Err(e) => {
                error!(ticket_id = %job.ticket_id, error = %e, "Failed to roll back ticket status");
                Rollback::Lost
            }
        }
    }

    fn abandon(&self, job: &TriageJob, message: &str) -> JobOutcome {
        warn!(
            ticket_id = %job.ticket_id,
            job_id = %job.id,
            error = %message,
            "Ticket left PROCESSING during triage, abandoning job"
        );
        if let Err(e) = self.queue.fail(job, &format!("abandoned: {}", message)) {
            error!(job_id = %job.id, error = %e, "Failed to retire abandoned triage job");
        }
        JobOutcome::Abandoned
    }
}

/// Result of moving a ticket out of PROCESSING after a failed attempt.
enum Rollback {
    Moved,
    /// Still PENDING: the attempt failed before the claim.
    Unclaimed,
    /// Someone else moved the ticket, or the write failed.
    Lost,
}

fn record_transition(from: TicketStatus, to: TicketStatus) {
    TICKET_TRANSITIONS
        .with_label_values(&[from.as_str(), to.as_str()])
        .inc();
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
