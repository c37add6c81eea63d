//! Types for the triage worker.

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::analysis::AnalysisError;
use crate::queue::JobCounts;
use crate::ticket::{TicketError, TicketStatus};

/// Why a triage attempt did not complete.
#[derive(Debug, Clone, Error)]
pub enum TriageError {
    /// The ticket no longer exists.
    #[error("ticket not found: {0}")]
    NotFound(String),

    /// Redelivery for a ticket triage already settled.
    #[error("ticket {ticket_id} already processed ({status})")]
    AlreadyProcessed {
        ticket_id: String,
        status: TicketStatus,
    },

    /// Another worker or an agent changed the ticket first.
    #[error("lost claim on ticket {0}")]
    ClaimLost(String),

    #[error("analysis timed out after {0:?}")]
    AnalysisTimeout(Duration),

    #[error("analysis provider error: {0}")]
    AnalysisProvider(String),

    #[error("analysis result rejected: {0}")]
    AnalysisValidation(String),

    #[error("persistence error: {0}")]
    Persistence(String),

    /// The job task panicked.
    #[error("triage task panicked: {0}")]
    Panicked(String),
}

impl TriageError {
    /// Whether the failure counts against the retry budget.
    ///
    /// The other variants mean there is nothing left to do for this job.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            TriageError::NotFound(_)
                | TriageError::AlreadyProcessed { .. }
                | TriageError::ClaimLost(_)
        )
    }
}

impl From<AnalysisError> for TriageError {
    fn from(e: AnalysisError) -> Self {
        match e {
            AnalysisError::Timeout(after) => TriageError::AnalysisTimeout(after),
            AnalysisError::Validation(msg) => TriageError::AnalysisValidation(msg),
            AnalysisError::Provider(msg) | AnalysisError::NotConfigured(msg) => {
                TriageError::AnalysisProvider(msg)
            }
        }
    }
}

impl From<TicketError> for TriageError {
    fn from(e: TicketError) -> Self {
        match e {
            TicketError::NotFound(id) => TriageError::NotFound(id),
            other => TriageError::Persistence(other.to_string()),
        }
    }
}

/// How a job ended, as recorded in metrics and logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// Ticket moved to COMPLETED and one event was published.
    Completed,
    /// Nothing to do: missing ticket, already settled or claim lost.
    Dropped,
    /// Ticket rolled back to PENDING; the job runs again after `delay`.
    Retried { attempt: u32, delay: Duration },
    /// Budget exhausted; ticket moved to FAILED.
    Failed { attempts: u32 },
    /// The ticket left PROCESSING under us; the job was retired untouched.
    Abandoned,
}

impl JobOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobOutcome::Completed => "completed",
            JobOutcome::Dropped => "dropped",
            JobOutcome::Retried { .. } => "retry",
            JobOutcome::Failed { .. } => "failed",
            JobOutcome::Abandoned => "abandoned",
        }
    }
}

/// Current status of the worker pool.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PoolStatus {
    /// Whether the pool is running.
    pub running: bool,
    /// Jobs currently executing.
    pub in_flight: usize,
    /// Maximum concurrent jobs.
    pub concurrency: usize,
    /// Jobs per queue state.
    pub queue: JobCounts,
}
