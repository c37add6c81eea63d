//! Ticket storage trait and types.

use std::fmt;

use crate::analysis::TicketAnalysis;
use crate::ticket::{Category, Ticket, TicketStatus, TicketSummary, Urgency};

/// Error type for ticket operations.
#[derive(Debug)]
pub enum TicketError {
    /// Ticket not found.
    NotFound(String),
    /// Cannot perform operation due to current state.
    InvalidState {
        ticket_id: String,
        current_state: String,
        operation: String,
    },
    /// The requested status change is not an edge of the lifecycle.
    InvalidTransition {
        from: TicketStatus,
        to: TicketStatus,
    },
    /// Caller is not allowed to perform the operation.
    Forbidden(String),
    /// Request failed input validation.
    Validation(String),
    /// Database error.
    Database(String),
}

impl fmt::Display for TicketError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TicketError::NotFound(id) => write!(f, "Ticket not found: {}", id),
            TicketError::InvalidState {
                ticket_id,
                current_state,
                operation,
            } => write!(
                f,
                "Cannot {} ticket {}: current state is {}",
                operation, ticket_id, current_state
            ),
            TicketError::InvalidTransition { from, to } => {
                write!(f, "Invalid status transition: {} -> {}", from, to)
            }
            TicketError::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
            TicketError::Validation(msg) => write!(f, "Validation error: {}", msg),
            TicketError::Database(msg) => write!(f, "Database error: {}", msg),
        }
    }
}

impl std::error::Error for TicketError {}

/// Request to create a new ticket.
#[derive(Debug, Clone)]
pub struct CreateTicketRequest {
    /// Customer submitting the ticket.
    pub customer_id: String,
    pub title: String,
    pub description: String,
}

/// Filter for querying tickets.
#[derive(Debug, Clone, Default)]
pub struct TicketFilter {
    /// Restrict to one customer's tickets.
    pub customer_id: Option<String>,
    /// Filter by status.
    pub status: Option<TicketStatus>,
    /// Match any of these statuses. Ignored when empty.
    pub statuses: Vec<TicketStatus>,
    /// Filter by triage urgency.
    pub urgency: Option<Urgency>,
    /// Case-insensitive substring match on the title.
    pub search: Option<String>,
    /// Maximum number of results.
    pub limit: i64,
    /// Offset for pagination.
    pub offset: i64,
}

impl TicketFilter {
    /// Create a new filter with defaults.
    pub fn new() -> Self {
        Self {
            customer_id: None,
            status: None,
            statuses: Vec::new(),
            urgency: None,
            search: None,
            limit: 100,
            offset: 0,
        }
    }

    /// Restrict to one customer.
    pub fn with_customer(mut self, customer_id: impl Into<String>) -> Self {
        self.customer_id = Some(customer_id.into());
        self
    }

    /// Filter by status.
    pub fn with_status(mut self, status: TicketStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Match any of several statuses.
    pub fn with_statuses(mut self, statuses: impl IntoIterator<Item = TicketStatus>) -> Self {
        self.statuses = statuses.into_iter().collect();
        self
    }

    /// Filter by urgency.
    pub fn with_urgency(mut self, urgency: Urgency) -> Self {
        self.urgency = Some(urgency);
        self
    }

    /// Filter by title substring.
    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    /// Set limit.
    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    /// Set offset.
    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }
}

/// Fields written by a conditional update. `None` leaves a column untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TicketUpdate {
    /// New status; `None` keeps the current (precondition) status.
    pub status: Option<TicketStatus>,
    pub urgency: Option<Urgency>,
    pub category: Option<Category>,
    pub sentiment: Option<u8>,
    pub resolution_response: Option<String>,
    /// `Some(None)` clears the column.
    pub draft_updated_by: Option<Option<String>>,
}

impl TicketUpdate {
    /// The single write that moves a ticket into COMPLETED with its analysis.
    pub fn completion(analysis: &TicketAnalysis) -> Self {
        Self {
            status: Some(TicketStatus::Completed),
            urgency: Some(analysis.urgency),
            category: Some(analysis.category),
            sentiment: Some(analysis.sentiment),
            resolution_response: Some(analysis.draft.clone()),
            draft_updated_by: Some(None),
        }
    }

    pub fn is_empty(&self) -> bool {
        self == &TicketUpdate::default()
    }
}

/// Trait for ticket storage backends.
///
/// Status changes are compare-and-swap writes: they apply only while the
/// ticket is still in the expected `from` status.
pub trait TicketStore: Send + Sync {
    /// Create a new ticket in PENDING.
    fn create(&self, request: CreateTicketRequest) -> Result<Ticket, TicketError>;

    /// Get a ticket by ID.
    fn find_by_id(&self, id: &str) -> Result<Option<Ticket>, TicketError>;

    /// List tickets matching the filter, newest first.
    fn list(&self, filter: &TicketFilter) -> Result<Vec<Ticket>, TicketError>;

    /// Count tickets matching the filter (ignores limit/offset).
    fn count(&self, filter: &TicketFilter) -> Result<i64, TicketError>;

    /// Set `status = to` where `id = id and status = from`.
    ///
    /// Returns the number of rows affected; 0 means the precondition no
    /// longer held. Fails with `InvalidTransition` if `from -> to` is not an
    /// edge of the lifecycle.
    fn conditional_update_status(
        &self,
        id: &str,
        from: TicketStatus,
        to: TicketStatus,
    ) -> Result<usize, TicketError>;

    /// Apply `update` where `id = id and status = from`.
    ///
    /// Returns the updated ticket, or `None` if the precondition no longer
    /// held.
    fn conditional_update(
        &self,
        id: &str,
        from: TicketStatus,
        update: &TicketUpdate,
    ) -> Result<Option<Ticket>, TicketError>;

    /// Ticket counts, scoped to one customer when given.
    fn summary(&self, customer_id: Option<&str>) -> Result<TicketSummary, TicketError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_builder() {
        let filter = TicketFilter::new()
            .with_customer("c1")
            .with_status(TicketStatus::Pending)
            .with_limit(10)
            .with_offset(20);

        assert_eq!(filter.customer_id.as_deref(), Some("c1"));
        assert_eq!(filter.status, Some(TicketStatus::Pending));
        assert_eq!(filter.limit, 10);
        assert_eq!(filter.offset, 20);
    }

    #[test]
    fn test_completion_update_sets_all_analysis_fields() {
        let analysis = TicketAnalysis {
            sentiment: 3,
            urgency: Urgency::High,
            category: Category::Billing,
            draft: "We are looking into it.".to_string(),
        };
        let update = TicketUpdate::completion(&analysis);

        assert_eq!(update.status, Some(TicketStatus::Completed));
        assert_eq!(update.urgency, Some(Urgency::High));
        assert_eq!(update.category, Some(Category::Billing));
        assert_eq!(update.sentiment, Some(3));
        assert_eq!(
            update.resolution_response.as_deref(),
            Some("We are looking into it.")
        );
        assert_eq!(update.draft_updated_by, Some(None));
        assert!(!update.is_empty());
        assert!(TicketUpdate::default().is_empty());
    }

    #[test]
    fn test_error_display() {
        let err = TicketError::InvalidTransition {
            from: TicketStatus::Processing,
            to: TicketStatus::Cancelled,
        };
        assert_eq!(
            err.to_string(),
            "Invalid status transition: PROCESSING -> CANCELLED"
        );
    }
}
