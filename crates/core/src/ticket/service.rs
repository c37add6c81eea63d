//! Ticket operations as seen by callers: submission, reads and agent actions.
//!
//! Every read goes through [`masked`] and every agent-driven transition
//! publishes exactly one event after its conditional write succeeds.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{
    can_view, masked, CreateTicketRequest, Category, Ticket, TicketError, TicketFilter,
    TicketStatus, TicketStore, TicketSummary, TicketUpdate, Urgency,
};
use crate::auth::{Identity, Role};
use crate::events::EventBus;
use crate::metrics::{TICKETS_SUBMITTED, TICKET_TRANSITIONS};
use crate::queue::TriageQueue;

pub const TITLE_MIN_CHARS: usize = 3;
pub const TITLE_MAX_CHARS: usize = 100;
pub const DESCRIPTION_MIN_CHARS: usize = 10;
pub const DESCRIPTION_MAX_CHARS: usize = 1000;

/// Statuses a customer sees reported as PENDING.
const MASKED_AS_PENDING: [TicketStatus; 4] = [
    TicketStatus::Pending,
    TicketStatus::Processing,
    TicketStatus::Completed,
    TicketStatus::Failed,
];

/// A new ticket as submitted by a caller.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitTicket {
    pub title: String,
    pub description: String,
    /// Only agents may submit on behalf of a customer.
    #[serde(default)]
    pub customer_id: Option<String>,
}

/// Agent changes to a triaged ticket. Absent fields are left alone.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AgentEdit {
    pub urgency: Option<Urgency>,
    pub category: Option<Category>,
    pub sentiment: Option<u8>,
    pub resolution_response: Option<String>,
}

/// One page of tickets plus the total matching count.
#[derive(Debug, Clone, Serialize)]
pub struct TicketPage {
    pub tickets: Vec<Ticket>,
    pub total: i64,
}

/// Front door for ticket reads and writes.
pub struct TicketService {
    store: Arc<dyn TicketStore>,
    queue: Arc<TriageQueue>,
    bus: Arc<EventBus>,
}

impl TicketService {
    pub fn new(store: Arc<dyn TicketStore>, queue: Arc<TriageQueue>, bus: Arc<EventBus>) -> Self {
        Self { store, queue, bus }
    }

    pub fn store(&self) -> &Arc<dyn TicketStore> {
        &self.store
    }

    /// Create a ticket in PENDING and enqueue exactly one triage job for it.
    ///
    /// Creation is not published. If the enqueue fails the ticket is still
    /// returned: it stays PENDING and crash recovery queues it on the next
    /// start.
    pub fn submit(&self, identity: &Identity, request: SubmitTicket) -> Result<Ticket, TicketError> {
        let title = request.title.trim().to_string();
        let description = request.description.trim().to_string();
        validate_length("title", &title, TITLE_MIN_CHARS, TITLE_MAX_CHARS)?;
        validate_length(
            "description",
            &description,
            DESCRIPTION_MIN_CHARS,
            DESCRIPTION_MAX_CHARS,
        )?;

        let customer_id = match (identity.role, request.customer_id) {
            (Role::Agent, Some(customer_id)) if !customer_id.trim().is_empty() => {
                customer_id.trim().to_string()
            }
            (Role::Customer, Some(customer_id)) if customer_id != identity.user_id => {
                return Err(TicketError::Forbidden(
                    "customers can only submit their own tickets".to_string(),
                ));
            }
            _ => identity.user_id.clone(),
        };

        let ticket = self.store.create(CreateTicketRequest {
            customer_id,
            title,
            description,
        })?;
        TICKETS_SUBMITTED.inc();

        match self.queue.enqueue(&ticket.id) {
            Ok(job) => {
                info!(
                    ticket_id = %ticket.id,
                    job_id = %job.id,
                    customer_id = %ticket.customer_id,
                    "Ticket submitted"
                );
                Ok(ticket)
            }
            Err(e) => {
                warn!(
                    ticket_id = %ticket.id,
                    error = %e,
                    "Ticket created but triage enqueue failed; it will be queued on next start"
                );
                Ok(ticket)
            }
        }
    }

    /// Fetch one ticket, masked for the caller.
    ///
    /// Another customer's ticket is reported as not found.
    pub fn get(&self, identity: &Identity, id: &str) -> Result<Ticket, TicketError> {
        let ticket = self.find_visible(identity, id)?;
        Ok(masked(identity.role, ticket))
    }

    /// List tickets visible to the caller, masked.
    ///
    /// Customers are scoped to their own tickets. Their status filter
    /// matches the status they would see, and the urgency filter is ignored
    /// since urgency is hidden from them.
    pub fn list(&self, identity: &Identity, filter: TicketFilter) -> Result<TicketPage, TicketError> {
        let mut filter = filter;

        if identity.role == Role::Customer {
            filter.customer_id = Some(identity.user_id.clone());
            filter.urgency = None;
            filter.statuses.clear();
            match filter.status {
                Some(TicketStatus::Pending) => {
                    filter.status = None;
                    filter.statuses = MASKED_AS_PENDING.to_vec();
                }
                Some(TicketStatus::Resolved) | Some(TicketStatus::Cancelled) | None => {}
                Some(_) => {
                    return Ok(TicketPage {
                        tickets: Vec::new(),
                        total: 0,
                    })
                }
            }
        }

        let total = self.store.count(&filter)?;
        let tickets = self
            .store
            .list(&filter)?
            .into_iter()
            .map(|ticket| masked(identity.role, ticket))
            .collect();

        Ok(TicketPage { tickets, total })
    }

    /// Agent marks a triaged ticket as resolved.
    pub fn resolve(&self, identity: &Identity, id: &str) -> Result<Ticket, TicketError> {
        require_agent(identity, "resolve tickets")?;

        let update = TicketUpdate {
            status: Some(TicketStatus::Resolved),
            ..Default::default()
        };
        let ticket = self
            .store
            .conditional_update(id, TicketStatus::Completed, &update)?
            .ok_or_else(|| self.lost_race(id, "resolve"))?;

        self.record_transition(&ticket, TicketStatus::Completed, identity);
        Ok(ticket)
    }

    /// Cancel a ticket that is not being processed or already closed.
    ///
    /// Customers may cancel their own tickets; agents may cancel any.
    pub fn cancel(&self, identity: &Identity, id: &str) -> Result<Ticket, TicketError> {
        let current = self.find_visible(identity, id)?;

        if !current.status.can_transition_to(TicketStatus::Cancelled) {
            return Err(TicketError::InvalidState {
                ticket_id: id.to_string(),
                current_state: current.status.to_string(),
                operation: "cancel".to_string(),
            });
        }

        let update = TicketUpdate {
            status: Some(TicketStatus::Cancelled),
            ..Default::default()
        };
        let ticket = self
            .store
            .conditional_update(id, current.status, &update)?
            .ok_or_else(|| self.lost_race(id, "cancel"))?;

        self.record_transition(&ticket, current.status, identity);
        Ok(masked(identity.role, ticket))
    }

    /// Agent edits the triage output of a COMPLETED ticket.
    pub fn edit(&self, identity: &Identity, id: &str, edit: AgentEdit) -> Result<Ticket, TicketError> {
        require_agent(identity, "edit tickets")?;

        if let Some(sentiment) = edit.sentiment {
            if !(1..=10).contains(&sentiment) {
                return Err(TicketError::Validation(format!(
                    "sentiment must be between 1 and 10, got {}",
                    sentiment
                )));
            }
        }
        if let Some(ref response) = edit.resolution_response {
            if response.trim().is_empty() {
                return Err(TicketError::Validation(
                    "resolution_response must not be empty".to_string(),
                ));
            }
        }

        let current = self
            .store
            .find_by_id(id)?
            .ok_or_else(|| TicketError::NotFound(id.to_string()))?;

        if current.status != TicketStatus::Completed {
            return Err(TicketError::InvalidState {
                ticket_id: id.to_string(),
                current_state: current.status.to_string(),
                operation: "edit".to_string(),
            });
        }

        let response_changed = edit
            .resolution_response
            .as_ref()
            .is_some_and(|response| current.resolution_response.as_ref() != Some(response));

        let update = TicketUpdate {
            status: None,
            urgency: edit.urgency,
            category: edit.category,
            sentiment: edit.sentiment,
            resolution_response: edit.resolution_response,
            draft_updated_by: response_changed.then(|| Some(identity.user_id.clone())),
        };

        if update.is_empty() {
            return Err(TicketError::Validation("no fields to update".to_string()));
        }

        let ticket = self
            .store
            .conditional_update(id, TicketStatus::Completed, &update)?
            .ok_or_else(|| self.lost_race(id, "edit"))?;

        info!(ticket_id = %ticket.id, agent = %identity.user_id, "Ticket edited");
        self.bus.publish_ticket(&ticket);
        Ok(ticket)
    }

    /// Ticket counts, scoped to the caller for customers.
    pub fn summary(&self, identity: &Identity) -> Result<TicketSummary, TicketError> {
        match identity.role {
            Role::Agent => self.store.summary(None),
            Role::Customer => self.store.summary(Some(&identity.user_id)),
        }
    }

    fn find_visible(&self, identity: &Identity, id: &str) -> Result<Ticket, TicketError> {
        match self.store.find_by_id(id)? {
            Some(ticket) if can_view(identity, &ticket.customer_id) => Ok(ticket),
            _ => Err(TicketError::NotFound(id.to_string())),
        }
    }

    /// Build the error for a conditional write that matched no row.
    fn lost_race(&self, id: &str, operation: &str) -> TicketError {
        match self.store.find_by_id(id) {
            Ok(Some(ticket)) => TicketError::InvalidState {
                ticket_id: id.to_string(),
                current_state: ticket.status.to_string(),
                operation: operation.to_string(),
            },
            Ok(None) => TicketError::NotFound(id.to_string()),
            Err(e) => e,
        }
    }

    fn record_transition(&self, ticket: &Ticket, from: TicketStatus, identity: &Identity) {
        TICKET_TRANSITIONS
            .with_label_values(&[from.as_str(), ticket.status.as_str()])
            .inc();
        info!(
            ticket_id = %ticket.id,
            from = %from,
            to = %ticket.status,
            user_id = %identity.user_id,
            "Ticket status changed"
        );
        let receivers = self.bus.publish_ticket(ticket);
        debug!(ticket_id = %ticket.id, receivers, "Published ticket update");
    }
}

fn require_agent(identity: &Identity, action: &str) -> Result<(), TicketError> {
    if identity.is_agent() {
        Ok(())
    } else {
        Err(TicketError::Forbidden(format!("only agents can {}", action)))
    }
}

fn validate_length(field: &str, value: &str, min: usize, max: usize) -> Result<(), TicketError> {
    let len = value.chars().count();
    if len < min || len > max {
        return Err(TicketError::Validation(format!(
            "{} must be between {} and {} characters",
            field, min, max
        )));
    }
    Ok(())
}
