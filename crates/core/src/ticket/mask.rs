//! Role-based field visibility.
//!
//! One rule for every read path: single fetch, list fetch and live events.
//! Customers never see triage output; they see the drafted response only
//! once an agent has resolved the ticket, and intermediate statuses are
//! reported as PENDING.

use crate::auth::{Identity, Role};
use crate::ticket::{Category, Ticket, TicketStatus, Urgency};

/// Mutable view of the fields subject to masking.
pub struct MaskableFields<'a> {
    pub status: &'a mut TicketStatus,
    pub urgency: &'a mut Option<Urgency>,
    pub category: &'a mut Option<Category>,
    pub sentiment: &'a mut Option<u8>,
    pub resolution_response: &'a mut Option<String>,
}

/// A ticket-shaped payload that can be shown to a customer.
pub trait Maskable {
    /// Owner of the underlying ticket.
    fn customer_id(&self) -> &str;

    fn maskable_fields(&mut self) -> MaskableFields<'_>;

    /// Clear fields that only agents should see beyond the shared rule.
    fn clear_internal(&mut self) {}
}

/// Apply the customer masking rule in place. Agents see everything.
pub fn apply_mask<T: Maskable>(role: Role, item: &mut T) {
    if role == Role::Agent {
        return;
    }

    item.clear_internal();

    let fields = item.maskable_fields();
    *fields.urgency = None;
    *fields.category = None;
    *fields.sentiment = None;

    if *fields.status != TicketStatus::Resolved {
        *fields.resolution_response = None;
    }

    if !matches!(
        *fields.status,
        TicketStatus::Resolved | TicketStatus::Cancelled
    ) {
        *fields.status = TicketStatus::Pending;
    }
}

/// Owned variant of [`apply_mask`].
pub fn masked<T: Maskable>(role: Role, mut item: T) -> T {
    apply_mask(role, &mut item);
    item
}

/// Whether `identity` may see a ticket owned by `customer_id`.
pub fn can_view(identity: &Identity, customer_id: &str) -> bool {
    identity.role == Role::Agent || identity.user_id == customer_id
}

impl Maskable for Ticket {
    fn customer_id(&self) -> &str {
        &self.customer_id
    }

    fn maskable_fields(&mut self) -> MaskableFields<'_> {
        MaskableFields {
            status: &mut self.status,
            urgency: &mut self.urgency,
            category: &mut self.category,
            sentiment: &mut self.sentiment,
            resolution_response: &mut self.resolution_response,
        }
    }

    fn clear_internal(&mut self) {
        self.draft_updated_by = None;
    }
}
