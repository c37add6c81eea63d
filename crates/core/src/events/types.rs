use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ticket::{Category, Maskable, MaskableFields, Ticket, TicketStatus, Urgency};

/// Channel carrying every externally visible ticket change.
pub const TICKETS_UPDATED_CHANNEL: &str = "tickets:updated";

/// A ticket change broadcast to live subscribers. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriageEvent {
    pub ticket_id: String,
    pub customer_id: String,
    pub status: TicketStatus,
    pub urgency: Option<Urgency>,
    pub category: Option<Category>,
    pub sentiment: Option<u8>,
    pub resolution_response: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl TriageEvent {
    /// Snapshot of a persisted ticket.
    pub fn from_ticket(ticket: &Ticket) -> Self {
        Self {
            ticket_id: ticket.id.clone(),
            customer_id: ticket.customer_id.clone(),
            status: ticket.status,
            urgency: ticket.urgency,
            category: ticket.category,
            sentiment: ticket.sentiment,
            resolution_response: ticket.resolution_response.clone(),
            updated_at: ticket.updated_at,
        }
    }
}

impl From<&Ticket> for TriageEvent {
    fn from(ticket: &Ticket) -> Self {
        Self::from_ticket(ticket)
    }
}

impl Maskable for TriageEvent {
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
}

/// Event bus and live gateway sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsConfig {
    /// Broadcast channel capacity; receivers further behind than this lag.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    /// Per-subscriber buffer; events beyond it are dropped for that subscriber.
    #[serde(default = "default_subscriber_buffer")]
    pub subscriber_buffer: usize,
}

fn default_channel_capacity() -> usize {
    256
}

fn default_subscriber_buffer() -> usize {
    64
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
            subscriber_buffer: default_subscriber_buffer(),
        }
    }
}
