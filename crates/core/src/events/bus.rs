//! Named broadcast channels for ticket events.

use std::collections::HashMap;
use std::sync::RwLock;

use tokio::sync::broadcast;
use tracing::debug;

use super::{TriageEvent, TICKETS_UPDATED_CHANNEL};
use crate::metrics::EVENTS_PUBLISHED;
use crate::ticket::Ticket;

/// In-process publish/subscribe bus.
///
/// Publishing never blocks: each channel is a bounded `broadcast` channel
/// and slow receivers lag instead of applying backpressure.
pub struct EventBus {
    channels: RwLock<HashMap<String, broadcast::Sender<TriageEvent>>>,
    capacity: usize,
}

impl EventBus {
    /// Create a bus whose channels buffer `capacity` events per receiver.
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Publish an event. Returns the number of subscribers it reached.
    pub fn publish(&self, channel: &str, event: TriageEvent) -> usize {
        EVENTS_PUBLISHED.with_label_values(&[channel]).inc();

        let channels = self.channels.read().unwrap_or_else(|e| e.into_inner());
        let Some(sender) = channels.get(channel) else {
            debug!(channel, ticket_id = %event.ticket_id, "Published event with no subscribers");
            return 0;
        };

        // Err only means there are no receivers right now.
        sender.send(event).unwrap_or(0)
    }

    /// Publish the current state of a ticket on the ticket channel.
    pub fn publish_ticket(&self, ticket: &Ticket) -> usize {
        self.publish(TICKETS_UPDATED_CHANNEL, TriageEvent::from_ticket(ticket))
    }

    /// Subscribe to a channel, creating it on first use.
    pub fn subscribe(&self, channel: &str) -> broadcast::Receiver<TriageEvent> {
        let mut channels = self.channels.write().unwrap_or_else(|e| e.into_inner());
        channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Number of live receivers on a channel.
    pub fn subscriber_count(&self, channel: &str) -> usize {
        let channels = self.channels.read().unwrap_or_else(|e| e.into_inner());
        channels
            .get(channel)
            .map(|sender| sender.receiver_count())
            .unwrap_or(0)
    }

    /// Drop every channel. Existing receivers observe `Closed`.
    pub fn close(&self) {
        let mut channels = self.channels.write().unwrap_or_else(|e| e.into_inner());
        channels.clear();
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
