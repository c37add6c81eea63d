//! Ticket change events: the in-process bus and the live update gateway.

mod bus;
mod gateway;
mod types;

pub use bus::EventBus;
pub use gateway::{LiveSession, LiveUpdateGateway, SessionInfo};
pub use types::{EventsConfig, TriageEvent, TICKETS_UPDATED_CHANNEL};
