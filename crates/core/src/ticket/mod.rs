//! Support tickets: lifecycle, storage, masking and the caller-facing service.

mod mask;
mod service;
mod sqlite_store;
mod store;
mod types;

pub use mask::{apply_mask, can_view, masked, Maskable, MaskableFields};
pub use service::{
    AgentEdit, SubmitTicket, TicketPage, TicketService, DESCRIPTION_MAX_CHARS,
    DESCRIPTION_MIN_CHARS, TITLE_MAX_CHARS, TITLE_MIN_CHARS,
};
pub use sqlite_store::SqliteTicketStore;
pub use store::{CreateTicketRequest, TicketError, TicketFilter, TicketStore, TicketUpdate};
pub use types::{Category, Ticket, TicketStatus, TicketSummary, Urgency};
