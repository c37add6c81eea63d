//! Testing utilities shared by unit and integration tests.
//!
//! # Example
//!
//! ```rust,ignore
//! use triage_core::testing::{fixtures, Script, ScriptedAnalyzer};
//!
//! let analyzer = ScriptedAnalyzer::always(Script::Hang);
//! let ticket = fixtures::ticket("customer-1");
//! ```

mod failing_job_store;
mod scripted_analyzer;

pub use failing_job_store::FailingJobStore;
pub use scripted_analyzer::{RecordedCall, Script, ScriptedAnalyzer};

/// Test fixtures and helper functions.
pub mod fixtures {
    use chrono::Utc;

    use crate::analysis::TicketAnalysis;
    use crate::ticket::{Category, Ticket, TicketStatus, Urgency};

    /// A fresh PENDING ticket owned by `customer_id`.
    pub fn ticket(customer_id: &str) -> Ticket {
        let now = Utc::now();
        Ticket {
            id: uuid::Uuid::new_v4().to_string(),
            customer_id: customer_id.to_string(),
            title: "Charged twice".to_string(),
            description: "My card was billed two times this month.".to_string(),
            status: TicketStatus::Pending,
            urgency: None,
            category: None,
            sentiment: None,
            resolution_response: None,
            draft_updated_by: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// A valid analysis result.
    pub fn analysis() -> TicketAnalysis {
        TicketAnalysis {
            sentiment: 3,
            urgency: Urgency::High,
            category: Category::Billing,
            draft: "Sorry about the double charge, we are refunding it now.".to_string(),
        }
    }
}
