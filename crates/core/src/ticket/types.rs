//! Ticket types and status lifecycle.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A customer support ticket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    /// Unique identifier (UUID).
    pub id: String,
    /// Customer who submitted the ticket.
    pub customer_id: String,
    pub title: String,
    pub description: String,
    /// Current lifecycle status.
    pub status: TicketStatus,
    /// Urgency assigned by triage.
    pub urgency: Option<Urgency>,
    /// Category assigned by triage.
    pub category: Option<Category>,
    /// Customer sentiment, 1 (angry) to 10 (happy).
    pub sentiment: Option<u8>,
    /// Drafted (or agent-edited) response.
    pub resolution_response: Option<String>,
    /// Agent who last edited the drafted response. None while the draft is
    /// the one written by triage.
    pub draft_updated_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Ticket lifecycle status.
///
/// ```text
/// PENDING ──claim──> PROCESSING ──ok──> COMPLETED ──agent──> RESOLVED
///    ^                  │  │                 │
///    └──── rollback ────┘  └─budget spent─> FAILED
///
/// PENDING | COMPLETED | FAILED ──> CANCELLED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketStatus {
    Pending,
    Processing,
    Completed,
    Resolved,
    Failed,
    Cancelled,
}

impl TicketStatus {
    pub const ALL: [TicketStatus; 6] = [
        TicketStatus::Pending,
        TicketStatus::Processing,
        TicketStatus::Completed,
        TicketStatus::Resolved,
        TicketStatus::Failed,
        TicketStatus::Cancelled,
    ];

    /// Database and wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::Pending => "PENDING",
            TicketStatus::Processing => "PROCESSING",
            TicketStatus::Completed => "COMPLETED",
            TicketStatus::Resolved => "RESOLVED",
            TicketStatus::Failed => "FAILED",
            TicketStatus::Cancelled => "CANCELLED",
        }
    }

    /// Whether `self -> to` is an edge of the lifecycle.
    pub fn can_transition_to(&self, to: TicketStatus) -> bool {
        use TicketStatus::*;
        matches!(
            (self, to),
            (Pending, Processing)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Processing, Pending)
                | (Completed, Resolved)
                | (Pending, Cancelled)
                | (Completed, Cancelled)
                | (Failed, Cancelled)
        )
    }

    /// Statuses a triage job must not touch: redelivery is a no-op.
    pub fn is_terminal_for_triage(&self) -> bool {
        matches!(
            self,
            TicketStatus::Completed
                | TicketStatus::Resolved
                | TicketStatus::Failed
                | TicketStatus::Cancelled
        )
    }

    /// RESOLVED and CANCELLED never change again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TicketStatus::Resolved | TicketStatus::Cancelled)
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TicketStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Ok(TicketStatus::Pending),
            "PROCESSING" => Ok(TicketStatus::Processing),
            "COMPLETED" => Ok(TicketStatus::Completed),
            "RESOLVED" => Ok(TicketStatus::Resolved),
            "FAILED" => Ok(TicketStatus::Failed),
            "CANCELLED" => Ok(TicketStatus::Cancelled),
            other => Err(format!("unknown ticket status: {}", other)),
        }
    }
}

/// Urgency assigned by triage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Urgency {
    Low,
    Medium,
    High,
}

impl Urgency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Urgency::Low => "LOW",
            Urgency::Medium => "MEDIUM",
            Urgency::High => "HIGH",
        }
    }
}

impl FromStr for Urgency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "LOW" => Ok(Urgency::Low),
            "MEDIUM" => Ok(Urgency::Medium),
            "HIGH" => Ok(Urgency::High),
            other => Err(format!("unknown urgency: {}", other)),
        }
    }
}

/// Category assigned by triage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Category {
    Billing,
    Technical,
    FeatureRequest,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Billing => "BILLING",
            Category::Technical => "TECHNICAL",
            Category::FeatureRequest => "FEATURE_REQUEST",
        }
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "BILLING" => Ok(Category::Billing),
            "TECHNICAL" => Ok(Category::Technical),
            "FEATURE_REQUEST" => Ok(Category::FeatureRequest),
            other => Err(format!("unknown category: {}", other)),
        }
    }
}

/// Ticket counts, optionally scoped to one customer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketSummary {
    pub total: i64,
    pub resolved: i64,
    pub unresolved: i64,
}
