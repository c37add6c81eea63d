//! Ticket API handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use triage_core::ticket::{masked, AgentEdit, SubmitTicket, TicketFilter, TicketSummary, Urgency};
use triage_core::{Role, Ticket, TicketStatus};

use super::error::ApiError;
use super::middleware::AuthUser;
use crate::state::AppState;

/// Maximum allowed limit for ticket queries
const MAX_LIMIT: i64 = 1000;

/// Default limit for ticket queries
const DEFAULT_LIMIT: i64 = 100;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Query parameters for listing tickets
#[derive(Debug, Default, Deserialize)]
pub struct ListTicketsParams {
    /// Filter by status (e.g. `PENDING`)
    pub status: Option<String>,
    /// Filter by urgency; ignored for customers
    pub urgency: Option<String>,
    /// Case-insensitive title search
    pub search: Option<String>,
    /// Filter by customer; agents only
    pub customer_id: Option<String>,
    /// Maximum number of tickets to return
    pub limit: Option<i64>,
    /// Pagination offset
    pub offset: Option<i64>,
}

/// Response for listing tickets
#[derive(Debug, Serialize)]
pub struct ListTicketsResponse {
    pub tickets: Vec<Ticket>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

impl ListTicketsParams {
    fn into_filter(self, role: Role) -> Result<TicketFilter, ApiError> {
        let limit = self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
        let offset = self.offset.unwrap_or(0).max(0);

        let mut filter = TicketFilter::new().with_limit(limit).with_offset(offset);

        if let Some(status) = non_empty(self.status) {
            let status: TicketStatus = status.parse().map_err(ApiError::bad_request)?;
            filter = filter.with_status(status);
        }

        if let Some(urgency) = non_empty(self.urgency) {
            let urgency: Urgency = urgency.parse().map_err(ApiError::bad_request)?;
            filter = filter.with_urgency(urgency);
        }

        if let Some(search) = non_empty(self.search) {
            filter = filter.with_search(search);
        }

        if role == Role::Agent {
            if let Some(customer_id) = non_empty(self.customer_id) {
                filter = filter.with_customer(customer_id);
            }
        }

        Ok(filter)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

// ============================================================================
// Handlers
// ============================================================================

/// Submit a new ticket
pub async fn create_ticket(
    State(state): State<Arc<AppState>>,
    AuthUser(identity): AuthUser,
    Json(body): Json<SubmitTicket>,
) -> Result<(StatusCode, Json<Ticket>), ApiError> {
    let ticket = state.tickets().submit(&identity, body)?;
    Ok((StatusCode::CREATED, Json(masked(identity.role, ticket))))
}

/// Get a ticket by ID
pub async fn get_ticket(
    State(state): State<Arc<AppState>>,
    AuthUser(identity): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Ticket>, ApiError> {
    Ok(Json(state.tickets().get(&identity, &id)?))
}

/// List tickets with optional filters
pub async fn list_tickets(
    State(state): State<Arc<AppState>>,
    AuthUser(identity): AuthUser,
    Query(params): Query<ListTicketsParams>,
) -> Result<Json<ListTicketsResponse>, ApiError> {
    let filter = params.into_filter(identity.role)?;
    let (limit, offset) = (filter.limit, filter.offset);

    let page = state.tickets().list(&identity, filter)?;

    Ok(Json(ListTicketsResponse {
        tickets: page.tickets,
        total: page.total,
        limit,
        offset,
    }))
}

/// Ticket counts for the caller
pub async fn get_summary(
    State(state): State<Arc<AppState>>,
    AuthUser(identity): AuthUser,
) -> Result<Json<TicketSummary>, ApiError> {
    Ok(Json(state.tickets().summary(&identity)?))
}

/// Mark a triaged ticket resolved (agents only)
pub async fn resolve_ticket(
    State(state): State<Arc<AppState>>,
    AuthUser(identity): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Ticket>, ApiError> {
    Ok(Json(state.tickets().resolve(&identity, &id)?))
}

/// Cancel a ticket
pub async fn cancel_ticket(
    State(state): State<Arc<AppState>>,
    AuthUser(identity): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Ticket>, ApiError> {
    Ok(Json(state.tickets().cancel(&identity, &id)?))
}

/// Edit triage output of a completed ticket (agents only)
pub async fn edit_ticket(
    State(state): State<Arc<AppState>>,
    AuthUser(identity): AuthUser,
    Path(id): Path<String>,
    Json(body): Json<AgentEdit>,
) -> Result<Json<Ticket>, ApiError> {
    Ok(Json(state.tickets().edit(&identity, &id, body)?))
}
