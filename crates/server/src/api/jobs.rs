//! Triage queue and worker inspection (agents only).

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use triage_core::queue::{JobCounts, JobFilter};
use triage_core::worker::PoolStatus;
use triage_core::{Identity, JobState, Role, TriageJob};

use super::error::ApiError;
use super::middleware::AuthUser;
use crate::state::AppState;

const MAX_LIMIT: i64 = 500;
const DEFAULT_LIMIT: i64 = 50;

/// Query parameters for listing jobs
#[derive(Debug, Default, Deserialize)]
pub struct ListJobsParams {
    /// Filter by queue state (`waiting`, `active`, `completed`, `failed`)
    pub state: Option<String>,
    /// Filter by ticket
    pub ticket_id: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ListJobsResponse {
    pub jobs: Vec<TriageJob>,
    pub counts: JobCounts,
}

fn require_agent(identity: &Identity) -> Result<(), ApiError> {
    if identity.role == Role::Agent {
        Ok(())
    } else {
        Err(ApiError::forbidden("agents only"))
    }
}

/// List queued jobs, newest first
pub async fn list_jobs(
    State(state): State<Arc<AppState>>,
    AuthUser(identity): AuthUser,
    Query(params): Query<ListJobsParams>,
) -> Result<Json<ListJobsResponse>, ApiError> {
    require_agent(&identity)?;

    let mut filter = JobFilter::new()
        .with_limit(params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT))
        .with_offset(params.offset.unwrap_or(0).max(0));

    if let Some(job_state) = params.state {
        let job_state: JobState = job_state.parse().map_err(ApiError::bad_request)?;
        filter = filter.with_state(job_state);
    }
    if let Some(ticket_id) = params.ticket_id {
        filter = filter.with_ticket(ticket_id);
    }

    let jobs = state.queue().list(&filter)?;
    let counts = state.queue().counts()?;

    Ok(Json(ListJobsResponse { jobs, counts }))
}

/// Get a job by ID
pub async fn get_job(
    State(state): State<Arc<AppState>>,
    AuthUser(identity): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<TriageJob>, ApiError> {
    require_agent(&identity)?;

    state
        .queue()
        .get(&id)?
        .map(Json)
        .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, format!("Job not found: {}", id)))
}

/// Worker pool status
pub async fn worker_status(
    State(state): State<Arc<AppState>>,
    AuthUser(identity): AuthUser,
) -> Result<Json<PoolStatus>, ApiError> {
    require_agent(&identity)?;

    let status = match state.worker_pool() {
        Some(pool) => pool.status(),
        None => PoolStatus {
            queue: state.queue().counts()?,
            ..Default::default()
        },
    };

    Ok(Json(status))
}
