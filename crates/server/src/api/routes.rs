use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use super::middleware::{auth_middleware, metrics_middleware};
use super::{handlers, jobs, stream, tickets};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // Routes that require an authenticated caller
    let protected = Router::new()
        .route("/config", get(handlers::get_config))
        // Tickets
        .route("/tickets", post(tickets::create_ticket))
        .route("/tickets", get(tickets::list_tickets))
        .route("/tickets/summary", get(tickets::get_summary))
        .route(
            "/tickets/{id}",
            get(tickets::get_ticket).patch(tickets::edit_ticket),
        )
        .route("/tickets/{id}/resolve", post(tickets::resolve_ticket))
        .route("/tickets/{id}/cancel", post(tickets::cancel_ticket))
        // Queue and worker
        .route("/jobs", get(jobs::list_jobs))
        .route("/jobs/{id}", get(jobs::get_job))
        .route("/worker/status", get(jobs::worker_status))
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            auth_middleware,
        ));

    // Health and metrics are open; the stream authenticates before upgrading
    let public = Router::new()
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::get_metrics))
        .route("/tickets/stream", get(stream::stream_handler));

    let api_routes = protected.merge(public).with_state(state);

    Router::new()
        .nest("/api/v1", api_routes)
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
