//! JSON error responses shared by the API handlers.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::error;
use triage_core::{queue::QueueError, TicketError};

/// Error body: `{"error": "..."}`.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// An error that renders as a status code plus [`ErrorResponse`].
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                error: self.message,
            }),
        )
            .into_response()
    }
}

impl From<TicketError> for ApiError {
    fn from(e: TicketError) -> Self {
        let status = match &e {
            TicketError::NotFound(_) => StatusCode::NOT_FOUND,
            TicketError::Forbidden(_) => StatusCode::FORBIDDEN,
            TicketError::Validation(_) => StatusCode::BAD_REQUEST,
            TicketError::InvalidState { .. } | TicketError::InvalidTransition { .. } => {
                StatusCode::CONFLICT
            }
            TicketError::Database(_) => {
                error!(error = %e, "Ticket operation failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self::new(status, e.to_string())
    }
}

impl From<QueueError> for ApiError {
    fn from(e: QueueError) -> Self {
        match e {
            QueueError::NotFound(_) => Self::new(StatusCode::NOT_FOUND, e.to_string()),
            QueueError::Database(_) => {
                error!(error = %e, "Queue operation failed");
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use triage_core::TicketStatus;

    #[test]
    fn test_ticket_error_status_codes() {
        let cases = [
            (TicketError::NotFound("t1".into()), StatusCode::NOT_FOUND),
            (TicketError::Forbidden("agents only".into()), StatusCode::FORBIDDEN),
            (TicketError::Validation("too short".into()), StatusCode::BAD_REQUEST),
            (
                TicketError::InvalidState {
                    ticket_id: "t1".into(),
                    current_state: "PROCESSING".into(),
                    operation: "cancel".into(),
                },
                StatusCode::CONFLICT,
            ),
            (
                TicketError::InvalidTransition {
                    from: TicketStatus::Resolved,
                    to: TicketStatus::Pending,
                },
                StatusCode::CONFLICT,
            ),
            (
                TicketError::Database("locked".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(ApiError::from(error).status, expected);
        }
    }

    #[test]
    fn test_queue_not_found_is_404() {
        let error = ApiError::from(QueueError::NotFound("job-1".into()));
        assert_eq!(error.status, StatusCode::NOT_FOUND);
        assert_eq!(error.message, "Job not found: job-1");
    }
}
