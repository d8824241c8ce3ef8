//! Mapping of companion errors to HTTP responses.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use companion_core::{EventDecodeError, IssueError, ReconcileError, RelayError};
use thiserror::Error;

use super::types::ErrorResponse;

/// Error returned by API handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request body could not be read.
    #[error("bad request: {message}")]
    BadRequest { message: String },

    #[error(transparent)]
    Issue(#[from] IssueError),

    #[error(transparent)]
    Relay(#[from] RelayError),

    #[error(transparent)]
    Event(#[from] EventDecodeError),

    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
        }
    }

    /// HTTP status and machine-readable error type.
    pub fn classify(&self) -> (StatusCode, &'static str) {
        match self {
            Self::BadRequest { .. } => (StatusCode::BAD_REQUEST, "bad_request"),

            Self::Issue(IssueError::InvalidRequest { .. }) => {
                (StatusCode::BAD_REQUEST, "invalid_request")
            }
            Self::Issue(IssueError::OwnerNotFound { .. }) => {
                (StatusCode::NOT_FOUND, "user_not_found")
            }
            Self::Issue(IssueError::Store { .. }) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "store_error")
            }

            Self::Relay(RelayError::NotFound { .. }) => (StatusCode::NOT_FOUND, "route_not_found"),
            Self::Relay(RelayError::Configuration { .. }) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "configuration_error")
            }
            Self::Relay(RelayError::InvalidTemplate { .. }) => {
                (StatusCode::BAD_REQUEST, "invalid_template")
            }
            Self::Relay(RelayError::Messaging(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "messaging_error")
            }

            Self::Event(EventDecodeError::TokenMismatch) => {
                (StatusCode::UNAUTHORIZED, "unauthorized")
            }
            Self::Event(_) => (StatusCode::BAD_REQUEST, "invalid_event"),

            Self::Reconcile(_) => (StatusCode::INTERNAL_SERVER_ERROR, "reconcile_error"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type) = self.classify();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, "request rejected");
        }

        let body = ErrorResponse {
            error: error_type.to_string(),
            message: self.to_string(),
            status: status.as_u16(),
        };

        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
