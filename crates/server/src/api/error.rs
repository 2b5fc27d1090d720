//! Mapping of session errors onto HTTP responses.

use axum::{http::StatusCode, Json};
use serde::Serialize;
use tracing::error;
use webimport_core::SessionError;

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

/// Status code for a session error.
///
/// A choice the task cannot honour in its current state is a 409; a failed
/// lookup service call is a 502.
pub fn status_for(e: &SessionError) -> StatusCode {
    match e {
        SessionError::TaskNotFound(_) | SessionError::SessionNotFound(_) => StatusCode::NOT_FOUND,
        SessionError::InvalidInput(_) => StatusCode::UNPROCESSABLE_ENTITY,
        SessionError::InvalidChoice { .. } => StatusCode::CONFLICT,
        SessionError::Lookup(_) => StatusCode::BAD_GATEWAY,
        SessionError::Library(_) | SessionError::Placer(_) | SessionError::Pipeline(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl From<SessionError> for ErrorResponse {
    fn from(e: SessionError) -> Self {
        Self {
            error: e.to_string(),
        }
    }
}

pub fn session_error(e: SessionError) -> ApiError {
    let status = status_for(&e);
    if status.is_server_error() {
        error!(error = %e, "Session command failed");
    }
    (status, Json(ErrorResponse::from(e)))
}
