//! Roll Call error types.
//!
//! `SessionError` is the closed set of outcomes the session coordinator can
//! report for a well-formed request. Everything else (storage, display,
//! channel policy) is a `RollCallError`. All errors map to HTTP status codes
//! via the `IntoResponse` impl; internal details are logged server-side and
//! never returned to callers.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Coordinator-level failures. Each is recoverable and leaves state untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SessionError {
    /// `start` was called while a session is already active.
    #[error("An attendance session is already active")]
    SessionAlreadyActive,

    /// `submit` or `end` was called while no session is active.
    #[error("No active attendance session")]
    NoActiveSession,

    /// The submitted code does not match the code current at evaluation time.
    #[error("Invalid or expired attendance code")]
    InvalidCode,
}

/// Roll Call service error type.
///
/// Maps to HTTP status codes:
/// - `Session(SessionAlreadyActive | NoActiveSession)`: 409 Conflict
/// - `Session(InvalidCode)`: 422 Unprocessable Entity
/// - `WrongChannel`: 403 Forbidden
/// - `NotFound`: 404 Not Found
/// - `BadRequest`: 400 Bad Request
/// - `Display`: 502 Bad Gateway
/// - `Database`, `PersistenceFailed`, `Internal`: 500 Internal Server Error
#[derive(Debug, Error)]
pub enum RollCallError {
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Wrong channel: {0}")]
    WrongChannel(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Display error: {0}")]
    Display(String),

    #[error("Database error: {0}")]
    Database(String),

    /// A session was closed but its records could not be stored.
    ///
    /// The session stays closed; the entries are reported, not retried.
    #[error("Failed to persist session {session_id} ({lost} record(s) not saved)")]
    PersistenceFailed { session_id: String, lost: usize },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl RollCallError {
    /// Returns the HTTP status code for this error (for metrics recording).
    pub fn status_code(&self) -> u16 {
        match self {
            RollCallError::Session(SessionError::InvalidCode) => 422,
            RollCallError::Session(_) => 409,
            RollCallError::WrongChannel(_) => 403,
            RollCallError::NotFound(_) => 404,
            RollCallError::BadRequest(_) => 400,
            RollCallError::Display(_) => 502,
            RollCallError::Database(_)
            | RollCallError::PersistenceFailed { .. }
            | RollCallError::Internal(_) => 500,
        }
    }

    /// Returns a short, stable label for the error kind.
    pub fn code(&self) -> &'static str {
        match self {
            RollCallError::Session(SessionError::SessionAlreadyActive) => "SESSION_ALREADY_ACTIVE",
            RollCallError::Session(SessionError::NoActiveSession) => "NO_ACTIVE_SESSION",
            RollCallError::Session(SessionError::InvalidCode) => "INVALID_CODE",
            RollCallError::WrongChannel(_) => "WRONG_CHANNEL",
            RollCallError::NotFound(_) => "NOT_FOUND",
            RollCallError::BadRequest(_) => "BAD_REQUEST",
            RollCallError::Display(_) => "DISPLAY_ERROR",
            RollCallError::Database(_) => "DATABASE_ERROR",
            RollCallError::PersistenceFailed { .. } => "PERSISTENCE_FAILED",
            RollCallError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Returns a client-safe error message (no internal details).
    pub fn client_message(&self) -> String {
        match self {
            RollCallError::Session(e) => e.to_string(),
            RollCallError::WrongChannel(msg)
            | RollCallError::NotFound(msg)
            | RollCallError::BadRequest(msg) => msg.clone(),
            RollCallError::Display(_) => "The display surface is unavailable".to_string(),
            RollCallError::Database(_) | RollCallError::Internal(_) => {
                "An internal error occurred".to_string()
            }
            RollCallError::PersistenceFailed { session_id, lost } => format!(
                "Session {session_id} was closed but {lost} record(s) could not be saved"
            ),
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

impl IntoResponse for RollCallError {
    fn into_response(self) -> Response {
        match &self {
            RollCallError::Database(err) => {
                tracing::error!(target: "rc.database", error = %err, "Database operation failed");
            }
            RollCallError::Internal(err) => {
                tracing::error!(target: "rc.internal", error = %err, "Internal error");
            }
            RollCallError::Display(err) => {
                tracing::warn!(target: "rc.display", error = %err, "Display surface failed");
            }
            _ => {}
        }

        let status = StatusCode::from_u16(self.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let body = ErrorResponse {
            error: ErrorDetail {
                code: self.code().to_string(),
                message: self.client_message(),
            },
        };

        (status, Json(body)).into_response()
    }
}

/// Convert sqlx errors to `RollCallError`
impl From<sqlx::Error> for RollCallError {
    fn from(err: sqlx::Error) -> Self {
        RollCallError::Database(err.to_string())
    }
}
