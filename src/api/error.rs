//! Error types and response handling for the HTTP API.
//!
//! Maps session errors onto HTTP status codes and renders them as the
//! `{ success: false, error, message }` JSON shape every route shares.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use crate::session::{ConnectError, DisconnectError, SendError, SessionStatus};

/// Errors surfaced by API handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed body or missing fields
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Connect(#[from] ConnectError),

    #[error(transparent)]
    Disconnect(#[from] DisconnectError),

    #[error(transparent)]
    Send(#[from] SendError),

    /// No pairing code or session before the deadline
    #[error("Connection attempt timed out after {seconds}s")]
    TimedOut {
        seconds: u64,
        status: Box<SessionStatus>,
    },

    #[error("API endpoint not found")]
    NotFound,
}

impl ApiError {
    /// Map error variant to appropriate HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Connect(ConnectError::InvalidPhoneNumber(_)) => StatusCode::BAD_REQUEST,
            ApiError::Connect(ConnectError::AlreadyConnecting { .. }) => StatusCode::CONFLICT,
            ApiError::Connect(ConnectError::EstablishFailed(_)) => StatusCode::BAD_GATEWAY,
            ApiError::Connect(ConnectError::Superseded) => StatusCode::CONFLICT,
            ApiError::Disconnect(_) => StatusCode::CONFLICT,
            ApiError::Send(SendError::NotConnected) => StatusCode::CONFLICT,
            ApiError::Send(SendError::Failed(_)) => StatusCode::BAD_GATEWAY,
            ApiError::TimedOut { .. } => StatusCode::GATEWAY_TIMEOUT,
            ApiError::NotFound => StatusCode::NOT_FOUND,
        }
    }

    /// Get error type string for JSON responses
    pub fn error_type(&self) -> &'static str {
        match self {
            ApiError::InvalidRequest(_) => "invalid_request",
            ApiError::Connect(ConnectError::InvalidPhoneNumber(_)) => "invalid_phone_number",
            ApiError::Connect(ConnectError::AlreadyConnecting { .. }) => "already_connecting",
            ApiError::Connect(ConnectError::EstablishFailed(_)) => "establish_failed",
            ApiError::Connect(ConnectError::Superseded) => "superseded",
            ApiError::Disconnect(DisconnectError::NoActiveSession) => "no_active_session",
            ApiError::Disconnect(DisconnectError::InProgress) => "disconnect_in_progress",
            ApiError::Send(SendError::NotConnected) => "not_connected",
            ApiError::Send(SendError::Failed(_)) => "send_failed",
            ApiError::TimedOut { .. } => "timed_out",
            ApiError::NotFound => "not_found",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut body = serde_json::json!({
            "success": false,
            "error": self.error_type(),
            "message": self.to_string(),
        });
        if let ApiError::TimedOut { status, .. } = &self {
            body["status"] = serde_json::to_value(status.as_ref()).unwrap_or_default();
        }

        (self.status_code(), Json(body)).into_response()
    }
}
