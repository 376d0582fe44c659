use std::time::Instant;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::activity::LogEntry;
use crate::session::{ConnectError, SessionOrchestrator, SessionState, SessionStatus};

use super::error::ApiError;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: SessionOrchestrator,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(orchestrator: SessionOrchestrator) -> Self {
        Self {
            orchestrator,
            started_at: Instant::now(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub success: bool,
    pub connected: bool,
    #[serde(flatten)]
    pub status: SessionStatus,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct LogsResponse {
    pub success: bool,
    pub capacity: usize,
    pub logs: Vec<LogEntry>,
}

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub service: &'static str,
    pub uptime_seconds: u64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectRequest {
    #[serde(default)]
    pub phone_number: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

fn required(field: Option<String>) -> Option<String> {
    field.filter(|value| !value.trim().is_empty())
}

fn parse_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    body.map(|Json(value)| value)
        .map_err(|rejection| ApiError::InvalidRequest(rejection.body_text()))
}

pub async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    let status = state.orchestrator.status();
    Json(StatusResponse {
        success: true,
        connected: status.is_connected(),
        status,
        timestamp: Utc::now(),
    })
}

pub async fn logs(State(state): State<AppState>) -> Json<LogsResponse> {
    let log = state.orchestrator.log();
    Json(LogsResponse {
        success: true,
        capacity: log.capacity(),
        logs: log.snapshot(),
    })
}

pub async fn connect(
    State(state): State<AppState>,
    body: Result<Json<ConnectRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let request = parse_body(body)?;
    let phone = required(request.phone_number)
        .ok_or_else(|| ApiError::InvalidRequest("phoneNumber is required".to_string()))?;

    let status = state.orchestrator.connect(&phone).await?;
    match status.state {
        SessionState::AwaitingCode => Ok(Json(json!({
            "success": true,
            "message": "Pairing code generated. Enter it under Linked devices on the phone.",
            "pairingCode": status.pairing_code,
            "status": status,
        }))),
        SessionState::Connected => Ok(Json(json!({
            "success": true,
            "message": "Bot connected successfully",
            "pairingCode": null,
            "status": status,
        }))),
        SessionState::TimedOut => Err(ApiError::TimedOut {
            seconds: state.orchestrator.settings().pairing_timeout.as_secs(),
            status: Box::new(status),
        }),
        other => Err(ConnectError::EstablishFailed(
            status
                .last_error
                .unwrap_or_else(|| format!("attempt ended in state {}", other)),
        )
        .into()),
    }
}

pub async fn disconnect(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let status = state.orchestrator.disconnect().await?;
    Ok(Json(json!({
        "success": true,
        "message": "Bot disconnected",
        "status": status,
    })))
}

pub async fn send_message(
    State(state): State<AppState>,
    body: Result<Json<SendMessageRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let request = parse_body(body)?;
    let (Some(phone), Some(message)) = (required(request.phone), required(request.message))
    else {
        return Err(ApiError::InvalidRequest(
            "phone and message are required".to_string(),
        ));
    };

    let receipt = state.orchestrator.send_message(&phone, &message).await?;
    Ok(Json(json!({
        "success": true,
        "messageId": receipt.id,
    })))
}

/// Current pairing code, if one is waiting to be entered.
pub async fn pairing_code(State(state): State<AppState>) -> Json<Value> {
    let status = state.orchestrator.status();
    let timestamp = Utc::now();

    if let Some(code) = &status.pairing_code {
        return Json(json!({
            "success": true,
            "pairingCode": code,
            "phoneNumber": status.phone_number,
            "message": "Enter this code under Linked devices on the phone",
            "timestamp": timestamp,
        }));
    }

    let message = match status.state {
        SessionState::Connected => "Bot already connected",
        SessionState::Connecting | SessionState::Disconnecting => {
            "Pairing code not generated yet. Please wait..."
        }
        _ => "No connection in progress. Configure a phone number first.",
    };
    Json(json!({
        "success": false,
        "pairingCode": null,
        "phoneNumber": status.phone_number,
        "message": message,
        "timestamp": timestamp,
    }))
}

pub async fn health(State(state): State<AppState>) -> Json<HealthStatus> {
    Json(HealthStatus {
        status: "ok",
        service: env!("CARGO_PKG_NAME"),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        timestamp: Utc::now(),
    })
}

pub async fn not_found() -> ApiError {
    ApiError::NotFound
}
