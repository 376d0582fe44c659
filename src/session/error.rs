use thiserror::Error;

use super::phone::PhoneError;

/// Errors returned by [`super::SessionOrchestrator::connect`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectError {
    #[error("invalid phone number: {0}")]
    InvalidPhoneNumber(#[from] PhoneError),

    #[error("a connection attempt is already in progress ({state})")]
    AlreadyConnecting { state: String },

    #[error("failed to establish session: {0}")]
    EstablishFailed(String),

    /// The attempt was cancelled by a disconnect before it resolved.
    #[error("connection attempt was cancelled")]
    Superseded,
}

/// Errors returned by [`super::SessionOrchestrator::disconnect`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DisconnectError {
    #[error("no active session")]
    NoActiveSession,

    #[error("a disconnect is already in progress")]
    InProgress,
}

/// Errors returned by [`super::SessionOrchestrator::send_message`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendError {
    #[error("bot is not connected")]
    NotConnected,

    #[error("failed to send message: {0}")]
    Failed(String),
}
