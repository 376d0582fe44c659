//! Boundary with the messaging-network client.
//!
//! The orchestrator never talks to the network itself. It hands an
//! [`ExternalSessionClient`] a phone number plus a [`SessionEventSink`], and
//! gets back a [`SessionHandle`] once the account is linked.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use super::phone::PhoneNumber;
use super::state::ExternalState;

/// Failure reported by the messaging client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ClientError {
    pub message: String,
}

impl ClientError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// A chat message received over the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub from: String,
    pub body: String,
}

/// Acknowledgement of a sent message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageReceipt {
    pub id: String,
}

/// Receives asynchronous events from the client for one connect attempt.
///
/// Implementations must be cheap and non-blocking; clients may call them
/// from any thread.
pub trait SessionEventSink: Send + Sync {
    fn on_code_ready(&self, code: String);
    fn on_state_change(&self, state: ExternalState);
    fn on_message(&self, message: InboundMessage);
}

/// An established connection to the messaging network.
#[async_trait]
pub trait SessionHandle: Send + Sync {
    async fn send_text(&self, to: &str, body: &str) -> Result<MessageReceipt, ClientError>;

    /// Close the connection. Must tolerate being called on a dead session.
    async fn close(&self) -> Result<(), ClientError>;
}

/// Factory for sessions.
#[async_trait]
pub trait ExternalSessionClient: Send + Sync {
    /// Start linking `phone`. May run for a long time; pairing codes and
    /// state changes are reported through `sink` while it runs.
    async fn establish(
        &self,
        phone: &PhoneNumber,
        sink: Arc<dyn SessionEventSink>,
    ) -> Result<Arc<dyn SessionHandle>, ClientError>;
}
