//! In-process stand-in for the messaging client.
//!
//! Walks through the same event sequence a real client produces (opening,
//! pairing code, pairing, connected) on configurable delays, and only
//! traces outgoing messages instead of delivering them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::LoopbackConfig;

use super::client::{
    ClientError, ExternalSessionClient, MessageReceipt, SessionEventSink, SessionHandle,
};
use super::phone::PhoneNumber;
use super::state::ExternalState;

#[derive(Debug, Clone)]
pub struct LoopbackClient {
    code_delay: Duration,
    establish_delay: Duration,
}

impl LoopbackClient {
    pub fn new(config: &LoopbackConfig) -> Self {
        Self {
            code_delay: Duration::from_millis(config.code_delay_ms),
            establish_delay: Duration::from_millis(config.establish_delay_ms),
        }
    }
}

fn pairing_code() -> String {
    let raw = uuid::Uuid::new_v4().simple().to_string().to_uppercase();
    format!("{}-{}", &raw[..4], &raw[4..8])
}

#[async_trait]
impl ExternalSessionClient for LoopbackClient {
    async fn establish(
        &self,
        phone: &PhoneNumber,
        sink: Arc<dyn SessionEventSink>,
    ) -> Result<Arc<dyn SessionHandle>, ClientError> {
        tracing::debug!(phone = %phone, "Loopback session starting");
        sink.on_state_change(ExternalState::Opening);

        tokio::time::sleep(self.code_delay).await;
        sink.on_code_ready(pairing_code());
        sink.on_state_change(ExternalState::Pairing);

        tokio::time::sleep(self.establish_delay).await;
        sink.on_state_change(ExternalState::Connected);

        Ok(Arc::new(LoopbackHandle {
            phone: phone.to_string(),
            sink,
            closed: AtomicBool::new(false),
        }))
    }
}

/// Session produced by [`LoopbackClient`].
pub struct LoopbackHandle {
    phone: String,
    sink: Arc<dyn SessionEventSink>,
    closed: AtomicBool,
}

#[async_trait]
impl SessionHandle for LoopbackHandle {
    async fn send_text(&self, to: &str, body: &str) -> Result<MessageReceipt, ClientError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ClientError::new("session closed"));
        }
        tracing::info!(from = %self.phone, to = %to, chars = body.chars().count(), "Loopback message sent");
        Ok(MessageReceipt {
            id: format!("true_{}_{}", to, uuid::Uuid::new_v4().simple()),
        })
    }

    async fn close(&self) -> Result<(), ClientError> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            tracing::debug!(phone = %self.phone, "Loopback session closed");
            self.sink.on_state_change(ExternalState::Disconnected);
        }
        Ok(())
    }
}
