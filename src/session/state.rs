//! Session state machine and status snapshot.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Lifecycle of the single session slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    Idle,
    Connecting,
    AwaitingCode,
    Connected,
    Disconnecting,
    Disconnected,
    Failed,
    TimedOut,
}

impl SessionState {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Idle => "IDLE",
            SessionState::Connecting => "CONNECTING",
            SessionState::AwaitingCode => "AWAITING_CODE",
            SessionState::Connected => "CONNECTED",
            SessionState::Disconnecting => "DISCONNECTING",
            SessionState::Disconnected => "DISCONNECTED",
            SessionState::Failed => "FAILED",
            SessionState::TimedOut => "TIMED_OUT",
        }
    }

    /// States from which a new `connect` may start.
    pub fn accepts_connect(self) -> bool {
        matches!(
            self,
            SessionState::Idle
                | SessionState::Failed
                | SessionState::TimedOut
                | SessionState::Disconnected
        )
    }

    /// Transition table.
    ///
    /// `Disconnecting` doubles as the teardown step of a new `connect`, so
    /// every state that accepts a connect may enter it, and it may exit to
    /// `Idle` (teardown done) or `Disconnected` (explicit disconnect done).
    /// `Connected -> Failed` covers a client that reported the link as up
    /// and then failed before handing over a session.
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        match self {
            Idle => matches!(next, Connecting | Disconnecting),
            Connecting => matches!(
                next,
                AwaitingCode | Connected | Failed | TimedOut | Disconnecting
            ),
            AwaitingCode => matches!(
                next,
                AwaitingCode | Connected | Failed | TimedOut | Disconnecting
            ),
            Connected => matches!(next, Disconnected | Disconnecting | Failed),
            Disconnecting => matches!(next, Idle | Disconnected),
            Disconnected => matches!(next, Connected | Connecting | Disconnecting),
            Failed => matches!(next, Connecting | Disconnecting),
            TimedOut => matches!(next, Connecting | Disconnecting),
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable snapshot handed to status readers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub state: SessionState,
    pub phone_number: Option<String>,
    pub pairing_code: Option<String>,
    pub connected_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl SessionStatus {
    pub fn idle() -> Self {
        Self {
            state: SessionState::Idle,
            phone_number: None,
            pairing_code: None,
            connected_at: None,
            last_error: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state == SessionState::Connected
    }

    /// Forget everything tied to the previous attempt.
    pub(crate) fn clear(&mut self) {
        self.phone_number = None;
        self.pairing_code = None;
        self.connected_at = None;
        self.last_error = None;
    }
}

impl Default for SessionStatus {
    fn default() -> Self {
        Self::idle()
    }
}

/// State reported by the messaging client itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExternalState {
    Connected,
    Disconnected,
    Timeout,
    Pairing,
    Opening,
    Other(String),
}

impl ExternalState {
    /// Parse the client's upper-case state names; unknown names are kept.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "CONNECTED" => ExternalState::Connected,
            "DISCONNECTED" => ExternalState::Disconnected,
            "TIMEOUT" => ExternalState::Timeout,
            "PAIRING" => ExternalState::Pairing,
            "OPENING" => ExternalState::Opening,
            _ => ExternalState::Other(raw.trim().to_string()),
        }
    }
}

impl fmt::Display for ExternalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExternalState::Connected => f.write_str("CONNECTED"),
            ExternalState::Disconnected => f.write_str("DISCONNECTED"),
            ExternalState::Timeout => f.write_str("TIMEOUT"),
            ExternalState::Pairing => f.write_str("PAIRING"),
            ExternalState::Opening => f.write_str("OPENING"),
            ExternalState::Other(name) => f.write_str(name),
        }
    }
}
