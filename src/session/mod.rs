//! Session orchestration: the single connection slot, the pairing race, and
//! the boundary with the messaging client.

mod broker;
mod client;
mod error;
mod loopback;
mod orchestrator;
mod phone;
mod state;

pub use broker::{PairingCodeBroker, PairingOutcome, PairingWait};
pub use client::{
    ClientError, ExternalSessionClient, InboundMessage, MessageReceipt, SessionEventSink,
    SessionHandle,
};
pub use error::{ConnectError, DisconnectError, SendError};
pub use loopback::{LoopbackClient, LoopbackHandle};
pub use orchestrator::{SessionOrchestrator, SessionSettings};
pub use phone::{PhoneError, PhoneNumber, PhoneRules};
pub use state::{ExternalState, SessionState, SessionStatus};
