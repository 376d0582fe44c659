//! First-arrival adjudication between the pairing code callback, the
//! session-established completion, a failure, and a deadline.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::time::Instant;

/// The single result delivered to the waiter.
pub enum PairingOutcome<H> {
    Code(String),
    Established(H),
    TimedOut,
    Failed(String),
}

impl<H> PairingOutcome<H> {
    pub fn kind(&self) -> &'static str {
        match self {
            PairingOutcome::Code(_) => "code",
            PairingOutcome::Established(_) => "established",
            PairingOutcome::TimedOut => "timed_out",
            PairingOutcome::Failed(_) => "failed",
        }
    }
}

impl<H> fmt::Debug for PairingOutcome<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PairingOutcome::Code(code) => f.debug_tuple("Code").field(code).finish(),
            PairingOutcome::Established(_) => f.write_str("Established(..)"),
            PairingOutcome::TimedOut => f.write_str("TimedOut"),
            PairingOutcome::Failed(err) => f.debug_tuple("Failed").field(err).finish(),
        }
    }
}

/// Resolving side of a pairing race. Clones share one outcome slot.
pub struct PairingCodeBroker<H> {
    slot: Arc<Mutex<Option<oneshot::Sender<PairingOutcome<H>>>>>,
}

impl<H> Clone for PairingCodeBroker<H> {
    fn clone(&self) -> Self {
        Self {
            slot: self.slot.clone(),
        }
    }
}

/// Waiting side of a pairing race.
pub struct PairingWait<H> {
    deadline: Instant,
    receiver: oneshot::Receiver<PairingOutcome<H>>,
    broker: PairingCodeBroker<H>,
}

impl<H> PairingCodeBroker<H> {
    /// Open a race that times out `deadline` from now.
    pub fn start(deadline: Duration) -> (Self, PairingWait<H>) {
        let (sender, receiver) = oneshot::channel();
        let broker = Self {
            slot: Arc::new(Mutex::new(Some(sender))),
        };
        let wait = PairingWait {
            deadline: Instant::now() + deadline,
            receiver,
            broker: broker.clone(),
        };
        (broker, wait)
    }

    /// Returns `true` if the code won the race.
    pub fn on_code_ready(&self, code: String) -> bool {
        self.resolve(PairingOutcome::Code(code)).is_ok()
    }

    /// Resolve with an established session. When the race is already over
    /// the handle is given back so the caller stays responsible for it.
    pub fn on_established(&self, handle: H) -> Result<(), H> {
        match self.resolve(PairingOutcome::Established(handle)) {
            Ok(()) => Ok(()),
            Err(PairingOutcome::Established(handle)) => Err(handle),
            Err(_) => unreachable!("resolve returns the rejected outcome unchanged"),
        }
    }

    /// Returns `true` if the failure won the race.
    pub fn on_failed(&self, error: impl Into<String>) -> bool {
        self.resolve(PairingOutcome::Failed(error.into())).is_ok()
    }

    fn resolve(&self, outcome: PairingOutcome<H>) -> Result<(), PairingOutcome<H>> {
        // The send happens while the slot is locked so a losing resolver
        // can rely on the winner's outcome already sitting in the channel.
        let mut slot = self.slot.lock();
        match slot.take() {
            Some(sender) => {
                tracing::debug!(outcome = outcome.kind(), "Pairing race resolved");
                if sender.send(outcome).is_err() {
                    tracing::debug!("Pairing waiter gone before delivery");
                }
                Ok(())
            }
            None => {
                tracing::debug!(outcome = outcome.kind(), "Pairing race already resolved");
                Err(outcome)
            }
        }
    }
}

impl<H> PairingWait<H> {
    /// Wait for the first outcome.
    pub async fn outcome(mut self) -> PairingOutcome<H> {
        match tokio::time::timeout_at(self.deadline, &mut self.receiver).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => PairingOutcome::Failed("pairing broker closed".to_string()),
            Err(_) => match self.broker.resolve(PairingOutcome::TimedOut) {
                Ok(()) => PairingOutcome::TimedOut,
                // Lost to an event that landed right at the deadline.
                Err(_) => self
                    .receiver
                    .try_recv()
                    .unwrap_or_else(|_| PairingOutcome::Failed("pairing broker closed".to_string())),
            },
        }
    }
}
