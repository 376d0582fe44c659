//! Owner of the single session slot.
//!
//! Every mutation of [`SessionStatus`] happens under `Shared::slot`, and the
//! lock is never held across an `.await`. Each connect attempt gets a new
//! generation; sinks and background tasks carry the generation they were
//! created for and drop their work once it is no longer current.
//!
//! Event sources apply their own transition while holding the slot lock and
//! resolve the pairing broker inside that same critical section, so the
//! broker's winner and the visible state never disagree. The deadline is the
//! one exception: the waiter applies `TIMED_OUT` after the broker resolves.

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};

use crate::activity::LogBuffer;
use crate::commands::CommandDispatcher;
use crate::config::Config;

use super::broker::{PairingCodeBroker, PairingOutcome};
use super::client::{
    ClientError, ExternalSessionClient, InboundMessage, MessageReceipt, SessionEventSink,
    SessionHandle,
};
use super::error::{ConnectError, DisconnectError, SendError};
use super::phone::{PhoneNumber, PhoneRules};
use super::state::{ExternalState, SessionState, SessionStatus};

type Handle = Arc<dyn SessionHandle>;
type Broker = PairingCodeBroker<Handle>;

/// Tunables for the orchestrator.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub pairing_timeout: Duration,
    pub close_timeout: Duration,
    pub keepalive_interval: Duration,
    pub phone_rules: PhoneRules,
}

impl From<&Config> for SessionSettings {
    fn from(config: &Config) -> Self {
        Self {
            pairing_timeout: config.session.pairing_timeout(),
            close_timeout: config.session.close_timeout(),
            keepalive_interval: config.session.keepalive_interval(),
            phone_rules: PhoneRules::from(&config.phone),
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

/// Cheap-to-clone front for the session slot.
#[derive(Clone)]
pub struct SessionOrchestrator {
    shared: Arc<Shared>,
}

struct Shared {
    client: Arc<dyn ExternalSessionClient>,
    dispatcher: CommandDispatcher,
    log: LogBuffer,
    settings: SessionSettings,
    slot: Mutex<Slot>,
    /// Mirrors `Slot::generation` so background tasks can wait on it.
    generations: watch::Sender<u64>,
}

impl Shared {
    /// Start a new generation. Tasks of older generations stop.
    fn advance(&self, slot: &mut Slot) -> u64 {
        slot.generation += 1;
        self.generations.send_replace(slot.generation);
        slot.generation
    }

    /// Resolves once `generation` is no longer current.
    fn superseded(
        &self,
        generation: u64,
    ) -> impl std::future::Future<Output = ()> + Send + 'static {
        let mut generations = self.generations.subscribe();
        async move {
            let _ = generations.wait_for(|current| *current != generation).await;
        }
    }
}

struct Slot {
    status: SessionStatus,
    generation: u64,
    handle: Option<Handle>,
    /// Messages received before the handle is installed wait here.
    inbox: Option<mpsc::UnboundedReceiver<InboundMessage>>,
    /// Broker of the attempt in flight, so a disconnect can wake its waiter.
    pending: Option<Broker>,
}

impl Slot {
    fn set_state(&mut self, next: SessionState) -> bool {
        let current = self.status.state;
        if !current.can_transition_to(next) {
            tracing::warn!(from = %current, to = %next, "Rejected session transition");
            return false;
        }

        self.status.state = next;
        match next {
            SessionState::Connected => {
                if self.status.connected_at.is_none() {
                    self.status.connected_at = Some(chrono::Utc::now());
                }
                self.status.pairing_code = None;
                self.status.last_error = None;
            }
            _ => self.status.connected_at = None,
        }
        tracing::debug!(from = %current, to = %next, generation = self.generation, "Session transition");
        true
    }
}

impl SessionOrchestrator {
    pub fn new(
        client: Arc<dyn ExternalSessionClient>,
        dispatcher: CommandDispatcher,
        log: LogBuffer,
        settings: SessionSettings,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                client,
                dispatcher,
                log,
                settings,
                slot: Mutex::new(Slot {
                    status: SessionStatus::idle(),
                    generation: 0,
                    handle: None,
                    inbox: None,
                    pending: None,
                }),
                generations: watch::Sender::new(0),
            }),
        }
    }

    /// Current status snapshot. Never waits on the network.
    pub fn status(&self) -> SessionStatus {
        self.shared.slot.lock().status.clone()
    }

    pub fn log(&self) -> &LogBuffer {
        &self.shared.log
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.shared.settings
    }

    /// Start linking `raw_phone`.
    ///
    /// Resolves as soon as a pairing code exists, the session is
    /// established, establishing fails, or the pairing deadline passes,
    /// whichever comes first. A timed-out attempt returns `Ok` with state
    /// `TIMED_OUT`.
    pub async fn connect(&self, raw_phone: &str) -> Result<SessionStatus, ConnectError> {
        let phone = self.shared.settings.phone_rules.parse(raw_phone)?;

        let (generation, previous) = {
            let mut slot = self.shared.slot.lock();
            let state = slot.status.state;
            if !state.accepts_connect() {
                return Err(ConnectError::AlreadyConnecting {
                    state: state.to_string(),
                });
            }
            self.shared.advance(&mut slot);
            slot.inbox = None;
            slot.pending = None;
            let previous = slot.handle.take();
            let next = if previous.is_some() {
                SessionState::Disconnecting
            } else {
                SessionState::Connecting
            };
            slot.set_state(next);
            slot.status.clear();
            slot.status.phone_number = Some(phone.to_string());
            (slot.generation, previous)
        };

        // Run detached so a caller that stops waiting cannot strand the slot
        // in CONNECTING.
        let attempt = tokio::spawn(self.clone().run_attempt(generation, phone, previous));
        match attempt.await {
            Ok(result) => result,
            Err(err) => {
                let message = format!("connect task failed: {}", err);
                {
                    let mut slot = self.shared.slot.lock();
                    if slot.generation == generation && slot.set_state(SessionState::Failed) {
                        slot.status.last_error = Some(message.clone());
                    }
                }
                self.shared.log.append(format!("❌ {}", message));
                Err(ConnectError::EstablishFailed(message))
            }
        }
    }

    async fn run_attempt(
        self,
        generation: u64,
        phone: PhoneNumber,
        previous: Option<Handle>,
    ) -> Result<SessionStatus, ConnectError> {
        if let Some(handle) = previous {
            self.shared.log.append("🔄 Closing previous session...");
            self.close_quietly(handle).await;
            let mut slot = self.shared.slot.lock();
            if slot.generation != generation {
                return Err(ConnectError::Superseded);
            }
            slot.set_state(SessionState::Idle);
            slot.set_state(SessionState::Connecting);
        }

        let (broker, wait) = Broker::start(self.shared.settings.pairing_timeout);
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        {
            let mut slot = self.shared.slot.lock();
            if slot.generation != generation {
                return Err(ConnectError::Superseded);
            }
            slot.inbox = Some(inbox_rx);
            slot.pending = Some(broker.clone());
        }
        self.shared
            .log
            .append(format!("📱 Starting bot for number {}", phone));

        let sink: Arc<dyn SessionEventSink> = Arc::new(AttemptSink {
            shared: Arc::downgrade(&self.shared),
            generation,
            broker: broker.clone(),
            inbox: inbox_tx,
        });
        let establisher = self.clone();
        tokio::spawn(async move {
            let result = establisher.shared.client.establish(&phone, sink).await;
            establisher
                .finish_establish(generation, &broker, result)
                .await;
        });

        match wait.outcome().await {
            PairingOutcome::Code(_) | PairingOutcome::Established(_) => {
                self.current_status(generation)
            }
            PairingOutcome::Failed(message) => {
                self.current_status(generation)?;
                Err(ConnectError::EstablishFailed(message))
            }
            PairingOutcome::TimedOut => {
                let timeout = self.shared.settings.pairing_timeout;
                let applied = {
                    let mut slot = self.shared.slot.lock();
                    if slot.generation != generation {
                        return Err(ConnectError::Superseded);
                    }
                    let applied = slot.status.state == SessionState::Connecting
                        && slot.set_state(SessionState::TimedOut);
                    if applied {
                        slot.status.last_error = Some(format!(
                            "no pairing code or session within {}s",
                            timeout.as_secs()
                        ));
                    }
                    applied
                };
                if applied {
                    self.shared.log.append(format!(
                        "⏰ Connection attempt timed out after {}s",
                        timeout.as_secs()
                    ));
                }
                self.current_status(generation)
            }
        }
    }

    fn current_status(&self, generation: u64) -> Result<SessionStatus, ConnectError> {
        let slot = self.shared.slot.lock();
        if slot.generation != generation {
            return Err(ConnectError::Superseded);
        }
        Ok(slot.status.clone())
    }

    fn is_current(&self, generation: u64) -> bool {
        self.shared.slot.lock().generation == generation
    }

    /// Apply the completion of `establish`, whether or not it won the race.
    async fn finish_establish(
        &self,
        generation: u64,
        broker: &Broker,
        result: Result<Handle, ClientError>,
    ) {
        match result {
            Ok(handle) => {
                let adopted = {
                    let mut slot = self.shared.slot.lock();
                    let won = broker.on_established(handle.clone()).is_ok();
                    let adopt = slot.generation == generation
                        && slot.handle.is_none()
                        && (won
                            || matches!(
                                slot.status.state,
                                SessionState::AwaitingCode | SessionState::Connected
                            ));
                    if adopt {
                        if slot.status.state != SessionState::Connected {
                            slot.set_state(SessionState::Connected);
                        }
                        slot.handle = Some(handle.clone());
                        Some(slot.inbox.take())
                    } else {
                        None
                    }
                };

                match adopted {
                    Some(inbox) => {
                        self.shared.log.append("✅ Bot connected successfully!");
                        self.attach(generation, handle, inbox);
                    }
                    None => {
                        self.shared.log.append(
                            "⚠️ Session established after its attempt was superseded or timed out; closing it",
                        );
                        self.close_quietly(handle).await;
                    }
                }
            }
            Err(err) => {
                let (applied, state) = {
                    let mut slot = self.shared.slot.lock();
                    let won = broker.on_failed(err.message.clone());
                    if slot.generation != generation || slot.handle.is_some() {
                        (false, None)
                    } else {
                        // The client may already have reported CONNECTED
                        // without ever handing over a session.
                        let unconfirmed = matches!(
                            slot.status.state,
                            SessionState::AwaitingCode | SessionState::Connected
                        );
                        let applied =
                            (won || unconfirmed) && slot.set_state(SessionState::Failed);
                        if applied {
                            slot.status.pairing_code = None;
                            slot.status.last_error = Some(err.message.clone());
                        } else if slot.status.last_error.is_none() {
                            slot.status.last_error = Some(err.message.clone());
                        }
                        (applied, Some(slot.status.state))
                    }
                };
                match (applied, state) {
                    (true, _) => self
                        .shared
                        .log
                        .append(format!("❌ Error connecting: {}", err)),
                    (false, Some(state)) => self.shared.log.append(format!(
                        "⚠️ Connection error after the attempt ended as {}: {}",
                        state, err
                    )),
                    (false, None) => self.shared.log.append(format!(
                        "⚠️ Ignoring late connection error from a stale attempt: {}",
                        err
                    )),
                }
            }
        }
    }

    /// Start the message pump and the heartbeat for an installed handle.
    fn attach(
        &self,
        generation: u64,
        handle: Handle,
        inbox: Option<mpsc::UnboundedReceiver<InboundMessage>>,
    ) {
        if let Some(inbox) = inbox {
            tokio::spawn(self.clone().pump_messages(generation, handle, inbox));
        }
        tokio::spawn(self.clone().keepalive(generation));
    }

    async fn pump_messages(
        self,
        generation: u64,
        handle: Handle,
        mut inbox: mpsc::UnboundedReceiver<InboundMessage>,
    ) {
        self.shared
            .log
            .append("📱 Bot running! Waiting for messages...");
        let stop = self.shared.superseded(generation);
        tokio::pin!(stop);
        loop {
            let message = tokio::select! {
                message = inbox.recv() => message,
                _ = &mut stop => None,
            };
            let Some(message) = message else {
                break;
            };
            if !self.is_current(generation) {
                break;
            }
            self.shared
                .dispatcher
                .dispatch(&message, handle.as_ref(), &self.shared.log)
                .await;
        }
        tracing::debug!(generation, "Message pump stopped");
    }

    async fn keepalive(self, generation: u64) {
        let mut ticker = tokio::time::interval(self.shared.settings.keepalive_interval);
        ticker.tick().await;
        let stop = self.shared.superseded(generation);
        tokio::pin!(stop);
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = &mut stop => break,
            }
            if !self.is_current(generation) {
                break;
            }
            self.shared.log.append("💓 Bot active and monitoring...");
        }
        tracing::debug!(generation, "Keepalive stopped");
    }

    fn apply_code(&self, generation: u64, broker: &Broker, code: String) {
        let (applied, state) = {
            let mut slot = self.shared.slot.lock();
            if slot.generation != generation {
                (false, None)
            } else {
                let won = broker.on_code_ready(code.clone());
                let applied = if won {
                    slot.set_state(SessionState::AwaitingCode)
                } else {
                    // A refreshed code replaces the one already shown.
                    slot.status.state == SessionState::AwaitingCode
                };
                if applied {
                    slot.status.pairing_code = Some(code.clone());
                }
                (applied, Some(slot.status.state))
            }
        };

        match (applied, state) {
            (true, _) => self
                .shared
                .log
                .append(format!("🔑 Pairing code generated: {}", code)),
            (false, Some(state)) => self.shared.log.append(format!(
                "🔑 Pairing code {} arrived while {}; not delivered",
                code, state
            )),
            (false, None) => self.shared.log.append(format!(
                "🔑 Ignoring pairing code {} from a superseded attempt",
                code
            )),
        }
    }

    fn apply_external_state(&self, generation: u64, external: ExternalState) {
        let note = {
            let mut slot = self.shared.slot.lock();
            if slot.generation != generation {
                drop(slot);
                self.shared.log.append(format!(
                    "🔄 Ignoring state {} from a superseded session",
                    external
                ));
                return;
            }

            let state = slot.status.state;
            match &external {
                ExternalState::Connected => match state {
                    SessionState::AwaitingCode => {
                        slot.set_state(SessionState::Connected);
                        Some("✅ WhatsApp connected!")
                    }
                    SessionState::Disconnected if slot.handle.is_some() => {
                        slot.set_state(SessionState::Connected);
                        Some("✅ WhatsApp reconnected!")
                    }
                    _ => None,
                },
                ExternalState::Disconnected => {
                    if state == SessionState::Connected {
                        slot.set_state(SessionState::Disconnected);
                        Some("❌ WhatsApp disconnected")
                    } else {
                        None
                    }
                }
                ExternalState::Timeout => match state {
                    SessionState::Connected => {
                        slot.set_state(SessionState::Disconnected);
                        Some("⏰ Connection timed out")
                    }
                    SessionState::AwaitingCode => {
                        slot.set_state(SessionState::TimedOut);
                        slot.status.pairing_code = None;
                        slot.status.last_error = Some("pairing timed out".to_string());
                        Some("⏰ Pairing timed out")
                    }
                    _ => None,
                },
                ExternalState::Pairing => Some("🔗 Pairing device..."),
                ExternalState::Opening => Some("🔄 Opening WhatsApp..."),
                ExternalState::Other(_) => None,
            }
        };

        self.shared
            .log
            .append(format!("🔄 WhatsApp state: {}", external));
        if let Some(note) = note {
            self.shared.log.append(note);
        }
    }

    fn route_message(
        &self,
        generation: u64,
        inbox: &mpsc::UnboundedSender<InboundMessage>,
        message: InboundMessage,
    ) {
        if !self.is_current(generation) {
            self.shared.log.append(format!(
                "📨 Dropping message from {} received on a superseded session",
                message.from
            ));
            return;
        }
        if let Err(err) = inbox.send(message) {
            tracing::debug!(from = %err.0.from, "Message inbox closed");
        }
    }

    /// Send a text through the connected session.
    pub async fn send_message(&self, to: &str, body: &str) -> Result<MessageReceipt, SendError> {
        let handle = {
            let slot = self.shared.slot.lock();
            if slot.status.state != SessionState::Connected {
                return Err(SendError::NotConnected);
            }
            slot.handle.clone().ok_or(SendError::NotConnected)?
        };

        match handle.send_text(to, body).await {
            Ok(receipt) => {
                self.shared
                    .log
                    .append(format!("📤 Message sent to {}: {}", to, body));
                Ok(receipt)
            }
            Err(err) => {
                self.shared
                    .log
                    .append(format!("❌ Error sending message: {}", err));
                Err(SendError::Failed(err.message))
            }
        }
    }

    /// Close the current session, or cancel the attempt in flight.
    pub async fn disconnect(&self) -> Result<SessionStatus, DisconnectError> {
        let (generation, handle, pending) = {
            let mut slot = self.shared.slot.lock();
            match slot.status.state {
                SessionState::Idle | SessionState::Disconnected => {
                    return Err(DisconnectError::NoActiveSession)
                }
                SessionState::Disconnecting => return Err(DisconnectError::InProgress),
                _ => {}
            }
            let generation = self.shared.advance(&mut slot);
            slot.inbox = None;
            slot.set_state(SessionState::Disconnecting);
            (generation, slot.handle.take(), slot.pending.take())
        };

        self.shared.log.append("🔌 Disconnecting bot...");
        if let Some(broker) = pending {
            broker.on_failed("cancelled by disconnect");
        }
        if let Some(handle) = handle {
            self.close_quietly(handle).await;
        }

        let status = {
            let mut slot = self.shared.slot.lock();
            if slot.generation == generation {
                slot.set_state(SessionState::Disconnected);
                slot.status.clear();
            }
            slot.status.clone()
        };
        self.shared.log.append("✅ Bot disconnected");
        Ok(status)
    }

    /// Best-effort teardown for process exit.
    pub async fn shutdown(&self) {
        match self.disconnect().await {
            Ok(_) | Err(DisconnectError::NoActiveSession) => {}
            Err(err) => tracing::warn!(error = %err, "Session teardown on shutdown skipped"),
        }
    }

    async fn close_quietly(&self, handle: Handle) {
        match tokio::time::timeout(self.shared.settings.close_timeout, handle.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => self
                .shared
                .log
                .append(format!("⚠️ Error closing session (ignored): {}", err)),
            Err(_) => self.shared.log.append(format!(
                "⚠️ Closing session timed out after {}s (ignored)",
                self.shared.settings.close_timeout.as_secs()
            )),
        }
    }
}

/// Event sink handed to the client for one connect attempt.
struct AttemptSink {
    shared: Weak<Shared>,
    generation: u64,
    broker: Broker,
    inbox: mpsc::UnboundedSender<InboundMessage>,
}

impl AttemptSink {
    fn orchestrator(&self) -> Option<SessionOrchestrator> {
        self.shared
            .upgrade()
            .map(|shared| SessionOrchestrator { shared })
    }
}

impl SessionEventSink for AttemptSink {
    fn on_code_ready(&self, code: String) {
        if let Some(orchestrator) = self.orchestrator() {
            orchestrator.apply_code(self.generation, &self.broker, code);
        }
    }

    fn on_state_change(&self, state: ExternalState) {
        if let Some(orchestrator) = self.orchestrator() {
            orchestrator.apply_external_state(self.generation, state);
        }
    }

    fn on_message(&self, message: InboundMessage) {
        if let Some(orchestrator) = self.orchestrator() {
            orchestrator.route_message(self.generation, &self.inbox, message);
        }
    }
}
