//! Scriptable messaging client for orchestrator and API tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use pairlink::session::{
    ClientError, ExternalSessionClient, ExternalState, InboundMessage, MessageReceipt,
    PhoneNumber, SessionEventSink, SessionHandle,
};

/// One step of an `establish` call.
#[derive(Debug, Clone)]
pub enum Step {
    Sleep(Duration),
    Code(String),
    State(ExternalState),
    /// Block until [`MockClient::release`] is called.
    WaitRelease,
    /// Complete with a handle.
    Establish,
    /// Complete with an error.
    Fail(String),
}

/// A message sent through a mock handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub to: String,
    pub body: String,
}

#[derive(Default)]
struct Recorder {
    sent: Mutex<Vec<SentMessage>>,
    closes: AtomicUsize,
    live_handles: AtomicUsize,
    fail_sends: AtomicBool,
    fail_close: AtomicBool,
}

/// Each `establish` call pops one script; an empty queue means "never
/// complete".
#[derive(Default)]
pub struct MockClient {
    scripts: Mutex<VecDeque<Vec<Step>>>,
    sinks: Mutex<Vec<Arc<dyn SessionEventSink>>>,
    establish_calls: AtomicUsize,
    release: Notify,
    recorder: Arc<Recorder>,
}

impl MockClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_scripts(scripts: Vec<Vec<Step>>) -> Arc<Self> {
        let client = Self::default();
        client.scripts.lock().extend(scripts);
        Arc::new(client)
    }

    /// Code after `code_after`, session `established_after` later.
    pub fn pairing_flow(code: &str, code_after: Duration, established_after: Duration) -> Vec<Step> {
        vec![
            Step::State(ExternalState::Opening),
            Step::Sleep(code_after),
            Step::Code(code.to_string()),
            Step::State(ExternalState::Pairing),
            Step::Sleep(established_after),
            Step::State(ExternalState::Connected),
            Step::Establish,
        ]
    }

    pub fn push_script(&self, steps: Vec<Step>) {
        self.scripts.lock().push_back(steps);
    }

    pub fn establish_calls(&self) -> usize {
        self.establish_calls.load(Ordering::SeqCst)
    }

    /// Sink handed over by the `index`th establish call.
    pub fn sink(&self, index: usize) -> Arc<dyn SessionEventSink> {
        self.sinks.lock()[index].clone()
    }

    pub fn release(&self) {
        self.release.notify_one();
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.recorder.sent.lock().clone()
    }

    pub fn closes(&self) -> usize {
        self.recorder.closes.load(Ordering::SeqCst)
    }

    /// Handles handed out and not yet dropped.
    pub fn live_handles(&self) -> usize {
        self.recorder.live_handles.load(Ordering::SeqCst)
    }

    pub fn fail_sends(&self, fail: bool) {
        self.recorder.fail_sends.store(fail, Ordering::SeqCst);
    }

    pub fn fail_close(&self, fail: bool) {
        self.recorder.fail_close.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ExternalSessionClient for MockClient {
    async fn establish(
        &self,
        _phone: &PhoneNumber,
        sink: Arc<dyn SessionEventSink>,
    ) -> Result<Arc<dyn SessionHandle>, ClientError> {
        self.establish_calls.fetch_add(1, Ordering::SeqCst);
        self.sinks.lock().push(sink.clone());
        let steps = self.scripts.lock().pop_front().unwrap_or_default();

        for step in steps {
            match step {
                Step::Sleep(duration) => tokio::time::sleep(duration).await,
                Step::Code(code) => sink.on_code_ready(code),
                Step::State(state) => sink.on_state_change(state),
                Step::WaitRelease => self.release.notified().await,
                Step::Establish => {
                    self.recorder.live_handles.fetch_add(1, Ordering::SeqCst);
                    return Ok(Arc::new(MockHandle {
                        recorder: self.recorder.clone(),
                        _sink: sink,
                    }));
                }
                Step::Fail(message) => return Err(ClientError::new(message)),
            }
        }

        std::future::pending().await
    }
}

/// Holds on to its sink the way a real client session does.
struct MockHandle {
    recorder: Arc<Recorder>,
    _sink: Arc<dyn SessionEventSink>,
}

impl Drop for MockHandle {
    fn drop(&mut self) {
        self.recorder.live_handles.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl SessionHandle for MockHandle {
    async fn send_text(&self, to: &str, body: &str) -> Result<MessageReceipt, ClientError> {
        if self.recorder.fail_sends.load(Ordering::SeqCst) {
            return Err(ClientError::new("send rejected"));
        }
        let mut sent = self.recorder.sent.lock();
        sent.push(SentMessage {
            to: to.to_string(),
            body: body.to_string(),
        });
        Ok(MessageReceipt {
            id: format!("mock-{}", sent.len()),
        })
    }

    async fn close(&self) -> Result<(), ClientError> {
        self.recorder.closes.fetch_add(1, Ordering::SeqCst);
        if self.recorder.fail_close.load(Ordering::SeqCst) {
            return Err(ClientError::new("close exploded"));
        }
        Ok(())
    }
}

/// Convenience for pushing an inbound message through a sink.
pub fn deliver(sink: &Arc<dyn SessionEventSink>, from: &str, body: &str) {
    sink.on_message(InboundMessage {
        from: from.to_string(),
        body: body.to_string(),
    });
}
