//! Shared test utilities and mock infrastructure.

#![allow(dead_code, unused_imports)]

pub mod mock_client;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio::task::JoinHandle;

use pairlink::activity::LogBuffer;
use pairlink::api::{ApiServer, ServerHandle};
use pairlink::commands::{CommandDispatcher, CommandTable};
use pairlink::config::{Config, ConfigStore};
use pairlink::session::{PhoneRules, SessionOrchestrator, SessionSettings};

pub use mock_client::{deliver, MockClient, SentMessage, Step};

/// A number the default phone rules accept.
pub const PHONE: &str = "5521999998888";
pub const PANEL_URL: &str = "https://panel.example.com";

pub fn settings(pairing_timeout: Duration) -> SessionSettings {
    SessionSettings {
        pairing_timeout,
        close_timeout: Duration::from_secs(1),
        keepalive_interval: Duration::from_secs(300),
        phone_rules: PhoneRules::default(),
    }
}

pub fn orchestrator(client: Arc<MockClient>, settings: SessionSettings) -> SessionOrchestrator {
    SessionOrchestrator::new(
        client,
        CommandDispatcher::new(CommandTable::standard(PANEL_URL)),
        LogBuffer::new(50),
        settings,
    )
}

/// Whether any log line contains `needle`.
pub fn logged(orchestrator: &SessionOrchestrator, needle: &str) -> bool {
    orchestrator
        .log()
        .snapshot()
        .iter()
        .any(|entry| entry.message.contains(needle))
}

/// Write `content` to a config file in a fresh temp dir.
pub fn temp_config(content: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let config_path = temp_dir.path().join("config.toml");
    std::fs::write(&config_path, content).expect("Failed to write config");
    (temp_dir, config_path)
}

/// A running API server on an ephemeral port.
pub struct TestServer {
    pub addr: SocketAddr,
    pub handle: ServerHandle,
    pub orchestrator: SessionOrchestrator,
    pub task: JoinHandle<anyhow::Result<()>>,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

pub async fn start_server(client: Arc<MockClient>, pairing_timeout: Duration) -> TestServer {
    let mut config = Config::default();
    config.server.bind_addr = "127.0.0.1:0".to_string();
    let store = ConfigStore::new(config, PathBuf::from("unused.toml"));

    let orchestrator = orchestrator(client, settings(pairing_timeout));
    let mut server = ApiServer::new(store, orchestrator.clone());
    let addr = server.try_bind().await.expect("bind test server");
    let handle = server.handle();
    let task = tokio::spawn(server.run());

    TestServer {
        addr,
        handle,
        orchestrator,
        task,
    }
}
