use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use pairlink::activity::LogBuffer;
use pairlink::api::{init_tracing, ApiServer};
use pairlink::commands::{CommandDispatcher, CommandTable};
use pairlink::config::ConfigStore;
use pairlink::session::{LoopbackClient, SessionOrchestrator, SessionSettings};

/// Link a messaging account by pairing code and answer chat commands.
#[derive(Debug, Parser)]
#[command(name = "pairlink", version, about)]
struct Cli {
    /// Config file (defaults to the per-user config directory)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Address to listen on, overriding `server.bind_addr`
    #[arg(long, value_name = "ADDR")]
    bind: Option<String>,

    /// Seconds to wait for a pairing code or session
    #[arg(long, value_name = "SECONDS")]
    pairing_timeout: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let store = ConfigStore::open(cli.config.as_deref())?;
    let port = std::env::var("PORT").ok();
    store.update(|config| {
        config.apply_port_override(port.as_deref());
        if let Some(bind) = cli.bind {
            config.server.bind_addr = bind;
        }
        if let Some(seconds) = cli.pairing_timeout {
            config.session.pairing_timeout_seconds = seconds;
        }
    })?;
    tracing::info!(path = %store.path().display(), "Configuration loaded");

    let config = store.get();
    let orchestrator = SessionOrchestrator::new(
        Arc::new(LoopbackClient::new(&config.loopback)),
        CommandDispatcher::new(CommandTable::from_config(&config.commands)),
        LogBuffer::new(config.logs.capacity),
        SessionSettings::from(&config),
    );

    let mut server = ApiServer::new(store, orchestrator);
    server.try_bind().await?;
    server.run().await
}
