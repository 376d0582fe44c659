use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;

use crate::config::ConfigStore;
use crate::session::SessionOrchestrator;

use super::handlers::AppState;
use super::router::build_router;
use super::shutdown::ShutdownManager;

/// How long `run` waits for in-flight requests after the shutdown signal.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

pub struct ApiServer {
    pub addr: SocketAddr,
    /// Populated by try_bind(), consumed by run().
    listener: Option<TcpListener>,
    config: ConfigStore,
    orchestrator: SessionOrchestrator,
    shutdown: Arc<ShutdownManager>,
}

impl ApiServer {
    pub fn new(config: ConfigStore, orchestrator: SessionOrchestrator) -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            listener: None,
            config,
            orchestrator,
            shutdown: Arc::new(ShutdownManager::new()),
        }
    }

    /// Bind the configured address and keep the listener until `run`.
    pub async fn try_bind(&mut self) -> anyhow::Result<SocketAddr> {
        let bind_addr = self.config.get().server.bind_addr.clone();
        let addr: SocketAddr = bind_addr
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid bind address '{}': {}", bind_addr, e))?;

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| anyhow::anyhow!("Could not bind {}: {}", addr, e))?;
        let actual = listener.local_addr()?;

        self.addr = actual;
        self.listener = Some(listener);
        tracing::info!(addr = %actual, "API server bound");
        Ok(actual)
    }

    pub fn orchestrator(&self) -> SessionOrchestrator {
        self.orchestrator.clone()
    }

    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            shutdown: self.shutdown.clone(),
        }
    }

    /// Serve until shutdown, drain requests, then close the session.
    ///
    /// Call try_bind() first.
    pub async fn run(self) -> anyhow::Result<()> {
        let listener = self
            .listener
            .ok_or_else(|| anyhow::anyhow!("try_bind() must be called before run()"))?;

        tracing::info!("🚀 Server running on {}", self.addr);

        let cors_origin = self.config.get().server.cors_origin.clone();
        let app = build_router(
            AppState::new(self.orchestrator.clone()),
            self.shutdown.clone(),
            &cors_origin,
        );

        let shutdown = self.shutdown.clone();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                if let Err(err) = shutdown.wait_for_shutdown().await {
                    tracing::error!(error = %err, "Signal handler failed; stopping");
                }
            })
            .into_future()
            .await?;

        self.shutdown.wait_for_requests(DRAIN_TIMEOUT).await;
        self.orchestrator.shutdown().await;
        tracing::info!("Server stopped");

        Ok(())
    }
}

/// Lets other tasks stop a running [`ApiServer`].
#[derive(Clone)]
pub struct ServerHandle {
    shutdown: Arc<ShutdownManager>,
}

impl ServerHandle {
    pub fn shutdown(&self) {
        self.shutdown.signal_shutdown();
    }
}
