use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use tokio::signal;
use tokio::sync::Notify;

/// Shutdown signalling plus a count of requests still being served.
pub struct ShutdownManager {
    shutdown: AtomicBool,
    active_requests: AtomicUsize,
    notify: Notify,
}

impl ShutdownManager {
    pub fn new() -> Self {
        Self {
            shutdown: AtomicBool::new(false),
            active_requests: AtomicUsize::new(0),
            notify: Notify::new(),
        }
    }

    /// Resolves on ctrl-c, SIGTERM, or [`Self::signal_shutdown`].
    pub async fn wait_for_shutdown(&self) -> std::io::Result<()> {
        let notified = self.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        if self.is_shutting_down() {
            return Ok(());
        }

        #[cfg(unix)]
        {
            let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;
            tokio::select! {
                _ = signal::ctrl_c() => {},
                _ = sigterm.recv() => {},
                _ = notified => {},
            }
        }

        #[cfg(not(unix))]
        {
            tokio::select! {
                _ = signal::ctrl_c() => {},
                _ = notified => {},
            }
        }

        self.shutdown.store(true, Ordering::SeqCst);
        tracing::info!("Shutting down gracefully...");
        Ok(())
    }

    pub fn signal_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    pub fn active_requests(&self) -> usize {
        self.active_requests.load(Ordering::SeqCst)
    }

    /// Wait until no request is in flight, or `timeout` passes.
    pub async fn wait_for_requests(&self, timeout: Duration) {
        tracing::info!(active = self.active_requests(), "Waiting for in-flight requests");

        let start = tokio::time::Instant::now();
        while start.elapsed() < timeout {
            if self.active_requests() == 0 {
                tracing::info!("All requests drained");
                return;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        tracing::warn!(
            remaining = self.active_requests(),
            "Forced shutdown after timeout"
        );
    }
}

impl Default for ShutdownManager {
    fn default() -> Self {
        Self::new()
    }
}

struct RequestGuard(Arc<ShutdownManager>);

impl Drop for RequestGuard {
    fn drop(&mut self) {
        self.0.active_requests.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Middleware counting requests in flight for graceful shutdown.
pub async fn track_requests(
    State(shutdown): State<Arc<ShutdownManager>>,
    req: Request,
    next: Next,
) -> Response {
    shutdown.active_requests.fetch_add(1, Ordering::SeqCst);
    let _guard = RequestGuard(shutdown);
    next.run(req).await
}
