//! Thin HTTP surface over the session orchestrator.

pub mod error;
pub mod handlers;
pub mod router;
pub mod server;
pub mod shutdown;

pub use error::ApiError;
pub use handlers::AppState;
pub use router::build_router;
pub use server::{ApiServer, ServerHandle};
pub use shutdown::ShutdownManager;

use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing.
///
/// Logs go to stdout unless `PAIRLINK_LOG` names a file path, in which case
/// they go to `{path}.{pid}` instead.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file = std::env::var("PAIRLINK_LOG").ok().and_then(|path| {
        let unique_path = format!("{}.{}", path, std::process::id());
        match std::fs::File::create(&unique_path) {
            Ok(file) => Some(file),
            Err(err) => {
                eprintln!("Warning: Failed to create log file {}: {}", unique_path, err);
                None
            }
        }
    });

    match file {
        Some(file) => {
            let file_layer = fmt::layer()
                .with_writer(file)
                .with_ansi(false)
                .with_target(true)
                .with_level(true)
                .with_timer(UtcTime::rfc_3339());
            tracing_subscriber::registry()
                .with(filter)
                .with(file_layer)
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(true)
                .with_level(true)
                .with_timer(UtcTime::rfc_3339())
                .init();
        }
    }
}
