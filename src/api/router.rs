use std::sync::Arc;

use axum::http::{HeaderValue, Method};
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers::{self, AppState};
use super::shutdown::{track_requests, ShutdownManager};

fn routes() -> Router<AppState> {
    Router::new()
        .route("/status", get(handlers::status))
        .route("/logs", get(handlers::logs))
        .route("/connect", post(handlers::connect))
        .route("/disconnect", post(handlers::disconnect))
        .route("/send-message", post(handlers::send_message))
        .route("/pairing-code", get(handlers::pairing_code))
        .route("/qrcode", get(handlers::pairing_code))
        .route("/health", get(handlers::health))
}

fn cors_layer(origin: &str) -> CorsLayer {
    let allow_origin = if origin.trim() == "*" {
        AllowOrigin::from(Any)
    } else {
        match HeaderValue::from_str(origin.trim()) {
            Ok(value) => AllowOrigin::exact(value),
            Err(err) => {
                tracing::warn!(origin = %origin, error = %err, "Invalid CORS origin, allowing any");
                AllowOrigin::from(Any)
            }
        }
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
}

/// Every route is served at the root and again under `/api`.
pub fn build_router(state: AppState, shutdown: Arc<ShutdownManager>, cors_origin: &str) -> Router {
    Router::new()
        .merge(routes())
        .nest("/api", routes())
        .fallback(handlers::not_found)
        .layer(middleware::from_fn_with_state(shutdown, track_requests))
        .layer(cors_layer(cors_origin))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
