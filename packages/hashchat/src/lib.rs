//! Hashchat server: a key directory plus a WebSocket relay that fans every
//! message out to all other connected clients.
//!
//! Encryption happens entirely client-side. The server stores public keys
//! as opaque strings and relays payloads without looking at them.

pub mod config;
pub mod handlers;
pub mod metrics;
pub mod relay;

use axum::{
    Router,
    routing::{get, post},
};
use key_directory::Directory;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;
use tower_http::trace::{MakeSpan, TraceLayer};
use uuid::Uuid;

use crate::config::RelayConfig;
use crate::metrics::RelayMetrics;
use crate::relay::Relay;

#[derive(Clone)]
pub struct AppState {
    /// Username -> public key; one writer at a time
    pub directory: Arc<RwLock<Directory>>,
    pub relay: Arc<Relay>,
    pub metrics: Arc<RelayMetrics>,
}

impl AppState {
    pub fn new(relay_config: RelayConfig) -> Self {
        let metrics = Arc::new(RelayMetrics::new());
        Self {
            directory: Arc::new(RwLock::new(Directory::new())),
            relay: Arc::new(Relay::new(relay_config, metrics.clone())),
            metrics,
        }
    }
}

/// Custom span maker that adds a unique request ID to each incoming request
#[derive(Clone)]
struct RequestIdMakeSpan;

impl<B> MakeSpan<B> for RequestIdMakeSpan {
    fn make_span(&mut self, request: &axum::http::Request<B>) -> tracing::Span {
        let request_id = Uuid::new_v4().to_string();
        tracing::info_span!(
            "request",
            method = %request.method(),
            uri = %request.uri(),
            request_id = %request_id,
        )
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        // Key directory
        .route("/register", post(handlers::register_handler))
        .route("/users", get(handlers::list_users_handler))
        .route(
            "/users/{username}/public-key",
            get(handlers::public_key_handler),
        )
        // Relay
        .route("/ws", get(handlers::relay_websocket_handler))
        // Health endpoints
        .route("/health", get(handlers::health_handler))
        .route("/health/live", get(handlers::health_live_handler))
        .route("/metrics", get(handlers::metrics_handler))
        .layer(TraceLayer::new_for_http().make_span_with(RequestIdMakeSpan))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
