use axum::{
    extract::{
        State, WebSocketUpgrade,
        ws::rejection::WebSocketUpgradeRejection,
    },
    response::{IntoResponse, Response},
};
use tracing::{debug, warn};

use crate::AppState;
use crate::relay;

/// Relay endpoint: upgrade and hand the socket to the relay.
///
/// A failed handshake never reaches the live set; it is only counted.
pub async fn relay_websocket_handler(
    State(state): State<AppState>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => {
            state.metrics.handshake_failed();
            debug!("Rejected relay upgrade: {}", rejection);
            return rejection.into_response();
        }
    };

    let relay = state.relay.clone();
    let metrics = state.metrics.clone();

    ws.max_message_size(relay.config().max_message_bytes)
        .on_failed_upgrade(move |e| {
            metrics.handshake_failed();
            warn!("WebSocket upgrade failed: {}", e);
        })
        .on_upgrade(move |socket| async move {
            relay::serve_connection(relay, socket).await;
        })
}
