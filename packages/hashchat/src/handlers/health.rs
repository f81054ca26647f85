use axum::{Json, extract::State, response::IntoResponse};

use crate::AppState;
use crate::metrics::HealthStatus;

/// Health check endpoint - directory size and live relay connections
pub async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let registered_users = state.directory.read().await.count() as u64;

    Json(HealthStatus {
        status: "healthy".to_string(),
        registered_users,
        active_connections: state.relay.active_count() as u64,
    })
}

/// Metrics endpoint - returns detailed relay metrics
pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.relay.metrics_snapshot())
}

/// Liveness probe - returns 200 if the server is running
pub async fn health_live_handler() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "alive" }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RelayConfig;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    async fn get_json(state: &AppState, uri: &str) -> (StatusCode, serde_json::Value) {
        let app = crate::build_router(state.clone());
        let resp = app
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), 1024 * 1024)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn health_counts_users_and_connections() {
        let state = AppState::new(RelayConfig::default());
        state
            .directory
            .write()
            .await
            .register("alice", "PUBKEY1")
            .unwrap();
        let _conn = state.relay.accept();

        let (status, body) = get_json(&state, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["registered_users"], 1);
        assert_eq!(body["active_connections"], 1);
    }

    #[tokio::test]
    async fn health_drops_removed_connections() {
        let state = AppState::new(RelayConfig::default());
        let conn = state.relay.accept();
        drop(conn);

        let (_, body) = get_json(&state, "/health").await;
        assert_eq!(body["active_connections"], 0);
        assert_eq!(body["registered_users"], 0);
    }

    #[tokio::test]
    async fn live_and_metrics() {
        let state = AppState::new(RelayConfig::default());
        let (status, body) = get_json(&state, "/health/live").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "alive");

        let _conn = state.relay.accept();
        let (status, body) = get_json(&state, "/metrics").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["connections"]["active"], 1);
        assert_eq!(body["connections"]["total"], 1);
    }
}
