use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use key_directory::{DirectoryError, ErrorResponse, Identity};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub public_key: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub status: String,
    pub message: String,
    pub username: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserEntry {
    pub username: String,
}

fn directory_error(err: DirectoryError) -> Response {
    let status = match err {
        DirectoryError::InvalidInput { .. } | DirectoryError::AlreadyExists { .. } => {
            StatusCode::BAD_REQUEST
        }
        DirectoryError::NotFound { .. } => StatusCode::NOT_FOUND,
    };
    (status, Json(ErrorResponse::from(&err))).into_response()
}

pub async fn register_handler(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Response {
    let result = state
        .directory
        .write()
        .await
        .register(&req.username, &req.public_key);

    match result {
        Ok(()) => {
            info!(username = %req.username, "Registered public key");
            (
                StatusCode::OK,
                Json(RegisterResponse {
                    status: "success".to_string(),
                    message: format!("User '{}' registered successfully", req.username),
                    username: req.username,
                }),
            )
                .into_response()
        }
        Err(e) => {
            debug!(username = %req.username, error = %e, "Registration rejected");
            directory_error(e)
        }
    }
}

pub async fn public_key_handler(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Response {
    let directory = state.directory.read().await;
    match directory.lookup(&username) {
        Ok(public_key) => Json(Identity {
            public_key: public_key.to_string(),
            username,
        })
        .into_response(),
        Err(e) => directory_error(e),
    }
}

pub async fn list_users_handler(State(state): State<AppState>) -> impl IntoResponse {
    let users: Vec<UserEntry> = state
        .directory
        .read()
        .await
        .list()
        .into_iter()
        .map(|username| UserEntry { username })
        .collect();
    Json(users)
}
