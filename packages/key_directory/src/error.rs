//! Error types and stable error codes.

use serde::{Deserialize, Serialize};

/// Which registration field failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Username,
    PublicKey,
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Field::Username => write!(f, "Username"),
            Field::PublicKey => write!(f, "Public key"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DirectoryError {
    #[error("{field} cannot be empty")]
    InvalidInput { field: Field },

    #[error("Username '{username}' already registered.")]
    AlreadyExists { username: String },

    #[error("User '{username}' not found.")]
    NotFound { username: String },
}

impl DirectoryError {
    pub fn error_code(&self) -> &str {
        match self {
            Self::InvalidInput { .. } => "invalid_input",
            Self::AlreadyExists { .. } => "already_exists",
            Self::NotFound { .. } => "not_found",
        }
    }
}

/// Serializable error body for HTTP responses.
///
/// `detail` carries the same text as `message`; existing clients decode
/// only `detail`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub detail: String,
}

impl From<&DirectoryError> for ErrorResponse {
    fn from(err: &DirectoryError) -> Self {
        let message = err.to_string();
        Self {
            error: err.error_code().to_string(),
            detail: message.clone(),
            message,
        }
    }
}
