use thiserror::Error;

use crate::storage::StorageError;

/// Errors raised by the identity provider client.
#[derive(Error, Debug)]
pub enum AuthError {
    /// The provider answered with a non-success status.
    #[error("API error ({status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("Authentication error: {0}")]
    AuthenticationError(String),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("URL error: {0}")]
    UrlError(#[from] url::ParseError),

    #[error("Missing session")]
    MissingSession,

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Storage error: {0}")]
    StorageError(#[from] StorageError),
}

impl AuthError {
    /// HTTP status reported by the provider, if this error came from a response.
    pub fn status(&self) -> Option<u16> {
        match self {
            AuthError::ApiError { status, .. } => Some(*status),
            AuthError::NetworkError(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Builds an `ApiError` from a raw error body.
    ///
    /// GoTrue reports failures under several keys depending on the endpoint
    /// (`error_description`, `msg`, `message`, `error`); the first one present wins.
    pub(crate) fn from_body(status: u16, body: &str) -> Self {
        let message = serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|value| {
                ["error_description", "msg", "message", "error"]
                    .iter()
                    .find_map(|key| value.get(*key).and_then(|v| v.as_str()).map(str::to_string))
            })
            .unwrap_or_else(|| body.to_string());

        AuthError::ApiError { status, message }
    }
}
