//! Error handling for the restodash client

use std::fmt;
use thiserror::Error;

use restodash_auth::AuthError;

use crate::auth::RecoveryError;

/// Unified error type for the restodash client
#[derive(Error, Debug)]
pub enum Error {
    /// Network or HTTP related errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization or deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parsing errors
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// Identity provider errors
    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    /// Password recovery failures
    #[error("Recovery error: {0}")]
    Recovery(#[from] RecoveryError),

    /// The backend rejected the bearer credential and recovery did not help
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Any other non-success status from the REST backend
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Invalid or missing configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// General errors
    #[error("{0}")]
    General(String),
}

impl Error {
    /// Create a new configuration error
    pub fn config<T: fmt::Display>(msg: T) -> Self {
        Error::Config(msg.to_string())
    }

    /// Create a new general error
    pub fn general<T: fmt::Display>(msg: T) -> Self {
        Error::General(msg.to_string())
    }

    /// Map a non-success backend status onto the matching variant.
    pub fn from_status(status: u16, body: String) -> Self {
        if status == 401 {
            Error::Unauthorized(body)
        } else {
            Error::Api {
                status,
                message: body,
            }
        }
    }

    /// Whether the caller should send the user back to sign-in.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Error::Unauthorized(_))
            || matches!(self, Error::Auth(e) if e.status() == Some(401))
    }
}
