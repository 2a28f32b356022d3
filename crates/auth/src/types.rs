//! Wire types shared by the provider client and its consumers

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;

/// An authenticated principal as reported by the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub app_metadata: serde_json::Value,
    #[serde(default)]
    pub user_metadata: serde_json::Value,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl User {
    /// Roles granted through `app_metadata.roles`, if the project assigns any.
    pub fn roles(&self) -> Option<Vec<String>> {
        self.app_metadata
            .get("roles")
            .and_then(|v| v.as_array())
            .map(|roles| {
                roles
                    .iter()
                    .filter_map(|r| r.as_str().map(str::to_string))
                    .collect()
            })
    }
}

/// A provider session: the principal plus its access and refresh tokens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: String,
    #[serde(default)]
    pub expires_in: i64,
    /// Unix timestamp (seconds). Filled from `expires_in` when the provider omits it.
    #[serde(default)]
    pub expires_at: Option<i64>,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    pub user: User,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

impl Session {
    /// Fills `expires_at` from `expires_in` when the provider did not send it.
    pub fn with_computed_expiry(mut self) -> Self {
        if self.expires_at.is_none() && self.expires_in > 0 {
            self.expires_at = Some(Utc::now().timestamp() + self.expires_in);
        }
        self
    }

    /// Whether the access token expires within `margin_secs` from now.
    ///
    /// Sessions without an expiry never count as expiring.
    pub fn expires_within(&self, margin_secs: i64) -> bool {
        match self.expires_at {
            Some(expires_at) => Utc::now().timestamp() + margin_secs >= expires_at,
            None => false,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.expires_within(0)
    }
}

/// Attributes accepted by `update_user`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserAttributes {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl UserAttributes {
    pub fn password(password: &str) -> Self {
        Self {
            password: Some(password.to_string()),
            ..Default::default()
        }
    }
}

/// Which sessions a sign-out invalidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignOutScope {
    /// Every session of the principal, on every device.
    #[default]
    Global,
    /// Only the session held by this client.
    Local,
    /// Every session except the one held by this client.
    Others,
}

impl SignOutScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Global => "global",
            Self::Local => "local",
            Self::Others => "others",
        }
    }
}

/// Kinds of session-change notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthChangeEvent {
    InitialSession,
    SignedIn,
    SignedOut,
    TokenRefreshed,
    UserUpdated,
    PasswordRecovery,
    #[serde(other)]
    Unknown,
}

impl fmt::Display for AuthChangeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::InitialSession => "INITIAL_SESSION",
            Self::SignedIn => "SIGNED_IN",
            Self::SignedOut => "SIGNED_OUT",
            Self::TokenRefreshed => "TOKEN_REFRESHED",
            Self::UserUpdated => "USER_UPDATED",
            Self::PasswordRecovery => "PASSWORD_RECOVERY",
            Self::Unknown => "UNKNOWN",
        };
        f.write_str(name)
    }
}

/// A notification delivered to `on_auth_state_change` subscribers.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthStateChange {
    pub event: AuthChangeEvent,
    pub session: Option<Session>,
}

impl AuthStateChange {
    pub fn new(event: AuthChangeEvent, session: Option<Session>) -> Self {
        Self { event, session }
    }
}
