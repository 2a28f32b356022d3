//! Password recovery: reset e-mails, recovery links and the new password

use std::sync::Arc;

use restodash_auth::{AuthError, IdentityProvider, Session, User, UserAttributes};
use thiserror::Error;
use tracing::{info, warn};
use url::Url;

/// Passwords shorter than this are rejected before reaching the provider.
pub const MIN_PASSWORD_LENGTH: usize = 8;

#[derive(Error, Debug)]
pub enum RecoveryError {
    #[error("Invalid or expired reset link: {0}")]
    InvalidLink(String),

    #[error("Password must be at least {min} characters")]
    WeakPassword { min: usize },

    #[error(transparent)]
    Auth(#[from] AuthError),
}

/// Token material carried in a recovery link's fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryLink {
    pub access_token: String,
    pub refresh_token: String,
}

impl RecoveryLink {
    /// Parses `access_token`, `refresh_token` and `type` out of a fragment.
    ///
    /// Accepts a full URL, a bare `#...` fragment or the fragment body.
    /// Returns `Ok(None)` when there is no fragment at all.
    pub fn parse(input: &str) -> Result<Option<Self>, RecoveryError> {
        let fragment = match Url::parse(input) {
            Ok(url) => url.fragment().map(str::to_string),
            Err(_) => Some(input.trim_start_matches('#').to_string()),
        };
        let fragment = match fragment {
            Some(f) if !f.is_empty() => f,
            _ => return Ok(None),
        };

        let mut access_token = None;
        let mut refresh_token = None;
        let mut kind = None;
        for (key, value) in url::form_urlencoded::parse(fragment.as_bytes()) {
            match key.as_ref() {
                "access_token" => access_token = Some(value.into_owned()),
                "refresh_token" => refresh_token = Some(value.into_owned()),
                "type" => kind = Some(value.into_owned()),
                _ => {}
            }
        }

        if kind.as_deref() != Some("recovery") {
            return Err(RecoveryError::InvalidLink("not a recovery link".into()));
        }
        match access_token {
            Some(access_token) if !access_token.is_empty() => Ok(Some(Self {
                access_token,
                refresh_token: refresh_token.unwrap_or_default(),
            })),
            _ => Err(RecoveryError::InvalidLink("missing access token".into())),
        }
    }
}

pub struct PasswordRecovery {
    provider: Arc<dyn IdentityProvider>,
}

impl PasswordRecovery {
    pub fn new(provider: Arc<dyn IdentityProvider>) -> Self {
        Self { provider }
    }

    /// Sends the reset e-mail. `redirect_to` is where the link lands.
    pub async fn request_password_reset(
        &self,
        email: &str,
        redirect_to: Option<&str>,
    ) -> Result<(), RecoveryError> {
        self.provider
            .reset_password_for_email(email, redirect_to)
            .await?;
        info!(%email, "password reset requested");
        Ok(())
    }

    /// Establishes the session a recovery link grants.
    pub async fn recover_from_link(&self, link: &str) -> Result<Session, RecoveryError> {
        match RecoveryLink::parse(link)? {
            Some(link) => {
                let session = self
                    .provider
                    .set_session(&link.access_token, &link.refresh_token)
                    .await
                    .map_err(|e| {
                        warn!(error = %e, "recovery link rejected by provider");
                        RecoveryError::InvalidLink(e.to_string())
                    })?;
                Ok(session)
            }
            None => match self.provider.get_session().await? {
                Some(session) => Ok(session),
                None => Err(RecoveryError::InvalidLink("no active session".into())),
            },
        }
    }

    pub async fn update_password(&self, new_password: &str) -> Result<User, RecoveryError> {
        if new_password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(RecoveryError::WeakPassword {
                min: MIN_PASSWORD_LENGTH,
            });
        }
        let user = self
            .provider
            .update_user(UserAttributes::password(new_password))
            .await?;
        info!(user_id = %user.id, "password updated");
        Ok(user)
    }
}
