//! HTTP client for a GoTrue-compatible `/auth/v1` API

use async_trait::async_trait;
use chrono::Utc;
use log::{debug, info, warn};
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::Mutex;

use crate::error::AuthError;
use crate::events::{AuthSubscription, EventBus};
use crate::jwt;
use crate::storage::SessionStorage;
use crate::types::{AuthChangeEvent, Session, SignOutScope, User, UserAttributes};
use crate::IdentityProvider;

/// Path of the provider's own user-lookup endpoint.
pub const USER_ENDPOINT_PATH: &str = "/auth/v1/user";

/// Sessions this close to expiry are refreshed before being handed out.
pub const EXPIRY_MARGIN_SECS: i64 = 10;

const CLIENT_INFO: &str = concat!("restodash-auth/", env!("CARGO_PKG_VERSION"));

/// Client options
#[derive(Debug, Clone)]
pub struct AuthOptions {
    pub auto_refresh_token: bool,
    pub persist_session: bool,
    /// Key under which the serialized session is persisted.
    pub storage_key: String,
}

impl Default for AuthOptions {
    fn default() -> Self {
        Self {
            auto_refresh_token: true,
            persist_session: true,
            storage_key: "supabase.auth.token".to_string(),
        }
    }
}

impl AuthOptions {
    pub fn with_auto_refresh_token(mut self, value: bool) -> Self {
        self.auto_refresh_token = value;
        self
    }

    pub fn with_persist_session(mut self, value: bool) -> Self {
        self.persist_session = value;
        self
    }

    pub fn with_storage_key(mut self, value: &str) -> Self {
        self.storage_key = value.to_string();
        self
    }
}

/// Identity provider client
pub struct Auth {
    url: String,
    key: String,
    http_client: Client,
    options: AuthOptions,
    current_session: Arc<RwLock<Option<Session>>>,
    refresh_lock: Arc<Mutex<()>>,
    events: EventBus,
    storage: Option<Arc<dyn SessionStorage>>,
}

impl Auth {
    /// Create a new Auth client
    pub fn new(url: &str, key: &str, http_client: Client, options: AuthOptions) -> Self {
        Self {
            url: url.trim_end_matches('/').to_string(),
            key: key.to_string(),
            http_client,
            options,
            current_session: Arc::new(RwLock::new(None)),
            refresh_lock: Arc::new(Mutex::new(())),
            events: EventBus::new(),
            storage: None,
        }
    }

    /// Attaches durable storage and restores any session persisted there.
    pub fn with_storage(mut self, storage: Arc<dyn SessionStorage>) -> Self {
        self.storage = Some(storage);
        self.restore();
        self
    }

    fn restore(&self) {
        if !self.options.persist_session {
            return;
        }
        let Some(storage) = &self.storage else {
            return;
        };
        match storage.get_item(&self.options.storage_key) {
            Ok(Some(raw)) => match serde_json::from_str::<Session>(&raw) {
                Ok(session) => {
                    debug!("Restored persisted session for user {}", session.user.id);
                    *self.current_session.write().unwrap_or_else(PoisonError::into_inner) =
                        Some(session);
                }
                Err(e) => {
                    warn!("Discarding unreadable persisted session: {}", e);
                    if let Err(e) = storage.remove_item(&self.options.storage_key) {
                        warn!("Failed to remove persisted session: {}", e);
                    }
                }
            },
            Ok(None) => {}
            Err(e) => warn!("Failed to read persisted session: {}", e),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/auth/v1{}", self.url, path)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http_client
            .request(method, self.endpoint(path))
            .header("apikey", &self.key)
            .header("X-Client-Info", CLIENT_INFO)
    }

    async fn parse<T: DeserializeOwned>(response: Response) -> Result<T, AuthError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::from_body(status.as_u16(), &body));
        }
        Ok(response.json::<T>().await?)
    }

    /// The session currently held in memory, without any refresh.
    pub fn current_session(&self) -> Option<Session> {
        self.current_session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn save_session(&self, session: &Session) {
        *self
            .current_session
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(session.clone());

        if !self.options.persist_session {
            return;
        }
        if let Some(storage) = &self.storage {
            let stored = serde_json::to_string(session)
                .map_err(AuthError::from)
                .and_then(|raw| {
                    storage
                        .set_item(&self.options.storage_key, &raw)
                        .map_err(AuthError::from)
                });
            if let Err(e) = stored {
                warn!("Failed to persist session: {}", e);
            }
        }
    }

    fn clear_session(&self) {
        *self
            .current_session
            .write()
            .unwrap_or_else(PoisonError::into_inner) = None;

        if let Some(storage) = &self.storage {
            if let Err(e) = storage.remove_item(&self.options.storage_key) {
                warn!("Failed to remove persisted session: {}", e);
            }
        }
    }

    /// Current session, refreshed first when it is about to expire.
    pub async fn get_session(&self) -> Result<Option<Session>, AuthError> {
        let Some(session) = self.current_session() else {
            return Ok(None);
        };

        if self.options.auto_refresh_token && session.expires_within(EXPIRY_MARGIN_SECS) {
            let _refreshing = self.refresh_lock.lock().await;

            // whoever held the lock before us may already have refreshed
            let Some(session) = self.current_session() else {
                return Ok(None);
            };
            if !session.expires_within(EXPIRY_MARGIN_SECS) {
                return Ok(Some(session));
            }

            debug!("Session for {} is expiring, refreshing", session.user.id);
            return match self.refresh_with(&session.refresh_token).await {
                Ok(refreshed) => Ok(Some(refreshed)),
                Err(e) => {
                    warn!("Session refresh failed, signing out locally: {}", e);
                    self.clear_session();
                    self.events.emit(AuthChangeEvent::SignedOut, None);
                    Err(e)
                }
            };
        }

        Ok(Some(session))
    }

    /// The principal behind the current session, looked up on the provider.
    pub async fn get_user(&self) -> Result<Option<User>, AuthError> {
        let Some(session) = self.get_session().await? else {
            return Ok(None);
        };
        self.get_user_by_token(&session.access_token).await.map(Some)
    }

    async fn get_user_by_token(&self, token: &str) -> Result<User, AuthError> {
        let response = self
            .request(Method::GET, "/user")
            .bearer_auth(token)
            .send()
            .await?;
        Self::parse(response).await
    }

    /// Sign in with email and password
    pub async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, AuthError> {
        let response = self
            .request(Method::POST, "/token?grant_type=password")
            .json(&serde_json::json!({
                "email": email,
                "password": password,
            }))
            .send()
            .await?;

        let session = Self::parse::<Session>(response).await?.with_computed_expiry();
        info!("Signed in user {}", session.user.id);

        self.save_session(&session);
        self.events
            .emit(AuthChangeEvent::SignedIn, Some(session.clone()));

        Ok(session)
    }

    /// Register a new user.
    ///
    /// Returns `None` when the provider is waiting for e-mail confirmation and
    /// therefore issued no session yet.
    pub async fn sign_up(&self, email: &str, password: &str) -> Result<Option<Session>, AuthError> {
        let response = self
            .request(Method::POST, "/signup")
            .json(&serde_json::json!({
                "email": email,
                "password": password,
            }))
            .send()
            .await?;

        let body = Self::parse::<serde_json::Value>(response).await?;
        if body.get("access_token").is_none() {
            debug!("Sign-up accepted, confirmation pending for {}", email);
            return Ok(None);
        }

        let session = serde_json::from_value::<Session>(body)?.with_computed_expiry();
        self.save_session(&session);
        self.events
            .emit(AuthChangeEvent::SignedIn, Some(session.clone()));

        Ok(Some(session))
    }

    /// Sign out.
    ///
    /// Local state is cleared and `SIGNED_OUT` is emitted before the remote
    /// call, so a failing network never leaves this client signed in.
    pub async fn sign_out(&self, scope: SignOutScope) -> Result<(), AuthError> {
        let token = self.current_session().map(|s| s.access_token);

        self.clear_session();
        self.events.emit(AuthChangeEvent::SignedOut, None);

        let Some(token) = token else {
            return Ok(());
        };

        let response = self
            .request(Method::POST, &format!("/logout?scope={}", scope.as_str()))
            .bearer_auth(&token)
            .send()
            .await?;

        let status = response.status();
        // the session is already gone on the provider side
        if status.is_success() || status.as_u16() == 401 || status.as_u16() == 404 {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(AuthError::from_body(status.as_u16(), &body))
    }

    /// Adopt a session from raw tokens, e.g. those carried by a recovery link.
    pub async fn set_session(
        &self,
        access_token: &str,
        refresh_token: &str,
    ) -> Result<Session, AuthError> {
        if access_token.is_empty() {
            return Err(AuthError::AuthenticationError(
                "access token is required".to_string(),
            ));
        }

        let claims = jwt::decode_unverified(access_token)?;
        let now = Utc::now().timestamp();
        let expires_at = claims.exp.unwrap_or(now);

        if expires_at <= now {
            if refresh_token.is_empty() {
                return Err(AuthError::InvalidToken(
                    "access token has expired".to_string(),
                ));
            }
            return self.refresh_with(refresh_token).await;
        }

        let user = self.get_user_by_token(access_token).await?;
        let session = Session {
            access_token: access_token.to_string(),
            refresh_token: refresh_token.to_string(),
            expires_in: expires_at - now,
            expires_at: Some(expires_at),
            token_type: "bearer".to_string(),
            user,
        };

        self.save_session(&session);
        self.events
            .emit(AuthChangeEvent::SignedIn, Some(session.clone()));

        Ok(session)
    }

    /// Exchange the current refresh token for a new session.
    pub async fn refresh_session(&self) -> Result<Session, AuthError> {
        let _refreshing = self.refresh_lock.lock().await;
        let session = self.current_session().ok_or(AuthError::MissingSession)?;
        self.refresh_with(&session.refresh_token).await
    }

    async fn refresh_with(&self, refresh_token: &str) -> Result<Session, AuthError> {
        let response = self
            .request(Method::POST, "/token?grant_type=refresh_token")
            .json(&serde_json::json!({
                "refresh_token": refresh_token,
            }))
            .send()
            .await?;

        let session = Self::parse::<Session>(response).await?.with_computed_expiry();
        debug!("Refreshed session for user {}", session.user.id);

        self.save_session(&session);
        self.events
            .emit(AuthChangeEvent::TokenRefreshed, Some(session.clone()));

        Ok(session)
    }

    /// Update the signed-in user's attributes (e.g. a new password).
    pub async fn update_user(&self, attributes: UserAttributes) -> Result<User, AuthError> {
        let session = self.get_session().await?.ok_or(AuthError::MissingSession)?;

        let response = self
            .request(Method::PUT, "/user")
            .bearer_auth(&session.access_token)
            .json(&attributes)
            .send()
            .await?;

        let user: User = Self::parse(response).await?;

        let updated = Session {
            user: user.clone(),
            ..session
        };
        self.save_session(&updated);
        self.events
            .emit(AuthChangeEvent::UserUpdated, Some(updated));

        Ok(user)
    }

    /// Send a password-reset e-mail.
    pub async fn reset_password_for_email(
        &self,
        email: &str,
        redirect_to: Option<&str>,
    ) -> Result<(), AuthError> {
        let path = match redirect_to {
            Some(redirect) => format!("/recover?redirect_to={}", urlencoding::encode(redirect)),
            None => "/recover".to_string(),
        };

        let response = self
            .request(Method::POST, &path)
            .json(&serde_json::json!({ "email": email }))
            .send()
            .await?;

        Self::parse::<serde_json::Value>(response).await.map(|_| ())
    }

    pub fn on_auth_state_change(&self) -> AuthSubscription {
        self.events.subscribe()
    }
}

#[async_trait]
impl IdentityProvider for Auth {
    async fn get_session(&self) -> Result<Option<Session>, AuthError> {
        Auth::get_session(self).await
    }

    async fn get_user(&self) -> Result<Option<User>, AuthError> {
        Auth::get_user(self).await
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, AuthError> {
        Auth::sign_in_with_password(self, email, password).await
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<Option<Session>, AuthError> {
        Auth::sign_up(self, email, password).await
    }

    async fn sign_out(&self, scope: SignOutScope) -> Result<(), AuthError> {
        Auth::sign_out(self, scope).await
    }

    async fn set_session(
        &self,
        access_token: &str,
        refresh_token: &str,
    ) -> Result<Session, AuthError> {
        Auth::set_session(self, access_token, refresh_token).await
    }

    async fn update_user(&self, attributes: UserAttributes) -> Result<User, AuthError> {
        Auth::update_user(self, attributes).await
    }

    async fn reset_password_for_email(
        &self,
        email: &str,
        redirect_to: Option<&str>,
    ) -> Result<(), AuthError> {
        Auth::reset_password_for_email(self, email, redirect_to).await
    }

    fn on_auth_state_change(&self) -> AuthSubscription {
        Auth::on_auth_state_change(self)
    }
}
