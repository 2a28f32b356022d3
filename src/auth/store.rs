//! The application-wide session store
//!
//! Holds the signed-in user and the cached access token, mirrors the token
//! into durable storage, and wraps the identity provider's credential
//! operations. There is one store per [`crate::Dashboard`]; everything that
//! needs session state holds an `Arc<SessionStore>`.

use std::sync::Arc;

use restodash_auth::{IdentityProvider, Session, SessionStorage, SignOutScope};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::types::{AuthOutcome, AuthState, AuthUser};

/// User and access token shared by the whole application
pub struct SessionStore {
    provider: Arc<dyn IdentityProvider>,
    storage: Arc<dyn SessionStorage>,
    storage_key: String,
    state: watch::Sender<AuthState>,
}

impl SessionStore {
    /// Creates the store, seeding the token from durable storage.
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        storage: Arc<dyn SessionStorage>,
        storage_key: &str,
    ) -> Self {
        let access_token = match storage.get_item(storage_key) {
            Ok(token) => token.unwrap_or_default(),
            Err(e) => {
                warn!(error = %e, "could not read persisted access token");
                String::new()
            }
        };
        let (state, _) = watch::channel(AuthState {
            user: None,
            access_token,
        });

        Self {
            provider,
            storage,
            storage_key: storage_key.to_string(),
            state,
        }
    }

    /// The identity provider behind the store.
    pub fn provider(&self) -> &Arc<dyn IdentityProvider> {
        &self.provider
    }

    /// A copy of the current user and token.
    pub fn snapshot(&self) -> AuthState {
        self.state.borrow().clone()
    }

    pub fn user(&self) -> Option<AuthUser> {
        self.state.borrow().user.clone()
    }

    /// The cached token; empty when there is none.
    pub fn access_token(&self) -> String {
        self.state.borrow().access_token.clone()
    }

    /// True whenever a user is present, whatever the token says.
    pub fn is_authenticated(&self) -> bool {
        self.state.borrow().is_authenticated()
    }

    /// Observe every state change.
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }

    /// Replaces the user. The token and durable storage are not touched.
    pub fn set_user(&self, user: Option<AuthUser>) {
        self.state.send_modify(|state| state.user = user);
    }

    /// Caches a token and mirrors it into storage. An empty token
    /// removes the stored one.
    pub fn set_access_token(&self, token: &str) {
        self.commit(|state| state.access_token = token.to_string());
    }

    pub fn reset_access_token(&self) {
        self.commit(|state| state.access_token.clear());
    }

    /// Clears user and token in one step.
    pub fn reset(&self) {
        self.commit(|state| {
            state.user = None;
            state.access_token.clear();
        });
    }

    /// Adopts a provider session: user and token are replaced together.
    pub fn adopt_session(&self, session: &Session) {
        let user = AuthUser::from(session);
        self.commit(|state| {
            state.user = Some(user);
            state.access_token = session.access_token.clone();
        });
    }

    /// Every token write goes through here so durable storage can never
    /// disagree with memory. An empty token always removes the stored one.
    fn commit(&self, mutate: impl FnOnce(&mut AuthState)) {
        let mut persist = None;
        self.state.send_modify(|state| {
            let previous = state.access_token.clone();
            mutate(state);
            if state.access_token != previous || state.access_token.is_empty() {
                persist = Some(state.access_token.clone());
            }
        });

        if let Some(token) = persist {
            let result = if token.is_empty() {
                self.storage.remove_item(&self.storage_key)
            } else {
                self.storage.set_item(&self.storage_key, &token)
            };
            if let Err(e) = result {
                warn!(error = %e, "could not persist access token");
            }
        }
    }

    /// Asks the provider for the live token. Provider failures read as "no token".
    pub async fn get_token(&self) -> Option<String> {
        match self.provider.get_session().await {
            Ok(session) => session.map(|s| s.access_token),
            Err(e) => {
                warn!(error = %e, "session lookup failed");
                None
            }
        }
    }

    /// Reconciles the store with the provider.
    ///
    /// With a cached user and token, the live session wins and both are
    /// replaced. Otherwise, or when the session lookup fails, the provider's
    /// user is adopted while the token is left alone. A failed user lookup
    /// is logged and leaves the state untouched.
    pub async fn fetch_user_data(&self) {
        if self.state.borrow().is_hydrated() {
            match self.provider.get_session().await {
                Ok(Some(session)) => {
                    debug!("reconciled store with live session");
                    self.adopt_session(&session);
                    return;
                }
                Ok(None) => debug!("no live session, falling back to user lookup"),
                Err(e) => warn!(error = %e, "session lookup failed, falling back to user lookup"),
            }
        }

        match self.provider.get_user().await {
            Ok(Some(user)) => self.set_user(Some(AuthUser::from(&user))),
            Ok(None) => debug!("provider reports no user"),
            Err(e) => warn!(error = %e, "user lookup failed"),
        }
    }

    /// Signs in with e-mail and password.
    ///
    /// On success the returned session is adopted and the store is then
    /// reconciled with the provider. A rejection comes back in the
    /// outcome and leaves the state as it was.
    pub async fn sign_in(&self, email: &str, password: &str) -> AuthOutcome {
        match self.provider.sign_in_with_password(email, password).await {
            Ok(session) => {
                info!(user_id = %session.user.id, "signed in");
                self.adopt_session(&session);
                self.fetch_user_data().await;
                AuthOutcome::ok()
            }
            Err(e) => {
                info!(error = %e, "sign-in rejected");
                AuthOutcome::failed(e)
            }
        }
    }

    /// Registers an account. Never touches the store; the provider may
    /// still require e-mail confirmation.
    pub async fn sign_up(&self, email: &str, password: &str) -> AuthOutcome {
        match self.provider.sign_up(email, password).await {
            Ok(session) => {
                if session.is_none() {
                    info!(%email, "sign-up pending confirmation");
                }
                AuthOutcome::ok()
            }
            Err(e) => {
                info!(error = %e, "sign-up rejected");
                AuthOutcome::failed(e)
            }
        }
    }

    /// Clears local state before asking the provider to revoke the session,
    /// so the user is signed out locally whatever the provider answers.
    pub async fn sign_out(&self) {
        self.reset();
        if let Err(e) = self.provider.sign_out(SignOutScope::Global).await {
            warn!(error = %e, "provider sign-out failed, local session already cleared");
            self.reset();
        }
    }
}
