#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use restodash::prelude::*;
use restodash_auth::{
    AuthChangeEvent, AuthError, AuthSubscription, EventBus, MemoryStorage, SignOutScope,
    UserAttributes,
};
use serde_json::json;
use tokio::sync::Notify;

pub const TOKEN_KEY: &str = "restodash.access_token";
pub const PASSWORD: &str = "correct-horse";

pub fn user(id: &str, email: &str) -> User {
    serde_json::from_value(json!({ "id": id, "email": email })).unwrap()
}

pub fn session(token: &str, id: &str, email: &str) -> Session {
    serde_json::from_value(json!({
        "access_token": token,
        "refresh_token": format!("refresh-{}", token),
        "expires_in": 3600,
        "token_type": "bearer",
        "user": { "id": id, "email": email }
    }))
    .unwrap()
}

/// In-process identity provider with call counters.
#[derive(Default)]
pub struct FakeProvider {
    session: Mutex<Option<Session>>,
    user: Mutex<Option<User>>,
    failing: AtomicBool,
    fail_sign_out: AtomicBool,
    fail_session_lookups: AtomicBool,
    gate: Mutex<Option<Arc<Notify>>>,
    calls: Mutex<HashMap<&'static str, usize>>,
    events: EventBus,
}

impl FakeProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_session(session: Session) -> Arc<Self> {
        let provider = Self::default();
        *provider.session.lock().unwrap() = Some(session);
        Arc::new(provider)
    }

    pub fn set_session_value(&self, session: Option<Session>) {
        *self.session.lock().unwrap() = session;
    }

    pub fn set_user_value(&self, user: Option<User>) {
        *self.user.lock().unwrap() = user;
    }

    /// Every lookup fails from now on.
    pub fn go_offline(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    pub fn fail_sign_out(&self) {
        self.fail_sign_out.store(true, Ordering::SeqCst);
    }

    /// Only `get_session` fails; `get_user` keeps answering.
    pub fn fail_session_lookups(&self) {
        self.fail_session_lookups.store(true, Ordering::SeqCst);
    }

    /// `get_session` parks until released.
    pub fn hold_session_lookups(&self) {
        *self.gate.lock().unwrap() = Some(Arc::new(Notify::new()));
    }

    pub fn release_session_lookups(&self) {
        if let Some(gate) = self.gate.lock().unwrap().take() {
            gate.notify_one();
        }
    }

    pub fn calls(&self, name: &str) -> usize {
        self.calls.lock().unwrap().get(name).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }

    pub fn emit(&self, event: AuthChangeEvent, session: Option<Session>) {
        self.events.emit(event, session);
    }

    fn record(&self, name: &'static str) {
        *self.calls.lock().unwrap().entry(name).or_default() += 1;
    }

    fn check_online(&self) -> Result<(), AuthError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(AuthError::AuthenticationError("provider unreachable".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl IdentityProvider for FakeProvider {
    async fn get_session(&self) -> Result<Option<Session>, AuthError> {
        self.record("get_session");
        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.check_online()?;
        if self.fail_session_lookups.load(Ordering::SeqCst) {
            return Err(AuthError::AuthenticationError("session lookup failed".into()));
        }
        Ok(self.session.lock().unwrap().clone())
    }

    async fn get_user(&self) -> Result<Option<User>, AuthError> {
        self.record("get_user");
        self.check_online()?;
        if let Some(user) = self.user.lock().unwrap().clone() {
            return Ok(Some(user));
        }
        Ok(self.session.lock().unwrap().as_ref().map(|s| s.user.clone()))
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        self.record("sign_in_with_password");
        self.check_online()?;
        if password != PASSWORD {
            return Err(AuthError::ApiError {
                status: 400,
                message: "Invalid login credentials".into(),
            });
        }
        let session = session("T", "u1", email);
        self.set_session_value(Some(session.clone()));
        self.emit(AuthChangeEvent::SignedIn, Some(session.clone()));
        Ok(session)
    }

    async fn sign_up(&self, _email: &str, _password: &str) -> Result<Option<Session>, AuthError> {
        self.record("sign_up");
        self.check_online()?;
        Ok(None)
    }

    async fn sign_out(&self, _scope: SignOutScope) -> Result<(), AuthError> {
        self.record("sign_out");
        self.set_session_value(None);
        self.emit(AuthChangeEvent::SignedOut, None);
        if self.fail_sign_out.load(Ordering::SeqCst) {
            return Err(AuthError::ApiError {
                status: 500,
                message: "logout failed".into(),
            });
        }
        Ok(())
    }

    async fn set_session(&self, access_token: &str, _refresh_token: &str) -> Result<Session, AuthError> {
        self.record("set_session");
        self.check_online()?;
        if access_token == "expired" {
            return Err(AuthError::InvalidToken("token expired".into()));
        }
        let session = session(access_token, "u1", "a@x.com");
        self.set_session_value(Some(session.clone()));
        self.emit(AuthChangeEvent::SignedIn, Some(session.clone()));
        Ok(session)
    }

    async fn update_user(&self, _attributes: UserAttributes) -> Result<User, AuthError> {
        self.record("update_user");
        self.check_online()?;
        let current = self.session.lock().unwrap().clone();
        match current {
            Some(session) => Ok(session.user),
            None => Err(AuthError::MissingSession),
        }
    }

    async fn reset_password_for_email(&self, _email: &str, _redirect_to: Option<&str>) -> Result<(), AuthError> {
        self.record("reset_password_for_email");
        self.check_online()
    }

    fn on_auth_state_change(&self) -> AuthSubscription {
        self.events.subscribe()
    }
}

pub fn store_for(provider: &Arc<FakeProvider>, storage: &MemoryStorage) -> Arc<SessionStore> {
    Arc::new(SessionStore::new(
        provider.clone(),
        Arc::new(storage.clone()),
        TOKEN_KEY,
    ))
}

pub fn dashboard_for(
    provider: &Arc<FakeProvider>,
    storage: &MemoryStorage,
    api_url: &str,
) -> Dashboard {
    let config = DashboardConfig::new("http://localhost:54321", "anon-key")
        .unwrap()
        .with_api_url(api_url)
        .unwrap();
    Dashboard::with_provider(config, provider.clone(), Arc::new(storage.clone())).unwrap()
}

/// Polls until `check` holds; panics after a second.
pub async fn eventually(mut check: impl FnMut() -> bool) {
    for _ in 0..100 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}
