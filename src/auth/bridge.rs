//! Keeps the session store in step with the identity provider
//!
//! A mounted bridge owns one provider subscription. `SIGNED_IN` and
//! `SIGNED_OUT` notifications are applied to the store; everything else is
//! ignored. Notifications that arrive after unmount are dropped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use restodash_auth::{AuthChangeEvent, AuthStateChange, IdentityProvider, SubscriptionHandle};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use super::store::SessionStore;
use super::types::{AuthUser, RouteAccess};

#[derive(Clone)]
pub struct AuthStateBridge {
    inner: Arc<BridgeInner>,
}

struct BridgeInner {
    store: Arc<SessionStore>,
    provider: Arc<dyn IdentityProvider>,
    loading: watch::Sender<bool>,
    /// Hydrations in flight; `loading` is true while this is non-zero.
    hydrations: Mutex<usize>,
    listener: Mutex<Option<Listener>>,
}

struct Listener {
    mounted: Arc<AtomicBool>,
    subscription: SubscriptionHandle,
    task: JoinHandle<()>,
}

/// Holds `is_loading` up for as long as it lives. Overlapping guards
/// keep it up until the last one drops.
struct LoadingGuard<'a>(&'a BridgeInner);

impl<'a> LoadingGuard<'a> {
    fn raise(inner: &'a BridgeInner) -> Self {
        let mut count = inner
            .hydrations
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *count += 1;
        inner.loading.send_replace(true);
        Self(inner)
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        let mut count = self
            .0
            .hydrations
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.0.loading.send_replace(false);
        }
    }
}

impl AuthStateBridge {
    /// A fresh bridge starts out loading.
    pub fn new(store: Arc<SessionStore>, provider: Arc<dyn IdentityProvider>) -> Self {
        let (loading, _) = watch::channel(true);
        Self {
            inner: Arc::new(BridgeInner {
                store,
                provider,
                loading,
                hydrations: Mutex::new(0),
                listener: Mutex::new(None),
            }),
        }
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.inner.store
    }

    pub fn user(&self) -> Option<AuthUser> {
        self.inner.store.user()
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.store.is_authenticated()
    }

    pub fn is_loading(&self) -> bool {
        *self.inner.loading.borrow()
    }

    pub fn watch_loading(&self) -> watch::Receiver<bool> {
        self.inner.loading.subscribe()
    }

    pub fn access(&self) -> RouteAccess {
        RouteAccess::decide(self.is_loading(), self.is_authenticated())
    }

    pub fn is_mounted(&self) -> bool {
        self.listener()
            .as_ref()
            .map_or(false, |l| l.mounted.load(Ordering::SeqCst))
    }

    fn listener(&self) -> std::sync::MutexGuard<'_, Option<Listener>> {
        self.inner
            .listener
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Subscribes to provider notifications and hydrates the store.
    ///
    /// Mounting an already mounted bridge replaces the old subscription.
    pub async fn mount(&self) {
        self.unmount();

        let mounted = Arc::new(AtomicBool::new(true));
        let mut subscription = self.inner.provider.on_auth_state_change();
        let handle = subscription.handle();

        let inner = Arc::downgrade(&self.inner);
        let flag = mounted.clone();
        let task = tokio::spawn(async move {
            while let Some(change) = subscription.recv().await {
                let Some(inner) = inner.upgrade() else { break };
                AuthStateBridge { inner }.on_auth_event(&flag, change);
            }
            debug!("auth listener stopped");
        });

        *self.listener() = Some(Listener {
            mounted,
            subscription: handle,
            task,
        });

        self.fetch_user().await;
    }

    /// Stops listening. Late notifications are discarded.
    pub fn unmount(&self) {
        if let Some(listener) = self.listener().take() {
            listener.mounted.store(false, Ordering::SeqCst);
            listener.subscription.unsubscribe();
            listener.task.abort();
            debug!("auth bridge unmounted");
        }
    }

    /// Initial hydration. Skipped entirely when the store already holds a
    /// user and a token.
    pub async fn fetch_user(&self) {
        let _loading = LoadingGuard::raise(&self.inner);
        let store = &self.inner.store;

        if store.snapshot().is_hydrated() {
            debug!("store already hydrated");
            return;
        }

        match self.inner.provider.get_session().await {
            Ok(Some(session)) => {
                store.adopt_session(&session);
                return;
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "session lookup during hydration failed, trying user lookup"),
        }

        match self.inner.provider.get_user().await {
            Ok(Some(user)) => store.set_user(Some(AuthUser::from(&user))),
            Ok(None) => debug!("nobody signed in"),
            Err(e) => error!(error = %e, "user lookup during hydration failed"),
        }
    }

    fn on_auth_event(&self, mounted: &AtomicBool, change: AuthStateChange) {
        if !mounted.load(Ordering::SeqCst) {
            debug!(event = %change.event, "dropping notification after unmount");
            return;
        }

        let store = &self.inner.store;
        match (change.event, change.session) {
            (AuthChangeEvent::SignedIn, Some(session)) => store.adopt_session(&session),
            (AuthChangeEvent::SignedIn, None) => debug!("SIGNED_IN without a session"),
            (AuthChangeEvent::SignedOut, _) => store.reset(),
            (event, _) => debug!(%event, "ignoring auth notification"),
        }
    }
}

impl Drop for BridgeInner {
    fn drop(&mut self) {
        let listener = self
            .listener
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(listener) = listener {
            listener.mounted.store(false, Ordering::SeqCst);
            listener.subscription.unsubscribe();
            listener.task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use restodash_auth::{
        AuthError, AuthSubscription, EventBus, MemoryStorage, Session, SignOutScope, User,
        UserAttributes,
    };

    struct Silent(EventBus);

    #[async_trait::async_trait]
    impl IdentityProvider for Silent {
        async fn get_session(&self) -> Result<Option<Session>, AuthError> {
            Ok(None)
        }
        async fn get_user(&self) -> Result<Option<User>, AuthError> {
            Ok(None)
        }
        async fn sign_in_with_password(&self, _: &str, _: &str) -> Result<Session, AuthError> {
            Err(AuthError::MissingSession)
        }
        async fn sign_up(&self, _: &str, _: &str) -> Result<Option<Session>, AuthError> {
            Ok(None)
        }
        async fn sign_out(&self, _: SignOutScope) -> Result<(), AuthError> {
            Ok(())
        }
        async fn set_session(&self, _: &str, _: &str) -> Result<Session, AuthError> {
            Err(AuthError::MissingSession)
        }
        async fn update_user(&self, _: UserAttributes) -> Result<User, AuthError> {
            Err(AuthError::MissingSession)
        }
        async fn reset_password_for_email(&self, _: &str, _: Option<&str>) -> Result<(), AuthError> {
            Ok(())
        }
        fn on_auth_state_change(&self) -> AuthSubscription {
            self.0.subscribe()
        }
    }

    fn session() -> Session {
        serde_json::from_value(serde_json::json!({
            "access_token": "t1",
            "refresh_token": "r1",
            "expires_in": 3600,
            "user": {"id": "u1", "email": "a@x.com"}
        }))
        .unwrap()
    }

    fn bridge() -> AuthStateBridge {
        let provider: Arc<dyn IdentityProvider> = Arc::new(Silent(EventBus::new()));
        let store = Arc::new(SessionStore::new(
            provider.clone(),
            Arc::new(MemoryStorage::new()),
            "restodash.access_token",
        ));
        AuthStateBridge::new(store, provider)
    }

    #[test]
    fn unmounted_flag_suppresses_events() {
        let bridge = bridge();
        let stale = AtomicBool::new(false);
        bridge.on_auth_event(
            &stale,
            AuthStateChange::new(AuthChangeEvent::SignedIn, Some(session())),
        );
        assert!(bridge.user().is_none());
        assert_eq!(bridge.store().access_token(), "");
    }

    #[test]
    fn signed_in_then_signed_out() {
        let bridge = bridge();
        let live = AtomicBool::new(true);

        bridge.on_auth_event(
            &live,
            AuthStateChange::new(AuthChangeEvent::SignedIn, Some(session())),
        );
        assert_eq!(bridge.store().access_token(), "t1");
        assert_eq!(bridge.user(), Some(AuthUser::new("u1", "a@x.com")));

        bridge.on_auth_event(&live, AuthStateChange::new(AuthChangeEvent::SignedOut, None));
        assert!(bridge.user().is_none());
        assert_eq!(bridge.store().access_token(), "");
    }

    #[test]
    fn overlapping_hydrations_keep_loading_up() {
        let bridge = bridge();
        let first = LoadingGuard::raise(&bridge.inner);
        let second = LoadingGuard::raise(&bridge.inner);

        drop(first);
        assert!(bridge.is_loading());
        drop(second);
        assert!(!bridge.is_loading());
    }

    #[tokio::test]
    async fn loading_settles_after_mount() {
        let bridge = bridge();
        assert!(bridge.is_loading());
        assert_eq!(bridge.access(), RouteAccess::Loading);

        bridge.mount().await;
        assert!(bridge.is_mounted());
        assert!(!bridge.is_loading());
        assert_eq!(bridge.access(), RouteAccess::Landing);

        bridge.unmount();
        assert!(!bridge.is_mounted());
    }
}
