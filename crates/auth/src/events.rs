//! Session-change notifications

use log::{debug, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::Notify;

use crate::types::{AuthChangeEvent, AuthStateChange, Session};

const EVENT_CAPACITY: usize = 16;

/// Fan-out of session changes to every live subscription.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<AuthStateChange>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CAPACITY);
        Self { sender }
    }

    pub fn emit(&self, event: AuthChangeEvent, session: Option<Session>) {
        debug!("Emitting auth event {}", event);
        // no receivers is fine: nobody is listening yet
        if self.sender.send(AuthStateChange::new(event, session)).is_err() {
            debug!("No subscribers for auth event {}", event);
        }
    }

    pub fn subscribe(&self) -> AuthSubscription {
        AuthSubscription {
            receiver: self.sender.subscribe(),
            handle: SubscriptionHandle::default(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Cancels an `AuthSubscription` from outside the task that drains it.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionHandle {
    inner: Arc<HandleInner>,
}

#[derive(Debug, Default)]
struct HandleInner {
    closed: AtomicBool,
    notify: Notify,
}

impl SubscriptionHandle {
    /// Stops delivery. Calling it more than once is a no-op.
    pub fn unsubscribe(&self) {
        if !self.inner.closed.swap(true, Ordering::SeqCst) {
            debug!("Auth subscription closed");
            // notify_one stores a permit, so a recv() that has not parked yet still wakes
            self.inner.notify.notify_one();
        }
    }

    pub fn is_active(&self) -> bool {
        !self.inner.closed.load(Ordering::SeqCst)
    }
}

/// A live registration for session-change notifications.
#[derive(Debug)]
pub struct AuthSubscription {
    receiver: broadcast::Receiver<AuthStateChange>,
    handle: SubscriptionHandle,
}

impl AuthSubscription {
    pub fn handle(&self) -> SubscriptionHandle {
        self.handle.clone()
    }

    pub fn unsubscribe(&self) {
        self.handle.unsubscribe();
    }

    pub fn is_active(&self) -> bool {
        self.handle.is_active()
    }

    /// Waits for the next notification.
    ///
    /// Returns `None` once the subscription is closed or the provider is gone.
    /// Notifications dropped because this receiver lagged are skipped.
    pub async fn recv(&mut self) -> Option<AuthStateChange> {
        loop {
            if !self.handle.is_active() {
                return None;
            }
            tokio::select! {
                _ = self.handle.inner.notify.notified() => return None,
                received = self.receiver.recv() => match received {
                    Ok(change) if self.handle.is_active() => return Some(change),
                    Ok(_) => return None,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Auth subscription lagged, {} notifications skipped", skipped);
                    }
                    Err(RecvError::Closed) => return None,
                },
            }
        }
    }
}
