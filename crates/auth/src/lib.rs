//! Identity provider client for the restodash admin dashboard
//!
//! This crate talks to a GoTrue-compatible authentication service (Supabase
//! Auth): password sign-in and sign-up, sign-out, session refresh, recovery
//! links, user updates, and session-change notifications. The
//! [`IdentityProvider`] trait is the seam the dashboard's session core is
//! written against; [`Auth`] is the HTTP implementation.

mod client;
mod error;
mod events;
pub mod jwt;
pub mod storage;
mod types;

use async_trait::async_trait;

pub use client::{Auth, AuthOptions, EXPIRY_MARGIN_SECS, USER_ENDPOINT_PATH};
pub use error::AuthError;
pub use events::{AuthSubscription, EventBus, SubscriptionHandle};
pub use storage::{FileStorage, MemoryStorage, SessionStorage, StorageError};
pub use types::{
    AuthChangeEvent, AuthStateChange, Session, SignOutScope, User, UserAttributes,
};

/// The capability set the dashboard needs from an identity provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// The live session, or `None` when nobody is signed in.
    async fn get_session(&self) -> Result<Option<Session>, AuthError>;

    /// The authenticated principal, looked up directly.
    async fn get_user(&self) -> Result<Option<User>, AuthError>;

    async fn sign_in_with_password(&self, email: &str, password: &str)
        -> Result<Session, AuthError>;

    /// `None` when the account awaits e-mail confirmation.
    async fn sign_up(&self, email: &str, password: &str) -> Result<Option<Session>, AuthError>;

    async fn sign_out(&self, scope: SignOutScope) -> Result<(), AuthError>;

    async fn set_session(&self, access_token: &str, refresh_token: &str)
        -> Result<Session, AuthError>;

    async fn update_user(&self, attributes: UserAttributes) -> Result<User, AuthError>;

    async fn reset_password_for_email(
        &self,
        email: &str,
        redirect_to: Option<&str>,
    ) -> Result<(), AuthError>;

    /// Registers for session-change notifications.
    fn on_auth_state_change(&self) -> AuthSubscription;
}
