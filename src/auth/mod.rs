//! Session core: store, provider bridge and password recovery

mod bridge;
mod recovery;
mod store;
mod types;

pub use bridge::AuthStateBridge;
pub use recovery::{PasswordRecovery, RecoveryError, RecoveryLink, MIN_PASSWORD_LENGTH};
pub use store::SessionStore;
pub use types::{AuthOutcome, AuthState, AuthUser, RouteAccess};
