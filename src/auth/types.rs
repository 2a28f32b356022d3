//! Session state as the dashboard sees it

use restodash_auth::{AuthError, Session, User};

/// The signed-in user as exposed to the UI layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub id: String,
    pub email: String,
    pub roles: Option<Vec<String>>,
}

impl AuthUser {
    pub fn new(id: &str, email: &str) -> Self {
        Self {
            id: id.to_string(),
            email: email.to_string(),
            roles: None,
        }
    }

    pub fn with_roles(mut self, roles: Vec<String>) -> Self {
        self.roles = Some(roles);
        self
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles
            .as_ref()
            .map_or(false, |roles| roles.iter().any(|r| r == role))
    }
}

impl From<&User> for AuthUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            email: user.email.clone().unwrap_or_default(),
            roles: user.roles(),
        }
    }
}

impl From<&Session> for AuthUser {
    fn from(session: &Session) -> Self {
        AuthUser::from(&session.user)
    }
}

/// Snapshot of the session store.
///
/// An empty `access_token` means "no token".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthState {
    pub user: Option<AuthUser>,
    pub access_token: String,
}

impl AuthState {
    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    /// Both a user and a token are cached.
    pub fn is_hydrated(&self) -> bool {
        self.user.is_some() && !self.access_token.is_empty()
    }
}

/// Result of a credential operation. Rejections are values, never `Err`.
#[derive(Debug, Default)]
pub struct AuthOutcome {
    pub error: Option<AuthError>,
}

impl AuthOutcome {
    pub fn ok() -> Self {
        Self { error: None }
    }

    pub fn failed(error: AuthError) -> Self {
        Self { error: Some(error) }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// What a protected route should render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteAccess {
    /// Hydration still running; render nothing conclusive yet.
    Loading,
    Authenticated,
    /// Signed out and settled: show the public landing page.
    Landing,
}

impl RouteAccess {
    pub fn decide(is_loading: bool, is_authenticated: bool) -> Self {
        match (is_authenticated, is_loading) {
            (true, _) => RouteAccess::Authenticated,
            (false, true) => RouteAccess::Loading,
            (false, false) => RouteAccess::Landing,
        }
    }
}
