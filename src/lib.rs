//! Restodash client library
//!
//! The session core of the restodash restaurant-management dashboard: a
//! session store mirrored into durable storage, a bridge that keeps it in
//! step with the identity provider, and an HTTP client that attaches the
//! bearer token to every REST call and recovers from a `401` once.

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod fetch;

use std::sync::Arc;

use reqwest::Client;
use restodash_auth::{
    Auth, AuthError, AuthOptions, FileStorage, IdentityProvider, MemoryStorage, SessionStorage,
};

use crate::api::{MenuItemsApi, PermissionsApi, RestaurantsApi, RolesApi, TenantsApi};
use crate::auth::{AuthOutcome, AuthStateBridge, PasswordRecovery, SessionStore};
use crate::config::DashboardConfig;
use crate::error::Error;
use crate::fetch::AuthorizedClient;

/// The main entry point: one session store, one provider, one REST client
pub struct Dashboard {
    config: DashboardConfig,
    provider: Arc<dyn IdentityProvider>,
    store: Arc<SessionStore>,
    client: AuthorizedClient,
}

impl Dashboard {
    /// Create a dashboard client talking to the configured identity provider
    ///
    /// # Example
    ///
    /// ```no_run
    /// use restodash::{config::DashboardConfig, Dashboard};
    ///
    /// # async fn run() -> Result<(), restodash::error::Error> {
    /// let config = DashboardConfig::new("https://your-project.supabase.co", "your-anon-key")?;
    /// let dashboard = Dashboard::new(config)?;
    /// let outcome = dashboard.sign_in("admin@example.com", "secret").await;
    /// if outcome.is_ok() {
    ///     let tenants = dashboard.tenants().list().await?;
    ///     println!("{} tenants", tenants.len());
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(config: DashboardConfig) -> Result<Self, Error> {
        let http_client = Self::http_client(&config)?;
        let storage = Self::storage(&config)?;

        let options = AuthOptions::default()
            .with_auto_refresh_token(config.auto_refresh_token)
            .with_persist_session(config.persist_session);
        let auth = Auth::new(
            config.auth_base(),
            &config.anon_key,
            http_client.clone(),
            options,
        )
        .with_storage(storage.clone());

        Ok(Self::assemble(config, http_client, Arc::new(auth), storage))
    }

    /// Create a dashboard client over any identity provider and storage
    pub fn with_provider(
        config: DashboardConfig,
        provider: Arc<dyn IdentityProvider>,
        storage: Arc<dyn SessionStorage>,
    ) -> Result<Self, Error> {
        let http_client = Self::http_client(&config)?;
        Ok(Self::assemble(config, http_client, provider, storage))
    }

    fn assemble(
        config: DashboardConfig,
        http_client: Client,
        provider: Arc<dyn IdentityProvider>,
        storage: Arc<dyn SessionStorage>,
    ) -> Self {
        let store = Arc::new(SessionStore::new(
            provider.clone(),
            storage,
            &config.storage_key,
        ));
        let client = AuthorizedClient::new(http_client, config.api_url.clone(), store.clone());

        Self {
            config,
            provider,
            store,
            client,
        }
    }

    fn http_client(config: &DashboardConfig) -> Result<Client, Error> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        Ok(builder.build()?)
    }

    fn storage(config: &DashboardConfig) -> Result<Arc<dyn SessionStorage>, Error> {
        Ok(match &config.storage_dir {
            Some(dir) => Arc::new(FileStorage::open(dir).map_err(AuthError::from)?),
            None => Arc::new(MemoryStorage::new()),
        })
    }

    pub fn config(&self) -> &DashboardConfig {
        &self.config
    }

    pub fn provider(&self) -> &Arc<dyn IdentityProvider> {
        &self.provider
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    /// The authorized HTTP client shared by every resource API
    pub fn http(&self) -> &AuthorizedClient {
        &self.client
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> AuthOutcome {
        self.store.sign_in(email, password).await
    }

    pub async fn sign_up(&self, email: &str, password: &str) -> AuthOutcome {
        self.store.sign_up(email, password).await
    }

    pub async fn sign_out(&self) {
        self.store.sign_out().await
    }

    /// A bridge over this dashboard's store; not yet mounted.
    pub fn auth_bridge(&self) -> AuthStateBridge {
        AuthStateBridge::new(self.store.clone(), self.provider.clone())
    }

    /// Mount a bridge and wait for initial hydration
    pub async fn mount_auth_bridge(&self) -> AuthStateBridge {
        let bridge = self.auth_bridge();
        bridge.mount().await;
        bridge
    }

    pub fn recovery(&self) -> PasswordRecovery {
        PasswordRecovery::new(self.provider.clone())
    }

    pub fn tenants(&self) -> TenantsApi<'_> {
        TenantsApi::new(&self.client)
    }

    pub fn restaurants(&self) -> RestaurantsApi<'_> {
        RestaurantsApi::new(&self.client)
    }

    pub fn menu_items(&self) -> MenuItemsApi<'_> {
        MenuItemsApi::new(&self.client)
    }

    pub fn roles(&self) -> RolesApi<'_> {
        RolesApi::new(&self.client)
    }

    pub fn permissions(&self) -> PermissionsApi<'_> {
        PermissionsApi::new(&self.client)
    }
}

/// A convenience module for common imports
pub mod prelude {
    pub use crate::auth::{AuthOutcome, AuthState, AuthStateBridge, AuthUser, RouteAccess, SessionStore};
    pub use crate::config::DashboardConfig;
    pub use crate::error::Error;
    pub use crate::fetch::AuthorizedClient;
    pub use crate::Dashboard;
    pub use restodash_auth::{IdentityProvider, Session, SessionStorage, User};
}
