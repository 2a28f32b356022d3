//! Configuration for the restodash client

use std::path::PathBuf;
use std::time::Duration;
use url::Url;

use crate::error::Error;

/// Default base URL of the restaurant-management REST API.
pub const DEFAULT_API_URL: &str = "http://localhost:8000/api/v1";

/// Durable storage key holding the raw access token.
pub const ACCESS_TOKEN_KEY: &str = "restodash.access_token";

/// Configuration for the dashboard client
#[derive(Debug, Clone)]
pub struct DashboardConfig {
    /// Base URL of the identity provider (the Supabase project URL)
    pub auth_url: Url,

    /// Anonymous API key of the identity provider
    pub anon_key: String,

    /// Base URL of the REST backend, e.g. `http://localhost:8000/api/v1`
    pub api_url: Url,

    /// Key under which the access token is mirrored in durable storage
    pub storage_key: String,

    /// Directory for file-backed durable storage; in-memory when unset
    pub storage_dir: Option<PathBuf>,

    /// The request timeout
    pub request_timeout: Option<Duration>,

    /// Whether the provider refreshes expiring sessions on read
    pub auto_refresh_token: bool,

    /// Whether the provider persists its session across restarts
    pub persist_session: bool,
}

impl DashboardConfig {
    /// Creates a new configuration, validating URLs and key.
    pub fn new(auth_url: &str, anon_key: &str) -> Result<Self, Error> {
        let auth_url = Url::parse(auth_url)?;
        if anon_key.is_empty() {
            return Err(Error::config("anon_key cannot be empty"));
        }

        Ok(Self {
            auth_url,
            anon_key: anon_key.to_string(),
            api_url: Url::parse(DEFAULT_API_URL)?,
            storage_key: ACCESS_TOKEN_KEY.to_string(),
            storage_dir: None,
            request_timeout: Some(Duration::from_secs(30)),
            auto_refresh_token: true,
            persist_session: true,
        })
    }

    /// Reads `SUPABASE_URL`, `SUPABASE_ANON_KEY` and the optional
    /// `RESTODASH_API_URL` / `RESTODASH_STORAGE_DIR`.
    pub fn from_env() -> Result<Self, Error> {
        let auth_url = std::env::var("SUPABASE_URL")
            .map_err(|_| Error::config("SUPABASE_URL environment variable not found"))?;
        let anon_key = std::env::var("SUPABASE_ANON_KEY")
            .map_err(|_| Error::config("SUPABASE_ANON_KEY environment variable not found"))?;

        let mut config = Self::new(&auth_url, &anon_key)?;
        if let Ok(api_url) = std::env::var("RESTODASH_API_URL") {
            config = config.with_api_url(&api_url)?;
        }
        if let Ok(dir) = std::env::var("RESTODASH_STORAGE_DIR") {
            config = config.with_storage_dir(dir);
        }
        Ok(config)
    }

    /// Set the REST API base URL
    pub fn with_api_url(mut self, value: &str) -> Result<Self, Error> {
        self.api_url = Url::parse(value)?;
        Ok(self)
    }

    /// Set the durable storage key for the access token
    pub fn with_storage_key(mut self, value: &str) -> Self {
        self.storage_key = value.to_string();
        self
    }

    /// Persist tokens under this directory instead of in memory
    pub fn with_storage_dir(mut self, value: impl Into<PathBuf>) -> Self {
        self.storage_dir = Some(value.into());
        self
    }

    /// Set the request timeout
    pub fn with_request_timeout(mut self, value: Option<Duration>) -> Self {
        self.request_timeout = value;
        self
    }

    /// Set whether to automatically refresh the token
    pub fn with_auto_refresh_token(mut self, value: bool) -> Self {
        self.auto_refresh_token = value;
        self
    }

    /// Set whether the provider persists its session
    pub fn with_persist_session(mut self, value: bool) -> Self {
        self.persist_session = value;
        self
    }

    /// Identity provider URL without the trailing slash `Url` adds.
    pub(crate) fn auth_base(&self) -> &str {
        self.auth_url.as_str().trim_end_matches('/')
    }
}
