//! Authorized HTTP access to the REST backend
//!
//! Every request built here carries the store's bearer token. A `401` is
//! recovered at most once: the store is reconciled with the identity
//! provider and the request is replayed with the fresh token. Only one
//! recovery runs at a time across all clones of an [`AuthorizedClient`];
//! a `401` arriving while another recovery is in flight is returned as is.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Method, Request, Response, StatusCode};
use restodash_auth::USER_ENDPOINT_PATH;
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, info};
use url::Url;

use crate::auth::SessionStore;
use crate::error::Error;

/// HTTP client for the REST backend that authenticates as the store's user
#[derive(Clone)]
pub struct AuthorizedClient {
    http_client: Client,
    base_url: Url,
    store: Arc<SessionStore>,
    refreshing: Arc<AtomicBool>,
}

/// Owns the in-progress flag for one recovery attempt.
struct RefreshGuard<'a>(&'a AtomicBool);

impl<'a> RefreshGuard<'a> {
    fn try_acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for RefreshGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl AuthorizedClient {
    /// Create a new client. Relative paths resolve against `base_url`,
    /// which is treated as a directory even without a trailing slash.
    pub fn new(http_client: Client, base_url: Url, store: Arc<SessionStore>) -> Self {
        let mut base_url = base_url;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Self {
            http_client,
            base_url,
            store,
            refreshing: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Get the API base URL
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    /// Whether a 401 recovery is currently running.
    pub fn is_refreshing(&self) -> bool {
        self.refreshing.load(Ordering::Acquire)
    }

    /// Resolves `path` against the API base. Absolute URLs pass through.
    pub fn endpoint(&self, path: &str) -> Result<Url, Error> {
        if let Ok(url) = Url::parse(path) {
            return Ok(url);
        }
        Ok(self.base_url.join(path.trim_start_matches('/'))?)
    }

    /// Create a request with an arbitrary method
    pub fn request(&self, method: Method, path: &str) -> Result<FetchBuilder<'_>, Error> {
        Ok(FetchBuilder::new(self, self.endpoint(path)?, method))
    }

    /// Create a GET request
    pub fn get(&self, path: &str) -> Result<FetchBuilder<'_>, Error> {
        self.request(Method::GET, path)
    }

    /// Create a POST request
    pub fn post(&self, path: &str) -> Result<FetchBuilder<'_>, Error> {
        self.request(Method::POST, path)
    }

    /// Create a PUT request
    pub fn put(&self, path: &str) -> Result<FetchBuilder<'_>, Error> {
        self.request(Method::PUT, path)
    }

    /// Create a PATCH request
    pub fn patch(&self, path: &str) -> Result<FetchBuilder<'_>, Error> {
        self.request(Method::PATCH, path)
    }

    /// Create a DELETE request
    pub fn delete(&self, path: &str) -> Result<FetchBuilder<'_>, Error> {
        self.request(Method::DELETE, path)
    }

    async fn recover(
        &self,
        request: &FetchBuilder<'_>,
        unauthorized: Response,
    ) -> Result<Response, Error> {
        if self.is_refreshing() {
            debug!(url = %request.url, "recovery already running, passing 401 through");
            return Ok(unauthorized);
        }
        if request.url.path().contains(USER_ENDPOINT_PATH) {
            debug!(url = %request.url, "401 from the user endpoint, passing through");
            return Ok(unauthorized);
        }
        let Some(_guard) = RefreshGuard::try_acquire(&self.refreshing) else {
            debug!(url = %request.url, "lost the race for recovery, passing 401 through");
            return Ok(unauthorized);
        };

        info!(url = %request.url, "401 from backend, reconciling session");
        self.store.fetch_user_data().await;

        let token = self.store.access_token();
        if token.is_empty() {
            info!("no token after reconciliation, giving up");
            return Ok(unauthorized);
        }

        let retried = self.http_client.execute(request.build(&token)?).await?;
        debug!(status = %retried.status(), "replayed request");
        Ok(retried)
    }
}

/// Helper for building and executing authorized requests
pub struct FetchBuilder<'a> {
    client: &'a AuthorizedClient,
    url: Url,
    method: Method,
    headers: HeaderMap,
    query_params: Option<HashMap<String, String>>,
    body: Option<Vec<u8>>,
}

impl<'a> FetchBuilder<'a> {
    fn new(client: &'a AuthorizedClient, url: Url, method: Method) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        Self {
            client,
            url,
            method,
            headers,
            query_params: None,
            body: None,
        }
    }

    /// Add a header to the request. Values that are not valid header
    /// text are skipped.
    pub fn header(mut self, name: &'static str, value: &str) -> Self {
        if let Ok(value) = HeaderValue::from_str(value) {
            self.headers.insert(name, value);
        }
        self
    }

    /// Add query parameters to the request
    pub fn query(mut self, params: HashMap<String, String>) -> Self {
        if !params.is_empty() {
            self.query_params = Some(params);
        }
        self
    }

    /// Set a JSON body for the request
    pub fn json<T: Serialize>(mut self, body: &T) -> Result<Self, Error> {
        self.body = Some(serde_json::to_vec(body)?);
        Ok(self)
    }

    fn build(&self, token: &str) -> Result<Request, Error> {
        let mut url = self.url.clone();
        if let Some(params) = &self.query_params {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in params {
                pairs.append_pair(key, value);
            }
        }

        let mut headers = self.headers.clone();
        if !token.is_empty() {
            let bearer = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| Error::general(format!("invalid access token: {}", e)))?;
            headers.insert(AUTHORIZATION, bearer);
        }

        let mut req = self
            .client
            .http_client
            .request(self.method.clone(), url)
            .headers(headers);
        if let Some(body) = &self.body {
            req = req.body(body.clone());
        }
        Ok(req.build()?)
    }

    /// Sends the request, recovering from a 401 at most once.
    pub async fn execute_raw(&self) -> Result<Response, Error> {
        let token = self.client.store.access_token();
        let response = self.client.http_client.execute(self.build(&token)?).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }
        self.client.recover(self, response).await
    }

    /// Execute the request and deserialize a successful JSON response.
    /// Non-2xx answers become [`Error::from_status`].
    pub async fn execute<T: DeserializeOwned>(&self) -> Result<T, Error> {
        let response = Self::check(self.execute_raw().await?).await?;
        Ok(response.json::<T>().await?)
    }

    /// For endpoints whose success body is irrelevant.
    pub async fn execute_empty(&self) -> Result<(), Error> {
        Self::check(self.execute_raw().await?).await?;
        Ok(())
    }

    async fn check(response: Response) -> Result<Response, Error> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let text = response.text().await?;
        Err(Error::from_status(status.as_u16(), text))
    }
}
