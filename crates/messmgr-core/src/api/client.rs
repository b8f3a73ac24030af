//! Session client for the Mess Manager REST API.
//!
//! `SessionClient` owns the access and renewal credentials, attaches the
//! access credential to every request, and on a 401 renews it once through
//! a single shared renewal call before replaying the request.

use std::sync::{Arc, PoisonError, RwLock};

use anyhow::Result;
use futures::future::FutureExt;
use reqwest::{header, Method, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::auth::{CredentialStore, RenewalOutcome, RenewalSlot, SessionCredentials, StorageKey};
use crate::config::{
    normalize_origin, resolve_origin, Config, CredentialTransport, RenewalPolicy, SessionMode,
    API_URL_ENV,
};
use crate::models::RefreshResponse;

use super::transport::{ApiRequest, ApiResponse, HttpTransport, ReqwestTransport};
use super::ApiError;

// ============================================================================
// Constants
// ============================================================================

/// Path prefix for every API route.
const API_PREFIX: &str = "/api";

/// Renewal endpoint. Never itself triggers a renewal.
pub const RENEWAL_PATH: &str = "/auth/refresh";

/// Extra query parameters for one request.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub query: Vec<(String, String)>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }
}

/// One logical request, carried through at most one renewal and replay.
#[derive(Debug, Clone)]
pub struct RequestAttempt {
    method: Method,
    path: String,
    body: Option<Value>,
    options: RequestOptions,
    /// Set once the request has been through a renewal.
    retried: bool,
    /// Bearer token to use instead of the current access credential.
    authorization: Option<String>,
}

impl RequestAttempt {
    pub fn new(method: Method, path: &str, body: Option<Value>, options: RequestOptions) -> Self {
        Self {
            method,
            path: path.to_string(),
            body,
            options,
            retried: false,
            authorization: None,
        }
    }

    pub fn is_renewal_call(&self) -> bool {
        self.path.contains(RENEWAL_PATH)
    }

    fn should_renew(&self, status: StatusCode) -> bool {
        status == StatusCode::UNAUTHORIZED && !self.retried && !self.is_renewal_call()
    }

    fn mark_retried(&mut self) {
        self.retried = true;
    }
}

struct SessionInner {
    transport: Arc<dyn HttpTransport>,
    credentials: SessionCredentials,
    renewal: RenewalSlot,
    origin: RwLock<String>,
    mode: SessionMode,
}

/// API client bound to one session.
/// Clone is cheap - every clone shares credentials and the renewal slot.
#[derive(Clone)]
pub struct SessionClient {
    inner: Arc<SessionInner>,
}

impl SessionClient {
    /// Build a client on the reqwest transport, resolving the origin from the
    /// environment, the store and the config file.
    pub fn new(config: &Config, store: Arc<dyn CredentialStore>) -> Result<Self> {
        let cookie_store = config.transport == CredentialTransport::SessionCookie;
        let transport = ReqwestTransport::new(config.request_timeout(), cookie_store)?;

        let runtime_override = std::env::var(API_URL_ENV).ok();
        let persisted = store.get(StorageKey::API_URL);
        let origin = resolve_origin(
            runtime_override.as_deref(),
            persisted.as_deref(),
            config.api_url.as_deref(),
        );
        debug!(origin = %origin, "Resolved API origin");

        Ok(Self::with_transport(Arc::new(transport), store, config.mode(), origin))
    }

    pub fn with_transport(
        transport: Arc<dyn HttpTransport>,
        store: Arc<dyn CredentialStore>,
        mode: SessionMode,
        origin: String,
    ) -> Self {
        let origin = normalize_origin(&origin).unwrap_or(origin);
        Self {
            inner: Arc::new(SessionInner {
                transport,
                credentials: SessionCredentials::new(store),
                renewal: RenewalSlot::new(),
                origin: RwLock::new(origin),
                mode,
            }),
        }
    }

    pub fn mode(&self) -> SessionMode {
        self.inner.mode
    }

    // ===== Credentials =====

    pub fn set_access_credential(&self, token: Option<&str>) {
        self.inner.credentials.set_access(token);
    }

    pub fn set_renewal_credential(&self, token: Option<&str>) {
        self.inner.credentials.set_renewal(token);
    }

    pub fn persisted_access_credential(&self) -> Option<String> {
        self.inner.credentials.persisted_access()
    }

    pub fn persisted_renewal_credential(&self) -> Option<String> {
        self.inner.credentials.persisted_renewal()
    }

    /// Whether an access credential is held or can be restored from storage.
    pub fn has_access_credential(&self) -> bool {
        self.inner.credentials.access().is_some()
    }

    pub fn clear_credentials(&self) {
        self.inner.credentials.clear();
    }

    // ===== Origin =====

    /// Point the client at another API origin and remember the choice.
    /// Empty input is ignored.
    pub fn configure_api_origin(&self, url: &str) {
        let Some(origin) = normalize_origin(url) else {
            return;
        };
        if let Err(e) = self.inner.credentials.store().set(StorageKey::API_URL, &origin) {
            warn!(error = %e, "Failed to persist API origin");
        }
        info!(origin = %origin, "API origin configured");
        *self.inner.origin.write().unwrap_or_else(PoisonError::into_inner) = origin;
    }

    pub fn api_origin(&self) -> String {
        self.inner
            .origin
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn api_base(&self) -> String {
        format!("{}{}", self.api_origin(), API_PREFIX)
    }

    /// Resolve a server-relative path (e.g. an uploaded photo) against the origin.
    pub fn to_absolute_url(&self, url: &str) -> String {
        if url.is_empty() {
            return String::new();
        }
        if is_absolute_url(url) {
            return url.to_string();
        }
        if url.starts_with('/') {
            format!("{}{}", self.api_origin(), url)
        } else {
            format!("{}/{}", self.api_origin(), url)
        }
    }

    // ===== Requests =====

    /// Send a request to `origin + /api + path`, renewing the access
    /// credential once if the server answers 401.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        options: RequestOptions,
    ) -> Result<ApiResponse, ApiError> {
        let mut attempt = RequestAttempt::new(method, path, body, options);

        loop {
            let response = self.dispatch(&attempt).await?;
            if !self.renewal_enabled() || !attempt.should_renew(response.status) {
                return response.error_for_status();
            }

            attempt.mark_retried();
            let original = ApiError::from_status(response.status, &response.body);
            debug!(path = %attempt.path, "Unauthorized, renewing access credential");

            match self.renew_access().await {
                Ok(token) => attempt.authorization = token,
                Err(e) => {
                    debug!(path = %attempt.path, error = %e, "Renewal failed, session ended");
                    return Err(original);
                }
            }
        }
    }

    pub async fn request_json<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        options: RequestOptions,
    ) -> Result<T, ApiError> {
        self.request(method, path, body, options).await?.json()
    }

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        options: RequestOptions,
    ) -> Result<T, ApiError> {
        self.request_json(Method::GET, path, None, options).await
    }

    pub async fn send_json<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let body = encode(body)?;
        self.request_json(method, path, Some(body), RequestOptions::default())
            .await
    }

    fn renewal_enabled(&self) -> bool {
        self.inner.mode.renewal == RenewalPolicy::Enabled
    }

    async fn dispatch(&self, attempt: &RequestAttempt) -> Result<ApiResponse, ApiError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/json"),
        );

        if self.inner.mode.transport == CredentialTransport::BearerHeader {
            let token = attempt
                .authorization
                .clone()
                .or_else(|| self.inner.credentials.access());
            if let Some(token) = token {
                let value = header::HeaderValue::from_str(&format!("Bearer {}", token))
                    .map_err(|e| ApiError::Transport(format!("Invalid credential header: {}", e)))?;
                headers.insert(header::AUTHORIZATION, value);
            }
        }

        let request = ApiRequest {
            method: attempt.method.clone(),
            url: format!("{}{}", self.api_base(), attempt.path),
            headers,
            query: attempt.options.query.clone(),
            body: attempt.body.clone(),
        };
        debug!(method = %request.method, url = %request.url, retried = attempt.retried, "Sending request");

        Ok(self.inner.transport.send(request).await?)
    }

    /// Obtain a fresh access credential, sharing any renewal already in flight.
    async fn renew_access(&self) -> RenewalOutcome {
        let renewal_token = match self.inner.mode.transport {
            CredentialTransport::BearerHeader => match self.inner.credentials.renewal() {
                Some(token) => Some(token),
                None => {
                    debug!("No renewal credential held, clearing session");
                    self.inner.credentials.clear();
                    return Err(ApiError::Unauthorized("no renewal credential".into()));
                }
            },
            CredentialTransport::SessionCookie => None,
        };

        let client = self.clone();
        let claim = self.inner.renewal.claim_or_join(move |generation| {
            async move { client.perform_renewal(renewal_token, generation).await }.boxed()
        });
        if claim.started() {
            debug!("Started access credential renewal");
        } else {
            debug!("Joined in-flight access credential renewal");
        }
        claim.handle().await
    }

    async fn perform_renewal(self, renewal_token: Option<String>, generation: u64) -> RenewalOutcome {
        let mut attempt = RequestAttempt::new(
            Method::POST,
            RENEWAL_PATH,
            Some(Value::Object(Default::default())),
            RequestOptions::default(),
        );
        attempt.authorization = renewal_token;

        let outcome = match self.dispatch(&attempt).await {
            Ok(response) => response
                .error_for_status()
                .and_then(|response| self.install_renewed(&response)),
            Err(e) => Err(e),
        };

        match outcome {
            Ok(_) => info!("Access credential renewed"),
            Err(ref e) => {
                warn!(error = %e, "Access credential renewal failed, clearing session");
                self.inner.credentials.clear();
            }
        }
        self.inner.renewal.settle(generation);
        outcome
    }

    fn install_renewed(&self, response: &ApiResponse) -> RenewalOutcome {
        let renewed: RefreshResponse = if response.body.trim().is_empty() {
            RefreshResponse::default()
        } else {
            response.json()?
        };

        if let Some(ref rotated) = renewed.refresh_token {
            self.inner.credentials.set_renewal(Some(rotated));
        }
        match (renewed.access_token, self.inner.mode.transport) {
            (Some(token), _) => {
                self.inner.credentials.set_access(Some(&token));
                Ok(Some(token))
            }
            (None, CredentialTransport::SessionCookie) => Ok(None),
            (None, CredentialTransport::BearerHeader) => Err(ApiError::InvalidResponse(
                "renewal response carried no access token".into(),
            )),
        }
    }
}

fn is_absolute_url(url: &str) -> bool {
    let lower = url.get(..8).unwrap_or(url).to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

pub(crate) fn encode<B: Serialize + ?Sized>(body: &B) -> Result<Value, ApiError> {
    serde_json::to_value(body).map_err(|e| ApiError::Encode(e.to_string()))
}
