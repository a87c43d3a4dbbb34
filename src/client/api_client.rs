//! HTTP client for the CMS API with transparent token refresh
//!
//! Every request carries `Authorization: Bearer <token>` from the
//! [`TokenStore`]. A 401 triggers one refresh through `/auth/refresh`,
//! shared by all requests that fail at the same time, and the request is
//! replayed once with the new token.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::single_flight::SingleFlight;
use super::token_store::{MemoryTokenStore, TokenStore};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

const REFRESH_PATH: &str = "/auth/refresh";
const VERIFY_PATH: &str = "/auth/verify";
const LOGIN_PATH: &str = "/auth/login";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    #[error("HTTP transport error: {0}")]
    Http(String),
    #[error("Request timed out")]
    Timeout,
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Session expired: {0}")]
    SessionExpired(String),
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },
    #[error("Invalid response body: {0}")]
    Decode(String),
    #[error("No token available")]
    NoToken,
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Http(err.to_string())
        }
    }
}

/// Called once when a refresh fails and the stored token is dropped, or when
/// a 401 arrives with no token stored at all.
pub type SessionExpiredHook = Arc<dyn Fn() + Send + Sync>;

/// User fields returned by login and refresh.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SessionUser {
    pub id: i32,
    pub username: String,
    pub role: String,
}

#[derive(Debug, Deserialize)]
struct TokenEnvelope {
    #[serde(default)]
    success: bool,
    token: Option<String>,
    user: Option<SessionUser>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    message: Option<String>,
}

pub struct ApiClientBuilder {
    base_url: String,
    timeout: Duration,
    store: Option<Arc<dyn TokenStore>>,
    on_session_expired: Option<SessionExpiredHook>,
}

impl ApiClientBuilder {
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn token_store(mut self, store: Arc<dyn TokenStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn on_session_expired(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_session_expired = Some(Arc::new(hook));
        self
    }

    pub fn build(self) -> Result<ApiClient, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| ClientError::Http(e.to_string()))?;

        Ok(ApiClient {
            inner: Arc::new(Inner {
                http,
                base_url: self.base_url.trim_end_matches('/').to_string(),
                store: self
                    .store
                    .unwrap_or_else(|| Arc::new(MemoryTokenStore::new())),
                refresh: SingleFlight::new(),
                on_session_expired: RwLock::new(self.on_session_expired),
            }),
        })
    }
}

struct Inner {
    http: reqwest::Client,
    base_url: String,
    store: Arc<dyn TokenStore>,
    refresh: SingleFlight<String, ClientError>,
    on_session_expired: RwLock<Option<SessionExpiredHook>>,
}

/// API client; clones share the token store and the refresh flight.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<Inner>,
}

impl ApiClient {
    /// `base_url` is the API root, e.g. `https://cms.example.com/api`.
    pub fn builder(base_url: impl Into<String>) -> ApiClientBuilder {
        ApiClientBuilder {
            base_url: base_url.into(),
            timeout: DEFAULT_TIMEOUT,
            store: None,
            on_session_expired: None,
        }
    }

    pub fn token_store(&self) -> &Arc<dyn TokenStore> {
        &self.inner.store
    }

    pub fn set_on_session_expired(&self, hook: impl Fn() + Send + Sync + 'static) {
        *self
            .inner
            .on_session_expired
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(hook));
    }

    // ── Session ─────────────────────────────────────────────────

    /// Log in and keep the returned token.
    pub async fn login(&self, username: &str, password: &str) -> Result<SessionUser, ClientError> {
        let body = serde_json::json!({ "username": username, "password": password });
        let resp = send(&self.inner, Method::POST, LOGIN_PATH, Some(&body), None).await?;
        let envelope: TokenEnvelope = read_success(resp).await?;

        let (token, user) = match (envelope.token, envelope.user) {
            (Some(token), Some(user)) if envelope.success => (token, user),
            _ => {
                return Err(ClientError::Decode(
                    envelope.message.unwrap_or_else(|| "登录响应无效".into()),
                ))
            }
        };

        self.inner.store.set(&token);
        info!(username = %user.username, "Logged in");
        Ok(user)
    }

    /// Make sure the stored token is usable, refreshing it if needed.
    ///
    /// Returns `false` when there is no token or it could not be refreshed.
    pub async fn check_and_refresh(&self) -> Result<bool, ClientError> {
        let Some(token) = self.inner.store.get() else {
            return Ok(false);
        };

        let resp = send(&self.inner, Method::GET, VERIFY_PATH, None, Some(&token)).await?;
        if resp.status().is_success() {
            debug!("Stored token is valid");
            return Ok(true);
        }

        debug!(status = %resp.status(), "Stored token rejected, refreshing");
        match refresh_token(&self.inner, token).await {
            Ok(_) => Ok(true),
            Err(e) => {
                debug!("Session could not be restored: {}", e);
                Ok(false)
            }
        }
    }

    // ── JSON helpers ────────────────────────────────────────────

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let resp = self.execute(Method::GET, path, None).await?;
        decode(resp).await
    }

    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, ClientError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body = to_value(body)?;
        let resp = self.execute(Method::POST, path, Some(&body)).await?;
        decode(resp).await
    }

    pub async fn put_json<B, T>(&self, path: &str, body: &B) -> Result<T, ClientError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body = to_value(body)?;
        let resp = self.execute(Method::PUT, path, Some(&body)).await?;
        decode(resp).await
    }

    /// Send an authenticated request, refreshing the token on a 401.
    ///
    /// Returns the successful response; non-2xx statuses become errors.
    pub async fn execute(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<reqwest::Response, ClientError> {
        let inner = &self.inner;
        let sent = inner.store.get();
        let resp = send(inner, method.clone(), path, body, sent.as_deref()).await?;
        if resp.status() != StatusCode::UNAUTHORIZED {
            return ensure_success(resp).await;
        }

        let token = match (sent, inner.store.get()) {
            (_, None) => {
                warn!(path, "Unauthorized with no stored token");
                notify_session_expired(inner);
                return Err(ClientError::NoToken);
            }
            (Some(sent), Some(current)) if sent == current => {
                refresh_token(inner, current).await?
            }
            // The token changed while this request was in flight
            (_, Some(current)) => {
                debug!(path, "Replaying with the current token");
                current
            }
        };

        let resp = send(inner, method, path, body, Some(&token)).await?;
        if resp.status() == StatusCode::UNAUTHORIZED {
            let message = error_message(resp).await;
            warn!(path, "Request still unauthorized after token refresh");
            return Err(ClientError::Unauthorized(message));
        }
        ensure_success(resp).await
    }
}

/// Obtain a new token in place of `stale`, sharing the refresh with any
/// concurrent caller.
async fn refresh_token(inner: &Arc<Inner>, stale: String) -> Result<String, ClientError> {
    let owned = inner.clone();
    inner
        .refresh
        .run(move || async move {
            // A flight that finished just before this one may already have
            // replaced the token.
            if let Some(current) = owned.store.get() {
                if current != stale {
                    return Ok(current);
                }
            }

            info!("Refreshing access token");
            match request_refresh(&owned, &stale).await {
                Ok(token) => {
                    owned.store.set(&token);
                    info!("Access token refreshed");
                    Ok(token)
                }
                Err(e) => {
                    warn!("Token refresh failed: {}", e);
                    owned.store.clear();
                    notify_session_expired(&owned);
                    Err(e)
                }
            }
        })
        .await
}

fn notify_session_expired(inner: &Inner) {
    let hook = inner
        .on_session_expired
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone();
    if let Some(hook) = hook {
        hook();
    }
}

async fn request_refresh(inner: &Inner, stale: &str) -> Result<String, ClientError> {
    let body = serde_json::json!({ "token": stale });
    let resp = send(inner, Method::POST, REFRESH_PATH, Some(&body), None).await?;
    if !resp.status().is_success() {
        return Err(ClientError::SessionExpired(error_message(resp).await));
    }

    let envelope: TokenEnvelope = resp.json().await?;
    match envelope.token {
        Some(token) if envelope.success && !token.is_empty() => Ok(token),
        _ => Err(ClientError::SessionExpired(
            envelope.message.unwrap_or_else(|| "刷新令牌失败".into()),
        )),
    }
}

async fn send(
    inner: &Inner,
    method: Method,
    path: &str,
    body: Option<&Value>,
    token: Option<&str>,
) -> Result<reqwest::Response, ClientError> {
    let url = format!("{}{}", inner.base_url, path);
    debug!(%method, %url, "Sending request");

    let mut request = inner.http.request(method, url);
    if let Some(token) = token {
        request = request.bearer_auth(token);
    }
    if let Some(body) = body {
        request = request.json(body);
    }

    Ok(request.send().await?)
}

async fn ensure_success(resp: reqwest::Response) -> Result<reqwest::Response, ClientError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    Err(ClientError::Api {
        status: status.as_u16(),
        message: error_message(resp).await,
    })
}

async fn read_success<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, ClientError> {
    let resp = ensure_success(resp).await?;
    decode(resp).await
}

async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, ClientError> {
    let bytes = resp.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| ClientError::Decode(e.to_string()))
}

/// `message` of a `{success:false, message}` body, or the status text.
async fn error_message(resp: reqwest::Response) -> String {
    let status = resp.status();
    let text = resp.text().await.unwrap_or_default();
    serde_json::from_str::<ErrorEnvelope>(&text)
        .ok()
        .and_then(|e| e.message)
        .unwrap_or_else(|| status.to_string())
}

fn to_value<B: Serialize + ?Sized>(body: &B) -> Result<Value, ClientError> {
    serde_json::to_value(body).map_err(|e| ClientError::Decode(e.to_string()))
}
