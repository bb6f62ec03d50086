//! Client for the hosted backend (auth service, REST tables and RPC).
//!
//! # Endpoints
//!
//! - `auth/v1/token?grant_type=password` - password sign-in (anon key)
//! - `auth/v1/user` - resolve an access token to a user
//! - `auth/v1/health` - readiness probe
//! - `rest/v1/profiles`, `rest/v1/carts`, `rest/v1/referrals` - table access
//!   with the service role key
//! - `rest/v1/rpc/check_stock` - stock validation
//!
//! Roles are cached for 60 seconds using `moka`. Configuration is checked on
//! each call so a partially configured service still starts.

mod types;

pub use types::{AuthSession, AuthUser, CartRecord, StockShortfall};

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use pawpantry_core::{CartItems, Email, Role, UserId};
use reqwest::{Method, RequestBuilder, Response, StatusCode, header};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::config::{BackendConfig, ConfigError};
use types::{
    AuthErrorBody, CartUpsert, CheckStockArgs, PasswordGrant, ProfileRow,
    parse_content_range_total,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const ROLE_CACHE_TTL: Duration = Duration::from_secs(60);
const ROLE_CACHE_CAPACITY: u64 = 10_000;

/// Errors that can occur when talking to the hosted backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// A required setting is missing.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success status with the upstream message.
    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Password grant rejected the credentials.
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Access token rejected.
    #[error("Access token rejected")]
    Unauthorized,

    /// Rate limited upstream.
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// Response was well-formed but not what the endpoint promises.
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),
}

/// Hosted backend client.
///
/// Cheap to clone; the HTTP connection pool and role cache are shared.
#[derive(Clone)]
pub struct BackendClient {
    inner: Arc<BackendClientInner>,
}

struct BackendClientInner {
    client: reqwest::Client,
    config: BackendConfig,
    roles: Cache<UserId, Role>,
}

impl BackendClient {
    /// Create a new backend client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &BackendConfig) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        let roles = Cache::builder()
            .max_capacity(ROLE_CACHE_CAPACITY)
            .time_to_live(ROLE_CACHE_TTL)
            .build();

        Ok(Self {
            inner: Arc::new(BackendClientInner {
                client,
                config: config.clone(),
                roles,
            }),
        })
    }

    /// Whether every setting the endpoints need is present.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        let config = &self.inner.config;
        config.url.is_some() && config.anon_key.is_some() && config.service_role_key.is_some()
    }

    // =========================================================================
    // Auth
    // =========================================================================

    /// Exchange an email and password for a session.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::InvalidCredentials` when the grant is refused.
    #[instrument(skip(self, email, password), fields(email_domain = %email.domain()))]
    pub async fn sign_in_with_password(
        &self,
        email: &Email,
        password: &SecretString,
    ) -> Result<AuthSession, BackendError> {
        let request = self
            .anon_request(Method::POST, "auth/v1/token")?
            .query(&[("grant_type", "password")])
            .json(&PasswordGrant {
                email: email.as_str(),
                password: password.expose_secret(),
            });

        let response = request.send().await?;
        match response.status() {
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED => {
                let body: AuthErrorBody = response.json().await.unwrap_or_default();
                debug!(reason = %body.into_message(), "Password grant refused");
                Err(BackendError::InvalidCredentials)
            }
            _ => read_json(response).await,
        }
    }

    /// Resolve an access token to the user it was issued for.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::Unauthorized` when the token is expired or invalid.
    #[instrument(skip_all)]
    pub async fn get_user(&self, access_token: &str) -> Result<AuthUser, BackendError> {
        let response = self
            .anon_request(Method::GET, "auth/v1/user")?
            .bearer_auth(access_token)
            .send()
            .await?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(BackendError::Unauthorized),
            _ => read_json(response).await,
        }
    }

    /// Look up a user's role, cached for 60 seconds.
    ///
    /// A user without a profile row has `Role::Unknown`.
    ///
    /// # Errors
    ///
    /// Returns an error if the profile lookup fails.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn get_role(&self, user_id: UserId) -> Result<Role, BackendError> {
        if let Some(role) = self.inner.roles.get(&user_id).await {
            debug!("Role cache hit");
            return Ok(role);
        }

        let response = self
            .service_request(Method::GET, "rest/v1/profiles")?
            .query(&[("id", format!("eq.{user_id}")), ("select", "role".to_string())])
            .send()
            .await?;

        let rows: Vec<ProfileRow> = read_json(response).await?;
        let role = rows
            .into_iter()
            .next()
            .and_then(|row| row.role)
            .map_or(Role::Unknown, |value| Role::from_column(&value));

        self.inner.roles.insert(user_id, role).await;
        Ok(role)
    }

    // =========================================================================
    // Carts
    // =========================================================================

    /// Fetch a user's cart row, if one exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn get_cart(&self, user_id: UserId) -> Result<Option<CartRecord>, BackendError> {
        let response = self
            .service_request(Method::GET, "rest/v1/carts")?
            .query(&[
                ("user_id", format!("eq.{user_id}")),
                ("select", "user_id,items,updated_at".to_string()),
            ])
            .send()
            .await?;

        let rows: Vec<CartRecord> = read_json(response).await?;
        Ok(rows.into_iter().next().map(normalize_record))
    }

    /// Insert or replace a user's cart row.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or no row comes back.
    #[instrument(skip(self, items), fields(user_id = %user_id, lines = items.lines().len()))]
    pub async fn upsert_cart(
        &self,
        user_id: UserId,
        items: &CartItems,
    ) -> Result<CartRecord, BackendError> {
        let body = [CartUpsert {
            user_id,
            items,
            updated_at: chrono::Utc::now(),
        }];

        let response = self
            .service_request(Method::POST, "rest/v1/carts")?
            .query(&[("on_conflict", "user_id")])
            .header("Prefer", "resolution=merge-duplicates,return=representation")
            .json(&body)
            .send()
            .await?;

        let rows: Vec<CartRecord> = read_json(response).await?;
        rows.into_iter()
            .next()
            .map(normalize_record)
            .ok_or_else(|| BackendError::UnexpectedResponse("upsert returned no rows".to_string()))
    }

    /// Delete a user's cart row. Deleting a missing row is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn delete_cart(&self, user_id: UserId) -> Result<(), BackendError> {
        let response = self
            .service_request(Method::DELETE, "rest/v1/carts")?
            .query(&[("user_id", format!("eq.{user_id}"))])
            .send()
            .await?;

        check_status(response).await.map(drop)
    }

    /// Lines whose requested quantity exceeds stock. Empty when all fit.
    ///
    /// # Errors
    ///
    /// Returns an error if the RPC fails.
    #[instrument(skip(self, items), fields(lines = items.lines().len()))]
    pub async fn check_stock(
        &self,
        items: &CartItems,
    ) -> Result<Vec<StockShortfall>, BackendError> {
        if items.is_empty() {
            return Ok(Vec::new());
        }

        let response = self
            .service_request(Method::POST, "rest/v1/rpc/check_stock")?
            .json(&CheckStockArgs {
                items: items.lines(),
            })
            .send()
            .await?;

        read_json(response).await
    }

    // =========================================================================
    // Referrals
    // =========================================================================

    /// Number of referrals credited to a user.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the count header is missing.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn count_referrals(&self, user_id: UserId) -> Result<u32, BackendError> {
        let response = self
            .service_request(Method::HEAD, "rest/v1/referrals")?
            .query(&[("referrer_id", format!("eq.{user_id}"))])
            .header("Prefer", "count=exact")
            .send()
            .await?;

        let response = check_status(response).await?;
        response
            .headers()
            .get(header::CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_content_range_total)
            .ok_or_else(|| {
                BackendError::UnexpectedResponse("missing or invalid Content-Range".to_string())
            })
    }

    // =========================================================================
    // Health
    // =========================================================================

    /// Probe the auth service health endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend is unconfigured or unhealthy.
    pub async fn health(&self) -> Result<(), BackendError> {
        let response = self
            .anon_request(Method::GET, "auth/v1/health")?
            .send()
            .await?;
        check_status(response).await.map(drop)
    }

    // =========================================================================
    // Request builders
    // =========================================================================

    fn endpoint(&self, path: &str) -> Result<String, BackendError> {
        let base = self.inner.config.require_url()?;
        Ok(format!("{base}/{path}"))
    }

    /// Request authorised with the public key (auth endpoints).
    fn anon_request(&self, method: Method, path: &str) -> Result<RequestBuilder, BackendError> {
        let key = self.inner.config.require_anon_key()?;
        Ok(self
            .inner
            .client
            .request(method, self.endpoint(path)?)
            .header("apikey", key.expose_secret()))
    }

    /// Request authorised with the service role key (tables and RPC).
    fn service_request(&self, method: Method, path: &str) -> Result<RequestBuilder, BackendError> {
        let key = self.inner.config.require_service_role_key()?;
        Ok(self
            .inner
            .client
            .request(method, self.endpoint(path)?)
            .header("apikey", key.expose_secret())
            .bearer_auth(key.expose_secret()))
    }
}

/// Fold duplicate or empty lines written by older clients.
fn normalize_record(record: CartRecord) -> CartRecord {
    CartRecord {
        items: CartItems::from_lines(record.items.lines().iter().copied()),
        ..record
    }
}

/// Map non-success statuses to `BackendError`, passing successes through.
async fn check_status(response: Response) -> Result<Response, BackendError> {
    let status = response.status();

    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get(header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(1);
        return Err(BackendError::RateLimited(retry_after));
    }

    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    tracing::error!(
        status = %status,
        body = %body.chars().take(500).collect::<String>(),
        "Backend returned non-success status"
    );

    let message = serde_json::from_str::<AuthErrorBody>(&body)
        .map_or_else(|_| body.chars().take(200).collect(), AuthErrorBody::into_message);

    Err(BackendError::Status {
        status: status.as_u16(),
        message,
    })
}

/// Check the status, then parse the body as JSON.
async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, BackendError> {
    let response = check_status(response).await?;
    let text = response.text().await?;

    serde_json::from_str(&text).map_err(|e| {
        tracing::error!(
            error = %e,
            body = %text.chars().take(500).collect::<String>(),
            "Failed to parse backend response"
        );
        BackendError::Parse(e)
    })
}
