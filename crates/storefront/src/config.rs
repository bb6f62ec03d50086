//! Storefront configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required when the matching endpoint is called
//!
//! These are read at startup but only checked when a request needs them, so
//! a partially configured instance still serves health checks. A request that
//! needs a missing value fails with 500.
//!
//! - `BACKEND_URL` - Hosted backend base URL (e.g., <https://xyz.supabase.co>)
//! - `BACKEND_ANON_KEY` - Public API key for the auth endpoints
//! - `BACKEND_SERVICE_ROLE_KEY` - Service role key for table and RPC access
//! - `TURNSTILE_SECRET_KEY` - CAPTCHA verification secret
//!
//! ## Optional
//! - `PAWPANTRY_HOST` - Bind address (default: 127.0.0.1)
//! - `PAWPANTRY_PORT` - Listen port (default: 3000)
//! - `PAWPANTRY_SECURE_COOKIES` - Mark the refresh cookie `Secure` (default: true)
//! - `TURNSTILE_VERIFY_URL` - CAPTCHA verification endpoint override
//! - `LOGIN_RATE_LIMIT` / `LOGIN_RATE_WINDOW_SECS` - Login policy (default: 5 per 60s)
//! - `CART_RATE_LIMIT` / `CART_RATE_WINDOW_SECS` - Cart mutation policy (default: 30 per 60s)
//! - `RATE_LIMIT_MAX_KEYS` - Maximum tracked rate limit keys (default: 100000)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name

use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;
use url::Url;

use crate::middleware::rate_limit::RateLimitPolicy;

/// Default Cloudflare Turnstile verification endpoint.
pub const DEFAULT_TURNSTILE_VERIFY_URL: &str =
    "https://challenges.cloudflare.com/turnstile/v0/siteverify";

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Storefront application configuration.
#[derive(Debug, Clone)]
pub struct StorefrontConfig {
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Whether the refresh-token cookie carries the `Secure` attribute
    pub secure_cookies: bool,
    /// Hosted backend (auth, tables, RPC)
    pub backend: BackendConfig,
    /// CAPTCHA verification
    pub captcha: CaptchaConfig,
    /// Rate limiting policies and housekeeping
    pub rate_limits: RateLimitConfig,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment name
    pub sentry_environment: Option<String>,
}

/// Hosted backend configuration.
///
/// Implements `Debug` manually to redact secret fields.
#[derive(Clone, Default)]
pub struct BackendConfig {
    /// Base URL, without a trailing slash
    pub url: Option<String>,
    /// Public key sent as `apikey` on auth endpoints
    pub anon_key: Option<SecretString>,
    /// Service role key for table and RPC access (server-side only)
    pub service_role_key: Option<SecretString>,
}

impl std::fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendConfig")
            .field("url", &self.url)
            .field("anon_key", &self.anon_key.as_ref().map(|_| "[REDACTED]"))
            .field(
                "service_role_key",
                &self.service_role_key.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

/// CAPTCHA verification configuration.
#[derive(Clone)]
pub struct CaptchaConfig {
    pub secret_key: Option<SecretString>,
    pub verify_url: String,
}

impl std::fmt::Debug for CaptchaConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptchaConfig")
            .field("secret_key", &self.secret_key.as_ref().map(|_| "[REDACTED]"))
            .field("verify_url", &self.verify_url)
            .finish()
    }
}

impl Default for CaptchaConfig {
    fn default() -> Self {
        Self {
            secret_key: None,
            verify_url: DEFAULT_TURNSTILE_VERIFY_URL.to_string(),
        }
    }
}

/// Rate limiting policies and sweep schedule.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Policy for `POST /api/login`
    pub login: RateLimitPolicy,
    /// Policy for cart mutations (`POST`, `PATCH`, `DELETE /api/cart`)
    pub cart: RateLimitPolicy,
    /// Upper bound on tracked keys
    pub max_keys: usize,
    /// How often stale windows are swept
    pub sweep_interval: Duration,
    /// Windows that started longer ago than this are swept
    pub max_entry_age: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            login: RateLimitPolicy::new(5, Duration::from_secs(60)),
            cart: RateLimitPolicy::new(30, Duration::from_secs(60)),
            max_keys: 100_000,
            sweep_interval: Duration::from_secs(30 * 60),
            max_entry_age: Duration::from_secs(60 * 60),
        }
    }
}

impl StorefrontConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is present but cannot be parsed.
    /// Missing backend or CAPTCHA secrets are not an error here.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let host = parse_env_or("PAWPANTRY_HOST", IpAddr::from([127, 0, 0, 1]))?;
        let port = parse_env_or("PAWPANTRY_PORT", 3000_u16)?;
        let secure_cookies = parse_env_or("PAWPANTRY_SECURE_COOKIES", true)?;

        Ok(Self {
            host,
            port,
            secure_cookies,
            backend: BackendConfig::from_env()?,
            captcha: CaptchaConfig::from_env()?,
            rate_limits: RateLimitConfig::from_env()?,
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

impl BackendConfig {
    /// Base URL, or an error naming the missing variable.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingEnvVar` when `BACKEND_URL` is unset.
    pub fn require_url(&self) -> Result<&str, ConfigError> {
        self.url
            .as_deref()
            .ok_or_else(|| ConfigError::MissingEnvVar("BACKEND_URL".to_string()))
    }

    /// # Errors
    ///
    /// Returns `ConfigError::MissingEnvVar` when `BACKEND_ANON_KEY` is unset.
    pub fn require_anon_key(&self) -> Result<&SecretString, ConfigError> {
        self.anon_key
            .as_ref()
            .ok_or_else(|| ConfigError::MissingEnvVar("BACKEND_ANON_KEY".to_string()))
    }

    /// # Errors
    ///
    /// Returns `ConfigError::MissingEnvVar` when `BACKEND_SERVICE_ROLE_KEY` is unset.
    pub fn require_service_role_key(&self) -> Result<&SecretString, ConfigError> {
        self.service_role_key
            .as_ref()
            .ok_or_else(|| ConfigError::MissingEnvVar("BACKEND_SERVICE_ROLE_KEY".to_string()))
    }

    fn from_env() -> Result<Self, ConfigError> {
        let url = match get_optional_env("BACKEND_URL") {
            Some(raw) => Some(normalize_base_url("BACKEND_URL", &raw)?),
            None => None,
        };

        Ok(Self {
            url,
            anon_key: get_optional_secret("BACKEND_ANON_KEY"),
            service_role_key: get_optional_secret("BACKEND_SERVICE_ROLE_KEY"),
        })
    }
}

impl CaptchaConfig {
    /// # Errors
    ///
    /// Returns `ConfigError::MissingEnvVar` when `TURNSTILE_SECRET_KEY` is unset.
    pub fn require_secret_key(&self) -> Result<&SecretString, ConfigError> {
        self.secret_key
            .as_ref()
            .ok_or_else(|| ConfigError::MissingEnvVar("TURNSTILE_SECRET_KEY".to_string()))
    }

    fn from_env() -> Result<Self, ConfigError> {
        let verify_url = match get_optional_env("TURNSTILE_VERIFY_URL") {
            Some(raw) => Url::parse(raw.trim())
                .map_err(|e| {
                    ConfigError::InvalidEnvVar("TURNSTILE_VERIFY_URL".to_string(), e.to_string())
                })?
                .to_string(),
            None => DEFAULT_TURNSTILE_VERIFY_URL.to_string(),
        };

        Ok(Self {
            secret_key: get_optional_secret("TURNSTILE_SECRET_KEY"),
            verify_url,
        })
    }
}

impl RateLimitConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let login = RateLimitPolicy::new(
            parse_env_or("LOGIN_RATE_LIMIT", defaults.login.limit)?,
            Duration::from_secs(parse_env_or(
                "LOGIN_RATE_WINDOW_SECS",
                defaults.login.window.as_secs(),
            )?),
        );
        let cart = RateLimitPolicy::new(
            parse_env_or("CART_RATE_LIMIT", defaults.cart.limit)?,
            Duration::from_secs(parse_env_or(
                "CART_RATE_WINDOW_SECS",
                defaults.cart.window.as_secs(),
            )?),
        );

        Ok(Self {
            login,
            cart,
            max_keys: parse_env_or("RATE_LIMIT_MAX_KEYS", defaults.max_keys)?,
            ..defaults
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Validate a base URL and strip any trailing slash.
fn normalize_base_url(key: &str, raw: &str) -> Result<String, ConfigError> {
    let url = Url::parse(raw.trim())
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            format!("unsupported scheme '{}'", url.scheme()),
        ));
    }

    Ok(url.as_str().trim_end_matches('/').to_string())
}

/// Get an optional environment variable, treating empty values as unset.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Get an optional environment variable as a secret.
fn get_optional_secret(key: &str) -> Option<SecretString> {
    get_optional_env(key).map(SecretString::from)
}

/// Parse an environment variable, falling back to a default when unset.
fn parse_env_or<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    get_optional_env(key).map_or(Ok(default), |raw| {
        raw.trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
    })
}
