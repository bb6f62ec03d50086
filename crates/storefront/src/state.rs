//! Application state shared across handlers.

use std::sync::Arc;

use pawpantry_core::ReferralTiers;

use crate::backend::{BackendClient, BackendError};
use crate::config::StorefrontConfig;
use crate::middleware::rate_limit::RateLimiter;
use crate::services::captcha::{CaptchaError, TurnstileVerifier};

/// Error building application state.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("backend client: {0}")]
    Backend(#[from] BackendError),
    #[error("captcha client: {0}")]
    Captcha(#[from] CaptchaError),
}

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to the
/// configuration, upstream clients and the in-memory rate limiter.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    backend: BackendClient,
    captcha: TurnstileVerifier,
    rate_limiter: RateLimiter,
    referral_tiers: ReferralTiers,
}

impl AppState {
    /// Create a new application state.
    ///
    /// # Errors
    ///
    /// Returns an error if an HTTP client cannot be built.
    pub fn new(config: StorefrontConfig) -> Result<Self, StateError> {
        let backend = BackendClient::new(&config.backend)?;
        let captcha = TurnstileVerifier::new(&config.captcha)?;
        let rate_limiter = RateLimiter::new(config.rate_limits.max_keys);

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                backend,
                captcha,
                rate_limiter,
                referral_tiers: ReferralTiers::default(),
            }),
        })
    }

    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    /// Hosted backend client.
    #[must_use]
    pub fn backend(&self) -> &BackendClient {
        &self.inner.backend
    }

    #[must_use]
    pub fn captcha(&self) -> &TurnstileVerifier {
        &self.inner.captcha
    }

    /// Process-wide rate limiter shared by every route.
    #[must_use]
    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.inner.rate_limiter
    }

    #[must_use]
    pub fn referral_tiers(&self) -> &ReferralTiers {
        &self.inner.referral_tiers
    }
}
