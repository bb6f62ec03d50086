//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures server-side errors to
//! Sentry before responding to the client. All route handlers return
//! `Result<T, AppError>`; the response body is always JSON of the form
//! `{"error": "<message>"}` and never carries upstream details.

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header::RETRY_AFTER},
    response::{IntoResponse, Response},
};
use pawpantry_core::CartError;
use serde_json::json;
use thiserror::Error;

use crate::backend::BackendError;
use crate::config::ConfigError;
use crate::services::captcha::CaptchaError;

/// Application-level error type for the storefront.
#[derive(Debug, Error)]
pub enum AppError {
    /// Hosted backend call failed.
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// CAPTCHA verification failed or could not be performed.
    #[error("Captcha error: {0}")]
    Captcha(#[from] CaptchaError),

    /// Cart mutation violated a cart rule.
    #[error("Cart error: {0}")]
    Cart(#[from] CartError),

    /// Required configuration is missing at request time.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Caller is not authenticated.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Caller is authenticated but lacks the required role.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Rate limited.
    #[error("Rate limited")]
    RateLimited { retry_after_secs: u64 },

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// HTTP status for this error.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Backend(err) => match err {
                BackendError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
                BackendError::InvalidCredentials | BackendError::Unauthorized => {
                    StatusCode::UNAUTHORIZED
                }
                _ => StatusCode::BAD_GATEWAY,
            },
            Self::Captcha(err) => match err {
                CaptchaError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
                CaptchaError::Rejected(_) => StatusCode::BAD_REQUEST,
                _ => StatusCode::BAD_GATEWAY,
            },
            Self::Cart(err) => match err {
                CartError::InvalidQuantity { .. } => StatusCode::BAD_REQUEST,
                CartError::LineNotFound(_) => StatusCode::NOT_FOUND,
            },
            Self::Config(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
        }
    }

    /// Message safe to show to clients.
    fn public_message(&self) -> String {
        match self {
            Self::Backend(err) => match err {
                BackendError::Config(_) => "Server misconfigured".to_string(),
                BackendError::InvalidCredentials => "Invalid email or password".to_string(),
                BackendError::Unauthorized => "Invalid or expired session".to_string(),
                _ => "Upstream service error".to_string(),
            },
            Self::Captcha(err) => match err {
                CaptchaError::Config(_) => "Server misconfigured".to_string(),
                CaptchaError::Rejected(_) => "CAPTCHA verification failed".to_string(),
                _ => "Upstream service error".to_string(),
            },
            Self::Cart(err) => err.to_string(),
            Self::Config(_) => "Server misconfigured".to_string(),
            Self::Internal(_) => "Internal server error".to_string(),
            Self::RateLimited { .. } => "Too many requests, please try again later".to_string(),
            Self::NotFound(msg)
            | Self::Unauthorized(msg)
            | Self::Forbidden(msg)
            | Self::BadRequest(msg) => msg.clone(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Capture server errors to Sentry
        if status.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        } else {
            tracing::debug!(error = %self, status = %status, "Request rejected");
        }

        let mut response = (status, Json(json!({ "error": self.public_message() }))).into_response();

        if let Self::RateLimited { retry_after_secs } = self
            && let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string())
        {
            response.headers_mut().insert(RETRY_AFTER, value);
        }

        response
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context for the authenticated customer.
///
/// Only the ID is attached; emails stay out of error reports.
pub fn set_sentry_user(user_id: &impl ToString) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            ..Default::default()
        }));
    });
}
