//! Login route handler.
//!
//! `POST /api/login` signs a customer in with email and password after a
//! Turnstile check. The refresh token is only ever sent as an `HttpOnly`
//! cookie scoped to `/api`; the access token goes in the JSON body.

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::{HeaderValue, header::SET_COOKIE},
    response::{IntoResponse, Response},
};
use pawpantry_core::{Email, UserId};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use super::json_body;
use crate::error::{AppError, Result};
use crate::middleware::ClientIp;
use crate::state::AppState;

/// Name of the refresh-token cookie.
pub const REFRESH_COOKIE_NAME: &str = "pp_refresh_token";

/// Refresh cookie lifetime (30 days).
pub const REFRESH_COOKIE_MAX_AGE_SECS: u64 = 30 * 24 * 60 * 60;

/// Login request body.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    pub turnstile_token: String,
}

/// Successful login response.
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
    pub user: LoginUser,
}

#[derive(Debug, Serialize)]
pub struct LoginUser {
    pub id: UserId,
    pub email: Option<String>,
}

/// Validated credentials.
struct Credentials {
    email: Email,
    password: SecretString,
    turnstile_token: String,
}

impl TryFrom<LoginRequest> for Credentials {
    type Error = AppError;

    fn try_from(body: LoginRequest) -> Result<Self> {
        let email = Email::parse(&body.email)
            .map_err(|e| AppError::BadRequest(format!("Invalid email: {e}")))?;
        if body.password.is_empty() {
            return Err(AppError::BadRequest("Password is required".to_string()));
        }
        let turnstile_token = body.turnstile_token.trim().to_string();
        if turnstile_token.is_empty() {
            return Err(AppError::BadRequest("CAPTCHA token is required".to_string()));
        }

        Ok(Self {
            email,
            password: SecretString::from(body.password),
            turnstile_token,
        })
    }
}

/// Sign in with email and password.
///
/// POST /api/login
///
/// Rate limiting happens in the `login_rate_limit` route layer before this
/// handler runs.
///
/// # Errors
///
/// - 400 for an invalid body or a refused CAPTCHA
/// - 401 for wrong credentials
/// - 500 when the backend or CAPTCHA secret is not configured
/// - 502 when an upstream service fails
#[instrument(skip(state, payload), fields(client_ip = %client_ip.0))]
pub async fn login(
    State(state): State<AppState>,
    client_ip: ClientIp,
    payload: std::result::Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Response> {
    let credentials = Credentials::try_from(json_body(payload)?)?;

    let config = state.config();
    config.backend.require_url()?;
    config.backend.require_anon_key()?;
    config.backend.require_service_role_key()?;
    config.captcha.require_secret_key()?;

    state
        .captcha()
        .verify(&credentials.turnstile_token, client_ip.known())
        .await?;

    let session = state
        .backend()
        .sign_in_with_password(&credentials.email, &credentials.password)
        .await?;

    tracing::info!(user_id = %session.user.id, "Customer signed in");

    let cookie = refresh_cookie(&session.refresh_token, config.secure_cookies);
    let body = LoginResponse {
        access_token: session.access_token,
        token_type: "bearer".to_string(),
        expires_in: session.expires_in,
        user: LoginUser {
            id: session.user.id,
            email: session.user.email,
        },
    };

    let mut response = Json(body).into_response();
    let value = HeaderValue::from_str(&cookie)
        .map_err(|_| AppError::Internal("refresh token is not a valid header value".to_string()))?;
    response.headers_mut().insert(SET_COOKIE, value);
    Ok(response)
}

/// `Set-Cookie` value carrying the refresh token.
fn refresh_cookie(token: &str, secure: bool) -> String {
    let secure = if secure { "; Secure" } else { "" };
    format!(
        "{REFRESH_COOKIE_NAME}={token}; HttpOnly{secure}; SameSite=Strict; Path=/api; Max-Age={REFRESH_COOKIE_MAX_AGE_SECS}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refresh_cookie_attributes() {
        let cookie = refresh_cookie("rt-123", true);
        assert_eq!(
            cookie,
            "pp_refresh_token=rt-123; HttpOnly; Secure; SameSite=Strict; Path=/api; Max-Age=2592000"
        );
        assert!(!refresh_cookie("rt-123", false).contains("Secure"));
    }

    #[test]
    fn test_credentials_validation() {
        let valid = LoginRequest {
            email: " Pet.Owner@Example.com ".to_string(),
            password: "hunter22".to_string(),
            turnstile_token: "tok".to_string(),
        };
        let credentials = Credentials::try_from(valid);
        assert!(matches!(credentials, Ok(ref c) if c.email.as_str() == "pet.owner@example.com"));

        let missing_password = LoginRequest {
            email: "a@example.com".to_string(),
            turnstile_token: "tok".to_string(),
            ..LoginRequest::default()
        };
        assert!(matches!(
            Credentials::try_from(missing_password),
            Err(AppError::BadRequest(_))
        ));

        let missing_token = LoginRequest {
            email: "a@example.com".to_string(),
            password: "pw".to_string(),
            turnstile_token: "   ".to_string(),
        };
        assert!(matches!(
            Credentials::try_from(missing_token),
            Err(AppError::BadRequest(_))
        ));

        let bad_email = LoginRequest {
            email: "not-an-email".to_string(),
            password: "pw".to_string(),
            turnstile_token: "tok".to_string(),
        };
        assert!(matches!(
            Credentials::try_from(bad_email),
            Err(AppError::BadRequest(_))
        ));
    }
}
