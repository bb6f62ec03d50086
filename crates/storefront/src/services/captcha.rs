//! Cloudflare Turnstile client for CAPTCHA verification.
//!
//! Tokens are verified server-side against the `siteverify` endpoint with a
//! form POST of `secret`, `response` and (when known) `remoteip`.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::instrument;

use crate::config::{CaptchaConfig, ConfigError};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors that can occur when verifying a CAPTCHA token.
#[derive(Debug, Error)]
pub enum CaptchaError {
    /// Secret key is not configured.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Verifier answered but refused the token.
    #[error("Token rejected: {}", .0.join(", "))]
    Rejected(Vec<String>),

    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Verifier returned a non-success status.
    #[error("API error: {status}")]
    Api { status: u16 },
}

#[derive(Serialize)]
struct VerifyForm<'a> {
    secret: &'a str,
    response: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    remoteip: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct VerifyResponse {
    success: bool,
    #[serde(default, rename = "error-codes")]
    error_codes: Vec<String>,
}

/// Turnstile `siteverify` client.
#[derive(Clone)]
pub struct TurnstileVerifier {
    client: reqwest::Client,
    secret_key: Option<SecretString>,
    verify_url: String,
}

impl TurnstileVerifier {
    /// Create a new verifier.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(config: &CaptchaConfig) -> Result<Self, CaptchaError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            secret_key: config.secret_key.clone(),
            verify_url: config.verify_url.clone(),
        })
    }

    #[must_use]
    pub const fn is_configured(&self) -> bool {
        self.secret_key.is_some()
    }

    /// Verify a widget token, optionally bound to the client's address.
    ///
    /// # Errors
    ///
    /// Returns `CaptchaError::Rejected` if Turnstile refuses the token, and
    /// `Http`/`Api` if the verifier cannot be reached.
    #[instrument(skip(self, token))]
    pub async fn verify(&self, token: &str, remote_ip: Option<&str>) -> Result<(), CaptchaError> {
        let secret = self.secret_key.as_ref().ok_or_else(|| {
            ConfigError::MissingEnvVar("TURNSTILE_SECRET_KEY".to_string())
        })?;

        let form = VerifyForm {
            secret: secret.expose_secret(),
            response: token,
            remoteip: remote_ip,
        };

        let response = self.client.post(&self.verify_url).form(&form).send().await?;
        let status = response.status();

        if !status.is_success() {
            tracing::error!(status = %status, "Turnstile returned non-success status");
            return Err(CaptchaError::Api {
                status: status.as_u16(),
            });
        }

        let outcome: VerifyResponse = response.json().await?;
        if outcome.success {
            Ok(())
        } else {
            tracing::info!(error_codes = ?outcome.error_codes, "CAPTCHA token rejected");
            Err(CaptchaError::Rejected(outcome.error_codes))
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_verify_form_omits_unknown_ip() {
        let form = VerifyForm {
            secret: "s",
            response: "t",
            remoteip: None,
        };
        let json = serde_json::to_value(&form).unwrap();
        assert!(json.get("remoteip").is_none());
    }

    #[test]
    fn test_verify_response_parses_error_codes() {
        let parsed: VerifyResponse = serde_json::from_str(
            r#"{"success":false,"error-codes":["invalid-input-response"]}"#,
        )
        .unwrap();
        assert!(!parsed.success);
        assert_eq!(parsed.error_codes, vec!["invalid-input-response"]);
    }

    #[tokio::test]
    async fn test_missing_secret_is_config_error() {
        let verifier = TurnstileVerifier::new(&CaptchaConfig::default()).unwrap();
        assert!(!verifier.is_configured());

        let err = verifier.verify("token", None).await.unwrap_err();
        assert!(matches!(err, CaptchaError::Config(_)));
    }
}
