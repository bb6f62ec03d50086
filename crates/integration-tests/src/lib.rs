//! Integration tests for Pawpantry.
//!
//! Tests drive the storefront router in-process with `tower::ServiceExt::oneshot`
//! while the hosted backend and Turnstile are replaced by a `wiremock` server.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p pawpantry-integration-tests
//! ```

use std::net::{IpAddr, Ipv4Addr};

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, Response, header},
};
use pawpantry_core::UserId;
use pawpantry_storefront::config::{
    BackendConfig, CaptchaConfig, RateLimitConfig, StorefrontConfig,
};
use pawpantry_storefront::{AppState, router};
use secrecy::SecretString;
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::matchers::{header as header_eq, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Path the Turnstile mock answers on.
pub const SITEVERIFY_PATH: &str = "/turnstile/v0/siteverify";

/// Access token the auth mock accepts.
pub const VALID_TOKEN: &str = "valid-access-token";

/// A router wired to a mock backend.
pub struct TestContext {
    pub server: MockServer,
    pub app: Router,
}

impl TestContext {
    /// Fully configured storefront against a fresh mock server.
    pub async fn new() -> Self {
        let server = MockServer::start().await;
        let config = test_config(&server);
        Self::with_config(server, config)
    }

    /// Storefront with a caller-adjusted configuration.
    pub async fn with_config_adjusted<F>(adjust: F) -> Self
    where
        F: FnOnce(&mut StorefrontConfig),
    {
        let server = MockServer::start().await;
        let mut config = test_config(&server);
        adjust(&mut config);
        Self::with_config(server, config)
    }

    fn with_config(server: MockServer, config: StorefrontConfig) -> Self {
        let state = AppState::new(config).expect("state");
        Self {
            server,
            app: router(state),
        }
    }

    /// Send one request through a clone of the router.
    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.app
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible")
    }

    /// Make `VALID_TOKEN` resolve to `user_id` with the given profile role.
    ///
    /// `None` mounts an empty profile result (no row).
    pub async fn mount_user(&self, user_id: UserId, role: Option<&str>) {
        Mock::given(method("GET"))
            .and(path("/auth/v1/user"))
            .and(header_eq("authorization", format!("Bearer {VALID_TOKEN}").as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": user_id.to_string(),
                "email": "owner@example.com",
            })))
            .mount(&self.server)
            .await;

        let rows = role.map_or_else(|| json!([]), |role| json!([{ "role": role }]));
        Mock::given(method("GET"))
            .and(path("/rest/v1/profiles"))
            .and(query_param("id", format!("eq.{user_id}").as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(rows))
            .mount(&self.server)
            .await;
    }

    /// Mount a signed-in customer and return their ID.
    pub async fn mount_customer(&self) -> UserId {
        let user_id = UserId::new(Uuid::new_v4());
        self.mount_user(user_id, Some("customer")).await;
        user_id
    }

    /// Mount a Turnstile verdict.
    pub async fn mount_captcha(&self, success: bool) {
        let body = if success {
            json!({ "success": true, "error-codes": [] })
        } else {
            json!({ "success": false, "error-codes": ["invalid-input-response"] })
        };
        Mock::given(method("POST"))
            .and(path(SITEVERIFY_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&self.server)
            .await;
    }
}

/// Configuration pointing every upstream at `server`.
pub fn test_config(server: &MockServer) -> StorefrontConfig {
    StorefrontConfig {
        host: IpAddr::V4(Ipv4Addr::LOCALHOST),
        port: 0,
        secure_cookies: true,
        backend: BackendConfig {
            url: Some(server.uri()),
            anon_key: Some(SecretString::from("anon-key")),
            service_role_key: Some(SecretString::from("service-role-key")),
        },
        captcha: CaptchaConfig {
            secret_key: Some(SecretString::from("turnstile-secret")),
            verify_url: format!("{}{SITEVERIFY_PATH}", server.uri()),
        },
        rate_limits: RateLimitConfig::default(),
        sentry_dsn: None,
        sentry_environment: None,
    }
}

/// JSON request from a given client address.
pub fn json_request(method: &str, uri: &str, client_ip: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .header("x-forwarded-for", client_ip)
        .body(Body::from(body.to_string()))
        .expect("request")
}

/// Request carrying `VALID_TOKEN`.
pub fn authed_request(method: &str, uri: &str, body: Option<&Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {VALID_TOKEN}"))
        .header("x-forwarded-for", "203.0.113.7");

    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string())),
        None => builder.body(Body::empty()),
    }
    .expect("request")
}

/// Collect a response body as JSON.
pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json body")
}

/// Collect a response body as text.
pub async fn body_text(response: Response<Body>) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    String::from_utf8(bytes.to_vec()).expect("utf-8 body")
}
