//! HTTP route handlers for storefront.
//!
//! # Route Structure
//!
//! ```text
//! GET    /health               - Liveness check
//! GET    /health/ready         - Readiness check (backend reachable)
//!
//! # API
//! POST   /api/login            - Password + CAPTCHA sign-in (rate limited)
//! GET    /api/cart             - Show cart (customer)
//! POST   /api/cart             - Add line (customer, rate limited)
//! PATCH  /api/cart             - Set line quantity (customer, rate limited)
//! DELETE /api/cart             - Remove line or clear (customer, rate limited)
//! GET    /api/referral         - Referral tier (customer)
//! ```

pub mod cart;
pub mod health;
pub mod login;
pub mod referral;

use axum::{
    Json, Router,
    extract::rejection::JsonRejection,
    middleware,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::error::{AppError, Result};
use crate::middleware::{
    cart_rate_limit, login_rate_limit, request_id_middleware, security_headers_middleware,
};
use crate::state::AppState;

/// Unwrap a JSON body, turning extractor rejections into a 400.
pub(crate) fn json_body<T>(payload: std::result::Result<Json<T>, JsonRejection>) -> Result<T> {
    payload
        .map(|Json(body)| body)
        .map_err(|e| AppError::BadRequest(e.body_text()))
}

/// Create the login routes router.
pub fn login_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/login", post(login::login))
        .route_layer(middleware::from_fn_with_state(state.clone(), login_rate_limit))
}

/// Create the cart routes router.
pub fn cart_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route(
            "/cart",
            get(cart::show)
                .post(cart::add)
                .patch(cart::update)
                .delete(cart::remove),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), cart_rate_limit))
}

/// Create all API routes.
pub fn api_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .merge(login_routes(state))
        .merge(cart_routes(state))
        .route("/referral", get(referral::status))
}

/// Build the complete application router with its middleware stack.
///
/// The server must be started with `into_make_service_with_connect_info` so
/// the rate limiter can fall back to the peer address.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/health/ready", get(health::readiness))
        .nest("/api", api_routes(&state))
        .layer(middleware::from_fn(security_headers_middleware))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http().make_span_with(|request: &axum::extract::Request| {
            tracing::info_span!(
                "http_request",
                method = %request.method(),
                uri = %request.uri(),
                request_id = tracing::field::Empty,
                user_id = tracing::field::Empty,
            )
        }))
        .with_state(state)
        // Sentry layers (outermost for full request coverage)
        .layer(sentry_tower::NewSentryLayer::new_from_top())
        .layer(sentry_tower::SentryHttpLayer::new().enable_transaction())
}
