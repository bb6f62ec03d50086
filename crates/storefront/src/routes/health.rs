//! Health check endpoints.

use axum::{extract::State, http::StatusCode};

use crate::state::AppState;

/// Liveness health check endpoint.
///
/// Returns "ok" if the server is running. Does not check dependencies.
pub async fn health() -> &'static str {
    "ok"
}

/// Readiness health check endpoint.
///
/// Returns 503 Service Unavailable when the backend is unconfigured or its
/// auth service does not answer.
pub async fn readiness(State(state): State<AppState>) -> StatusCode {
    if !state.backend().is_configured() {
        return StatusCode::SERVICE_UNAVAILABLE;
    }

    match state.backend().health().await {
        Ok(()) => StatusCode::OK,
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}
