//! Authentication extractors.
//!
//! Provides the `CurrentCustomer` extractor for route handlers that require a
//! signed-in customer presenting a bearer access token.

use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, header::AUTHORIZATION, request::Parts},
};
use pawpantry_core::UserId;
use tracing::Span;

use crate::error::{AppError, set_sentry_user};
use crate::state::AppState;

/// Authenticated customer resolved from the `Authorization` header.
///
/// Rejections, in order of checking:
/// - missing or malformed bearer header → 401
/// - backend not configured → 500
/// - token rejected by the auth service → 401
/// - profile role other than customer → 403
///
/// # Example
///
/// ```rust,ignore
/// async fn handler(customer: CurrentCustomer) -> impl IntoResponse {
///     format!("Hello, {}!", customer.user_id)
/// }
/// ```
#[derive(Debug, Clone)]
pub struct CurrentCustomer {
    pub user_id: UserId,
    pub email: Option<String>,
}

impl FromRequestParts<AppState> for CurrentCustomer {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers)
            .ok_or_else(|| AppError::Unauthorized("Missing bearer token".to_string()))?;

        let user = state.backend().get_user(token).await?;
        let role = state.backend().get_role(user.id).await?;

        if !role.is_customer() {
            tracing::info!(user_id = %user.id, role = %role, "Non-customer denied");
            return Err(AppError::Forbidden("Customer account required".to_string()));
        }

        Span::current().record("user_id", tracing::field::display(user.id));
        set_sentry_user(&user.id);

        Ok(Self {
            user_id: user.id,
            email: user.email,
        })
    }
}

/// Token from an `Authorization: Bearer <token>` header.
///
/// The scheme is matched case-insensitively; an empty token counts as absent.
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_bearer_token_parsing() {
        assert_eq!(bearer_token(&headers("Bearer abc.def")), Some("abc.def"));
        assert_eq!(bearer_token(&headers("bearer  abc")), Some("abc"));
        assert_eq!(bearer_token(&headers("Basic dXNlcjpwYXNz")), None);
        assert_eq!(bearer_token(&headers("Bearer ")), None);
        assert_eq!(bearer_token(&headers("Bearer")), None);
        assert_eq!(bearer_token(&HeaderMap::new()), None);
    }
}
