//! HTTP middleware stack for storefront.
//!
//! # Middleware Order (outermost first)
//!
//! 1. Sentry layers (capture errors, transactions)
//! 2. `TraceLayer` (request spans)
//! 3. Request ID (add unique ID to each request)
//! 4. Security headers
//! 5. Per-route rate limiting (login, cart mutations)
//!
//! Authentication is an extractor (`CurrentCustomer`), not a layer.

pub mod auth;
pub mod rate_limit;
pub mod request_id;
pub mod security_headers;

pub use auth::CurrentCustomer;
pub use rate_limit::{
    ClientIp, RateLimitPolicy, RateLimiter, cart_rate_limit, client_ip, login_rate_limit,
    rate_limit_key,
};
pub use request_id::request_id_middleware;
pub use security_headers::security_headers_middleware;
