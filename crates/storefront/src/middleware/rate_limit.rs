//! Fixed-window rate limiting for the login and cart endpoints.
//!
//! Each key (`"<route>:<client ip>"`) owns a counter and the instant its
//! window opened. A request inside the window increments the counter until
//! the policy limit is reached; the first request after the window has
//! elapsed opens a fresh window.
//!
//! # Boundary bursts
//!
//! This is a fixed window, not a sliding window or token bucket. A client can
//! spend its whole allowance at the end of one window and again at the start
//! of the next, so up to `2 × limit` requests may be admitted within a span
//! shorter than one window.
//!
//! # Failure
//!
//! The limiter never rejects a request because of its own failure. An invalid
//! policy or a full store is reported as [`RateLimitError`], logged, and the
//! request proceeds (fail-open).

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{ConnectInfo, FromRequestParts, Request, State},
    http::{HeaderMap, Method, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::{DashMap, mapref::entry::Entry};
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::error::AppError;
use crate::state::AppState;

/// Key used when no client address can be determined.
///
/// Every request without forwarding headers or a peer address shares this
/// bucket, so a misconfigured proxy collapses all clients into one limit.
pub const UNKNOWN_CLIENT: &str = "unknown";

// =============================================================================
// Policy and Decision
// =============================================================================

/// How many requests a key may make per window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub limit: u32,
    pub window: Duration,
}

impl RateLimitPolicy {
    #[must_use]
    pub const fn new(limit: u32, window: Duration) -> Self {
        Self { limit, window }
    }
}

/// Outcome of a single `check_and_increment`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    /// The request must be rejected.
    pub limited: bool,
    /// Requests counted in the current window, including this one if admitted.
    pub count: u32,
    /// Time until the current window closes.
    pub retry_after: Duration,
}

impl RateLimitDecision {
    /// `Retry-After` value in whole seconds, never zero.
    #[must_use]
    pub fn retry_after_secs(&self) -> u64 {
        let secs = self.retry_after.as_secs();
        let rounded = if self.retry_after.subsec_nanos() > 0 {
            secs + 1
        } else {
            secs
        };
        rounded.max(1)
    }
}

/// Reasons the limiter could not make a decision.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RateLimitError {
    #[error("rate limit policy has a zero limit")]
    ZeroLimit,

    #[error("rate limit policy has a zero-length window")]
    ZeroWindow,

    #[error("rate limit store is full ({capacity} keys)")]
    StoreFull { capacity: usize },
}

// =============================================================================
// Store
// =============================================================================

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u32,
    started: Instant,
    /// Policy window in force when this window opened.
    length: Duration,
}

impl Window {
    const fn open(now: Instant, length: Duration) -> Self {
        Self {
            count: 1,
            started: now,
            length,
        }
    }

    /// Stale once both `max_age` and the window's own length have passed.
    fn is_stale(&self, now: Instant, max_age: Duration) -> bool {
        now.saturating_duration_since(self.started) > max_age.max(self.length)
    }

    /// Apply one request to an existing window.
    fn hit(&mut self, policy: &RateLimitPolicy, now: Instant) -> RateLimitDecision {
        let elapsed = now.saturating_duration_since(self.started);

        if elapsed > policy.window {
            *self = Self::open(now, policy.window);
            return RateLimitDecision {
                limited: false,
                count: 1,
                retry_after: policy.window,
            };
        }

        let retry_after = policy.window.saturating_sub(elapsed);
        if self.count >= policy.limit {
            return RateLimitDecision {
                limited: true,
                count: self.count,
                retry_after,
            };
        }

        self.count += 1;
        RateLimitDecision {
            limited: false,
            count: self.count,
            retry_after,
        }
    }
}

/// In-memory fixed-window counters shared by all request handlers.
///
/// Cheap to clone; clones share the same store. Updates for a single key are
/// atomic: the read, comparison and increment happen under the map shard's
/// write lock, so concurrent requests for one key cannot both observe
/// `count < limit` and overshoot it.
#[derive(Clone, Debug)]
pub struct RateLimiter {
    inner: Arc<RateLimiterInner>,
}

#[derive(Debug)]
struct RateLimiterInner {
    windows: DashMap<String, Window>,
    max_keys: usize,
}

impl RateLimiter {
    /// Create an empty limiter tracking at most `max_keys` keys.
    #[must_use]
    pub fn new(max_keys: usize) -> Self {
        Self {
            inner: Arc::new(RateLimiterInner {
                windows: DashMap::new(),
                max_keys,
            }),
        }
    }

    /// Count a request for `key` against `policy` at the current instant.
    ///
    /// # Errors
    ///
    /// See [`RateLimiter::check_and_increment_at`].
    pub fn check_and_increment(
        &self,
        key: &str,
        policy: &RateLimitPolicy,
    ) -> Result<RateLimitDecision, RateLimitError> {
        self.check_and_increment_at(key, policy, Instant::now())
    }

    /// Count a request for `key` against `policy` at `now`.
    ///
    /// 1. Unknown key: open a window with count 1, not limited.
    /// 2. Window older than `policy.window`: reopen with count 1, not limited.
    /// 3. Count already at the limit: limited, nothing changes.
    /// 4. Otherwise: increment, not limited.
    ///
    /// # Errors
    ///
    /// Returns [`RateLimitError::ZeroLimit`] or [`RateLimitError::ZeroWindow`]
    /// for an unusable policy, and [`RateLimitError::StoreFull`] when `key` is
    /// new and the store already tracks `max_keys` keys.
    pub fn check_and_increment_at(
        &self,
        key: &str,
        policy: &RateLimitPolicy,
        now: Instant,
    ) -> Result<RateLimitDecision, RateLimitError> {
        if policy.limit == 0 {
            return Err(RateLimitError::ZeroLimit);
        }
        if policy.window.is_zero() {
            return Err(RateLimitError::ZeroWindow);
        }

        if let Some(mut window) = self.inner.windows.get_mut(key) {
            return Ok(window.hit(policy, now));
        }

        // Checked before taking the entry lock: `len` reads every shard.
        let full = self.inner.windows.len() >= self.inner.max_keys;

        match self.inner.windows.entry(key.to_owned()) {
            // Another request created the window since the lookup above.
            Entry::Occupied(mut occupied) => Ok(occupied.get_mut().hit(policy, now)),
            Entry::Vacant(_) if full => Err(RateLimitError::StoreFull {
                capacity: self.inner.max_keys,
            }),
            Entry::Vacant(vacant) => {
                vacant.insert(Window::open(now, policy.window));
                Ok(RateLimitDecision {
                    limited: false,
                    count: 1,
                    retry_after: policy.window,
                })
            }
        }
    }

    /// Remove windows that opened more than `max_age` before `now`.
    ///
    /// A window whose policy is longer than `max_age` is kept until it has
    /// closed, so a sweep never hands a limited client a fresh allowance.
    /// Returns the number of keys removed.
    pub fn sweep_at(&self, now: Instant, max_age: Duration) -> usize {
        let before = self.inner.windows.len();
        self.inner
            .windows
            .retain(|_, window| !window.is_stale(now, max_age));
        before.saturating_sub(self.inner.windows.len())
    }

    /// Spawn the periodic sweep on the current tokio runtime.
    ///
    /// The first sweep runs one `every` after spawning. Abort the returned
    /// handle on shutdown.
    #[must_use]
    pub fn spawn_sweeper(&self, every: Duration, max_age: Duration) -> JoinHandle<()> {
        self.spawn_sweeper_with_clock(every, max_age, Instant::now)
    }

    fn spawn_sweeper_with_clock<C>(
        &self,
        every: Duration,
        max_age: Duration,
        clock: C,
    ) -> JoinHandle<()>
    where
        C: Fn() -> Instant + Send + 'static,
    {
        let limiter = self.clone();
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + every, every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tokio::spawn(async move {
            loop {
                ticker.tick().await;
                let removed = limiter.sweep_at(clock(), max_age);
                tracing::debug!(
                    removed,
                    remaining = limiter.len(),
                    "Swept stale rate limit windows"
                );
            }
        })
    }

    /// Number of keys currently tracked.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.windows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.windows.is_empty()
    }
}

// =============================================================================
// Client Address
// =============================================================================

/// Best-effort client address for rate limiting and CAPTCHA verification.
///
/// Order: first entry of `X-Forwarded-For`, then `X-Real-IP`, then the socket
/// peer address, then [`UNKNOWN_CLIENT`]. Header values are not validated as
/// IP addresses; the first non-empty entry is used as-is.
#[must_use]
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(str::trim)
        .filter(|s| !s.is_empty());

    let real_ip = || {
        headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|s| !s.is_empty())
    };

    forwarded
        .or_else(real_ip)
        .map(str::to_owned)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}

/// Rate limit key for a route and client address, e.g. `login:1.2.3.4`.
#[must_use]
pub fn rate_limit_key(route: &str, ip: &str) -> String {
    format!("{route}:{ip}")
}

/// Extractor for the derived client address.
///
/// The peer address is only available when the server is started with
/// `into_make_service_with_connect_info`.
#[derive(Debug, Clone)]
pub struct ClientIp(pub String);

impl ClientIp {
    fn from_parts(parts: &Parts) -> Self {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        Self(client_ip(&parts.headers, peer))
    }

    /// The address, or `None` when it could not be determined.
    #[must_use]
    pub fn known(&self) -> Option<&str> {
        (self.0 != UNKNOWN_CLIENT).then_some(self.0.as_str())
    }
}

impl<S> FromRequestParts<S> for ClientIp
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::from_parts(parts))
    }
}

// =============================================================================
// Middleware
// =============================================================================

/// Count the request against `policy` and decide whether it may proceed.
///
/// Limiter failures are logged and treated as "not limited".
///
/// # Errors
///
/// Returns `AppError::RateLimited` when the key is over its limit.
pub fn enforce(
    limiter: &RateLimiter,
    key: &str,
    policy: &RateLimitPolicy,
) -> Result<(), AppError> {
    match limiter.check_and_increment(key, policy) {
        Ok(decision) if decision.limited => {
            tracing::warn!(key, count = decision.count, "Rate limit exceeded");
            Err(AppError::RateLimited {
                retry_after_secs: decision.retry_after_secs(),
            })
        }
        Ok(_) => Ok(()),
        Err(e) => {
            tracing::warn!(key, error = %e, "Rate limiter failed, allowing request");
            Ok(())
        }
    }
}

/// Rate limit `POST /api/login` per client address.
pub async fn login_rate_limit(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    guard(&state, "login", &state.config().rate_limits.login, request, next).await
}

/// Rate limit cart mutations per client address. Reads pass through.
pub async fn cart_rate_limit(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    if matches!(
        *request.method(),
        Method::GET | Method::HEAD | Method::OPTIONS
    ) {
        return next.run(request).await;
    }
    guard(&state, "cart", &state.config().rate_limits.cart, request, next).await
}

async fn guard(
    state: &AppState,
    route: &str,
    policy: &RateLimitPolicy,
    request: Request,
    next: Next,
) -> Response {
    let (parts, body) = request.into_parts();
    let ClientIp(ip) = ClientIp::from_parts(&parts);
    let key = rate_limit_key(route, &ip);

    if let Err(rejection) = enforce(state.rate_limiter(), &key, policy) {
        return rejection.into_response();
    }

    next.run(Request::from_parts(parts, body)).await
}
