//! Wire types for the hosted backend's auth and REST endpoints.

use chrono::{DateTime, Utc};
use pawpantry_core::{CartItems, CartLine, ProductId, UserId};
use serde::{Deserialize, Serialize};

/// Session returned by the password grant.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthSession {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    /// Access token lifetime in seconds.
    pub expires_in: u64,
    pub refresh_token: String,
    pub user: AuthUser,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

/// Authenticated user as reported by `/auth/v1/user`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: UserId,
    #[serde(default)]
    pub email: Option<String>,
}

/// Row of the `profiles` table, selected down to the role column.
#[derive(Debug, Deserialize)]
pub(super) struct ProfileRow {
    #[serde(default)]
    pub role: Option<String>,
}

/// Row of the `carts` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartRecord {
    pub user_id: UserId,
    #[serde(default)]
    pub items: CartItems,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl CartRecord {
    /// Empty cart for a user that has no row yet.
    #[must_use]
    pub const fn empty(user_id: UserId) -> Self {
        Self {
            user_id,
            items: CartItems::new(),
            updated_at: None,
        }
    }
}

/// Body written by the cart upsert.
#[derive(Debug, Serialize)]
pub(super) struct CartUpsert<'a> {
    pub user_id: UserId,
    pub items: &'a CartItems,
    pub updated_at: DateTime<Utc>,
}

/// Arguments to the `check_stock` RPC.
#[derive(Debug, Serialize)]
pub(super) struct CheckStockArgs<'a> {
    pub items: &'a [CartLine],
}

/// A cart line the warehouse cannot fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockShortfall {
    pub product_id: ProductId,
    pub available: i64,
}

#[derive(Debug, Serialize)]
pub(super) struct PasswordGrant<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

/// Error body shape used by the auth service.
#[derive(Debug, Default, Deserialize)]
pub(super) struct AuthErrorBody {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
    #[serde(default)]
    pub msg: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl AuthErrorBody {
    pub(super) fn into_message(self) -> String {
        self.error_description
            .or(self.msg)
            .or(self.message)
            .or(self.error)
            .unwrap_or_else(|| "(no error details provided)".to_string())
    }
}

/// Total from a `Content-Range` header such as `0-4/5` or `*/0`.
pub(super) fn parse_content_range_total(value: &str) -> Option<u32> {
    let (_, total) = value.rsplit_once('/')?;
    total.trim().parse().ok()
}
