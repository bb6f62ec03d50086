//! Account roles stored on the `profiles` table.

use serde::{Deserialize, Serialize};

/// Role attached to an account profile.
///
/// Only [`Role::Customer`] may use the cart and referral endpoints. Values
/// the service does not recognise parse to [`Role::Unknown`] rather than
/// failing, so a new role added in the database is denied by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Shopper with a cart.
    Customer,
    /// Back-office operator.
    Admin,
    /// Missing profile or an unrecognised role string.
    #[default]
    #[serde(other)]
    Unknown,
}

impl Role {
    /// Parse a role column value. Never fails.
    #[must_use]
    pub fn from_column(value: &str) -> Self {
        match value.trim() {
            "customer" => Self::Customer,
            "admin" => Self::Admin,
            _ => Self::Unknown,
        }
    }

    #[must_use]
    pub const fn is_customer(self) -> bool {
        matches!(self, Self::Customer)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Customer => write!(f, "customer"),
            Self::Admin => write!(f, "admin"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}
