//! Core types for Pawpantry.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod cart;
pub mod email;
pub mod id;
pub mod price;
pub mod referral;
pub mod role;

pub use cart::{CartError, CartItems, CartLine, MAX_LINE_QUANTITY};
pub use email::{Email, EmailError};
pub use id::*;
pub use price::{CurrencyCode, Price};
pub use referral::{ReferralLevel, ReferralTier, ReferralTiers};
pub use role::Role;
