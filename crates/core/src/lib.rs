//! Pawpantry Core - Shared domain types.
//!
//! This crate provides the types used by the storefront service and its
//! integration tests:
//! - Identifiers for users and products issued by the hosted backend
//! - Validated email addresses and customer roles
//! - Cart lines and the merge/update rules applied before a cart is persisted
//! - Referral tiers and commission calculation
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no HTTP
//! clients. Everything that touches the hosted backend lives in
//! `pawpantry-storefront`.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
