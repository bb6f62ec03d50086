//! Pawpantry Storefront library.
//!
//! This crate provides the storefront API as a library so the router can be
//! driven directly in integration tests.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod backend;
pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod services;
pub mod state;

pub use routes::router;
pub use state::AppState;
