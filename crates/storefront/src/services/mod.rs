//! Third-party services used by the storefront.
//!
//! - `captcha` - Cloudflare Turnstile token verification for login

pub mod captcha;

pub use captcha::{CaptchaError, TurnstileVerifier};
