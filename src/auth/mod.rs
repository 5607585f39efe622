//! Authentication core: OTP issuance and verification, credential
//! checks, token issuance with refresh rotation, and password
//! reset/change orchestration.
//!
//! The [`engine::AuthEngine`] owns every flow and talks to the outside
//! world through three seams: [`store::AuthStore`] for persistence,
//! [`notify::Notifier`] for outbound email, and [`token::TokenIssuer`]
//! for signed bearer tokens. The HTTP layer maps flow results and
//! [`error::AuthError`] values onto transport responses; nothing in
//! this module knows about axum.

pub mod config;
pub mod engine;
pub mod error;
pub mod notify;
pub mod otp;
pub mod password;
pub mod store;
pub mod token;

pub use config::AuthConfig;
pub use engine::AuthEngine;
pub use error::AuthError;
pub use notify::{LogNotifier, Notifier};
pub use otp::OtpPurpose;
pub use store::AuthStore;
pub use token::TokenIssuer;
