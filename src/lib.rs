//! # Pordisto (Authentication & Access Management)
//!
//! `pordisto` is an authentication backend: email+OTP signup, password
//! login, refresh-token rotation, password reset/change, and CRUD over
//! the permission catalog backing the RBAC model.
//!
//! ## Session Model
//!
//! Logins issue a short-lived access token (JWT) and a longer-lived
//! refresh token persisted as a row. Refresh tokens are single-use:
//! every exchange revokes the presented token and inserts a fresh row,
//! so a replayed token always fails.
//!
//! - **Soft Deletes:** Deactivating an account flips `is_active` off;
//!   user rows are never physically removed, and their email/username
//!   stay reserved.
//! - **One-Time Codes:** Six-digit numeric codes prove control of an
//!   email address for signup and password reset. Codes expire, cap out
//!   at five attempts, and are rate-limited per address.
//! - **Anti-Enumeration:** Password-reset requests and resends answer
//!   identically whether or not the address is registered.
//!
//! ## Layering
//!
//! The [`auth`] module holds the engine and its collaborator contracts;
//! [`db`] implements persistence on Postgres; [`api`] is the axum HTTP
//! surface; [`cli`] wires configuration from flags and environment.

pub mod api;
pub mod auth;
pub mod cli;
pub mod db;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            // Acceptable in non-git build environments
            return;
        }
        // Should be a hex string (full SHA-1 is 40 chars, but could be short)
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
        assert!(
            GIT_COMMIT_HASH.len() >= 7,
            "GIT_COMMIT_HASH should be at least 7 characters long, got: {GIT_COMMIT_HASH}"
        );
    }

    #[test]
    fn test_app_user_agent_format() {
        assert!(APP_USER_AGENT.starts_with(env!("CARGO_PKG_NAME")));
        assert!(APP_USER_AGENT.contains(env!("CARGO_PKG_VERSION")));
    }
}
