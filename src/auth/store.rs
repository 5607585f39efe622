//! Persistence contract for the auth engine.
//!
//! The engine is generic over [`AuthStore`] so the flows carry no
//! database dependency; the Postgres implementation lives in
//! [`crate::db`]. Methods that perform several mutations are atomic:
//! either everything in the method is applied or nothing is.

use std::future::Future;

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::auth::otp::OtpPurpose;

/// Identity record. Rows are never physically removed; deactivation
/// flips `is_active` off.
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub is_active: bool,
    pub email_verified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Fields for a user created through OTP-verified signup.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
}

/// One-time code row, keyed by identifier (email) rather than a user
/// foreign key: a signup OTP exists before any user row does.
#[derive(Debug, Clone)]
pub struct OtpRecord {
    pub id: i64,
    pub identifier: String,
    pub code: String,
    pub purpose: OtpPurpose,
    pub attempts: i32,
    pub is_verified: bool,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Session row backing a refresh token. Rows are kept after
/// revocation for audit.
#[derive(Debug, Clone)]
pub struct RefreshTokenRecord {
    pub id: i64,
    pub user_id: i64,
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
}

pub trait AuthStore: Send + Sync {
    fn user_by_email(
        &self,
        email: &str,
    ) -> impl Future<Output = Result<Option<UserRecord>>> + Send;

    fn user_by_username(
        &self,
        username: &str,
    ) -> impl Future<Output = Result<Option<UserRecord>>> + Send;

    fn user_by_id(&self, id: i64) -> impl Future<Output = Result<Option<UserRecord>>> + Send;

    /// Delete any unverified OTPs for `(identifier, purpose)` and
    /// insert a fresh one, atomically. At most one active unverified
    /// OTP per pair exists by construction.
    fn replace_otp(
        &self,
        identifier: &str,
        purpose: OtpPurpose,
        code: &str,
        expires_at: DateTime<Utc>,
    ) -> impl Future<Output = Result<OtpRecord>> + Send;

    /// Most recent unverified OTP for `(identifier, purpose)`,
    /// latest-by-creation when duplicates exist.
    fn latest_unverified_otp(
        &self,
        identifier: &str,
        purpose: OtpPurpose,
    ) -> impl Future<Output = Result<Option<OtpRecord>>> + Send;

    /// Increment the attempts counter and return the new value. The
    /// counter never resets except via a fresh OTP row.
    fn record_failed_attempt(&self, otp_id: i64) -> impl Future<Output = Result<i32>> + Send;

    /// How many OTP rows (verified or not) exist for
    /// `(identifier, purpose)` created at or after `since`.
    fn count_otps_created_since(
        &self,
        identifier: &str,
        purpose: OtpPurpose,
        since: DateTime<Utc>,
    ) -> impl Future<Output = Result<i64>> + Send;

    /// Create the user (active, email verified) and mark the OTP
    /// consumed, atomically.
    fn create_verified_user(
        &self,
        user: NewUser,
        otp_id: i64,
    ) -> impl Future<Output = Result<UserRecord>> + Send;

    fn insert_refresh_token(
        &self,
        user_id: i64,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> impl Future<Output = Result<RefreshTokenRecord>> + Send;

    /// Non-revoked row matching `(token, user_id)`, expired or not;
    /// the engine decides what row expiry means per flow.
    fn active_refresh_token(
        &self,
        token: &str,
        user_id: i64,
    ) -> impl Future<Output = Result<Option<RefreshTokenRecord>>> + Send;

    fn revoke_refresh_token(&self, token_id: i64) -> impl Future<Output = Result<()>> + Send;

    /// Revoke the old row and insert the replacement in one atomic
    /// unit, so there is no window where both tokens are valid.
    fn rotate_refresh_token(
        &self,
        old_token_id: i64,
        user_id: i64,
        new_token: &str,
        expires_at: DateTime<Utc>,
    ) -> impl Future<Output = Result<RefreshTokenRecord>> + Send;

    /// Set the new password hash, mark the reset OTP consumed, and
    /// revoke every non-revoked refresh token of the user, atomically.
    fn reset_password(
        &self,
        user_id: i64,
        password_hash: &str,
        otp_id: i64,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Set the new password hash, bump `updated_at`, and revoke every
    /// non-revoked refresh token of the user, atomically.
    fn change_password(
        &self,
        user_id: i64,
        password_hash: &str,
    ) -> impl Future<Output = Result<()>> + Send;
}
