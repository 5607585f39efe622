//! Typed failures surfaced by the authentication flows.

use thiserror::Error;

/// Everything an auth flow can fail with, surfaced to the request
/// layer with a stable kind and a human-readable message. The HTTP
/// layer owns the mapping to status codes.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Email already registered")]
    EmailTaken,

    #[error("Username already taken")]
    UsernameTaken,

    #[error("OTP not found or already used")]
    OtpNotFound,

    #[error("OTP has expired. Please request a new OTP.")]
    OtpExpired,

    #[error("Too many failed attempts. Please request a new OTP.")]
    TooManyAttempts,

    /// Wrong code; carries how many attempts are left before the OTP
    /// locks out.
    #[error("Invalid OTP. {remaining} attempts remaining.")]
    InvalidOtp { remaining: i32 },

    /// Unified for unknown email and wrong password so responses do
    /// not reveal which one it was.
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Please verify your email first")]
    EmailNotVerified,

    #[error("Account is deactivated")]
    AccountDeactivated,

    /// Malformed, unsigned, expired, or wrong-type bearer token.
    #[error("{0}")]
    InvalidToken(String),

    #[error("Refresh token not found or has been revoked")]
    TokenNotFound,

    #[error("Refresh token has expired. Please login again.")]
    TokenExpired,

    #[error("User not found")]
    UserNotFound,

    #[error("Invalid OTP purpose: {purpose}")]
    InvalidPurpose { purpose: String },

    #[error("Email is already registered and verified")]
    AlreadyVerified,

    /// Resend cooldown or quota hit; `retry_after` is in seconds.
    #[error("Too many requests. Retry in {retry_after} seconds.")]
    RateLimited { retry_after: i64 },

    #[error("Password must be at least {min_length} characters long")]
    PasswordTooShort { min_length: usize },

    #[error("New password must be different from the current password")]
    PasswordUnchanged,

    /// Store or crypto failure; never shown verbatim to clients.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_otp_reports_remaining_attempts() {
        let err = AuthError::InvalidOtp { remaining: 3 };
        assert_eq!(err.to_string(), "Invalid OTP. 3 attempts remaining.");
    }

    #[test]
    fn rate_limited_reports_retry_after() {
        let err = AuthError::RateLimited { retry_after: 42 };
        assert_eq!(err.to_string(), "Too many requests. Retry in 42 seconds.");
    }

    #[test]
    fn internal_wraps_anyhow() {
        let err: AuthError = anyhow::anyhow!("pool exhausted").into();
        assert!(matches!(err, AuthError::Internal(_)));
    }
}
