//! Authentication configuration, built once at startup.

use secrecy::SecretString;

const DEFAULT_OTP_LENGTH: usize = 6;
const DEFAULT_OTP_TTL_MINUTES: i64 = 10;
const DEFAULT_MAX_OTP_ATTEMPTS: i32 = 5;
const DEFAULT_RESEND_COOLDOWN_SECONDS: i64 = 60;
const DEFAULT_RESEND_QUOTA: i64 = 3;
const DEFAULT_ACCESS_TOKEN_TTL_MINUTES: i64 = 30;
const DEFAULT_REFRESH_TOKEN_TTL_DAYS: i64 = 7;
const DEFAULT_MIN_PASSWORD_LENGTH: usize = 8;

/// Immutable knobs for the auth engine. Constructed from CLI/env at
/// process start and passed by reference into the engine.
#[derive(Clone, Debug)]
pub struct AuthConfig {
    jwt_secret: SecretString,
    otp_length: usize,
    otp_ttl_minutes: i64,
    max_otp_attempts: i32,
    resend_cooldown_seconds: i64,
    resend_quota: i64,
    access_token_ttl_minutes: i64,
    refresh_token_ttl_days: i64,
    min_password_length: usize,
}

impl AuthConfig {
    #[must_use]
    pub fn new(jwt_secret: SecretString) -> Self {
        Self {
            jwt_secret,
            otp_length: DEFAULT_OTP_LENGTH,
            otp_ttl_minutes: DEFAULT_OTP_TTL_MINUTES,
            max_otp_attempts: DEFAULT_MAX_OTP_ATTEMPTS,
            resend_cooldown_seconds: DEFAULT_RESEND_COOLDOWN_SECONDS,
            resend_quota: DEFAULT_RESEND_QUOTA,
            access_token_ttl_minutes: DEFAULT_ACCESS_TOKEN_TTL_MINUTES,
            refresh_token_ttl_days: DEFAULT_REFRESH_TOKEN_TTL_DAYS,
            min_password_length: DEFAULT_MIN_PASSWORD_LENGTH,
        }
    }

    #[must_use]
    pub fn with_otp_ttl_minutes(mut self, minutes: i64) -> Self {
        self.otp_ttl_minutes = minutes;
        self
    }

    #[must_use]
    pub fn with_resend_cooldown_seconds(mut self, seconds: i64) -> Self {
        self.resend_cooldown_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_resend_quota(mut self, quota: i64) -> Self {
        self.resend_quota = quota;
        self
    }

    #[must_use]
    pub fn with_access_token_ttl_minutes(mut self, minutes: i64) -> Self {
        self.access_token_ttl_minutes = minutes;
        self
    }

    #[must_use]
    pub fn with_refresh_token_ttl_days(mut self, days: i64) -> Self {
        self.refresh_token_ttl_days = days;
        self
    }

    #[must_use]
    pub fn with_min_password_length(mut self, length: usize) -> Self {
        self.min_password_length = length;
        self
    }

    #[must_use]
    pub fn jwt_secret(&self) -> &SecretString {
        &self.jwt_secret
    }

    #[must_use]
    pub fn otp_length(&self) -> usize {
        self.otp_length
    }

    #[must_use]
    pub fn otp_ttl_minutes(&self) -> i64 {
        self.otp_ttl_minutes
    }

    #[must_use]
    pub fn max_otp_attempts(&self) -> i32 {
        self.max_otp_attempts
    }

    #[must_use]
    pub fn resend_cooldown_seconds(&self) -> i64 {
        self.resend_cooldown_seconds
    }

    #[must_use]
    pub fn resend_quota(&self) -> i64 {
        self.resend_quota
    }

    #[must_use]
    pub fn access_token_ttl_minutes(&self) -> i64 {
        self.access_token_ttl_minutes
    }

    #[must_use]
    pub fn refresh_token_ttl_days(&self) -> i64 {
        self.refresh_token_ttl_days
    }

    #[must_use]
    pub fn min_password_length(&self) -> usize {
        self.min_password_length
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> AuthConfig {
        AuthConfig::new(SecretString::from("test-secret".to_string()))
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = config();
        assert_eq!(config.otp_length(), 6);
        assert_eq!(config.otp_ttl_minutes(), 10);
        assert_eq!(config.max_otp_attempts(), 5);
        assert_eq!(config.resend_cooldown_seconds(), 60);
        assert_eq!(config.resend_quota(), 3);
        assert_eq!(config.access_token_ttl_minutes(), 30);
        assert_eq!(config.refresh_token_ttl_days(), 7);
        assert_eq!(config.min_password_length(), 8);
    }

    #[test]
    fn builders_override_defaults() {
        let config = config()
            .with_otp_ttl_minutes(5)
            .with_resend_cooldown_seconds(30)
            .with_resend_quota(10)
            .with_access_token_ttl_minutes(15)
            .with_refresh_token_ttl_days(30)
            .with_min_password_length(12);
        assert_eq!(config.otp_ttl_minutes(), 5);
        assert_eq!(config.resend_cooldown_seconds(), 30);
        assert_eq!(config.resend_quota(), 10);
        assert_eq!(config.access_token_ttl_minutes(), 15);
        assert_eq!(config.refresh_token_ttl_days(), 30);
        assert_eq!(config.min_password_length(), 12);
    }

    #[test]
    fn debug_redacts_the_secret() {
        let rendered = format!("{:?}", config());
        assert!(!rendered.contains("test-secret"));
    }
}
