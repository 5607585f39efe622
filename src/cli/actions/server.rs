use crate::{api, auth::AuthConfig};
use anyhow::Result;
use secrecy::SecretString;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub jwt_secret: SecretString,
    pub access_token_ttl_minutes: i64,
    pub refresh_token_ttl_days: i64,
    pub otp_ttl_minutes: i64,
    pub otp_resend_cooldown_seconds: i64,
    pub otp_resend_quota: i64,
    pub min_password_length: usize,
    pub cors_origins: Option<String>,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the database is unreachable or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let config = AuthConfig::new(args.jwt_secret)
        .with_access_token_ttl_minutes(args.access_token_ttl_minutes)
        .with_refresh_token_ttl_days(args.refresh_token_ttl_days)
        .with_otp_ttl_minutes(args.otp_ttl_minutes)
        .with_resend_cooldown_seconds(args.otp_resend_cooldown_seconds)
        .with_resend_quota(args.otp_resend_quota)
        .with_min_password_length(args.min_password_length);

    api::new(args.port, args.dsn, config, args.cors_origins.as_deref()).await
}
