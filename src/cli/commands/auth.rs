//! Auth and token tuning arguments.

use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;

pub const ARG_JWT_SECRET: &str = "jwt-secret";

#[must_use]
pub fn with_args(command: Command) -> Command {
    let command = command
        .arg(
            Arg::new(ARG_JWT_SECRET)
                .long("jwt-secret")
                .help("Secret used to sign access and refresh tokens")
                .env("PORDISTO_JWT_SECRET")
                .required(true),
        )
        .arg(
            Arg::new("access-token-ttl-minutes")
                .long("access-token-ttl-minutes")
                .help("Access token TTL in minutes")
                .env("PORDISTO_ACCESS_TOKEN_TTL_MINUTES")
                .default_value("30")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("refresh-token-ttl-days")
                .long("refresh-token-ttl-days")
                .help("Refresh token TTL in days")
                .env("PORDISTO_REFRESH_TOKEN_TTL_DAYS")
                .default_value("7")
                .value_parser(clap::value_parser!(i64)),
        );

    let command = command
        .arg(
            Arg::new("otp-ttl-minutes")
                .long("otp-ttl-minutes")
                .help("One-time code TTL in minutes")
                .env("PORDISTO_OTP_TTL_MINUTES")
                .default_value("10")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("otp-resend-cooldown-seconds")
                .long("otp-resend-cooldown-seconds")
                .help("Cooldown before a one-time code can be resent")
                .env("PORDISTO_OTP_RESEND_COOLDOWN_SECONDS")
                .default_value("60")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("otp-resend-quota")
                .long("otp-resend-quota")
                .help("Max one-time codes issued per address within the OTP TTL window")
                .env("PORDISTO_OTP_RESEND_QUOTA")
                .default_value("3")
                .value_parser(clap::value_parser!(i64)),
        );

    command
        .arg(
            Arg::new("min-password-length")
                .long("min-password-length")
                .help("Minimum accepted password length")
                .env("PORDISTO_MIN_PASSWORD_LENGTH")
                .default_value("8")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("cors-origin")
                .long("cors-origin")
                .help("Comma-separated allowed CORS origins (default: any origin)")
                .env("PORDISTO_CORS_ORIGINS"),
        )
}

#[derive(Debug)]
pub struct Options {
    pub jwt_secret: SecretString,
    pub access_token_ttl_minutes: i64,
    pub refresh_token_ttl_days: i64,
    pub otp_ttl_minutes: i64,
    pub otp_resend_cooldown_seconds: i64,
    pub otp_resend_quota: i64,
    pub min_password_length: usize,
    pub cors_origins: Option<String>,
}

impl Options {
    /// Read the auth arguments out of validated matches.
    ///
    /// # Errors
    /// Returns an error if a required argument is missing.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        Ok(Self {
            jwt_secret: matches
                .get_one::<String>(ARG_JWT_SECRET)
                .cloned()
                .map(SecretString::from)
                .context("missing required argument: --jwt-secret")?,
            access_token_ttl_minutes: matches
                .get_one::<i64>("access-token-ttl-minutes")
                .copied()
                .unwrap_or(30),
            refresh_token_ttl_days: matches
                .get_one::<i64>("refresh-token-ttl-days")
                .copied()
                .unwrap_or(7),
            otp_ttl_minutes: matches
                .get_one::<i64>("otp-ttl-minutes")
                .copied()
                .unwrap_or(10),
            otp_resend_cooldown_seconds: matches
                .get_one::<i64>("otp-resend-cooldown-seconds")
                .copied()
                .unwrap_or(60),
            otp_resend_quota: matches
                .get_one::<i64>("otp-resend-quota")
                .copied()
                .unwrap_or(3),
            min_password_length: matches
                .get_one::<usize>("min-password-length")
                .copied()
                .unwrap_or(8),
            cors_origins: matches.get_one::<String>("cors-origin").cloned(),
        })
    }
}
