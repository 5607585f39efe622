//! Command-line argument dispatch.
//!
//! Maps validated CLI arguments to the appropriate action, such as
//! starting the API server with its full configuration.

use crate::cli::actions::{server::Args, Action};
use crate::cli::commands::auth;
use anyhow::{Context, Result};

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>("dsn")
        .cloned()
        .context("missing required argument: --dsn")?;

    let auth_opts = auth::Options::parse(matches)?;

    Ok(Action::Server(Args {
        port,
        dsn,
        jwt_secret: auth_opts.jwt_secret,
        access_token_ttl_minutes: auth_opts.access_token_ttl_minutes,
        refresh_token_ttl_days: auth_opts.refresh_token_ttl_days,
        otp_ttl_minutes: auth_opts.otp_ttl_minutes,
        otp_resend_cooldown_seconds: auth_opts.otp_resend_cooldown_seconds,
        otp_resend_quota: auth_opts.otp_resend_quota,
        min_password_length: auth_opts.min_password_length,
        cors_origins: auth_opts.cors_origins,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::actions::Action;

    #[test]
    fn server_action_from_args() {
        temp_env::with_vars([("PORDISTO_DSN", None::<&str>)], || {
            let command = crate::cli::commands::new();
            let matches = command.get_matches_from(vec![
                "pordisto",
                "--dsn",
                "postgres://localhost:5432/pordisto",
                "--jwt-secret",
                "sekret",
                "--otp-resend-quota",
                "5",
            ]);
            let action = handler(&matches).expect("handler should succeed");
            let Action::Server(args) = action;
            assert_eq!(args.port, 8080);
            assert_eq!(args.dsn, "postgres://localhost:5432/pordisto");
            assert_eq!(args.otp_resend_quota, 5);
            assert_eq!(args.min_password_length, 8);
            assert!(args.cors_origins.is_none());
        });
    }
}
