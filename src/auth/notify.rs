//! Outbound email abstraction.
//!
//! The engine triggers notifications after its transactional work and
//! never branches on the result: a failed send is logged by the caller
//! and discarded. The default sender for local development logs the
//! payload instead of delivering real email.

use std::future::Future;

use anyhow::Result;
use serde_json::json;
use tracing::info;

use crate::auth::otp::OtpPurpose;

pub trait Notifier: Send + Sync {
    fn send_otp_email(
        &self,
        email: &str,
        code: &str,
        purpose: OtpPurpose,
    ) -> impl Future<Output = Result<()>> + Send;

    fn send_welcome_email(
        &self,
        email: &str,
        username: &str,
    ) -> impl Future<Output = Result<()>> + Send;

    fn send_password_reset_confirmation(
        &self,
        email: &str,
        username: &str,
    ) -> impl Future<Output = Result<()>> + Send;

    fn send_password_changed_email(
        &self,
        email: &str,
        username: &str,
    ) -> impl Future<Output = Result<()>> + Send;
}

/// Local dev sender that logs the payload instead of sending real
/// email.
#[derive(Clone, Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    async fn send_otp_email(&self, email: &str, code: &str, purpose: OtpPurpose) -> Result<()> {
        info!(
            to_email = %email,
            template = "otp",
            payload = %json!({ "code": code, "purpose": purpose.as_str() }),
            "email send stub"
        );
        Ok(())
    }

    async fn send_welcome_email(&self, email: &str, username: &str) -> Result<()> {
        info!(
            to_email = %email,
            template = "welcome",
            payload = %json!({ "username": username }),
            "email send stub"
        );
        Ok(())
    }

    async fn send_password_reset_confirmation(&self, email: &str, username: &str) -> Result<()> {
        info!(
            to_email = %email,
            template = "password_reset_confirmation",
            payload = %json!({ "username": username }),
            "email send stub"
        );
        Ok(())
    }

    async fn send_password_changed_email(&self, email: &str, username: &str) -> Result<()> {
        info!(
            to_email = %email,
            template = "password_changed",
            payload = %json!({ "username": username }),
            "email send stub"
        );
        Ok(())
    }
}
