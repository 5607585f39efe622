//! Authentication flows: signup OTP issuance and verification, login,
//! logout, refresh-token rotation, password reset/change, OTP resend.
//!
//! Generic over the store and notifier implementations so the flows
//! have no database or delivery dependency. Every flow runs to
//! completion within one call; the only state it keeps is what the
//! store persists.

use std::future::Future;

use chrono::{Duration, Utc};
use tracing::warn;

use crate::auth::config::AuthConfig;
use crate::auth::error::AuthError;
use crate::auth::notify::Notifier;
use crate::auth::otp::{self, OtpPurpose};
use crate::auth::password;
use crate::auth::store::{AuthStore, NewUser, OtpRecord, UserRecord};
use crate::auth::token::{Claims, TokenIssuer, TOKEN_TYPE_ACCESS, TOKEN_TYPE_REFRESH};

/// Acknowledgment for an OTP issuance request. The code itself is
/// never part of the response.
#[derive(Debug, Clone)]
pub struct OtpIssued {
    pub message: String,
    pub email: String,
    pub expires_in_minutes: i64,
}

/// The user created by a verified signup.
#[derive(Debug, Clone)]
pub struct SignedUpUser {
    pub user_id: i64,
    pub email: String,
    pub username: String,
}

#[derive(Debug, Clone)]
pub struct UserSummary {
    pub id: i64,
    pub username: String,
    pub email: String,
}

/// Access/refresh pair returned by login and refresh.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
}

#[derive(Debug, Clone)]
pub struct LoginSuccess {
    pub message: String,
    pub user: UserSummary,
    pub tokens: TokenPair,
}

/// Generic success acknowledgment for flows whose responses must not
/// reveal account state.
#[derive(Debug, Clone)]
pub struct Acknowledgment {
    pub message: String,
}

/// Identical for the registered and unregistered branches of the
/// password-reset request: indistinguishable responses are the
/// anti-enumeration contract.
const RESET_REQUESTED_MESSAGE: &str =
    "If the email is registered, you will receive a password reset OTP.";
const RESET_RESENT_MESSAGE: &str = "If the email is registered, a new OTP has been sent.";

pub struct AuthEngine<S, N> {
    store: S,
    notifier: N,
    tokens: TokenIssuer,
    config: AuthConfig,
}

impl<S: AuthStore, N: Notifier> AuthEngine<S, N> {
    #[must_use]
    pub fn new(store: S, notifier: N, config: AuthConfig) -> Self {
        let tokens = TokenIssuer::new(&config);
        Self {
            store,
            notifier,
            tokens,
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Start a signup: check uniqueness, supersede any pending signup
    /// OTP for the email, and send the fresh code.
    ///
    /// # Errors
    /// `EmailTaken`, `UsernameTaken`, or `Internal`.
    pub async fn request_signup_otp(
        &self,
        email: &str,
        username: &str,
    ) -> Result<OtpIssued, AuthError> {
        let email = normalize_email(email);

        if self.store.user_by_email(&email).await?.is_some() {
            return Err(AuthError::EmailTaken);
        }
        if self.store.user_by_username(username).await?.is_some() {
            return Err(AuthError::UsernameTaken);
        }

        let code = otp::generate_code(self.config.otp_length());
        let expires_at = Utc::now() + Duration::minutes(self.config.otp_ttl_minutes());
        self.store
            .replace_otp(&email, OtpPurpose::Signup, &code, expires_at)
            .await?;

        self.notify(self.notifier.send_otp_email(&email, &code, OtpPurpose::Signup))
            .await;

        Ok(OtpIssued {
            message: "OTP sent to your email".to_string(),
            email,
            expires_in_minutes: self.config.otp_ttl_minutes(),
        })
    }

    /// Complete a signup: validate the code and create the user with
    /// the email trusted, since the OTP proved control of it.
    ///
    /// # Errors
    /// `OtpNotFound`, `OtpExpired`, `TooManyAttempts`, `InvalidOtp`,
    /// or `Internal`.
    pub async fn verify_and_signup(
        &self,
        email: &str,
        code: &str,
        password: &str,
        username: &str,
    ) -> Result<SignedUpUser, AuthError> {
        let email = normalize_email(email);
        let otp_row = self.valid_otp(&email, OtpPurpose::Signup, code).await?;

        let user = self
            .store
            .create_verified_user(
                NewUser {
                    username: username.to_string(),
                    email: email.clone(),
                    password_hash: password::hash(password)?,
                },
                otp_row.id,
            )
            .await?;

        self.notify(self.notifier.send_welcome_email(&user.email, &user.username))
            .await;

        Ok(SignedUpUser {
            user_id: user.id,
            email: user.email,
            username: user.username,
        })
    }

    /// Verify credentials and open a session: issue an access/refresh
    /// pair and persist the refresh-token row.
    ///
    /// # Errors
    /// `InvalidCredentials` (unknown email and wrong password alike),
    /// `EmailNotVerified`, `AccountDeactivated`, or `Internal`.
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginSuccess, AuthError> {
        let email = normalize_email(email);
        let user = self
            .store
            .user_by_email(&email)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        // Verification state is reported before the password check.
        if !user.email_verified {
            return Err(AuthError::EmailNotVerified);
        }
        if !password::verify(password, &user.password_hash)? {
            return Err(AuthError::InvalidCredentials);
        }
        if !user.is_active {
            return Err(AuthError::AccountDeactivated);
        }

        let access_token = self.tokens.issue_access(user.id)?;
        let refresh_token = self.tokens.issue_refresh(user.id)?;
        let expires_at = Utc::now() + Duration::days(self.config.refresh_token_ttl_days());
        self.store
            .insert_refresh_token(user.id, &refresh_token, expires_at)
            .await?;

        Ok(LoginSuccess {
            message: "Login successful".to_string(),
            user: UserSummary {
                id: user.id,
                username: user.username,
                email: user.email,
            },
            tokens: TokenPair {
                access_token,
                refresh_token,
                token_type: "bearer",
            },
        })
    }

    /// Revoke one refresh token belonging to `user_id`.
    ///
    /// # Errors
    /// `InvalidToken`, `TokenNotFound`, or `Internal`.
    pub async fn logout(&self, refresh_token: &str, user_id: i64) -> Result<Acknowledgment, AuthError> {
        let claims = self
            .tokens
            .decode(refresh_token)
            .map_err(|_| AuthError::InvalidToken("Invalid refresh token".to_string()))?;
        if claims.token_type != TOKEN_TYPE_REFRESH {
            return Err(AuthError::InvalidToken("Invalid token type".to_string()));
        }

        let row = self
            .store
            .active_refresh_token(refresh_token, user_id)
            .await?
            .ok_or(AuthError::TokenNotFound)?;
        self.store.revoke_refresh_token(row.id).await?;

        Ok(Acknowledgment {
            message: "Logged out successfully".to_string(),
        })
    }

    /// Exchange a refresh token for a new pair. Rotation is mandatory:
    /// the old row is revoked in the same atomic unit that inserts the
    /// new one, so a consumed token can never be replayed.
    ///
    /// # Errors
    /// `InvalidToken`, `TokenNotFound`, `TokenExpired`, `UserNotFound`,
    /// `AccountDeactivated`, or `Internal`.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
        let claims = self
            .tokens
            .decode(refresh_token)
            .map_err(|_| AuthError::InvalidToken("Invalid or expired refresh token".to_string()))?;
        if claims.token_type != TOKEN_TYPE_REFRESH {
            return Err(AuthError::InvalidToken("Invalid token payload".to_string()));
        }
        let user_id = subject_id(&claims)?;

        let row = self
            .store
            .active_refresh_token(refresh_token, user_id)
            .await?
            .ok_or(AuthError::TokenNotFound)?;
        if Utc::now() > row.expires_at {
            return Err(AuthError::TokenExpired);
        }

        let user = self
            .store
            .user_by_id(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;
        if !user.is_active {
            return Err(AuthError::AccountDeactivated);
        }

        let access_token = self.tokens.issue_access(user.id)?;
        let new_refresh = self.tokens.issue_refresh(user.id)?;
        // The new row gets a full TTL from the rotation moment, not
        // whatever remained on the old one.
        let expires_at = Utc::now() + Duration::days(self.config.refresh_token_ttl_days());
        self.store
            .rotate_refresh_token(row.id, user.id, &new_refresh, expires_at)
            .await?;

        Ok(TokenPair {
            access_token,
            refresh_token: new_refresh,
            token_type: "bearer",
        })
    }

    /// Start a password reset. The acknowledgment is the same whether
    /// or not the email is registered; no OTP is created for unknown
    /// addresses.
    ///
    /// # Errors
    /// `Internal` only.
    pub async fn request_password_reset(&self, email: &str) -> Result<Acknowledgment, AuthError> {
        let email = normalize_email(email);

        if self.store.user_by_email(&email).await?.is_some() {
            let code = otp::generate_code(self.config.otp_length());
            let expires_at = Utc::now() + Duration::minutes(self.config.otp_ttl_minutes());
            self.store
                .replace_otp(&email, OtpPurpose::PasswordReset, &code, expires_at)
                .await?;
            self.notify(
                self.notifier
                    .send_otp_email(&email, &code, OtpPurpose::PasswordReset),
            )
            .await;
        }

        Ok(Acknowledgment {
            message: RESET_REQUESTED_MESSAGE.to_string(),
        })
    }

    /// Complete a password reset: validate the code, store the new
    /// hash, and force re-login everywhere by revoking every active
    /// refresh token of the user.
    ///
    /// # Errors
    /// `OtpNotFound`, `OtpExpired`, `TooManyAttempts`, `InvalidOtp`,
    /// `UserNotFound`, or `Internal`.
    pub async fn reset_password_with_otp(
        &self,
        email: &str,
        code: &str,
        new_password: &str,
    ) -> Result<Acknowledgment, AuthError> {
        let email = normalize_email(email);
        let otp_row = self
            .valid_otp(&email, OtpPurpose::PasswordReset, code)
            .await?;

        let user = self
            .store
            .user_by_email(&email)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        let hash = password::hash(new_password)?;
        self.store.reset_password(user.id, &hash, otp_row.id).await?;

        self.notify(
            self.notifier
                .send_password_reset_confirmation(&user.email, &user.username),
        )
        .await;

        Ok(Acknowledgment {
            message: "Password reset successful. You can now login with your new password."
                .to_string(),
        })
    }

    /// Issue a replacement OTP, rate-limited by a per-pair cooldown
    /// and a created-within-window quota, both derived from the store
    /// at call time.
    ///
    /// # Errors
    /// `AlreadyVerified`, `RateLimited`, or `Internal`.
    pub async fn resend_otp(
        &self,
        email: &str,
        purpose: OtpPurpose,
    ) -> Result<Acknowledgment, AuthError> {
        let email = normalize_email(email);

        match purpose {
            OtpPurpose::Signup => {
                if let Some(user) = self.store.user_by_email(&email).await? {
                    if user.email_verified {
                        return Err(AuthError::AlreadyVerified);
                    }
                }
            }
            OtpPurpose::PasswordReset => {
                if self.store.user_by_email(&email).await?.is_none() {
                    // Unregistered addresses get the same acknowledgment
                    // without any row being created.
                    return Ok(Acknowledgment {
                        message: RESET_RESENT_MESSAGE.to_string(),
                    });
                }
            }
        }

        let now = Utc::now();
        if let Some(last) = self.store.latest_unverified_otp(&email, purpose).await? {
            let age = now.signed_duration_since(last.created_at).num_seconds();
            let cooldown = self.config.resend_cooldown_seconds();
            if age < cooldown {
                return Err(AuthError::RateLimited {
                    retry_after: cooldown - age,
                });
            }
        }

        let window = Duration::minutes(self.config.otp_ttl_minutes());
        let issued = self
            .store
            .count_otps_created_since(&email, purpose, now - window)
            .await?;
        if issued >= self.config.resend_quota() {
            return Err(AuthError::RateLimited {
                retry_after: window.num_seconds(),
            });
        }

        let code = otp::generate_code(self.config.otp_length());
        let expires_at = now + window;
        self.store
            .replace_otp(&email, purpose, &code, expires_at)
            .await?;
        self.notify(self.notifier.send_otp_email(&email, &code, purpose))
            .await;

        Ok(Acknowledgment {
            message: match purpose {
                OtpPurpose::Signup => "OTP sent to your email".to_string(),
                OtpPurpose::PasswordReset => RESET_RESENT_MESSAGE.to_string(),
            },
        })
    }

    /// Change the password of a logged-in user and revoke every active
    /// refresh token.
    ///
    /// # Errors
    /// `UserNotFound`, `InvalidCredentials`, `PasswordTooShort`,
    /// `PasswordUnchanged`, or `Internal`.
    pub async fn change_password(
        &self,
        user_id: i64,
        current_password: &str,
        new_password: &str,
    ) -> Result<Acknowledgment, AuthError> {
        let user = self
            .store
            .user_by_id(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        if !password::verify(current_password, &user.password_hash)? {
            return Err(AuthError::InvalidCredentials);
        }
        if new_password.len() < self.config.min_password_length() {
            return Err(AuthError::PasswordTooShort {
                min_length: self.config.min_password_length(),
            });
        }
        if password::verify(new_password, &user.password_hash)? {
            return Err(AuthError::PasswordUnchanged);
        }

        let hash = password::hash(new_password)?;
        self.store.change_password(user.id, &hash).await?;

        self.notify(
            self.notifier
                .send_password_changed_email(&user.email, &user.username),
        )
        .await;

        Ok(Acknowledgment {
            message: "Password changed successfully".to_string(),
        })
    }

    /// Resolve a bearer access token into its active user. Used by the
    /// request layer for protected routes.
    ///
    /// # Errors
    /// `InvalidToken`, `UserNotFound`, `AccountDeactivated`, or
    /// `Internal`.
    pub async fn authenticate(&self, access_token: &str) -> Result<UserRecord, AuthError> {
        let claims = self.tokens.decode(access_token)?;
        if claims.token_type != TOKEN_TYPE_ACCESS {
            return Err(AuthError::InvalidToken("Invalid token type".to_string()));
        }
        let user_id = subject_id(&claims)?;

        let user = self
            .store
            .user_by_id(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;
        if !user.is_active {
            return Err(AuthError::AccountDeactivated);
        }
        Ok(user)
    }

    /// Shared OTP validation pipeline: latest unverified row, expiry,
    /// attempt cap, then code comparison. A mismatch increments the
    /// attempts counter before failing, and the counter never resets
    /// except via a fresh row.
    async fn valid_otp(
        &self,
        identifier: &str,
        purpose: OtpPurpose,
        code: &str,
    ) -> Result<OtpRecord, AuthError> {
        let record = self
            .store
            .latest_unverified_otp(identifier, purpose)
            .await?
            .ok_or(AuthError::OtpNotFound)?;

        if Utc::now() > record.expires_at {
            return Err(AuthError::OtpExpired);
        }
        if record.attempts >= self.config.max_otp_attempts() {
            return Err(AuthError::TooManyAttempts);
        }
        if record.code != code {
            let attempts = self.store.record_failed_attempt(record.id).await?;
            return Err(AuthError::InvalidOtp {
                remaining: (self.config.max_otp_attempts() - attempts).max(0),
            });
        }

        Ok(record)
    }

    /// Notifications are best-effort: awaited, logged on failure,
    /// never propagated into the flow result.
    async fn notify(&self, send: impl Future<Output = anyhow::Result<()>>) {
        if let Err(err) = send.await {
            warn!("notification failed: {err:#}");
        }
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn subject_id(claims: &Claims) -> Result<i64, AuthError> {
    claims
        .sub
        .parse::<i64>()
        .map_err(|_| AuthError::InvalidToken("Invalid token payload".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_email_trims_and_lowercases() {
        assert_eq!(normalize_email(" Alice@Example.COM "), "alice@example.com");
    }

    #[test]
    fn subject_id_parses_numeric_subjects() {
        let claims = Claims {
            sub: "42".to_string(),
            token_type: TOKEN_TYPE_REFRESH.to_string(),
            iat: 0,
            exp: 0,
            jti: String::new(),
        };
        assert_eq!(subject_id(&claims).unwrap(), 42);
    }

    #[test]
    fn subject_id_rejects_non_numeric_subjects() {
        let claims = Claims {
            sub: "not-a-number".to_string(),
            token_type: TOKEN_TYPE_REFRESH.to_string(),
            iat: 0,
            exp: 0,
            jti: String::new(),
        };
        assert!(matches!(
            subject_id(&claims),
            Err(AuthError::InvalidToken(_))
        ));
    }
}
