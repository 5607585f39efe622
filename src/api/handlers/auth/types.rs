//! Request/response types for auth endpoints.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::engine::{LoginSuccess, OtpIssued, SignedUpUser, TokenPair};

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SignupRequest {
    pub email: String,
    pub username: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SignupRequestResponse {
    pub message: String,
    pub email: String,
    pub expires_in_minutes: i64,
}

impl From<OtpIssued> for SignupRequestResponse {
    fn from(issued: OtpIssued) -> Self {
        Self {
            message: issued.message,
            email: issued.email,
            expires_in_minutes: issued.expires_in_minutes,
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct VerifyOtpRequest {
    pub email: String,
    pub otp: String,
    pub password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SignupCompleteResponse {
    pub message: String,
    pub user_id: i64,
    pub email: String,
    pub username: String,
}

impl From<SignedUpUser> for SignupCompleteResponse {
    fn from(user: SignedUpUser) -> Self {
        Self {
            message: "Signup successful! You can now login.".to_string(),
            user_id: user.user_id,
            email: user.email,
            username: user.username,
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct UserSummaryResponse {
    pub id: i64,
    pub username: String,
    pub email: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
}

impl From<TokenPair> for TokenResponse {
    fn from(tokens: TokenPair) -> Self {
        Self {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            token_type: tokens.token_type.to_string(),
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginResponse {
    pub message: String,
    pub user: UserSummaryResponse,
    pub tokens: TokenResponse,
}

impl From<LoginSuccess> for LoginResponse {
    fn from(success: LoginSuccess) -> Self {
        Self {
            message: success.message,
            user: UserSummaryResponse {
                id: success.user.id,
                username: success.user.username,
                email: success.user.email,
            },
            tokens: success.tokens.into(),
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LogoutRequest {
    pub refresh_token: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ResetPasswordRequest {
    pub email: String,
    pub otp: String,
    pub new_password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ResendOtpRequest {
    pub email: String,
    pub purpose: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

/// Plain acknowledgment body used by logout, password reset, and resend.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct MessageResponse {
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Context, Result};

    #[test]
    fn login_request_round_trips() -> Result<()> {
        let request = LoginRequest {
            email: "alice@example.com".to_string(),
            password: "correct-horse-battery".to_string(),
        };
        let value = serde_json::to_value(&request)?;
        let email = value
            .get("email")
            .and_then(serde_json::Value::as_str)
            .context("missing email")?;
        assert_eq!(email, "alice@example.com");
        let decoded: LoginRequest = serde_json::from_value(value)?;
        assert_eq!(decoded.password, "correct-horse-battery");
        Ok(())
    }

    #[test]
    fn token_response_from_pair_keeps_bearer_type() {
        let response = TokenResponse::from(TokenPair {
            access_token: "a".to_string(),
            refresh_token: "r".to_string(),
            token_type: "bearer",
        });
        assert_eq!(response.token_type, "bearer");
    }

    #[test]
    fn resend_request_round_trips() -> Result<()> {
        let request = ResendOtpRequest {
            email: "bob@example.com".to_string(),
            purpose: "password_reset".to_string(),
        };
        let value = serde_json::to_value(&request)?;
        let decoded: ResendOtpRequest = serde_json::from_value(value)?;
        assert_eq!(decoded.purpose, "password_reset");
        Ok(())
    }
}
