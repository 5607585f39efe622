//! API handlers and shared utilities for Pordisto.
//!
//! This module organizes the service's route handlers and provides common
//! functions for request validation, bearer extraction, and the mapping
//! from auth failures to HTTP responses.

pub mod auth;
pub mod health;
pub mod permissions;
pub mod root;
pub mod users;

use axum::{
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::error;
use utoipa::ToSchema;

use crate::auth::AuthError;

/// Lightweight email sanity check used by auth handlers before persisting data.
pub fn valid_email(email: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|re| re.is_match(email))
}

/// Usernames are 3-50 word characters.
pub fn valid_username(username: &str) -> bool {
    Regex::new(r"^[a-zA-Z0-9_]{3,50}$").is_ok_and(|re| re.is_match(username))
}

/// One-time codes are exactly six digits.
pub fn valid_otp(otp: &str) -> bool {
    Regex::new(r"^[0-9]{6}$").is_ok_and(|re| re.is_match(otp))
}

/// Error payload shared by every non-2xx response.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ErrorBody {
    pub detail: String,
}

pub(crate) fn bad_request(detail: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorBody {
            detail: detail.to_string(),
        }),
    )
        .into_response()
}

/// Map an auth failure to its transport response. The engine never sees
/// HTTP types; this table is the whole contract between the two layers.
pub(crate) fn auth_error(err: &AuthError) -> Response {
    let status = match err {
        AuthError::EmailTaken
        | AuthError::UsernameTaken
        | AuthError::OtpNotFound
        | AuthError::OtpExpired
        | AuthError::InvalidOtp { .. }
        | AuthError::InvalidPurpose { .. }
        | AuthError::AlreadyVerified
        | AuthError::PasswordTooShort { .. }
        | AuthError::PasswordUnchanged => StatusCode::BAD_REQUEST,
        AuthError::InvalidCredentials
        | AuthError::InvalidToken(_)
        | AuthError::TokenNotFound
        | AuthError::TokenExpired => StatusCode::UNAUTHORIZED,
        AuthError::EmailNotVerified | AuthError::AccountDeactivated => StatusCode::FORBIDDEN,
        AuthError::UserNotFound => StatusCode::NOT_FOUND,
        AuthError::TooManyAttempts | AuthError::RateLimited { .. } => {
            StatusCode::TOO_MANY_REQUESTS
        }
        AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    let detail = if status == StatusCode::INTERNAL_SERVER_ERROR {
        // Store and crypto failures are logged, never echoed to clients.
        error!("internal error: {err:#}");
        "Internal server error".to_string()
    } else {
        err.to_string()
    };

    (status, Json(ErrorBody { detail })).into_response()
}

/// 500 with a generic body; the real failure goes to the log only.
pub(crate) fn internal_error(err: &anyhow::Error) -> Response {
    error!("internal error: {err:#}");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorBody {
            detail: "Internal server error".to_string(),
        }),
    )
        .into_response()
}

pub(crate) fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let trimmed = value.trim();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}
