//! The nine authentication endpoints.
//!
//! Handlers validate request shapes, call into the engine, and map
//! typed failures onto HTTP statuses. All session semantics live in
//! [`crate::auth::engine`]; nothing here touches the database directly.

pub mod types;

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use std::str::FromStr;
use std::sync::Arc;

use crate::api::Engine;
use crate::auth::otp::OtpPurpose;
use crate::auth::store::UserRecord;

use super::{auth_error, bad_request, extract_bearer_token, valid_email, valid_otp, valid_username, ErrorBody};
use types::{
    ChangePasswordRequest, ForgotPasswordRequest, LoginRequest, LoginResponse, LogoutRequest,
    MessageResponse, RefreshRequest, ResendOtpRequest, ResetPasswordRequest,
    SignupCompleteResponse, SignupRequest, SignupRequestResponse, TokenResponse, VerifyOtpRequest,
};

/// Resolve the bearer access token into its active user, or produce the
/// 401 response the caller should return as-is.
pub(crate) async fn authorize(engine: &Engine, headers: &HeaderMap) -> Result<UserRecord, Response> {
    let Some(token) = extract_bearer_token(headers) else {
        return Err((
            StatusCode::UNAUTHORIZED,
            Json(ErrorBody {
                detail: "Missing bearer token".to_string(),
            }),
        )
            .into_response());
    };
    engine
        .authenticate(&token)
        .await
        .map_err(|err| auth_error(&err))
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/signup/request",
    request_body = SignupRequest,
    responses(
        (status = 200, description = "OTP sent", body = SignupRequestResponse),
        (status = 400, description = "Email or username already taken", body = ErrorBody)
    ),
    tag = "auth"
)]
pub async fn signup_request(
    engine: Extension<Arc<Engine>>,
    Json(payload): Json<SignupRequest>,
) -> Response {
    if !valid_email(&payload.email) {
        return bad_request("Invalid email address");
    }
    if !valid_username(&payload.username) {
        return bad_request("Username must be 3-50 letters, digits, or underscores");
    }

    match engine
        .request_signup_otp(&payload.email, &payload.username)
        .await
    {
        Ok(issued) => (StatusCode::OK, Json(SignupRequestResponse::from(issued))).into_response(),
        Err(err) => auth_error(&err),
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/signup/verify",
    request_body = VerifyOtpRequest,
    responses(
        (status = 201, description = "User created", body = SignupCompleteResponse),
        (status = 400, description = "Invalid or expired OTP", body = ErrorBody),
        (status = 429, description = "Attempts exhausted", body = ErrorBody)
    ),
    tag = "auth"
)]
pub async fn signup_verify(
    engine: Extension<Arc<Engine>>,
    Json(payload): Json<VerifyOtpRequest>,
) -> Response {
    if !valid_email(&payload.email) {
        return bad_request("Invalid email address");
    }
    if !valid_otp(&payload.otp) {
        return bad_request("OTP must be exactly 6 digits");
    }
    if payload.password.chars().count() < engine.config().min_password_length() {
        return bad_request("Password must be at least 8 characters long");
    }

    // The account name was reserved by the signup request; the local
    // part of the address is what gets registered.
    let username = payload.email.split('@').next().unwrap_or_default();

    match engine
        .verify_and_signup(&payload.email, &payload.otp, &payload.password, username)
        .await
    {
        Ok(user) => (
            StatusCode::CREATED,
            Json(SignupCompleteResponse::from(user)),
        )
            .into_response(),
        Err(err) => auth_error(&err),
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = LoginResponse),
        (status = 401, description = "Invalid credentials", body = ErrorBody),
        (status = 403, description = "Email not verified or account deactivated", body = ErrorBody)
    ),
    tag = "auth"
)]
pub async fn login(engine: Extension<Arc<Engine>>, Json(payload): Json<LoginRequest>) -> Response {
    if !valid_email(&payload.email) {
        return bad_request("Invalid email address");
    }

    match engine.login(&payload.email, &payload.password).await {
        Ok(success) => (StatusCode::OK, Json(LoginResponse::from(success))).into_response(),
        Err(err) => auth_error(&err),
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/logout",
    request_body = LogoutRequest,
    responses(
        (status = 200, description = "Logged out", body = MessageResponse),
        (status = 401, description = "Invalid or unknown token", body = ErrorBody)
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
pub async fn logout(
    engine: Extension<Arc<Engine>>,
    headers: HeaderMap,
    Json(payload): Json<LogoutRequest>,
) -> Response {
    let user = match authorize(&engine, &headers).await {
        Ok(user) => user,
        Err(response) => return response,
    };

    match engine.logout(&payload.refresh_token, user.id).await {
        Ok(ack) => (
            StatusCode::OK,
            Json(MessageResponse {
                message: ack.message,
            }),
        )
            .into_response(),
        Err(err) => auth_error(&err),
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/refresh",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "New token pair", body = TokenResponse),
        (status = 401, description = "Invalid, revoked, or expired token", body = ErrorBody)
    ),
    tag = "auth"
)]
pub async fn refresh(
    engine: Extension<Arc<Engine>>,
    Json(payload): Json<RefreshRequest>,
) -> Response {
    match engine.refresh(&payload.refresh_token).await {
        Ok(pair) => (StatusCode::OK, Json(TokenResponse::from(pair))).into_response(),
        Err(err) => auth_error(&err),
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/forgot-password",
    request_body = ForgotPasswordRequest,
    responses(
        (status = 200, description = "Acknowledgment, identical for any address", body = MessageResponse)
    ),
    tag = "auth"
)]
pub async fn forgot_password(
    engine: Extension<Arc<Engine>>,
    Json(payload): Json<ForgotPasswordRequest>,
) -> Response {
    if !valid_email(&payload.email) {
        return bad_request("Invalid email address");
    }

    match engine.request_password_reset(&payload.email).await {
        Ok(ack) => (
            StatusCode::OK,
            Json(MessageResponse {
                message: ack.message,
            }),
        )
            .into_response(),
        Err(err) => auth_error(&err),
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/reset-password",
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Password reset", body = MessageResponse),
        (status = 400, description = "Invalid or expired OTP", body = ErrorBody),
        (status = 429, description = "Attempts exhausted", body = ErrorBody)
    ),
    tag = "auth"
)]
pub async fn reset_password(
    engine: Extension<Arc<Engine>>,
    Json(payload): Json<ResetPasswordRequest>,
) -> Response {
    if !valid_email(&payload.email) {
        return bad_request("Invalid email address");
    }
    if !valid_otp(&payload.otp) {
        return bad_request("OTP must be exactly 6 digits");
    }
    if payload.new_password.chars().count() < engine.config().min_password_length() {
        return bad_request("Password must be at least 8 characters long");
    }

    match engine
        .reset_password_with_otp(&payload.email, &payload.otp, &payload.new_password)
        .await
    {
        Ok(ack) => (
            StatusCode::OK,
            Json(MessageResponse {
                message: ack.message,
            }),
        )
            .into_response(),
        Err(err) => auth_error(&err),
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/resend-otp",
    request_body = ResendOtpRequest,
    responses(
        (status = 200, description = "OTP issued or acknowledged", body = MessageResponse),
        (status = 400, description = "Unknown purpose or already verified", body = ErrorBody),
        (status = 429, description = "Cooldown or quota hit", body = ErrorBody)
    ),
    tag = "auth"
)]
pub async fn resend_otp(
    engine: Extension<Arc<Engine>>,
    Json(payload): Json<ResendOtpRequest>,
) -> Response {
    if !valid_email(&payload.email) {
        return bad_request("Invalid email address");
    }
    let purpose = match OtpPurpose::from_str(&payload.purpose) {
        Ok(purpose) => purpose,
        Err(err) => return auth_error(&err),
    };

    match engine.resend_otp(&payload.email, purpose).await {
        Ok(ack) => (
            StatusCode::OK,
            Json(MessageResponse {
                message: ack.message,
            }),
        )
            .into_response(),
        Err(err) => auth_error(&err),
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/change-password",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password changed", body = MessageResponse),
        (status = 400, description = "Too short or unchanged password", body = ErrorBody),
        (status = 401, description = "Wrong current password", body = ErrorBody)
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
pub async fn change_password(
    engine: Extension<Arc<Engine>>,
    headers: HeaderMap,
    Json(payload): Json<ChangePasswordRequest>,
) -> Response {
    let user = match authorize(&engine, &headers).await {
        Ok(user) => user,
        Err(response) => return response,
    };

    match engine
        .change_password(user.id, &payload.current_password, &payload.new_password)
        .await
    {
        Ok(ack) => (
            StatusCode::OK,
            Json(MessageResponse {
                message: ack.message,
            }),
        )
            .into_response(),
        Err(err) => auth_error(&err),
    }
}
