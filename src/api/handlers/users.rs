//! Current-user profile endpoints.

use anyhow::Context;
use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::Instrument;
use utoipa::ToSchema;

use crate::api::Engine;
use crate::auth::store::UserRecord;

use super::auth::authorize;
use super::{bad_request, internal_error, valid_username, ErrorBody};

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct UserProfileResponse {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub is_active: bool,
    pub email_verified: bool,
    pub created_at: DateTime<Utc>,
}

impl From<UserRecord> for UserProfileResponse {
    fn from(user: UserRecord) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            is_active: user.is_active,
            email_verified: user.email_verified,
            created_at: user.created_at,
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct UserUpdateRequest {
    pub username: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct DeactivatedResponse {
    pub message: String,
}

#[utoipa::path(
    get,
    path = "/api/v1/users/me",
    responses(
        (status = 200, description = "Current user profile", body = UserProfileResponse),
        (status = 401, description = "Missing or invalid token", body = ErrorBody)
    ),
    security(("bearer" = [])),
    tag = "users"
)]
pub async fn profile(engine: Extension<Arc<Engine>>, headers: HeaderMap) -> Response {
    match authorize(&engine, &headers).await {
        Ok(user) => (StatusCode::OK, Json(UserProfileResponse::from(user))).into_response(),
        Err(response) => response,
    }
}

#[utoipa::path(
    put,
    path = "/api/v1/users/me",
    request_body = UserUpdateRequest,
    responses(
        (status = 200, description = "Updated profile", body = UserProfileResponse),
        (status = 400, description = "Username invalid or already taken", body = ErrorBody),
        (status = 401, description = "Missing or invalid token", body = ErrorBody)
    ),
    security(("bearer" = [])),
    tag = "users"
)]
pub async fn update_profile(
    engine: Extension<Arc<Engine>>,
    pool: Extension<PgPool>,
    headers: HeaderMap,
    Json(payload): Json<UserUpdateRequest>,
) -> Response {
    let mut user = match authorize(&engine, &headers).await {
        Ok(user) => user,
        Err(response) => return response,
    };

    if let Some(username) = payload.username {
        if !valid_username(&username) {
            return bad_request("Username must be 3-50 letters, digits, or underscores");
        }

        match username_taken_by_other(&pool, &username, user.id).await {
            Ok(true) => return bad_request("Username already taken"),
            Ok(false) => {}
            Err(err) => return internal_error(&err),
        }

        if let Err(err) = rename_user(&pool, user.id, &username).await {
            return internal_error(&err);
        }
        user.username = username;
    }

    (StatusCode::OK, Json(UserProfileResponse::from(user))).into_response()
}

#[utoipa::path(
    delete,
    path = "/api/v1/users/me",
    responses(
        (status = 200, description = "Account deactivated", body = DeactivatedResponse),
        (status = 401, description = "Missing or invalid token", body = ErrorBody)
    ),
    security(("bearer" = [])),
    tag = "users"
)]
pub async fn deactivate(
    engine: Extension<Arc<Engine>>,
    pool: Extension<PgPool>,
    headers: HeaderMap,
) -> Response {
    let user = match authorize(&engine, &headers).await {
        Ok(user) => user,
        Err(response) => return response,
    };

    if let Err(err) = deactivate_user(&pool, user.id).await {
        return internal_error(&err);
    }

    (
        StatusCode::OK,
        Json(DeactivatedResponse {
            message: "Account deactivated successfully".to_string(),
        }),
    )
        .into_response()
}

async fn username_taken_by_other(
    pool: &PgPool,
    username: &str,
    user_id: i64,
) -> anyhow::Result<bool> {
    let query = "SELECT 1 FROM users WHERE username = $1 AND id <> $2 LIMIT 1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(username)
        .bind(user_id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to check username uniqueness")?;
    Ok(row.is_some())
}

async fn rename_user(pool: &PgPool, user_id: i64, username: &str) -> anyhow::Result<()> {
    let query = "UPDATE users SET username = $2, updated_at = NOW() WHERE id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .bind(username)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to update username")?;
    Ok(())
}

/// Soft delete: the row stays, its email and username stay reserved.
async fn deactivate_user(pool: &PgPool, user_id: i64) -> anyhow::Result<()> {
    let query = "UPDATE users SET is_active = FALSE, updated_at = NOW() WHERE id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to deactivate user")?;
    Ok(())
}
