//! Permission catalog CRUD.
//!
//! Plain relational data consumed by the RBAC layer; the only rule is
//! uniqueness of `value`. Kept outside the auth engine on purpose.

mod storage;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use utoipa::{IntoParams, ToSchema};

use super::{bad_request, internal_error, ErrorBody};
use storage::{InsertOutcome, PermissionRow};

const MAX_PAGE_SIZE: i64 = 200;
const DEFAULT_PAGE_SIZE: i64 = 10;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct PermissionCreate {
    pub label: String,
    pub value: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct PermissionUpdate {
    pub label: Option<String>,
    pub value: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct PermissionResponse {
    pub id: i64,
    pub label: String,
    pub value: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<PermissionRow> for PermissionResponse {
    fn from(row: PermissionRow) -> Self {
        Self {
            id: row.id,
            label: row.label,
            value: row.value,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct PermissionListResponse {
    pub total: i64,
    pub items: Vec<PermissionResponse>,
    pub page: i64,
    pub page_size: i64,
    pub total_pages: i64,
}

#[derive(IntoParams, Deserialize, Debug)]
#[into_params(parameter_in = Query)]
pub struct ListParams {
    /// Page number, starting at 1.
    pub page: Option<i64>,
    /// Items per page, capped at 200.
    pub page_size: Option<i64>,
    /// Case-insensitive substring match against label and value.
    pub search: Option<String>,
}

fn valid_field(field: &str) -> bool {
    !field.is_empty() && field.chars().count() <= 255
}

#[utoipa::path(
    post,
    path = "/api/v1/permissions",
    request_body = PermissionCreate,
    responses(
        (status = 201, description = "Permission created", body = PermissionResponse),
        (status = 400, description = "Value already exists", body = ErrorBody)
    ),
    tag = "permissions"
)]
pub async fn create(
    pool: Extension<PgPool>,
    Json(payload): Json<PermissionCreate>,
) -> Response {
    if !valid_field(&payload.label) || !valid_field(&payload.value) {
        return bad_request("label and value must be 1-255 characters");
    }

    match storage::insert_permission(&pool, &payload.label, &payload.value).await {
        Ok(InsertOutcome::Created(row)) => {
            (StatusCode::CREATED, Json(PermissionResponse::from(row))).into_response()
        }
        Ok(InsertOutcome::Conflict) => bad_request(&format!(
            "Permission with value '{}' already exists",
            payload.value
        )),
        Err(err) => internal_error(&err),
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/permissions/bulk",
    request_body = Vec<PermissionCreate>,
    responses(
        (status = 201, description = "Permissions created", body = Vec<PermissionResponse>),
        (status = 400, description = "Duplicate or existing values", body = ErrorBody)
    ),
    tag = "permissions"
)]
pub async fn bulk_create(
    pool: Extension<PgPool>,
    Json(payload): Json<Vec<PermissionCreate>>,
) -> Response {
    if payload.is_empty() {
        return bad_request("No permissions in request");
    }
    if payload
        .iter()
        .any(|p| !valid_field(&p.label) || !valid_field(&p.value))
    {
        return bad_request("label and value must be 1-255 characters");
    }

    let values: Vec<String> = payload.iter().map(|p| p.value.clone()).collect();
    let mut deduped = values.clone();
    deduped.sort();
    deduped.dedup();
    if deduped.len() != values.len() {
        return bad_request("Duplicate permission values in request");
    }

    match storage::existing_values(&pool, &values).await {
        Ok(existing) if !existing.is_empty() => {
            return bad_request(&format!(
                "Permissions already exist: {}",
                existing.join(",")
            ));
        }
        Ok(_) => {}
        Err(err) => return internal_error(&err),
    }

    let items: Vec<(String, String)> = payload
        .into_iter()
        .map(|p| (p.label, p.value))
        .collect();

    match storage::insert_permissions(&pool, &items).await {
        Ok(created) => {
            let body: Vec<PermissionResponse> =
                created.into_iter().map(PermissionResponse::from).collect();
            (StatusCode::CREATED, Json(body)).into_response()
        }
        Err(err) => internal_error(&err),
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/permissions",
    params(ListParams),
    responses(
        (status = 200, description = "Paginated catalog", body = PermissionListResponse)
    ),
    tag = "permissions"
)]
pub async fn list(pool: Extension<PgPool>, Query(params): Query<ListParams>) -> Response {
    let page = params.page.unwrap_or(1).max(1);
    let page_size = params
        .page_size
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);
    let offset = (page - 1) * page_size;

    match storage::list_permissions(&pool, offset, page_size, params.search.as_deref()).await {
        Ok((rows, total)) => {
            let total_pages = if total > 0 {
                (total + page_size - 1) / page_size
            } else {
                0
            };
            let body = PermissionListResponse {
                total,
                items: rows.into_iter().map(PermissionResponse::from).collect(),
                page,
                page_size,
                total_pages,
            };
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(err) => internal_error(&err),
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/permissions/{id}",
    params(("id" = i64, Path, description = "Permission id")),
    responses(
        (status = 200, description = "Permission", body = PermissionResponse),
        (status = 404, description = "No such permission", body = ErrorBody)
    ),
    tag = "permissions"
)]
pub async fn get_by_id(pool: Extension<PgPool>, Path(id): Path<i64>) -> Response {
    match storage::permission_by_id(&pool, id).await {
        Ok(Some(row)) => (StatusCode::OK, Json(PermissionResponse::from(row))).into_response(),
        Ok(None) => not_found(id),
        Err(err) => internal_error(&err),
    }
}

#[utoipa::path(
    put,
    path = "/api/v1/permissions/{id}",
    params(("id" = i64, Path, description = "Permission id")),
    request_body = PermissionUpdate,
    responses(
        (status = 200, description = "Updated permission", body = PermissionResponse),
        (status = 400, description = "Value already exists", body = ErrorBody),
        (status = 404, description = "No such permission", body = ErrorBody)
    ),
    tag = "permissions"
)]
pub async fn update(
    pool: Extension<PgPool>,
    Path(id): Path<i64>,
    Json(payload): Json<PermissionUpdate>,
) -> Response {
    if payload
        .label
        .as_deref()
        .is_some_and(|label| !valid_field(label))
        || payload
            .value
            .as_deref()
            .is_some_and(|value| !valid_field(value))
    {
        return bad_request("label and value must be 1-255 characters");
    }

    if let Some(value) = payload.value.as_deref() {
        match storage::value_taken_by_other(&pool, value, id).await {
            Ok(true) => {
                return bad_request(&format!("Permission with value '{value}' already exists"));
            }
            Ok(false) => {}
            Err(err) => return internal_error(&err),
        }
    }

    match storage::update_permission(&pool, id, payload.label.as_deref(), payload.value.as_deref())
        .await
    {
        Ok(Some(row)) => (StatusCode::OK, Json(PermissionResponse::from(row))).into_response(),
        Ok(None) => not_found(id),
        Err(err) => internal_error(&err),
    }
}

#[utoipa::path(
    delete,
    path = "/api/v1/permissions/{id}",
    params(("id" = i64, Path, description = "Permission id")),
    responses(
        (status = 204, description = "Permission deleted"),
        (status = 404, description = "No such permission", body = ErrorBody)
    ),
    tag = "permissions"
)]
pub async fn delete(pool: Extension<PgPool>, Path(id): Path<i64>) -> Response {
    match storage::delete_permission(&pool, id).await {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => not_found(id),
        Err(err) => internal_error(&err),
    }
}

fn not_found(id: i64) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorBody {
            detail: format!("Permission with id {id} not found"),
        }),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_bounds() {
        assert!(valid_field("read"));
        assert!(!valid_field(""));
        assert!(!valid_field(&"a".repeat(256)));
        assert!(valid_field(&"a".repeat(255)));
    }

    #[test]
    fn permission_response_from_row() {
        let row = PermissionRow {
            id: 3,
            label: "Write".to_string(),
            value: "write".to_string(),
            created_at: Utc::now(),
            updated_at: None,
        };
        let response = PermissionResponse::from(row);
        assert_eq!(response.id, 3);
        assert_eq!(response.value, "write");
    }
}
