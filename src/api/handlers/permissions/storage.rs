//! Database helpers for the permission catalog.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::Instrument;

use crate::db::is_unique_violation;

/// One catalog entry: a display label and the unique value checked by
/// the RBAC layer.
#[derive(Debug, Clone)]
pub(super) struct PermissionRow {
    pub(super) id: i64,
    pub(super) label: String,
    pub(super) value: String,
    pub(super) created_at: DateTime<Utc>,
    pub(super) updated_at: Option<DateTime<Utc>>,
}

/// Outcome when attempting to insert a permission with a unique value.
#[derive(Debug)]
pub(super) enum InsertOutcome {
    Created(PermissionRow),
    Conflict,
}

pub(super) async fn insert_permission(
    pool: &PgPool,
    label: &str,
    value: &str,
) -> Result<InsertOutcome> {
    let query = r"
        INSERT INTO permissions (label, value)
        VALUES ($1, $2)
        RETURNING id, label, value, created_at, updated_at
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(label)
        .bind(value)
        .fetch_one(pool)
        .instrument(span)
        .await;

    match row {
        Ok(row) => Ok(InsertOutcome::Created(permission_from_row(&row))),
        Err(err) if is_unique_violation(&err) => Ok(InsertOutcome::Conflict),
        Err(err) => Err(err).context("failed to insert permission"),
    }
}

pub(super) async fn permission_by_id(pool: &PgPool, id: i64) -> Result<Option<PermissionRow>> {
    let query = r"
        SELECT id, label, value, created_at, updated_at
        FROM permissions
        WHERE id = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup permission")?;

    Ok(row.map(|row| permission_from_row(&row)))
}

/// Page through the catalog, optionally filtering label and value with a
/// case-insensitive substring match. Returns the page plus the total
/// count for the same filter.
pub(super) async fn list_permissions(
    pool: &PgPool,
    offset: i64,
    limit: i64,
    search: Option<&str>,
) -> Result<(Vec<PermissionRow>, i64)> {
    let pattern = search.map(|s| format!("%{s}%"));

    let query = r"
        SELECT COUNT(*) AS total
        FROM permissions
        WHERE $1::text IS NULL OR label ILIKE $1 OR value ILIKE $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let total: i64 = sqlx::query(query)
        .bind(pattern.as_deref())
        .fetch_one(pool)
        .instrument(span)
        .await
        .context("failed to count permissions")?
        .get("total");

    let query = r"
        SELECT id, label, value, created_at, updated_at
        FROM permissions
        WHERE $1::text IS NULL OR label ILIKE $1 OR value ILIKE $1
        ORDER BY id
        OFFSET $2
        LIMIT $3
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let rows = sqlx::query(query)
        .bind(pattern.as_deref())
        .bind(offset)
        .bind(limit)
        .fetch_all(pool)
        .instrument(span)
        .await
        .context("failed to list permissions")?;

    Ok((
        rows.iter().map(permission_from_row).collect(),
        total,
    ))
}

/// Which of `values` already exist in the catalog.
pub(super) async fn existing_values(pool: &PgPool, values: &[String]) -> Result<Vec<String>> {
    let query = "SELECT value FROM permissions WHERE value = ANY($1) ORDER BY value";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let rows = sqlx::query(query)
        .bind(values)
        .fetch_all(pool)
        .instrument(span)
        .await
        .context("failed to check existing permission values")?;

    Ok(rows.iter().map(|row| row.get("value")).collect())
}

/// Insert a batch atomically; the caller has already rejected duplicate
/// and existing values.
pub(super) async fn insert_permissions(
    pool: &PgPool,
    items: &[(String, String)],
) -> Result<Vec<PermissionRow>> {
    let mut tx = pool.begin().await.context("begin bulk insert")?;

    let query = r"
        INSERT INTO permissions (label, value)
        VALUES ($1, $2)
        RETURNING id, label, value, created_at, updated_at
    ";
    let mut created = Vec::with_capacity(items.len());
    for (label, value) in items {
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(label)
            .bind(value)
            .fetch_one(&mut *tx)
            .instrument(span)
            .await
            .context("failed to bulk-insert permission")?;
        created.push(permission_from_row(&row));
    }

    tx.commit().await.context("commit bulk insert")?;

    Ok(created)
}

pub(super) async fn value_taken_by_other(pool: &PgPool, value: &str, id: i64) -> Result<bool> {
    let query = "SELECT 1 FROM permissions WHERE value = $1 AND id <> $2 LIMIT 1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(value)
        .bind(id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to check permission value uniqueness")?;

    Ok(row.is_some())
}

pub(super) async fn update_permission(
    pool: &PgPool,
    id: i64,
    label: Option<&str>,
    value: Option<&str>,
) -> Result<Option<PermissionRow>> {
    let query = r"
        UPDATE permissions
        SET label = COALESCE($2, label),
            value = COALESCE($3, value),
            updated_at = NOW()
        WHERE id = $1
        RETURNING id, label, value, created_at, updated_at
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(id)
        .bind(label)
        .bind(value)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to update permission")?;

    Ok(row.map(|row| permission_from_row(&row)))
}

/// Returns false when no row matched the id.
pub(super) async fn delete_permission(pool: &PgPool, id: i64) -> Result<bool> {
    let query = "DELETE FROM permissions WHERE id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(id)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to delete permission")?;

    Ok(result.rows_affected() > 0)
}

fn permission_from_row(row: &PgRow) -> PermissionRow {
    PermissionRow {
        id: row.get("id"),
        label: row.get("label"),
        value: row.get("value"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::{InsertOutcome, PermissionRow};
    use chrono::Utc;

    #[test]
    fn insert_outcome_debug_names() {
        let row = PermissionRow {
            id: 1,
            label: "Read".to_string(),
            value: "read".to_string(),
            created_at: Utc::now(),
            updated_at: None,
        };
        assert!(format!("{:?}", InsertOutcome::Created(row)).starts_with("Created"));
        assert_eq!(format!("{:?}", InsertOutcome::Conflict), "Conflict");
    }
}
