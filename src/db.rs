//! Postgres implementation of the auth persistence contract.
//!
//! One function per store method, raw queries instrumented with
//! `db.query` spans. Compound mutations run inside an explicit
//! transaction so each engine flow commits or rolls back as a unit.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use std::str::FromStr;
use tracing::Instrument;

use crate::auth::otp::OtpPurpose;
use crate::auth::store::{AuthStore, NewUser, OtpRecord, RefreshTokenRecord, UserRecord};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl AuthStore for PgStore {
    async fn user_by_email(&self, email: &str) -> Result<Option<UserRecord>> {
        let query = r"
            SELECT id, username, email, password_hash, is_active, email_verified,
                   created_at, updated_at
            FROM users
            WHERE email = $1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(email)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup user by email")?;

        Ok(row.map(|row| user_from_row(&row)))
    }

    async fn user_by_username(&self, username: &str) -> Result<Option<UserRecord>> {
        let query = r"
            SELECT id, username, email, password_hash, is_active, email_verified,
                   created_at, updated_at
            FROM users
            WHERE username = $1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(username)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup user by username")?;

        Ok(row.map(|row| user_from_row(&row)))
    }

    async fn user_by_id(&self, id: i64) -> Result<Option<UserRecord>> {
        let query = r"
            SELECT id, username, email, password_hash, is_active, email_verified,
                   created_at, updated_at
            FROM users
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
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup user by id")?;

        Ok(row.map(|row| user_from_row(&row)))
    }

    async fn replace_otp(
        &self,
        identifier: &str,
        purpose: OtpPurpose,
        code: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<OtpRecord> {
        let mut tx = self.pool.begin().await.context("begin otp transaction")?;

        let query =
            "DELETE FROM otps WHERE identifier = $1 AND purpose = $2 AND is_verified = FALSE";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(identifier)
            .bind(purpose.as_str())
            .execute(&mut *tx)
            .instrument(span)
            .await
            .context("failed to purge superseded otps")?;

        let query = r"
            INSERT INTO otps (identifier, code, purpose, expires_at)
            VALUES ($1, $2, $3, $4)
            RETURNING id, identifier, code, purpose, attempts, is_verified,
                      created_at, expires_at
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(identifier)
            .bind(code)
            .bind(purpose.as_str())
            .bind(expires_at)
            .fetch_one(&mut *tx)
            .instrument(span)
            .await
            .context("failed to insert otp")?;

        tx.commit().await.context("commit otp transaction")?;

        otp_from_row(&row)
    }

    async fn latest_unverified_otp(
        &self,
        identifier: &str,
        purpose: OtpPurpose,
    ) -> Result<Option<OtpRecord>> {
        let query = r"
            SELECT id, identifier, code, purpose, attempts, is_verified,
                   created_at, expires_at
            FROM otps
            WHERE identifier = $1 AND purpose = $2 AND is_verified = FALSE
            ORDER BY created_at DESC
            LIMIT 1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(identifier)
            .bind(purpose.as_str())
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup latest otp")?;

        row.map(|row| otp_from_row(&row)).transpose()
    }

    async fn record_failed_attempt(&self, otp_id: i64) -> Result<i32> {
        let query = "UPDATE otps SET attempts = attempts + 1 WHERE id = $1 RETURNING attempts";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(otp_id)
            .fetch_one(&self.pool)
            .instrument(span)
            .await
            .context("failed to record otp attempt")?;

        Ok(row.get("attempts"))
    }

    async fn count_otps_created_since(
        &self,
        identifier: &str,
        purpose: OtpPurpose,
        since: DateTime<Utc>,
    ) -> Result<i64> {
        let query = r"
            SELECT COUNT(*) AS issued
            FROM otps
            WHERE identifier = $1 AND purpose = $2 AND created_at >= $3
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(identifier)
            .bind(purpose.as_str())
            .bind(since)
            .fetch_one(&self.pool)
            .instrument(span)
            .await
            .context("failed to count otps in window")?;

        Ok(row.get("issued"))
    }

    async fn create_verified_user(&self, user: NewUser, otp_id: i64) -> Result<UserRecord> {
        // User insert and OTP consumption stay consistent even if one of
        // them fails.
        let mut tx = self.pool.begin().await.context("begin signup transaction")?;

        let query = r"
            INSERT INTO users (username, email, password_hash, is_active, email_verified)
            VALUES ($1, $2, $3, TRUE, TRUE)
            RETURNING id, username, email, password_hash, is_active, email_verified,
                      created_at, updated_at
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(&user.username)
            .bind(&user.email)
            .bind(&user.password_hash)
            .fetch_one(&mut *tx)
            .instrument(span)
            .await;

        let row = match row {
            Ok(row) => row,
            Err(err) if is_unique_violation(&err) => {
                let _ = tx.rollback().await;
                return Err(err).context("email or username already registered");
            }
            Err(err) => return Err(err).context("failed to insert user"),
        };

        let query = "UPDATE otps SET is_verified = TRUE WHERE id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(otp_id)
            .execute(&mut *tx)
            .instrument(span)
            .await
            .context("failed to mark otp verified")?;

        tx.commit().await.context("commit signup transaction")?;

        Ok(user_from_row(&row))
    }

    async fn insert_refresh_token(
        &self,
        user_id: i64,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<RefreshTokenRecord> {
        let query = r"
            INSERT INTO refresh_tokens (user_id, token, expires_at)
            VALUES ($1, $2, $3)
            RETURNING id, user_id, token, expires_at, revoked
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(user_id)
            .bind(token)
            .bind(expires_at)
            .fetch_one(&self.pool)
            .instrument(span)
            .await
            .context("failed to insert refresh token")?;

        Ok(token_from_row(&row))
    }

    async fn active_refresh_token(
        &self,
        token: &str,
        user_id: i64,
    ) -> Result<Option<RefreshTokenRecord>> {
        let query = r"
            SELECT id, user_id, token, expires_at, revoked
            FROM refresh_tokens
            WHERE token = $1 AND user_id = $2 AND revoked = FALSE
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(token)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup refresh token")?;

        Ok(row.map(|row| token_from_row(&row)))
    }

    async fn revoke_refresh_token(&self, token_id: i64) -> Result<()> {
        let query = "UPDATE refresh_tokens SET revoked = TRUE WHERE id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(token_id)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to revoke refresh token")?;

        Ok(())
    }

    async fn rotate_refresh_token(
        &self,
        old_token_id: i64,
        user_id: i64,
        new_token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<RefreshTokenRecord> {
        // Revoke and insert in one unit: no window where both the old and
        // the new token are valid.
        let mut tx = self
            .pool
            .begin()
            .await
            .context("begin rotation transaction")?;

        let query = "UPDATE refresh_tokens SET revoked = TRUE WHERE id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(old_token_id)
            .execute(&mut *tx)
            .instrument(span)
            .await
            .context("failed to revoke rotated token")?;

        let query = r"
            INSERT INTO refresh_tokens (user_id, token, expires_at)
            VALUES ($1, $2, $3)
            RETURNING id, user_id, token, expires_at, revoked
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(user_id)
            .bind(new_token)
            .bind(expires_at)
            .fetch_one(&mut *tx)
            .instrument(span)
            .await
            .context("failed to insert rotated token")?;

        tx.commit().await.context("commit rotation transaction")?;

        Ok(token_from_row(&row))
    }

    async fn reset_password(&self, user_id: i64, password_hash: &str, otp_id: i64) -> Result<()> {
        let mut tx = self.pool.begin().await.context("begin reset transaction")?;

        update_password(&mut tx, user_id, password_hash).await?;

        let query = "UPDATE otps SET is_verified = TRUE WHERE id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(otp_id)
            .execute(&mut *tx)
            .instrument(span)
            .await
            .context("failed to mark reset otp verified")?;

        revoke_all_tokens(&mut tx, user_id).await?;

        tx.commit().await.context("commit reset transaction")?;

        Ok(())
    }

    async fn change_password(&self, user_id: i64, password_hash: &str) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("begin password change transaction")?;

        update_password(&mut tx, user_id, password_hash).await?;
        revoke_all_tokens(&mut tx, user_id).await?;

        tx.commit()
            .await
            .context("commit password change transaction")?;

        Ok(())
    }
}

async fn update_password(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    user_id: i64,
    password_hash: &str,
) -> Result<()> {
    let query = "UPDATE users SET password_hash = $2, updated_at = NOW() WHERE id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .bind(password_hash)
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to update password hash")?;

    Ok(())
}

/// Forces re-login everywhere the user holds a session.
async fn revoke_all_tokens(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    user_id: i64,
) -> Result<()> {
    let query = "UPDATE refresh_tokens SET revoked = TRUE WHERE user_id = $1 AND revoked = FALSE";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to bulk-revoke refresh tokens")?;

    Ok(())
}

fn user_from_row(row: &PgRow) -> UserRecord {
    UserRecord {
        id: row.get("id"),
        username: row.get("username"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        is_active: row.get("is_active"),
        email_verified: row.get("email_verified"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn otp_from_row(row: &PgRow) -> Result<OtpRecord> {
    let purpose: String = row.get("purpose");
    Ok(OtpRecord {
        id: row.get("id"),
        identifier: row.get("identifier"),
        code: row.get("code"),
        purpose: OtpPurpose::from_str(&purpose)
            .map_err(|e| anyhow::anyhow!("unexpected purpose in otp row: {e}"))?,
        attempts: row.get("attempts"),
        is_verified: row.get("is_verified"),
        created_at: row.get("created_at"),
        expires_at: row.get("expires_at"),
    })
}

fn token_from_row(row: &PgRow) -> RefreshTokenRecord {
    RefreshTokenRecord {
        id: row.get("id"),
        user_id: row.get("user_id"),
        token: row.get("token"),
        expires_at: row.get("expires_at"),
        revoked: row.get("revoked"),
    }
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::is_unique_violation;
    use sqlx::error::{DatabaseError, ErrorKind};
    use std::borrow::Cow;
    use std::error::Error as StdError;
    use std::fmt;

    #[derive(Debug)]
    struct TestDbError {
        code: Option<&'static str>,
    }

    impl fmt::Display for TestDbError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "test database error")
        }
    }

    impl StdError for TestDbError {}

    impl DatabaseError for TestDbError {
        fn message(&self) -> &'static str {
            "test database error"
        }

        fn code(&self) -> Option<Cow<'_, str>> {
            self.code.map(Cow::Borrowed)
        }

        fn as_error(&self) -> &(dyn StdError + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn StdError + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn StdError + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> ErrorKind {
            ErrorKind::UniqueViolation
        }
    }

    #[test]
    fn is_unique_violation_matches_sqlstate() {
        let err = sqlx::Error::Database(Box::new(TestDbError {
            code: Some("23505"),
        }));
        assert!(is_unique_violation(&err));

        let err = sqlx::Error::Database(Box::new(TestDbError {
            code: Some("99999"),
        }));
        assert!(!is_unique_violation(&err));

        let err = sqlx::Error::RowNotFound;
        assert!(!is_unique_violation(&err));
    }
}
