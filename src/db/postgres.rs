use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::{LockoutState, UserRepository};
use crate::error::{AuthError, Result};
use crate::models::UserAccount;

/// Postgres-backed repository. The counter transitions are expressed as
/// single UPDATE statements so the database serializes concurrent attempts
/// for the same account.
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn create(&self, account: UserAccount) -> Result<UserAccount> {
        sqlx::query(
            r#"
            INSERT INTO user_accounts
                (id, email, role, password_hash, is_active, mfa_enabled, mfa_seed,
                 backup_code_hashes, failed_login_count, locked_until,
                 previous_password_hashes, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(account.id)
        .bind(&account.email)
        .bind(&account.role)
        .bind(&account.password_hash)
        .bind(account.is_active)
        .bind(account.mfa_enabled)
        .bind(&account.mfa_seed)
        .bind(&account.backup_code_hashes)
        .bind(account.failed_login_count)
        .bind(account.locked_until)
        .bind(&account.previous_password_hashes)
        .bind(account.created_at)
        .bind(account.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                AuthError::EmailAlreadyExists
            }
            _ => AuthError::Repository(e.to_string()),
        })?;

        Ok(account)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserAccount>> {
        let account = sqlx::query_as::<_, UserAccount>(
            r#"SELECT * FROM user_accounts WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(account)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<UserAccount>> {
        let account = sqlx::query_as::<_, UserAccount>(
            r#"SELECT * FROM user_accounts WHERE email = $1"#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(account)
    }

    async fn update_password(
        &self,
        id: Uuid,
        new_hash: &str,
        history_limit: usize,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE user_accounts SET
                previous_password_hashes =
                    (ARRAY[password_hash] || previous_password_hashes)[1:$3],
                password_hash = $2,
                updated_at = $4
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(new_hash)
        .bind(history_limit as i32)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AuthError::UserNotFound);
        }
        Ok(())
    }

    async fn record_login_failure(
        &self,
        id: Uuid,
        threshold: i32,
        lock_duration: Duration,
        now: DateTime<Utc>,
    ) -> Result<LockoutState> {
        // One statement: restart the counter when a previous lock has
        // expired, otherwise increment; lock once the threshold is hit.
        let lock_until = now + lock_duration;
        let row = sqlx::query_as::<_, LockoutRow>(
            r#"
            UPDATE user_accounts SET
                failed_login_count = CASE
                    WHEN locked_until IS NOT NULL AND locked_until <= $4 THEN 1
                    ELSE failed_login_count + 1
                END,
                locked_until = CASE
                    WHEN (CASE
                        WHEN locked_until IS NOT NULL AND locked_until <= $4 THEN 1
                        ELSE failed_login_count + 1
                    END) >= $2 THEN $3
                    ELSE NULL
                END,
                updated_at = $4
            WHERE id = $1
            RETURNING failed_login_count, locked_until
            "#,
        )
        .bind(id)
        .bind(threshold)
        .bind(lock_until)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(AuthError::UserNotFound)?;

        Ok(LockoutState {
            failed_login_count: row.failed_login_count,
            locked_until: row.locked_until,
        })
    }

    async fn reset_login_failures(&self, id: Uuid, now: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE user_accounts
            SET failed_login_count = 0, locked_until = NULL, updated_at = $2
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn store_mfa_enrollment(
        &self,
        id: Uuid,
        encrypted_seed: &str,
        backup_code_hashes: &[String],
        now: DateTime<Utc>,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE user_accounts
            SET mfa_enabled = TRUE, mfa_seed = $2, backup_code_hashes = $3, updated_at = $4
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(encrypted_seed)
        .bind(backup_code_hashes)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AuthError::UserNotFound);
        }
        Ok(())
    }

    async fn consume_backup_code(&self, id: Uuid, code_hash: &str) -> Result<bool> {
        // Compare-and-delete in one statement: the WHERE clause only
        // matches while the hash is still present, so exactly one of any
        // set of concurrent spenders sees a row change.
        let result = sqlx::query(
            r#"
            UPDATE user_accounts
            SET backup_code_hashes = array_remove(backup_code_hashes, $2), updated_at = $3
            WHERE id = $1 AND $2 = ANY(backup_code_hashes)
            "#,
        )
        .bind(id)
        .bind(code_hash)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn deactivate(&self, id: Uuid, now: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            r#"UPDATE user_accounts SET is_active = FALSE, updated_at = $2 WHERE id = $1"#,
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct LockoutRow {
    failed_login_count: i32,
    locked_until: Option<DateTime<Utc>>,
}
