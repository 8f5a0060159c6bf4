//! Quota account repository implementation.

use sqlx::{PgConnection, PgPool};

use stowage_core::error::{AppError, ErrorKind};
use stowage_core::result::AppResult;
use stowage_core::types::{DirectoryId, UserId};
use stowage_entity::quota::QuotaAccount;

use crate::connection::lock_error;

/// Repository for quota accounts.
#[derive(Debug, Clone)]
pub struct QuotaAccountRepository {
    pool: PgPool,
}

impl QuotaAccountRepository {
    /// Create a new quota account repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Find an account by user.
    pub async fn find_by_user(&self, user_id: UserId) -> AppResult<Option<QuotaAccount>> {
        sqlx::query_as::<_, QuotaAccount>("SELECT * FROM quota_accounts WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::Database, "Failed to find quota account", e)
            })
    }

    /// List every provisioned user id.
    pub async fn list_user_ids(&self) -> AppResult<Vec<UserId>> {
        sqlx::query_scalar::<_, UserId>("SELECT user_id FROM quota_accounts ORDER BY created_at")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to list accounts", e))
    }

    /// Lock an account row for the rest of the transaction.
    pub async fn lock(conn: &mut PgConnection, user_id: UserId) -> AppResult<Option<QuotaAccount>> {
        sqlx::query_as::<_, QuotaAccount>(
            "SELECT * FROM quota_accounts WHERE user_id = $1 FOR UPDATE",
        )
        .bind(user_id)
        .fetch_optional(conn)
        .await
        .map_err(|e| lock_error(e, "Failed to lock quota account"))
    }

    /// Insert an account unless one exists. Returns `None` on conflict.
    pub async fn create_if_absent(
        conn: &mut PgConnection,
        user_id: UserId,
        root_directory_id: DirectoryId,
        max_storage_bytes: i64,
    ) -> AppResult<Option<QuotaAccount>> {
        sqlx::query_as::<_, QuotaAccount>(
            "INSERT INTO quota_accounts (user_id, root_directory_id, max_storage_bytes) \
             VALUES ($1, $2, $3) ON CONFLICT (user_id) DO NOTHING RETURNING *",
        )
        .bind(user_id)
        .bind(root_directory_id)
        .bind(max_storage_bytes)
        .fetch_optional(conn)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to create quota account", e))
    }

    /// Add to `used_storage_bytes` unless the result would be negative.
    pub async fn add_used(
        conn: &mut PgConnection,
        user_id: UserId,
        delta: i64,
    ) -> AppResult<Option<QuotaAccount>> {
        sqlx::query_as::<_, QuotaAccount>(
            "UPDATE quota_accounts \
             SET used_storage_bytes = used_storage_bytes + $2, updated_at = NOW() \
             WHERE user_id = $1 AND used_storage_bytes + $2 >= 0 RETURNING *",
        )
        .bind(user_id)
        .bind(delta)
        .fetch_optional(conn)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to update used bytes", e))
    }

    /// Add to `max_storage_bytes` unless the result would be negative.
    pub async fn add_max(
        conn: &mut PgConnection,
        user_id: UserId,
        delta: i64,
    ) -> AppResult<Option<QuotaAccount>> {
        sqlx::query_as::<_, QuotaAccount>(
            "UPDATE quota_accounts \
             SET max_storage_bytes = max_storage_bytes + $2, updated_at = NOW() \
             WHERE user_id = $1 AND max_storage_bytes + $2 >= 0 RETURNING *",
        )
        .bind(user_id)
        .bind(delta)
        .fetch_optional(conn)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to update entitlement", e))
    }

    /// Overwrite `used_storage_bytes`.
    pub async fn set_used(conn: &mut PgConnection, user_id: UserId, used: i64) -> AppResult<()> {
        sqlx::query(
            "UPDATE quota_accounts SET used_storage_bytes = $2, updated_at = NOW() \
             WHERE user_id = $1",
        )
        .bind(user_id)
        .bind(used)
        .execute(conn)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to set used bytes", e))?;
        Ok(())
    }
}
