//! Directory repository implementation.

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};

use stowage_core::error::{AppError, ErrorKind};
use stowage_core::result::AppResult;
use stowage_core::types::{DirectoryId, UserId};
use stowage_entity::directory::{CreateDirectory, DirectoryNode};

/// Repository for directory rows and subtree queries.
#[derive(Debug, Clone)]
pub struct DirectoryRepository {
    pool: PgPool,
}

impl DirectoryRepository {
    /// Create a new directory repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Find a directory by ID.
    pub async fn find_by_id(&self, id: DirectoryId) -> AppResult<Option<DirectoryNode>> {
        sqlx::query_as::<_, DirectoryNode>("SELECT * FROM directories WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to find directory", e))
    }

    /// Directories trashed before a cutoff, shallowest first.
    pub async fn find_trashed_before(
        &self,
        cutoff: DateTime<Utc>,
        limit: u32,
    ) -> AppResult<Vec<DirectoryNode>> {
        sqlx::query_as::<_, DirectoryNode>(
            "SELECT * FROM directories WHERE trashed_at IS NOT NULL AND trashed_at < $1 \
             ORDER BY cardinality(ancestor_path) ASC, trashed_at ASC LIMIT $2",
        )
        .bind(cutoff)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to list trashed directories", e)
        })
    }

    /// Find a directory owned by `owner_id` inside a transaction.
    pub async fn find_owned(
        conn: &mut PgConnection,
        owner_id: UserId,
        id: DirectoryId,
    ) -> AppResult<Option<DirectoryNode>> {
        sqlx::query_as::<_, DirectoryNode>(
            "SELECT * FROM directories WHERE id = $1 AND owner_id = $2",
        )
        .bind(id)
        .bind(owner_id)
        .fetch_optional(conn)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to find directory", e))
    }

    /// Insert a new directory.
    pub async fn create(
        conn: &mut PgConnection,
        data: &CreateDirectory,
    ) -> AppResult<DirectoryNode> {
        sqlx::query_as::<_, DirectoryNode>(
            "INSERT INTO directories (id, owner_id, parent_id, name, ancestor_path) \
             VALUES ($1, $2, $3, $4, $5) RETURNING *",
        )
        .bind(data.id)
        .bind(data.owner_id)
        .bind(data.parent_id)
        .bind(&data.name)
        .bind(&data.ancestor_path)
        .fetch_one(conn)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to create directory", e))
    }

    /// Atomically add `delta` to every listed aggregate that stays non-negative.
    pub async fn add_sizes(
        conn: &mut PgConnection,
        owner_id: UserId,
        ids: &[DirectoryId],
        delta: i64,
    ) -> AppResult<u64> {
        let result = sqlx::query(
            "UPDATE directories \
             SET aggregate_size_bytes = aggregate_size_bytes + $3, updated_at = NOW() \
             WHERE id = ANY($1) AND owner_id = $2 AND aggregate_size_bytes + $3 >= 0",
        )
        .bind(ids)
        .bind(owner_id)
        .bind(delta)
        .execute(conn)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to update directory sizes", e)
        })?;
        Ok(result.rows_affected())
    }

    /// Count the listed directories owned by `owner_id`.
    pub async fn count_owned(
        conn: &mut PgConnection,
        owner_id: UserId,
        ids: &[DirectoryId],
    ) -> AppResult<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM directories WHERE id = ANY($1) AND owner_id = $2",
        )
        .bind(ids)
        .bind(owner_id)
        .fetch_one(conn)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to count directories", e))?;
        Ok(count as u64)
    }

    /// Overwrite a directory aggregate.
    pub async fn set_size(
        conn: &mut PgConnection,
        owner_id: UserId,
        id: DirectoryId,
        size_bytes: i64,
    ) -> AppResult<()> {
        sqlx::query(
            "UPDATE directories SET aggregate_size_bytes = $3, updated_at = NOW() \
             WHERE id = $1 AND owner_id = $2",
        )
        .bind(id)
        .bind(owner_id)
        .bind(size_bytes)
        .execute(conn)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to set directory size", e))?;
        Ok(())
    }

    /// Rewrite the parent and ancestor path of a directory.
    pub async fn set_placement(
        conn: &mut PgConnection,
        owner_id: UserId,
        id: DirectoryId,
        parent_id: Option<DirectoryId>,
        ancestor_path: &[DirectoryId],
    ) -> AppResult<()> {
        sqlx::query(
            "UPDATE directories SET parent_id = $3, ancestor_path = $4, updated_at = NOW() \
             WHERE id = $1 AND owner_id = $2",
        )
        .bind(id)
        .bind(owner_id)
        .bind(parent_id)
        .bind(ancestor_path)
        .execute(conn)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to move directory", e))?;
        Ok(())
    }

    /// Set or clear `trashed_at` on the listed directories.
    pub async fn set_trashed(
        conn: &mut PgConnection,
        owner_id: UserId,
        ids: &[DirectoryId],
        trashed_at: Option<DateTime<Utc>>,
    ) -> AppResult<u64> {
        let result = sqlx::query(
            "UPDATE directories SET trashed_at = $3, updated_at = NOW() \
             WHERE id = ANY($1) AND owner_id = $2",
        )
        .bind(ids)
        .bind(owner_id)
        .bind(trashed_at)
        .execute(conn)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to trash directories", e))?;
        Ok(result.rows_affected())
    }

    /// The directory plus every directory whose ancestor path contains it.
    pub async fn find_subtree(
        conn: &mut PgConnection,
        owner_id: UserId,
        root: DirectoryId,
    ) -> AppResult<Vec<DirectoryNode>> {
        sqlx::query_as::<_, DirectoryNode>(
            "SELECT * FROM directories \
             WHERE owner_id = $2 AND (id = $1 OR $1 = ANY(ancestor_path)) \
             ORDER BY cardinality(ancestor_path) ASC",
        )
        .bind(root)
        .bind(owner_id)
        .fetch_all(conn)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to list subtree", e))
    }

    /// Every directory owned by `owner_id`.
    pub async fn find_all_owned(
        conn: &mut PgConnection,
        owner_id: UserId,
    ) -> AppResult<Vec<DirectoryNode>> {
        sqlx::query_as::<_, DirectoryNode>(
            "SELECT * FROM directories WHERE owner_id = $1 ORDER BY cardinality(ancestor_path) ASC",
        )
        .bind(owner_id)
        .fetch_all(conn)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to list directories", e))
    }

    /// Delete the listed directories in one statement.
    ///
    /// Parent references inside the set are checked at statement end.
    pub async fn delete_many(
        conn: &mut PgConnection,
        owner_id: UserId,
        ids: &[DirectoryId],
    ) -> AppResult<u64> {
        let result = sqlx::query(
            "DELETE FROM directories WHERE id = ANY($1) AND owner_id = $2",
        )
        .bind(ids)
        .bind(owner_id)
        .execute(conn)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to delete directories", e))?;
        Ok(result.rows_affected())
    }
}
