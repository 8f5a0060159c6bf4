//! Document repository implementation.

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};

use stowage_core::error::{AppError, ErrorKind};
use stowage_core::result::AppResult;
use stowage_core::types::{DirectoryId, DocumentId, UserId};
use stowage_entity::document::{CreateDocument, DocumentRecord, UploadState};

/// Repository for document rows.
#[derive(Debug, Clone)]
pub struct DocumentRepository {
    pool: PgPool,
}

impl DocumentRepository {
    /// Create a new document repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Find a document by ID.
    pub async fn find_by_id(&self, id: DocumentId) -> AppResult<Option<DocumentRecord>> {
        sqlx::query_as::<_, DocumentRecord>("SELECT * FROM documents WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to find document", e))
    }

    /// Reserved documents created before a cutoff, oldest first.
    pub async fn find_reserved_before(
        &self,
        cutoff: DateTime<Utc>,
        limit: u32,
    ) -> AppResult<Vec<DocumentRecord>> {
        sqlx::query_as::<_, DocumentRecord>(
            "SELECT * FROM documents WHERE upload_state = 'reserved' AND created_at < $1 \
             ORDER BY created_at ASC LIMIT $2",
        )
        .bind(cutoff)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to list stale reservations", e)
        })
    }

    /// Documents trashed before a cutoff.
    pub async fn find_trashed_before(
        &self,
        cutoff: DateTime<Utc>,
        limit: u32,
    ) -> AppResult<Vec<DocumentRecord>> {
        sqlx::query_as::<_, DocumentRecord>(
            "SELECT * FROM documents WHERE trashed_at IS NOT NULL AND trashed_at < $1 \
             ORDER BY trashed_at ASC LIMIT $2",
        )
        .bind(cutoff)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to list trashed documents", e)
        })
    }

    /// Find a document owned by `owner_id` inside a transaction.
    pub async fn find_owned(
        conn: &mut PgConnection,
        owner_id: UserId,
        id: DocumentId,
    ) -> AppResult<Option<DocumentRecord>> {
        sqlx::query_as::<_, DocumentRecord>(
            "SELECT * FROM documents WHERE id = $1 AND owner_id = $2",
        )
        .bind(id)
        .bind(owner_id)
        .fetch_optional(conn)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to find document", e))
    }

    /// Insert a reserved document.
    pub async fn create(
        conn: &mut PgConnection,
        data: &CreateDocument,
    ) -> AppResult<DocumentRecord> {
        sqlx::query_as::<_, DocumentRecord>(
            "INSERT INTO documents \
             (id, parent_id, owner_id, name, extension, content_type, size_bytes, upload_state) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, 'reserved') RETURNING *",
        )
        .bind(data.id)
        .bind(data.parent_id)
        .bind(data.owner_id)
        .bind(&data.name)
        .bind(data.extension())
        .bind(&data.content_type)
        .bind(data.declared_size_bytes)
        .fetch_one(conn)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to create document", e))
    }

    /// Check-and-set the upload state of a document.
    pub async fn transition(
        conn: &mut PgConnection,
        owner_id: UserId,
        id: DocumentId,
        from: UploadState,
        to: UploadState,
        size_bytes: i64,
    ) -> AppResult<Option<DocumentRecord>> {
        sqlx::query_as::<_, DocumentRecord>(
            "UPDATE documents SET upload_state = $4, size_bytes = $5, updated_at = NOW(), \
             committed_at = CASE WHEN $4 = 'committed'::upload_state THEN NOW() ELSE committed_at END \
             WHERE id = $1 AND owner_id = $2 AND upload_state = $3 RETURNING *",
        )
        .bind(id)
        .bind(owner_id)
        .bind(from)
        .bind(to)
        .bind(size_bytes)
        .fetch_optional(conn)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to transition document", e)
        })
    }

    /// Delete a document only while it is still reserved.
    pub async fn delete_reserved(
        conn: &mut PgConnection,
        owner_id: UserId,
        id: DocumentId,
    ) -> AppResult<Option<DocumentRecord>> {
        sqlx::query_as::<_, DocumentRecord>(
            "DELETE FROM documents WHERE id = $1 AND owner_id = $2 AND upload_state = 'reserved' \
             RETURNING *",
        )
        .bind(id)
        .bind(owner_id)
        .fetch_optional(conn)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to delete reservation", e))
    }

    /// Documents directly inside any of the listed directories.
    pub async fn find_in_directories(
        conn: &mut PgConnection,
        owner_id: UserId,
        directory_ids: &[DirectoryId],
    ) -> AppResult<Vec<DocumentRecord>> {
        sqlx::query_as::<_, DocumentRecord>(
            "SELECT * FROM documents WHERE parent_id = ANY($1) AND owner_id = $2",
        )
        .bind(directory_ids)
        .bind(owner_id)
        .fetch_all(conn)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to list documents", e))
    }

    /// Every document owned by `owner_id`.
    pub async fn find_all_owned(
        conn: &mut PgConnection,
        owner_id: UserId,
    ) -> AppResult<Vec<DocumentRecord>> {
        sqlx::query_as::<_, DocumentRecord>("SELECT * FROM documents WHERE owner_id = $1")
            .bind(owner_id)
            .fetch_all(conn)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to list documents", e))
    }

    /// Set or clear `trashed_at` on the listed documents.
    pub async fn set_trashed(
        conn: &mut PgConnection,
        owner_id: UserId,
        ids: &[DocumentId],
        trashed_at: Option<DateTime<Utc>>,
    ) -> AppResult<u64> {
        let result = sqlx::query(
            "UPDATE documents SET trashed_at = $3, updated_at = NOW() \
             WHERE id = ANY($1) AND owner_id = $2",
        )
        .bind(ids)
        .bind(owner_id)
        .bind(trashed_at)
        .execute(conn)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to trash documents", e))?;
        Ok(result.rows_affected())
    }

    /// Delete the listed documents.
    pub async fn delete_many(
        conn: &mut PgConnection,
        owner_id: UserId,
        ids: &[DocumentId],
    ) -> AppResult<u64> {
        let result = sqlx::query("DELETE FROM documents WHERE id = ANY($1) AND owner_id = $2")
            .bind(ids)
            .bind(owner_id)
            .execute(conn)
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::Database, "Failed to delete documents", e)
            })?;
        Ok(result.rows_affected())
    }
}
