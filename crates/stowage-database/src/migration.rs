//! Schema migrations for the metadata store.

use sqlx::PgPool;
use sqlx::migrate::Migrator;
use tracing::info;

use stowage_core::error::{AppError, ErrorKind};

/// Migrations embedded from the workspace `migrations/` directory.
pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

/// An embedded migration not yet recorded as applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMigration {
    /// Migration version (timestamp prefix of the file name).
    pub version: i64,
    /// Human-readable description from the file name.
    pub description: String,
}

/// Migrations the database has not applied yet, oldest first.
pub async fn pending_migrations(pool: &PgPool) -> Result<Vec<PendingMigration>, AppError> {
    let applied = applied_versions(pool).await?;
    Ok(unapplied(&applied))
}

/// Apply pending migrations and return the ones that ran.
pub async fn run_migrations(pool: &PgPool) -> Result<Vec<PendingMigration>, AppError> {
    let pending = pending_migrations(pool).await?;
    if pending.is_empty() {
        info!("Metadata schema is up to date");
        return Ok(pending);
    }

    info!(count = pending.len(), "Applying metadata schema migrations");
    MIGRATOR.run(pool).await.map_err(|e| {
        AppError::with_source(
            ErrorKind::Database,
            format!("Failed to run migrations: {e}"),
            e,
        )
    })?;

    for migration in &pending {
        info!(
            version = migration.version,
            description = %migration.description,
            "Migration applied"
        );
    }
    Ok(pending)
}

async fn applied_versions(pool: &PgPool) -> Result<Vec<i64>, AppError> {
    // The bookkeeping table only exists after the first run.
    let exists: bool =
        sqlx::query_scalar("SELECT to_regclass('_sqlx_migrations') IS NOT NULL")
            .fetch_one(pool)
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::Database, "Failed to inspect migrations", e)
            })?;
    if !exists {
        return Ok(Vec::new());
    }

    sqlx::query_scalar("SELECT version FROM _sqlx_migrations WHERE success ORDER BY version")
        .fetch_all(pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to list migrations", e))
}

fn unapplied(applied: &[i64]) -> Vec<PendingMigration> {
    MIGRATOR
        .iter()
        .filter(|m| !m.migration_type.is_down_migration())
        .filter(|m| !applied.contains(&m.version))
        .map(|m| PendingMigration {
            version: m.version,
            description: m.description.to_string(),
        })
        .collect()
}
