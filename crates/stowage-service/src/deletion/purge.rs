//! Hard-deletes items that stayed in the trash past the retention period.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use stowage_core::error::{AppError, ErrorKind};
use stowage_core::result::AppResult;
use stowage_core::types::{DirectoryId, UserId};
use stowage_database::MetadataStore;

use super::engine::{DeletionEngine, DeletionReport};
use crate::context::RequestContext;

/// Maximum items examined per kind in one purge run.
const PURGE_BATCH: u32 = 500;

/// Outcome of one purge run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PurgeReport {
    /// Trashed directories deleted with their subtrees.
    pub directories_purged: usize,
    /// Individually trashed documents deleted.
    pub documents_purged: usize,
    /// Everything the underlying deletions removed.
    pub deleted: DeletionReport,
    /// Items that could not be purged this run.
    pub failures: usize,
}

/// Purges expired trash through the deletion engine.
#[derive(Debug, Clone)]
pub struct TrashPurger {
    store: Arc<dyn MetadataStore>,
    deletion: Arc<DeletionEngine>,
    retention_days: i64,
}

impl TrashPurger {
    /// Create a new purger.
    pub fn new(
        store: Arc<dyn MetadataStore>,
        deletion: Arc<DeletionEngine>,
        retention_days: i64,
    ) -> Self {
        Self {
            store,
            deletion,
            retention_days,
        }
    }

    /// Purge everything trashed before `now - retention`.
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> AppResult<PurgeReport> {
        let cutoff = now - chrono::Duration::days(self.retention_days);
        let mut report = PurgeReport::default();
        let mut purged: HashSet<DirectoryId> = HashSet::new();

        let directories = self
            .store
            .find_expired_trashed_directories(cutoff, PURGE_BATCH)
            .await?;
        for dir in directories {
            // Shallowest first: a descendant of a purged directory is already gone.
            if dir.ancestor_path.iter().any(|id| purged.contains(id)) {
                continue;
            }
            let ctx = match self.context_for(dir.owner_id).await {
                Ok(ctx) => ctx,
                Err(e) => {
                    report.failures += 1;
                    warn!(directory_id = %dir.id, error = %e, "Cannot purge directory");
                    continue;
                }
            };
            match self.deletion.delete_subtree(&ctx, dir.id).await {
                Ok(deleted) => {
                    purged.insert(dir.id);
                    report.directories_purged += 1;
                    report.deleted.merge(deleted);
                }
                Err(e) if e.kind == ErrorKind::NotFound => {}
                Err(e) => {
                    report.failures += 1;
                    warn!(directory_id = %dir.id, error = %e, "Failed to purge directory");
                }
            }
        }

        let documents = self
            .store
            .find_expired_trashed_documents(cutoff, PURGE_BATCH)
            .await?;
        for doc in documents {
            let ctx = match self.context_for(doc.owner_id).await {
                Ok(ctx) => ctx,
                Err(e) => {
                    report.failures += 1;
                    warn!(document_id = %doc.id, error = %e, "Cannot purge document");
                    continue;
                }
            };
            match self.deletion.delete_document(&ctx, doc.id).await {
                Ok(deleted) => {
                    report.documents_purged += 1;
                    report.deleted.merge(deleted);
                }
                Err(e) if e.kind == ErrorKind::NotFound => {}
                Err(e) => {
                    report.failures += 1;
                    warn!(document_id = %doc.id, error = %e, "Failed to purge document");
                }
            }
        }

        info!(
            directories = report.directories_purged,
            documents = report.documents_purged,
            released_bytes = report.deleted.released_bytes,
            failures = report.failures,
            "Trash purge finished"
        );
        Ok(report)
    }

    async fn context_for(&self, user_id: UserId) -> AppResult<RequestContext> {
        self.store
            .find_account(user_id)
            .await?
            .map(|account| RequestContext::for_account(&account))
            .ok_or_else(|| AppError::not_found(format!("No quota account for user {user_id}")))
    }
}
