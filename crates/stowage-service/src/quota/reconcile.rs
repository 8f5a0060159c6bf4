//! Reconciliation: recompute every aggregate from committed documents.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use stowage_core::error::AppError;
use stowage_core::result::AppResult;
use stowage_core::types::{DirectoryId, UserId};
use stowage_database::MetadataStore;

/// One rewritten directory aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryCorrection {
    /// The corrected directory.
    pub directory_id: DirectoryId,
    /// Stored aggregate before the correction.
    pub recorded_bytes: i64,
    /// Aggregate computed from committed documents.
    pub computed_bytes: i64,
}

/// Outcome of reconciling one user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationReport {
    /// The reconciled user.
    pub user_id: UserId,
    /// Number of directories examined.
    pub directories_checked: usize,
    /// Directories whose aggregate was rewritten.
    pub corrections: Vec<DirectoryCorrection>,
    /// `used_storage_bytes` before reconciliation.
    pub used_before: i64,
    /// `used_storage_bytes` after reconciliation.
    pub used_after: i64,
}

impl ReconciliationReport {
    /// Whether nothing had drifted.
    pub fn is_clean(&self) -> bool {
        self.corrections.is_empty() && self.used_before == self.used_after
    }
}

/// Recomputes counters bottom-up and rewrites the ones that drifted.
#[derive(Debug, Clone)]
pub struct Reconciler {
    store: Arc<dyn MetadataStore>,
}

impl Reconciler {
    /// Create a new reconciler.
    pub fn new(store: Arc<dyn MetadataStore>) -> Self {
        Self { store }
    }

    /// Reconcile one user inside a single unit of work.
    pub async fn recompute(&self, user_id: UserId) -> AppResult<ReconciliationReport> {
        let mut uow = self.store.begin(user_id).await?;
        let account = uow.account().await?;
        let mut directories = uow.all_directories().await?;
        let documents = uow.all_documents().await?;

        let mut totals: HashMap<DirectoryId, i64> = HashMap::new();
        for doc in &documents {
            *totals.entry(doc.parent_id).or_default() += doc.counted_bytes();
        }

        // Deepest first, so every child is final before its parent reads it.
        directories.sort_by_key(|d| std::cmp::Reverse(d.depth()));
        let mut computed: HashMap<DirectoryId, i64> = HashMap::with_capacity(directories.len());
        for dir in &directories {
            let total = totals.get(&dir.id).copied().unwrap_or(0);
            computed.insert(dir.id, total);
            if let Some(parent) = dir.parent_id {
                *totals.entry(parent).or_default() += total;
            }
        }

        let mut corrections = Vec::new();
        for dir in &directories {
            let total = computed.get(&dir.id).copied().unwrap_or(0);
            if total != dir.aggregate_size_bytes {
                uow.set_directory_size(dir.id, total).await?;
                corrections.push(DirectoryCorrection {
                    directory_id: dir.id,
                    recorded_bytes: dir.aggregate_size_bytes,
                    computed_bytes: total,
                });
            }
        }

        let used_after = computed
            .get(&account.root_directory_id)
            .copied()
            .ok_or_else(|| {
                AppError::not_found(format!(
                    "Root directory {} of user {user_id} is missing",
                    account.root_directory_id
                ))
            })?;
        if used_after != account.used_storage_bytes {
            uow.set_used_bytes(used_after).await?;
        }

        uow.commit().await?;

        let report = ReconciliationReport {
            user_id,
            directories_checked: directories.len(),
            corrections,
            used_before: account.used_storage_bytes,
            used_after,
        };
        if report.is_clean() {
            info!(user_id = %user_id, directories = report.directories_checked, "Quota reconciled, no drift");
        } else {
            warn!(
                user_id = %user_id,
                corrected = report.corrections.len(),
                used_before = report.used_before,
                used_after = report.used_after,
                "Quota drift corrected"
            );
        }
        Ok(report)
    }

    /// Reconcile every provisioned user, continuing past individual failures.
    pub async fn recompute_all(&self) -> AppResult<Vec<ReconciliationReport>> {
        let users = self.store.list_user_ids().await?;
        let mut reports = Vec::with_capacity(users.len());
        for user_id in users {
            match self.recompute(user_id).await {
                Ok(report) => reports.push(report),
                Err(e) => warn!(user_id = %user_id, error = %e, "Reconciliation failed"),
            }
        }
        Ok(reports)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stowage_database::MemoryStore;
    use stowage_entity::directory::CreateDirectory;
    use stowage_entity::document::{CreateDocument, UploadState};

    #[tokio::test]
    async fn test_recompute_repairs_drift() {
        let store = Arc::new(MemoryStore::new());
        let user = UserId::new();
        let root = store.provision_account(user, "root", 10_000).await.unwrap().root;

        let mut uow = store.begin(user).await.unwrap();
        let child = uow
            .insert_directory(&CreateDirectory {
                id: DirectoryId::new(),
                owner_id: user,
                parent_id: Some(root.id),
                name: "a".into(),
                ancestor_path: root.child_ancestor_path(),
            })
            .await
            .unwrap();
        let doc = uow
            .insert_document(&CreateDocument {
                id: Default::default(),
                parent_id: child.id,
                owner_id: user,
                name: "a.txt".into(),
                content_type: "text/plain".into(),
                declared_size_bytes: 40,
            })
            .await
            .unwrap();
        uow.transition_document(doc.id, UploadState::Reserved, UploadState::Committed, 40)
            .await
            .unwrap();
        // Counters deliberately left at zero.
        uow.commit().await.unwrap();

        let reconciler = Reconciler::new(store.clone());
        let report = reconciler.recompute(user).await.unwrap();
        assert_eq!(report.corrections.len(), 2);
        assert_eq!(report.used_after, 40);

        let state = store.snapshot().await;
        assert_eq!(state.directories[&root.id].aggregate_size_bytes, 40);
        assert_eq!(state.directories[&child.id].aggregate_size_bytes, 40);
        assert_eq!(state.accounts[&user].used_storage_bytes, 40);

        assert!(reconciler.recompute(user).await.unwrap().is_clean());
    }
}
