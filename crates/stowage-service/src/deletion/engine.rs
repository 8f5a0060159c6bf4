//! Recursive deletion engine.
//!
//! Metadata is removed and sizes released in one unit of work; object
//! deletion happens afterwards and never aborts the metadata removal.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use stowage_core::error::AppError;
use stowage_core::result::AppResult;
use stowage_core::types::{DirectoryId, DocumentId, UserId};
use stowage_database::MetadataStore;
use stowage_storage::ObjectStoreGateway;

use crate::context::RequestContext;
use crate::quota::SizePropagationEngine;

/// What a deletion removed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletionReport {
    /// Directory records removed.
    pub directories_removed: u64,
    /// Document records removed.
    pub documents_removed: u64,
    /// Committed bytes released from every ancestor and the account.
    pub released_bytes: i64,
    /// Object keys the store failed to delete.
    pub orphaned_keys: Vec<String>,
}

impl DeletionReport {
    /// Fold another report into this one.
    pub fn merge(&mut self, other: DeletionReport) {
        self.directories_removed += other.directories_removed;
        self.documents_removed += other.documents_removed;
        self.released_bytes += other.released_bytes;
        self.orphaned_keys.extend(other.orphaned_keys);
    }
}

/// Deletes subtrees and documents.
#[derive(Debug, Clone)]
pub struct DeletionEngine {
    store: Arc<dyn MetadataStore>,
    gateway: Arc<ObjectStoreGateway>,
}

impl DeletionEngine {
    /// Create a new deletion engine.
    pub fn new(store: Arc<dyn MetadataStore>, gateway: Arc<ObjectStoreGateway>) -> Self {
        Self { store, gateway }
    }

    /// Delete a directory, every descendant directory, and all their documents.
    pub async fn delete_subtree(
        &self,
        ctx: &RequestContext,
        directory_id: DirectoryId,
    ) -> AppResult<DeletionReport> {
        let mut uow = self.store.begin(ctx.user_id).await?;
        let root = uow
            .directory(directory_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Directory {directory_id} not found")))?;
        let parent_id = root
            .parent_id
            .ok_or_else(|| AppError::validation("The root directory cannot be deleted"))?;

        let mut directories = uow.subtree_directories(directory_id).await?;
        let dir_ids: Vec<DirectoryId> = directories.iter().map(|d| d.id).collect();
        let documents = uow.documents_in(&dir_ids).await?;

        let released: i64 = documents.iter().map(|d| d.counted_bytes()).sum();
        let keys: Vec<String> = documents.iter().map(|d| d.object_key()).collect();
        let doc_ids: Vec<DocumentId> = documents.iter().map(|d| d.id).collect();

        let documents_removed = uow.delete_documents(&doc_ids).await?;
        directories.sort_by_key(|d| std::cmp::Reverse(d.depth()));
        let deepest_first: Vec<DirectoryId> = directories.iter().map(|d| d.id).collect();
        let directories_removed = uow.delete_directories(&deepest_first).await?;

        SizePropagationEngine::apply_delta_in(uow.as_mut(), parent_id, -released).await?;
        uow.commit().await?;

        info!(
            user_id = %ctx.user_id,
            directory_id = %directory_id,
            directories = directories_removed,
            documents = documents_removed,
            released_bytes = released,
            "Subtree deleted"
        );

        Ok(DeletionReport {
            directories_removed,
            documents_removed,
            released_bytes: released,
            orphaned_keys: self.delete_objects(ctx.user_id, keys).await,
        })
    }

    /// Delete a single document.
    pub async fn delete_document(
        &self,
        ctx: &RequestContext,
        document_id: DocumentId,
    ) -> AppResult<DeletionReport> {
        let mut uow = self.store.begin(ctx.user_id).await?;
        let document = uow
            .document(document_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Document {document_id} not found")))?;

        let documents_removed = uow.delete_documents(&[document_id]).await?;
        let released = document.counted_bytes();
        SizePropagationEngine::apply_delta_in(uow.as_mut(), document.parent_id, -released).await?;
        uow.commit().await?;

        info!(
            user_id = %ctx.user_id,
            document_id = %document_id,
            released_bytes = released,
            "Document deleted"
        );

        Ok(DeletionReport {
            directories_removed: 0,
            documents_removed,
            released_bytes: released,
            orphaned_keys: self
                .delete_objects(ctx.user_id, vec![document.object_key()])
                .await,
        })
    }

    async fn delete_objects(&self, user_id: UserId, keys: Vec<String>) -> Vec<String> {
        let report = self.gateway.delete_objects(&keys).await;
        if !report.is_complete() {
            warn!(
                user_id = %user_id,
                orphaned = report.failed.len(),
                keys = ?report.failed,
                "Objects left behind after metadata deletion"
            );
        }
        report.failed
    }
}
