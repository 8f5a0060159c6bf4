//! Directory service: create, move, and soft-delete directories and documents.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use stowage_core::error::AppError;
use stowage_core::result::AppResult;
use stowage_core::types::{DirectoryId, DocumentId};
use stowage_database::{MetadataStore, UnitOfWork};
use stowage_entity::directory::{CreateDirectory, DirectoryNode};
use stowage_entity::document::DocumentRecord;

use super::validate_name;
use crate::context::RequestContext;
use crate::quota::SizePropagationEngine;

/// Request to create a directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateDirectoryRequest {
    /// Parent directory.
    pub parent_id: DirectoryId,
    /// Directory name.
    pub name: String,
}

/// Manages the directory hierarchy.
///
/// Trashed items keep counting toward usage until the purge job deletes them.
#[derive(Debug, Clone)]
pub struct DirectoryService {
    store: Arc<dyn MetadataStore>,
}

impl DirectoryService {
    /// Create a new directory service.
    pub fn new(store: Arc<dyn MetadataStore>) -> Self {
        Self { store }
    }

    /// Create a directory under `req.parent_id`.
    pub async fn create_directory(
        &self,
        ctx: &RequestContext,
        req: CreateDirectoryRequest,
    ) -> AppResult<DirectoryNode> {
        let name = validate_name(&req.name)?;

        let mut uow = self.store.begin(ctx.user_id).await?;
        let parent = require_directory(uow.as_mut(), req.parent_id).await?;
        if parent.is_trashed() {
            return Err(AppError::validation("Cannot create inside a trashed directory"));
        }

        let directory = uow
            .insert_directory(&CreateDirectory {
                id: DirectoryId::new(),
                owner_id: ctx.user_id,
                parent_id: Some(parent.id),
                name,
                ancestor_path: parent.child_ancestor_path(),
            })
            .await?;
        uow.commit().await?;

        info!(
            user_id = %ctx.user_id,
            directory_id = %directory.id,
            parent_id = %parent.id,
            "Directory created"
        );
        Ok(directory)
    }

    /// Re-parent a directory with its whole subtree.
    ///
    /// Ancestor paths of every node in the subtree are rewritten and the
    /// subtree's aggregate moves from the old chain to the new one.
    pub async fn move_directory(
        &self,
        ctx: &RequestContext,
        directory_id: DirectoryId,
        new_parent_id: DirectoryId,
    ) -> AppResult<DirectoryNode> {
        let mut uow = self.store.begin(ctx.user_id).await?;
        let directory = require_directory(uow.as_mut(), directory_id).await?;
        let old_parent_id = directory
            .parent_id
            .ok_or_else(|| AppError::validation("The root directory cannot be moved"))?;
        if directory.is_trashed() {
            return Err(AppError::validation("Restore the directory before moving it"));
        }

        // Foreign directories are invisible to the unit of work.
        let new_parent = require_directory(uow.as_mut(), new_parent_id).await?;
        if new_parent.is_within(directory.id) {
            return Err(AppError::validation(
                "A directory cannot be moved into itself or its descendants",
            ));
        }
        if new_parent.is_trashed() {
            return Err(AppError::validation("Cannot move into a trashed directory"));
        }
        if old_parent_id == new_parent.id {
            return Ok(directory);
        }

        SizePropagationEngine::transfer_in(
            uow.as_mut(),
            old_parent_id,
            new_parent.id,
            directory.aggregate_size_bytes,
        )
        .await?;

        let old_prefix = directory.ancestor_path.len();
        let new_prefix = new_parent.chain();
        for node in uow.subtree_directories(directory.id).await? {
            let mut path = new_prefix.clone();
            path.extend_from_slice(&node.ancestor_path[old_prefix..]);
            let parent = if node.id == directory.id {
                Some(new_parent.id)
            } else {
                node.parent_id
            };
            uow.set_directory_placement(node.id, parent, &path).await?;
        }

        let moved = require_directory(uow.as_mut(), directory.id).await?;
        uow.commit().await?;

        info!(
            user_id = %ctx.user_id,
            directory_id = %directory_id,
            from = %old_parent_id,
            to = %new_parent_id,
            size_bytes = moved.aggregate_size_bytes,
            "Directory moved"
        );
        Ok(moved)
    }

    /// Move a directory and everything below it to the trash.
    pub async fn trash_directory(
        &self,
        ctx: &RequestContext,
        directory_id: DirectoryId,
    ) -> AppResult<()> {
        let mut uow = self.store.begin(ctx.user_id).await?;
        let directory = require_directory(uow.as_mut(), directory_id).await?;
        if directory.is_root() {
            return Err(AppError::validation("The root directory cannot be trashed"));
        }
        if directory.is_trashed() {
            return Ok(());
        }

        let now = Utc::now();
        let (dir_ids, doc_ids) = subtree_ids(uow.as_mut(), directory_id).await?;
        uow.set_directories_trashed(&dir_ids, Some(now)).await?;
        uow.set_documents_trashed(&doc_ids, Some(now)).await?;
        uow.commit().await?;

        info!(
            user_id = %ctx.user_id,
            directory_id = %directory_id,
            directories = dir_ids.len(),
            documents = doc_ids.len(),
            "Directory trashed"
        );
        Ok(())
    }

    /// Restore a trashed directory and everything below it.
    pub async fn restore_directory(
        &self,
        ctx: &RequestContext,
        directory_id: DirectoryId,
    ) -> AppResult<()> {
        let mut uow = self.store.begin(ctx.user_id).await?;
        let directory = require_directory(uow.as_mut(), directory_id).await?;
        if !directory.is_trashed() {
            return Ok(());
        }
        if let Some(parent_id) = directory.parent_id {
            let parent = require_directory(uow.as_mut(), parent_id).await?;
            if parent.is_trashed() {
                return Err(AppError::validation("Restore the parent directory first"));
            }
        }

        let (dir_ids, doc_ids) = subtree_ids(uow.as_mut(), directory_id).await?;
        uow.set_directories_trashed(&dir_ids, None).await?;
        uow.set_documents_trashed(&doc_ids, None).await?;
        uow.commit().await?;

        info!(user_id = %ctx.user_id, directory_id = %directory_id, "Directory restored");
        Ok(())
    }

    /// Move a committed document to the trash.
    pub async fn trash_document(
        &self,
        ctx: &RequestContext,
        document_id: DocumentId,
    ) -> AppResult<()> {
        let mut uow = self.store.begin(ctx.user_id).await?;
        let document = require_document(uow.as_mut(), document_id).await?;
        if !document.is_committed() {
            return Err(AppError::validation("Pending uploads cannot be trashed; cancel them"));
        }
        if document.is_trashed() {
            return Ok(());
        }
        uow.set_documents_trashed(&[document_id], Some(Utc::now()))
            .await?;
        uow.commit().await?;

        info!(user_id = %ctx.user_id, document_id = %document_id, "Document trashed");
        Ok(())
    }

    /// Restore a trashed document.
    pub async fn restore_document(
        &self,
        ctx: &RequestContext,
        document_id: DocumentId,
    ) -> AppResult<()> {
        let mut uow = self.store.begin(ctx.user_id).await?;
        let document = require_document(uow.as_mut(), document_id).await?;
        if !document.is_trashed() {
            return Ok(());
        }
        let parent = require_directory(uow.as_mut(), document.parent_id).await?;
        if parent.is_trashed() {
            return Err(AppError::validation("Restore the parent directory first"));
        }
        uow.set_documents_trashed(&[document_id], None).await?;
        uow.commit().await?;

        info!(user_id = %ctx.user_id, document_id = %document_id, "Document restored");
        Ok(())
    }
}

async fn require_directory(
    uow: &mut dyn UnitOfWork,
    id: DirectoryId,
) -> AppResult<DirectoryNode> {
    uow.directory(id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Directory {id} not found")))
}

async fn require_document(uow: &mut dyn UnitOfWork, id: DocumentId) -> AppResult<DocumentRecord> {
    uow.document(id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Document {id} not found")))
}

async fn subtree_ids(
    uow: &mut dyn UnitOfWork,
    root: DirectoryId,
) -> AppResult<(Vec<DirectoryId>, Vec<DocumentId>)> {
    let dir_ids: Vec<DirectoryId> = uow
        .subtree_directories(root)
        .await?
        .iter()
        .map(|d| d.id)
        .collect();
    let doc_ids = uow
        .documents_in(&dir_ids)
        .await?
        .iter()
        .filter(|d| d.is_committed())
        .map(|d| d.id)
        .collect();
    Ok((dir_ids, doc_ids))
}
