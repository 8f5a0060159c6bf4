//! Upload transaction coordinator.
//!
//! Clients never stream bytes through this service. A document is first
//! *reserved* (recorded but not counted), the client uploads to a signed
//! URL, and *commit* verifies the object before counting its bytes. Only
//! `Reserved` and `Committed` are persisted; every phase is logged.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use stowage_core::config::UploadConfig;
use stowage_core::error::{AppError, ErrorKind};
use stowage_core::result::AppResult;
use stowage_core::types::{DirectoryId, DocumentId, UserId};
use stowage_database::MetadataStore;
use stowage_entity::document::{CreateDocument, DocumentRecord, UploadPhase, UploadState};
use stowage_storage::ObjectStoreGateway;

use crate::context::RequestContext;
use crate::directory::validate_name;
use crate::quota::{QuotaLedger, SizePropagationEngine};

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Request to reserve an upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReserveUploadRequest {
    /// Target directory.
    pub parent_directory_id: DirectoryId,
    /// File name.
    pub file_name: String,
    /// Size the client promises to upload.
    pub declared_size_bytes: i64,
    /// MIME type the upload URL is bound to.
    #[serde(default)]
    pub content_type: Option<String>,
}

/// Reservation handed back to the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadReservation {
    /// The reserved document.
    pub document_id: DocumentId,
    /// Where to upload the bytes.
    pub upload_url: String,
    /// When the upload URL stops working.
    pub expires_at: DateTime<Utc>,
}

/// Request to commit a reserved upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompleteUploadRequest {
    /// The reserved document.
    pub document_id: DocumentId,
}

/// Outcome of one reservation sweep.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SweepReport {
    /// Stale reservations found.
    pub examined: usize,
    /// Reservations removed by this sweep.
    pub cancelled: usize,
    /// Reservations that could not be removed.
    pub failures: usize,
    /// Object keys the store failed to delete.
    pub orphaned_keys: Vec<String>,
}

/// Drives the reserve/verify/commit upload protocol.
#[derive(Debug, Clone)]
pub struct UploadCoordinator {
    store: Arc<dyn MetadataStore>,
    gateway: Arc<ObjectStoreGateway>,
    config: UploadConfig,
}

impl UploadCoordinator {
    /// Create a new coordinator.
    pub fn new(
        store: Arc<dyn MetadataStore>,
        gateway: Arc<ObjectStoreGateway>,
        config: UploadConfig,
    ) -> Self {
        Self {
            store,
            gateway,
            config,
        }
    }

    /// Reserve a document and issue its upload URL.
    pub async fn reserve(
        &self,
        ctx: &RequestContext,
        req: ReserveUploadRequest,
    ) -> AppResult<UploadReservation> {
        log_phase(ctx.user_id, None, UploadPhase::Requested);

        let name = validate_name(&req.file_name)?;
        if req.declared_size_bytes < 0 {
            return Err(AppError::validation("Declared size must not be negative"));
        }
        if req.declared_size_bytes > self.config.max_upload_size_bytes {
            return Err(AppError::validation(format!(
                "Declared size {} exceeds the maximum upload size of {} bytes",
                req.declared_size_bytes, self.config.max_upload_size_bytes
            )));
        }
        let content_type = req
            .content_type
            .map(|ct| ct.trim().to_string())
            .filter(|ct| !ct.is_empty())
            .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());

        let mut uow = self.store.begin(ctx.user_id).await?;
        let parent = uow
            .directory(req.parent_directory_id)
            .await?
            .ok_or_else(|| {
                AppError::not_found(format!("Directory {} not found", req.parent_directory_id))
            })?;
        if parent.is_trashed() {
            return Err(AppError::validation("Cannot upload into a trashed directory"));
        }
        let account = uow.account().await?;
        QuotaLedger::admit(&account, req.declared_size_bytes)?;

        let document = uow
            .insert_document(&CreateDocument {
                id: DocumentId::new(),
                parent_id: parent.id,
                owner_id: ctx.user_id,
                name,
                content_type: content_type.clone(),
                declared_size_bytes: req.declared_size_bytes,
            })
            .await?;
        uow.commit().await?;
        log_phase(ctx.user_id, Some(document.id), UploadPhase::Reserved);

        match self
            .gateway
            .issue_upload_url(&document.object_key(), &content_type)
            .await
        {
            Ok(url) => {
                log_phase(ctx.user_id, Some(document.id), UploadPhase::AwaitingExternalUpload);
                Ok(UploadReservation {
                    document_id: document.id,
                    upload_url: url.url,
                    expires_at: url.expires_at,
                })
            }
            Err(e) => {
                warn!(
                    user_id = %ctx.user_id,
                    document_id = %document.id,
                    error = %e,
                    "Upload URL issuance failed, removing reservation"
                );
                if let Err(cleanup) = self.remove_reservation(ctx.user_id, document.id).await {
                    error!(
                        user_id = %ctx.user_id,
                        document_id = %document.id,
                        error = %cleanup,
                        "Failed to remove reservation; the sweep will collect it"
                    );
                } else {
                    log_phase(ctx.user_id, Some(document.id), UploadPhase::RolledBack);
                }
                Err(e)
            }
        }
    }

    /// Verify the uploaded object and count its bytes.
    pub async fn complete_upload(
        &self,
        ctx: &RequestContext,
        document_id: DocumentId,
    ) -> AppResult<DocumentRecord> {
        let document = self
            .store
            .find_document(document_id)
            .await?
            .filter(|d| d.owner_id == ctx.user_id && d.upload_state == UploadState::Reserved)
            .ok_or_else(|| {
                AppError::not_found(format!("No pending upload for document {document_id}"))
            })?;

        log_phase(ctx.user_id, Some(document_id), UploadPhase::Verifying);
        let key = document.object_key();
        let head = self.gateway.head_object(&key).await?;

        if !head.exists || head.size_bytes != document.size_bytes {
            warn!(
                user_id = %ctx.user_id,
                document_id = %document_id,
                phase = %UploadPhase::Failed,
                exists = head.exists,
                observed_bytes = head.size_bytes,
                declared_bytes = document.size_bytes,
                "Upload verification failed"
            );
            self.remove_reservation(ctx.user_id, document_id).await?;
            if head.exists {
                let report = self.gateway.delete_objects(&[key]).await;
                if !report.is_complete() {
                    warn!(document_id = %document_id, orphaned = ?report.failed, "Mismatched object left behind");
                }
            }
            log_phase(ctx.user_id, Some(document_id), UploadPhase::RolledBack);
            return Err(AppError::upload_verification_failed(if head.exists {
                format!(
                    "Uploaded object holds {} bytes but {} were declared",
                    head.size_bytes, document.size_bytes
                )
            } else {
                "Uploaded object was not found".to_string()
            }));
        }

        let mut uow = self.store.begin(ctx.user_id).await?;
        let mut committed = uow
            .transition_document(
                document_id,
                UploadState::Reserved,
                UploadState::Committed,
                head.size_bytes,
            )
            .await?
            .ok_or_else(|| {
                AppError::not_found(format!(
                    "Document {document_id} was cancelled or deleted before commit"
                ))
            })?;
        SizePropagationEngine::apply_delta_in(uow.as_mut(), committed.parent_id, head.size_bytes)
            .await?;
        // A directory trashed while the upload was in flight takes the document with it.
        let parent_trashed_at = uow
            .directory(committed.parent_id)
            .await?
            .and_then(|parent| parent.trashed_at);
        if let Some(trashed_at) = parent_trashed_at {
            uow.set_documents_trashed(&[document_id], Some(trashed_at))
                .await?;
            committed.trashed_at = Some(trashed_at);
        }
        uow.commit().await?;

        info!(
            user_id = %ctx.user_id,
            document_id = %document_id,
            phase = %UploadPhase::Committed,
            size_bytes = committed.size_bytes,
            trashed = committed.is_trashed(),
            "Upload committed"
        );
        Ok(committed)
    }

    /// Cancel a pending upload and delete any partial object.
    pub async fn cancel_upload(&self, ctx: &RequestContext, document_id: DocumentId) -> AppResult<()> {
        let removed = self.remove_reservation(ctx.user_id, document_id).await?;
        let report = self.gateway.delete_objects(&[removed.object_key()]).await;
        if !report.is_complete() {
            warn!(document_id = %document_id, orphaned = ?report.failed, "Partial upload left behind");
        }
        info!(
            user_id = %ctx.user_id,
            document_id = %document_id,
            phase = %UploadPhase::RolledBack,
            "Upload cancelled"
        );
        Ok(())
    }

    /// Cancel reservations older than the configured TTL.
    pub async fn sweep_stale_reservations(&self, now: DateTime<Utc>) -> AppResult<SweepReport> {
        let cutoff = now - chrono::Duration::seconds(self.config.reservation_ttl_seconds as i64);
        let stale = self
            .store
            .find_stale_reservations(cutoff, self.config.sweep_batch_size)
            .await?;

        let mut report = SweepReport {
            examined: stale.len(),
            ..Default::default()
        };
        let mut keys = Vec::with_capacity(stale.len());
        for document in stale {
            match self.remove_reservation(document.owner_id, document.id).await {
                Ok(removed) => {
                    report.cancelled += 1;
                    keys.push(removed.object_key());
                }
                // Committed or removed since the scan.
                Err(e) if e.kind == ErrorKind::NotFound => {}
                Err(e) => {
                    report.failures += 1;
                    warn!(document_id = %document.id, error = %e, "Failed to sweep reservation");
                }
            }
        }

        report.orphaned_keys = self.gateway.delete_objects(&keys).await.failed;
        info!(
            examined = report.examined,
            cancelled = report.cancelled,
            failures = report.failures,
            orphaned = report.orphaned_keys.len(),
            "Reservation sweep finished"
        );
        Ok(report)
    }

    async fn remove_reservation(
        &self,
        user_id: UserId,
        document_id: DocumentId,
    ) -> AppResult<DocumentRecord> {
        let mut uow = self.store.begin(user_id).await?;
        let removed = uow
            .delete_reserved_document(document_id)
            .await?
            .ok_or_else(|| {
                AppError::not_found(format!("No pending upload for document {document_id}"))
            })?;
        uow.commit().await?;
        Ok(removed)
    }
}

fn log_phase(user_id: UserId, document_id: Option<DocumentId>, phase: UploadPhase) {
    match document_id {
        Some(document_id) => {
            info!(user_id = %user_id, document_id = %document_id, phase = %phase, "Upload phase")
        }
        None => info!(user_id = %user_id, phase = %phase, "Upload phase"),
    }
}
