//! Signed download links for committed documents.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use stowage_core::error::AppError;
use stowage_core::result::AppResult;
use stowage_core::traits::storage::ContentDisposition;
use stowage_core::types::DocumentId;
use stowage_database::MetadataStore;
use stowage_storage::ObjectStoreGateway;

use crate::context::RequestContext;

/// A time-limited download link.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadLink {
    /// The document.
    pub document_id: DocumentId,
    /// Signed URL.
    pub url: String,
    /// When the URL stops working.
    pub expires_at: DateTime<Utc>,
}

/// Issues download links.
#[derive(Debug, Clone)]
pub struct DownloadService {
    store: Arc<dyn MetadataStore>,
    gateway: Arc<ObjectStoreGateway>,
}

impl DownloadService {
    /// Create a new download service.
    pub fn new(store: Arc<dyn MetadataStore>, gateway: Arc<ObjectStoreGateway>) -> Self {
        Self { store, gateway }
    }

    /// Issue a download URL for a committed, non-trashed document.
    pub async fn download_url(
        &self,
        ctx: &RequestContext,
        document_id: DocumentId,
        disposition: ContentDisposition,
    ) -> AppResult<DownloadLink> {
        let document = self
            .store
            .find_document(document_id)
            .await?
            .filter(|d| d.owner_id == ctx.user_id && d.is_committed() && !d.is_trashed())
            .ok_or_else(|| AppError::not_found(format!("Document {document_id} not found")))?;

        let url = self
            .gateway
            .issue_download_url(&document.object_key(), &document.name, disposition)
            .await?;

        info!(
            user_id = %ctx.user_id,
            document_id = %document_id,
            "Download URL issued"
        );
        Ok(DownloadLink {
            document_id,
            url: url.url,
            expires_at: url.expires_at,
        })
    }
}
