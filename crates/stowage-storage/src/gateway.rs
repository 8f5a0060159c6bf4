//! Object store gateway: the single entry point services use for object I/O.
//!
//! Wraps the configured [`ObjectStore`] and applies the configured URL
//! lifetimes and a per-call timeout. A timed-out call fails with
//! `ExternalService`.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use stowage_core::config::ObjectStoreConfig;
use stowage_core::error::AppError;
use stowage_core::result::AppResult;
use stowage_core::traits::storage::{
    ContentDisposition, DeleteReport, ObjectHead, ObjectStore, PresignedUrl,
};

use crate::providers::LocalObjectStore;

/// Build the object store selected by `config.provider`.
pub async fn build_object_store(config: &ObjectStoreConfig) -> AppResult<Arc<dyn ObjectStore>> {
    match config.provider.as_str() {
        "local" => Ok(Arc::new(LocalObjectStore::new(&config.local).await?)),
        #[cfg(feature = "s3")]
        "s3" => Ok(Arc::new(
            crate::providers::S3ObjectStore::new(&config.s3).await?,
        )),
        other => Err(AppError::configuration(format!(
            "Unsupported object store provider: '{other}'"
        ))),
    }
}

/// Timeout-bounded access to the object store.
#[derive(Debug, Clone)]
pub struct ObjectStoreGateway {
    store: Arc<dyn ObjectStore>,
    timeout: Duration,
    upload_ttl: Duration,
    download_ttl: Duration,
}

impl ObjectStoreGateway {
    /// Create a gateway with explicit limits.
    pub fn new(
        store: Arc<dyn ObjectStore>,
        timeout: Duration,
        upload_ttl: Duration,
        download_ttl: Duration,
    ) -> Self {
        Self {
            store,
            timeout,
            upload_ttl,
            download_ttl,
        }
    }

    /// Create a gateway using the limits from configuration.
    pub fn from_config(store: Arc<dyn ObjectStore>, config: &ObjectStoreConfig) -> Self {
        info!(
            provider = store.provider_type(),
            timeout_seconds = config.request_timeout_seconds,
            "Object store gateway ready"
        );
        Self::new(
            store,
            Duration::from_secs(config.request_timeout_seconds),
            Duration::from_secs(config.upload_url_ttl_seconds),
            Duration::from_secs(config.download_url_ttl_seconds),
        )
    }

    /// The wrapped store.
    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    async fn bounded<T, F>(&self, operation: &str, fut: F) -> AppResult<T>
    where
        F: Future<Output = AppResult<T>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    operation,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Object store call timed out"
                );
                Err(AppError::external_service(format!(
                    "Object store {operation} timed out after {:?}",
                    self.timeout
                )))
            }
        }
    }

    /// Issue an upload URL bound to `key` and `content_type`.
    pub async fn issue_upload_url(&self, key: &str, content_type: &str) -> AppResult<PresignedUrl> {
        debug!(key, content_type, "Issuing upload URL");
        self.bounded(
            "issue_upload_url",
            self.store.issue_upload_url(key, content_type, self.upload_ttl),
        )
        .await
    }

    /// Issue a download URL for `key`.
    pub async fn issue_download_url(
        &self,
        key: &str,
        filename: &str,
        disposition: ContentDisposition,
    ) -> AppResult<PresignedUrl> {
        debug!(key, "Issuing download URL");
        self.bounded(
            "issue_download_url",
            self.store
                .issue_download_url(key, filename, disposition, self.download_ttl),
        )
        .await
    }

    /// Inspect the object at `key`.
    pub async fn head_object(&self, key: &str) -> AppResult<ObjectHead> {
        self.bounded("head_object", self.store.head_object(key)).await
    }

    /// Best-effort bulk delete. A failed or timed-out call reports every key as failed.
    pub async fn delete_objects(&self, keys: &[String]) -> DeleteReport {
        if keys.is_empty() {
            return DeleteReport::default();
        }
        match self
            .bounded("delete_objects", self.store.delete_objects(keys))
            .await
        {
            Ok(report) => report,
            Err(e) => {
                warn!(error = %e, keys = keys.len(), "Bulk object delete failed");
                DeleteReport {
                    deleted: Vec::new(),
                    failed: keys.to_vec(),
                }
            }
        }
    }

    /// Check whether the store is reachable.
    pub async fn health_check(&self) -> bool {
        self.bounded("health_check", self.store.health_check())
            .await
            .unwrap_or(false)
    }
}
