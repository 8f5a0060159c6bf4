//! Object store trait for pluggable blob backends.
//!
//! Document bytes never pass through the application: clients upload and
//! download directly against URLs issued here. The application only issues
//! those URLs, inspects the resulting objects, and deletes them.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::result::AppResult;

/// A time-limited URL handed to a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresignedUrl {
    /// The URL itself.
    pub url: String,
    /// Instant after which the backend rejects the URL.
    pub expires_at: DateTime<Utc>,
}

/// Result of inspecting an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectHead {
    /// Whether any object exists at the key.
    pub exists: bool,
    /// Size of the object in bytes (0 when absent).
    pub size_bytes: i64,
}

impl ObjectHead {
    /// Head result for a missing object.
    pub fn missing() -> Self {
        Self {
            exists: false,
            size_bytes: 0,
        }
    }

    /// Head result for a present object.
    pub fn present(size_bytes: i64) -> Self {
        Self {
            exists: true,
            size_bytes,
        }
    }
}

/// How a download should be presented by the browser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentDisposition {
    /// Render in the browser if possible.
    Inline,
    /// Force a save dialog.
    Attachment,
}

impl ContentDisposition {
    /// Render the `Content-Disposition` header value for a file name.
    pub fn header_value(&self, filename: &str) -> String {
        let kind = match self {
            Self::Inline => "inline",
            Self::Attachment => "attachment",
        };
        let escaped = filename.replace('\\', "\\\\").replace('"', "\\\"");
        format!("{kind}; filename=\"{escaped}\"")
    }
}

/// Outcome of a best-effort bulk delete.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteReport {
    /// Keys removed (or already absent).
    pub deleted: Vec<String>,
    /// Keys the backend failed to remove.
    pub failed: Vec<String>,
}

impl DeleteReport {
    /// Whether every key was removed.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /// Merge another report into this one.
    pub fn merge(&mut self, other: DeleteReport) {
        self.deleted.extend(other.deleted);
        self.failed.extend(other.failed);
    }
}

/// Trait for blob storage backends.
///
/// Implementations exist for the local filesystem and S3. The trait is
/// defined here in `stowage-core` and implemented in `stowage-storage`.
#[async_trait]
pub trait ObjectStore: Send + Sync + std::fmt::Debug + 'static {
    /// Return the provider type name (e.g., "local", "s3").
    fn provider_type(&self) -> &str;

    /// Check whether the provider is healthy and reachable.
    async fn health_check(&self) -> AppResult<bool>;

    /// Issue a URL the client may `PUT` the object bytes to.
    async fn issue_upload_url(
        &self,
        key: &str,
        content_type: &str,
        ttl: Duration,
    ) -> AppResult<PresignedUrl>;

    /// Issue a URL the client may `GET` the object bytes from.
    async fn issue_download_url(
        &self,
        key: &str,
        filename: &str,
        disposition: ContentDisposition,
        ttl: Duration,
    ) -> AppResult<PresignedUrl>;

    /// Inspect the object at `key`.
    async fn head_object(&self, key: &str) -> AppResult<ObjectHead>;

    /// Delete objects, reporting per-key failures instead of aborting.
    async fn delete_objects(&self, keys: &[String]) -> AppResult<DeleteReport>;
}
