//! S3-compatible object store using presigned URLs.

use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::types::{Delete, ObjectIdentifier};
use chrono::{DateTime, Utc};
use tracing::{info, warn};

use stowage_core::config::S3ObjectStoreConfig;
use stowage_core::error::{AppError, ErrorKind};
use stowage_core::result::AppResult;
use stowage_core::traits::storage::{
    ContentDisposition, DeleteReport, ObjectHead, ObjectStore, PresignedUrl,
};

/// Maximum number of keys per `DeleteObjects` request.
const DELETE_BATCH: usize = 1000;

/// S3-compatible object store.
#[derive(Debug, Clone)]
pub struct S3ObjectStore {
    client: Client,
    bucket: String,
}

impl S3ObjectStore {
    /// Create a new S3 object store.
    ///
    /// Static credentials are used when an access key is configured;
    /// otherwise the default AWS credential chain applies.
    pub async fn new(config: &S3ObjectStoreConfig) -> AppResult<Self> {
        if config.bucket.is_empty() {
            return Err(AppError::configuration("object_store.s3.bucket must be set"));
        }
        info!(
            endpoint = %config.endpoint,
            region = %config.region,
            bucket = %config.bucket,
            "Initializing S3 object store"
        );

        let mut builder = if config.access_key.is_empty() {
            let shared = aws_config::defaults(BehaviorVersion::latest())
                .region(Region::new(config.region.clone()))
                .load()
                .await;
            aws_sdk_s3::config::Builder::from(&shared)
        } else {
            aws_sdk_s3::config::Builder::new()
                .behavior_version(BehaviorVersion::latest())
                .region(Region::new(config.region.clone()))
                .credentials_provider(Credentials::new(
                    config.access_key.clone(),
                    config.secret_key.clone(),
                    None,
                    None,
                    "stowage-config",
                ))
        };
        if !config.endpoint.is_empty() {
            builder = builder.endpoint_url(config.endpoint.clone()).force_path_style(true);
        }

        Ok(Self {
            client: Client::from_conf(builder.build()),
            bucket: config.bucket.clone(),
        })
    }

    fn presigning(ttl: Duration) -> AppResult<(PresigningConfig, DateTime<Utc>)> {
        let presign = PresigningConfig::expires_in(ttl)
            .map_err(|e| AppError::with_source(ErrorKind::Validation, "Invalid URL lifetime", e))?;
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| AppError::validation(format!("Invalid URL lifetime: {e}")))?;
        Ok((presign, Utc::now() + ttl))
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    fn provider_type(&self) -> &str {
        "s3"
    }

    async fn health_check(&self) -> AppResult<bool> {
        Ok(self
            .client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .is_ok())
    }

    async fn issue_upload_url(
        &self,
        key: &str,
        content_type: &str,
        ttl: Duration,
    ) -> AppResult<PresignedUrl> {
        let (presign, expires_at) = Self::presigning(ttl)?;
        let request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .presigned(presign)
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::ExternalService, "Failed to presign upload", e)
            })?;
        Ok(PresignedUrl {
            url: request.uri().to_string(),
            expires_at,
        })
    }

    async fn issue_download_url(
        &self,
        key: &str,
        filename: &str,
        disposition: ContentDisposition,
        ttl: Duration,
    ) -> AppResult<PresignedUrl> {
        let (presign, expires_at) = Self::presigning(ttl)?;
        let request = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .response_content_disposition(disposition.header_value(filename))
            .presigned(presign)
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::ExternalService, "Failed to presign download", e)
            })?;
        Ok(PresignedUrl {
            url: request.uri().to_string(),
            expires_at,
        })
    }

    async fn head_object(&self, key: &str) -> AppResult<ObjectHead> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(output) => Ok(ObjectHead::present(output.content_length().unwrap_or(0))),
            Err(err) => {
                let not_found = err
                    .as_service_error()
                    .is_some_and(|service| service.is_not_found());
                if not_found {
                    Ok(ObjectHead::missing())
                } else {
                    Err(AppError::with_source(
                        ErrorKind::Storage,
                        format!("Failed to inspect object: {key}"),
                        err,
                    ))
                }
            }
        }
    }

    async fn delete_objects(&self, keys: &[String]) -> AppResult<DeleteReport> {
        let mut report = DeleteReport::default();

        for batch in keys.chunks(DELETE_BATCH) {
            let objects = batch
                .iter()
                .map(|key| ObjectIdentifier::builder().key(key).build())
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| {
                    AppError::with_source(ErrorKind::Internal, "Failed to build delete request", e)
                })?;
            let delete = Delete::builder()
                .set_objects(Some(objects))
                .quiet(false)
                .build()
                .map_err(|e| {
                    AppError::with_source(ErrorKind::Internal, "Failed to build delete request", e)
                })?;

            match self
                .client
                .delete_objects()
                .bucket(&self.bucket)
                .delete(delete)
                .send()
                .await
            {
                Ok(output) => {
                    let failed: Vec<String> = output
                        .errors()
                        .iter()
                        .filter_map(|e| e.key().map(str::to_string))
                        .collect();
                    for key in batch {
                        if failed.contains(key) {
                            report.failed.push(key.clone());
                        } else {
                            report.deleted.push(key.clone());
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, keys = batch.len(), "Bulk delete request failed");
                    report.failed.extend(batch.iter().cloned());
                }
            }
        }

        Ok(report)
    }
}
