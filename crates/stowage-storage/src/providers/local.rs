//! Local filesystem object store.
//!
//! Objects live as flat files under the root directory. Issued URLs point at
//! `public_base_url` and carry an expiry and an HMAC signature; the HTTP
//! layer serving that base URL hands requests to [`LocalObjectStore::accept_upload`]
//! and [`LocalObjectStore::open_download`], which check the signature before
//! touching the filesystem.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::fs;
use tracing::{debug, warn};

use stowage_core::config::LocalObjectStoreConfig;
use stowage_core::error::{AppError, ErrorKind};
use stowage_core::result::AppResult;
use stowage_core::traits::storage::{
    ContentDisposition, DeleteReport, ObjectHead, ObjectStore, PresignedUrl,
};

use crate::signing::UrlSigner;

/// Local filesystem object store.
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    /// Root directory for all stored objects.
    root: PathBuf,
    /// Base URL the signed endpoints are served under.
    base_url: String,
    signer: UrlSigner,
}

/// A download authorized by a valid signed URL.
#[derive(Debug, Clone)]
pub struct AuthorizedDownload {
    /// Object bytes.
    pub body: Bytes,
    /// `Content-Disposition` header value.
    pub content_disposition: String,
}

/// Query parameters of an issued URL.
#[derive(Debug, Default)]
struct SignedQuery {
    key: String,
    expires: i64,
    signature: String,
    filename: Option<String>,
    disposition: Option<String>,
}

impl LocalObjectStore {
    /// Create a new local object store, creating the root if needed.
    pub async fn new(config: &LocalObjectStoreConfig) -> AppResult<Self> {
        let root = PathBuf::from(&config.root_path);
        fs::create_dir_all(&root).await.map_err(|e| {
            AppError::with_source(
                ErrorKind::Storage,
                format!("Failed to create object root: {}", root.display()),
                e,
            )
        })?;
        Ok(Self {
            root,
            base_url: config.public_base_url.trim_end_matches('/').to_string(),
            signer: UrlSigner::new(&config.signing_secret)?,
        })
    }

    /// Resolve a key to a path under the root, rejecting anything but a flat name.
    fn resolve(&self, key: &str) -> AppResult<PathBuf> {
        let valid = !key.is_empty()
            && key != "."
            && key != ".."
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if !valid {
            return Err(AppError::validation(format!("Invalid object key: '{key}'")));
        }
        Ok(self.root.join(key))
    }

    fn expiry(ttl: Duration) -> AppResult<DateTime<Utc>> {
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| AppError::validation(format!("Invalid URL lifetime: {e}")))?;
        Ok(Utc::now() + ttl)
    }

    fn check_expiry(expires: i64) -> AppResult<()> {
        if Utc::now().timestamp() > expires {
            return Err(AppError::signature("Signed URL has expired"));
        }
        Ok(())
    }

    fn parse_url(&self, url: &str) -> AppResult<SignedQuery> {
        let rest = url
            .strip_prefix(&self.base_url)
            .and_then(|r| r.strip_prefix('/'))
            .ok_or_else(|| AppError::validation("URL was not issued by this store"))?;
        let (key, query) = rest
            .split_once('?')
            .ok_or_else(|| AppError::validation("Signed URL has no query"))?;

        let mut parsed = SignedQuery {
            key: key.to_string(),
            ..SignedQuery::default()
        };
        for pair in query.split('&') {
            let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
            match name {
                "expires" => {
                    parsed.expires = value
                        .parse()
                        .map_err(|_| AppError::validation("Malformed expires parameter"))?;
                }
                "signature" => parsed.signature = value.to_string(),
                "filename" => parsed.filename = Some(value.to_string()),
                "disposition" => parsed.disposition = Some(value.to_string()),
                _ => {}
            }
        }
        if parsed.signature.is_empty() {
            return Err(AppError::signature("Signed URL has no signature"));
        }
        Ok(parsed)
    }

    /// Store bytes under a key without any signature check.
    pub async fn put_object(&self, key: &str, body: Bytes) -> AppResult<u64> {
        let path = self.resolve(key)?;
        fs::write(&path, &body).await.map_err(|e| {
            AppError::with_source(
                ErrorKind::Storage,
                format!("Failed to write object: {key}"),
                e,
            )
        })?;
        debug!(key, bytes = body.len(), "Wrote object");
        Ok(body.len() as u64)
    }

    /// Receive a `PUT` against an issued upload URL.
    pub async fn accept_upload(&self, url: &str, content_type: &str, body: Bytes) -> AppResult<u64> {
        let query = self.parse_url(url)?;
        let expires = query.expires.to_string();
        if !self
            .signer
            .verify(&["PUT", &query.key, &expires, content_type], &query.signature)
        {
            return Err(AppError::signature("Upload signature mismatch"));
        }
        Self::check_expiry(query.expires)?;
        self.put_object(&query.key, body).await
    }

    /// Serve a `GET` against an issued download URL.
    pub async fn open_download(&self, url: &str) -> AppResult<AuthorizedDownload> {
        let query = self.parse_url(url)?;
        let expires = query.expires.to_string();
        let filename_b64 = query.filename.clone().unwrap_or_default();
        let disposition_raw = query.disposition.clone().unwrap_or_default();
        if !self.signer.verify(
            &["GET", &query.key, &expires, &filename_b64, &disposition_raw],
            &query.signature,
        ) {
            return Err(AppError::signature("Download signature mismatch"));
        }
        Self::check_expiry(query.expires)?;

        let filename = URL_SAFE_NO_PAD
            .decode(&filename_b64)
            .ok()
            .and_then(|raw| String::from_utf8(raw).ok())
            .ok_or_else(|| AppError::validation("Malformed filename parameter"))?;
        let disposition = match disposition_raw.as_str() {
            "inline" => ContentDisposition::Inline,
            _ => ContentDisposition::Attachment,
        };

        let path = self.resolve(&query.key)?;
        let body = fs::read(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                AppError::not_found(format!("Object not found: {}", query.key))
            } else {
                AppError::with_source(
                    ErrorKind::Storage,
                    format!("Failed to read object: {}", query.key),
                    e,
                )
            }
        })?;

        Ok(AuthorizedDownload {
            body: Bytes::from(body),
            content_disposition: disposition.header_value(&filename),
        })
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    fn provider_type(&self) -> &str {
        "local"
    }

    async fn health_check(&self) -> AppResult<bool> {
        Ok(self.root.exists() && self.root.is_dir())
    }

    async fn issue_upload_url(
        &self,
        key: &str,
        content_type: &str,
        ttl: Duration,
    ) -> AppResult<PresignedUrl> {
        self.resolve(key)?;
        let expires_at = Self::expiry(ttl)?;
        let expires = expires_at.timestamp().to_string();
        let signature = self.signer.sign(&["PUT", key, &expires, content_type])?;
        Ok(PresignedUrl {
            url: format!(
                "{}/{key}?expires={expires}&signature={signature}",
                self.base_url
            ),
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
        self.resolve(key)?;
        let expires_at = Self::expiry(ttl)?;
        let expires = expires_at.timestamp().to_string();
        let filename_b64 = URL_SAFE_NO_PAD.encode(filename.as_bytes());
        let disposition = match disposition {
            ContentDisposition::Inline => "inline",
            ContentDisposition::Attachment => "attachment",
        };
        let signature = self
            .signer
            .sign(&["GET", key, &expires, &filename_b64, disposition])?;
        Ok(PresignedUrl {
            url: format!(
                "{}/{key}?expires={expires}&filename={filename_b64}&disposition={disposition}&signature={signature}",
                self.base_url
            ),
            expires_at,
        })
    }

    async fn head_object(&self, key: &str) -> AppResult<ObjectHead> {
        let path = self.resolve(key)?;
        match fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(ObjectHead::present(meta.len() as i64)),
            Ok(_) => Ok(ObjectHead::missing()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ObjectHead::missing()),
            Err(e) => Err(AppError::with_source(
                ErrorKind::Storage,
                format!("Failed to inspect object: {key}"),
                e,
            )),
        }
    }

    async fn delete_objects(&self, keys: &[String]) -> AppResult<DeleteReport> {
        let mut report = DeleteReport::default();
        for key in keys {
            let path = match self.resolve(key) {
                Ok(path) => path,
                Err(_) => {
                    report.failed.push(key.clone());
                    continue;
                }
            };
            match fs::remove_file(&path).await {
                Ok(()) => report.deleted.push(key.clone()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    report.deleted.push(key.clone())
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "Failed to delete object");
                    report.failed.push(key.clone());
                }
            }
        }
        Ok(report)
    }
}
