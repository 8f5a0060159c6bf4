//! Object store configuration.

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Top-level object store configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ObjectStoreConfig {
    /// Object store provider to use: `"local"` or `"s3"`.
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Lifetime of issued upload URLs in seconds.
    #[serde(default = "default_upload_ttl")]
    #[validate(range(min = 30, max = 604_800))]
    pub upload_url_ttl_seconds: u64,
    /// Lifetime of issued download URLs in seconds.
    #[serde(default = "default_download_ttl")]
    #[validate(range(min = 30, max = 604_800))]
    pub download_url_ttl_seconds: u64,
    /// Upper bound for a single gateway call (URL issuance, head, delete).
    #[serde(default = "default_request_timeout")]
    #[validate(range(min = 1, max = 300))]
    pub request_timeout_seconds: u64,
    /// Local filesystem object store configuration.
    #[serde(default)]
    pub local: LocalObjectStoreConfig,
    /// S3-compatible object store configuration.
    #[serde(default)]
    pub s3: S3ObjectStoreConfig,
}

impl Default for ObjectStoreConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            upload_url_ttl_seconds: default_upload_ttl(),
            download_url_ttl_seconds: default_download_ttl(),
            request_timeout_seconds: default_request_timeout(),
            local: LocalObjectStoreConfig::default(),
            s3: S3ObjectStoreConfig::default(),
        }
    }
}

/// Local filesystem object store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalObjectStoreConfig {
    /// Root path for stored objects.
    #[serde(default = "default_local_root")]
    pub root_path: String,
    /// Public base URL that serves the signed object endpoints.
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,
    /// Secret used to sign issued URLs.
    #[serde(default)]
    pub signing_secret: String,
}

impl Default for LocalObjectStoreConfig {
    fn default() -> Self {
        Self {
            root_path: default_local_root(),
            public_base_url: default_public_base_url(),
            signing_secret: String::new(),
        }
    }
}

/// S3-compatible object storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct S3ObjectStoreConfig {
    /// S3 endpoint URL (for non-AWS services like MinIO).
    #[serde(default)]
    pub endpoint: String,
    /// AWS region.
    #[serde(default = "default_region")]
    pub region: String,
    /// S3 bucket name.
    #[serde(default)]
    pub bucket: String,
    /// Access key ID.
    #[serde(default)]
    pub access_key: String,
    /// Secret access key.
    #[serde(default)]
    pub secret_key: String,
}

fn default_provider() -> String {
    "local".to_string()
}

fn default_upload_ttl() -> u64 {
    900
}

fn default_download_ttl() -> u64 {
    300
}

fn default_request_timeout() -> u64 {
    15
}

fn default_local_root() -> String {
    "./data/objects".to_string()
}

fn default_public_base_url() -> String {
    "http://localhost:8080/objects".to_string()
}

fn default_region() -> String {
    "us-east-1".to_string()
}
