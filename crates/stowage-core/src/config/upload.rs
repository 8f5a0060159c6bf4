//! Upload protocol configuration.

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Settings for the reserve → upload → verify → commit protocol.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct UploadConfig {
    /// Maximum declared size of a single upload in bytes (default 5 GB).
    #[serde(default = "default_max_upload")]
    #[validate(range(min = 1))]
    pub max_upload_size_bytes: i64,
    /// Age in seconds after which an unverified reservation is swept.
    #[serde(default = "default_reservation_ttl")]
    #[validate(range(min = 60))]
    pub reservation_ttl_seconds: u64,
    /// Maximum number of stale reservations cancelled per sweep run.
    #[serde(default = "default_sweep_batch")]
    #[validate(range(min = 1, max = 10_000))]
    pub sweep_batch_size: u32,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_upload_size_bytes: default_max_upload(),
            reservation_ttl_seconds: default_reservation_ttl(),
            sweep_batch_size: default_sweep_batch(),
        }
    }
}

fn default_max_upload() -> i64 {
    5_368_709_120 // 5 GB
}

fn default_reservation_ttl() -> u64 {
    3600
}

fn default_sweep_batch() -> u32 {
    500
}
