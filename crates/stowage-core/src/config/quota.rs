//! Quota defaults.

use serde::{Deserialize, Serialize};

/// Per-account quota settings applied at provisioning time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaConfig {
    /// Entitlement granted to every account before any subscription (default 5 GB).
    #[serde(default = "default_max_storage")]
    pub default_max_storage_bytes: i64,
    /// Days a trashed item is kept before the purge job hard-deletes it.
    #[serde(default = "default_trash_retention")]
    pub trash_retention_days: i64,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            default_max_storage_bytes: default_max_storage(),
            trash_retention_days: default_trash_retention(),
        }
    }
}

fn default_max_storage() -> i64 {
    5_368_709_120
}

fn default_trash_retention() -> i64 {
    30
}
