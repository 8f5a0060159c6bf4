//! Quota account entity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use stowage_core::types::{DirectoryId, UserId};

/// Per-user entitlement and consumption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct QuotaAccount {
    /// The account owner.
    pub user_id: UserId,
    /// The user's root directory.
    pub root_directory_id: DirectoryId,
    /// Entitlement ceiling in bytes.
    pub max_storage_bytes: i64,
    /// Committed bytes; mirrors the root directory's aggregate.
    pub used_storage_bytes: i64,
    /// When the account was created.
    pub created_at: DateTime<Utc>,
    /// When the account was last updated.
    pub updated_at: DateTime<Utc>,
}

impl QuotaAccount {
    /// Bytes still available (never negative).
    pub fn remaining_bytes(&self) -> i64 {
        (self.max_storage_bytes - self.used_storage_bytes).max(0)
    }

    /// Check if adding the given number of bytes would exceed the entitlement.
    pub fn would_exceed(&self, additional_bytes: i64) -> bool {
        self.used_storage_bytes.saturating_add(additional_bytes) > self.max_storage_bytes
    }

    /// Usage percentage (0.0 - 100.0+).
    pub fn usage_percent(&self) -> f64 {
        if self.max_storage_bytes <= 0 {
            0.0
        } else {
            (self.used_storage_bytes as f64 / self.max_storage_bytes as f64) * 100.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(max: i64, used: i64) -> QuotaAccount {
        let now = Utc::now();
        QuotaAccount {
            user_id: UserId::new(),
            root_directory_id: DirectoryId::new(),
            max_storage_bytes: max,
            used_storage_bytes: used,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_would_exceed_is_strict() {
        let acct = account(1000, 900);
        assert!(acct.would_exceed(150));
        assert!(!acct.would_exceed(100));
        assert_eq!(acct.remaining_bytes(), 100);
    }

    #[test]
    fn test_remaining_never_negative() {
        let acct = account(100, 500);
        assert_eq!(acct.remaining_bytes(), 0);
        assert!(acct.usage_percent() > 100.0);
    }
}
