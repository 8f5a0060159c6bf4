//! Per-user quota ledger: admission checks and entitlement adjustments.

use std::sync::Arc;

use tracing::{info, warn};

use stowage_core::error::AppError;
use stowage_core::result::AppResult;
use stowage_core::types::UserId;
use stowage_database::{MetadataStore, UnitOfWork};
use stowage_entity::quota::QuotaAccount;

/// Reads quota accounts and owns every write to `max_storage_bytes`.
#[derive(Debug, Clone)]
pub struct QuotaLedger {
    store: Arc<dyn MetadataStore>,
}

impl QuotaLedger {
    /// Create a new ledger.
    pub fn new(store: Arc<dyn MetadataStore>) -> Self {
        Self { store }
    }

    /// Current account snapshot.
    pub async fn account(&self, user_id: UserId) -> AppResult<QuotaAccount> {
        self.store
            .find_account(user_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("No quota account for user {user_id}")))
    }

    /// Bytes still available to the user.
    pub async fn remaining_bytes(&self, user_id: UserId) -> AppResult<i64> {
        Ok(self.account(user_id).await?.remaining_bytes())
    }

    /// Reject `additional_bytes` if it would push usage above the ceiling.
    pub fn admit(account: &QuotaAccount, additional_bytes: i64) -> AppResult<()> {
        if account.would_exceed(additional_bytes) {
            warn!(
                user_id = %account.user_id,
                used = account.used_storage_bytes,
                max = account.max_storage_bytes,
                requested = additional_bytes,
                "Quota admission rejected"
            );
            return Err(AppError::quota_exceeded(format!(
                "Storage quota exceeded: {} of {} bytes used, {} requested",
                account.used_storage_bytes, account.max_storage_bytes, additional_bytes
            )));
        }
        Ok(())
    }

    /// Grow or shrink the user's ceiling inside the caller's unit of work.
    pub async fn adjust_entitlement_in(
        uow: &mut dyn UnitOfWork,
        delta: i64,
    ) -> AppResult<QuotaAccount> {
        let account = uow.add_max_bytes(delta).await?;
        info!(
            user_id = %account.user_id,
            delta,
            max_storage_bytes = account.max_storage_bytes,
            "Storage entitlement adjusted"
        );
        if account.used_storage_bytes > account.max_storage_bytes {
            warn!(
                user_id = %account.user_id,
                used = account.used_storage_bytes,
                max = account.max_storage_bytes,
                "Usage now exceeds entitlement; new uploads will be rejected"
            );
        }
        Ok(account)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use stowage_core::error::ErrorKind;
    use stowage_core::types::DirectoryId;
    use stowage_database::MemoryStore;

    fn account(used: i64, max: i64) -> QuotaAccount {
        QuotaAccount {
            user_id: UserId::new(),
            root_directory_id: DirectoryId::new(),
            max_storage_bytes: max,
            used_storage_bytes: used,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_admission_boundary() {
        assert!(QuotaLedger::admit(&account(900, 1000), 100).is_ok());
        let err = QuotaLedger::admit(&account(900, 1000), 150).unwrap_err();
        assert_eq!(err.kind, ErrorKind::QuotaExceeded);
    }

    #[tokio::test]
    async fn test_entitlement_adjustment_commits_with_unit_of_work() {
        let store = Arc::new(MemoryStore::new());
        let user = UserId::new();
        store.provision_account(user, "root", 100).await.unwrap();
        let ledger = QuotaLedger::new(store.clone());

        let mut uow = store.begin(user).await.unwrap();
        QuotaLedger::adjust_entitlement_in(uow.as_mut(), 400).await.unwrap();
        drop(uow);
        assert_eq!(ledger.account(user).await.unwrap().max_storage_bytes, 100);

        let mut uow = store.begin(user).await.unwrap();
        QuotaLedger::adjust_entitlement_in(uow.as_mut(), 400).await.unwrap();
        uow.commit().await.unwrap();
        assert_eq!(ledger.remaining_bytes(user).await.unwrap(), 500);
    }
}
