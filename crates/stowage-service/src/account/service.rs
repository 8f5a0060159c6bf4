//! Account service: creates a user's root directory and quota account.

use std::sync::Arc;

use tracing::info;

use stowage_core::config::QuotaConfig;
use stowage_core::error::AppError;
use stowage_core::result::AppResult;
use stowage_core::types::UserId;
use stowage_database::{MetadataStore, ProvisionedAccount};
use stowage_entity::quota::QuotaAccount;

use crate::context::RequestContext;

/// Name given to every root directory.
pub const ROOT_DIRECTORY_NAME: &str = "My Files";

/// Provisions and looks up accounts.
#[derive(Debug, Clone)]
pub struct AccountService {
    store: Arc<dyn MetadataStore>,
    config: QuotaConfig,
}

impl AccountService {
    /// Create a new account service.
    pub fn new(store: Arc<dyn MetadataStore>, config: QuotaConfig) -> Self {
        Self { store, config }
    }

    /// Provision a user with the default entitlement. Idempotent.
    pub async fn provision(&self, user_id: UserId) -> AppResult<ProvisionedAccount> {
        let provisioned = self
            .store
            .provision_account(
                user_id,
                ROOT_DIRECTORY_NAME,
                self.config.default_max_storage_bytes,
            )
            .await?;

        if provisioned.created {
            info!(
                user_id = %user_id,
                root_directory_id = %provisioned.root.id,
                max_storage_bytes = provisioned.account.max_storage_bytes,
                "Account provisioned"
            );
        }
        Ok(provisioned)
    }

    /// Find a provisioned account.
    pub async fn get_account(&self, user_id: UserId) -> AppResult<QuotaAccount> {
        self.store
            .find_account(user_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("User {user_id} is not provisioned")))
    }

    /// Build a request context acting as `user_id`.
    pub async fn context_for(&self, user_id: UserId) -> AppResult<RequestContext> {
        Ok(RequestContext::for_account(&self.get_account(user_id).await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stowage_database::MemoryStore;

    #[tokio::test]
    async fn test_provision_twice_keeps_first_account() {
        let service = AccountService::new(Arc::new(MemoryStore::new()), QuotaConfig::default());
        let user = UserId::new();

        let first = service.provision(user).await.unwrap();
        let second = service.provision(user).await.unwrap();

        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.root.id, second.root.id);
        assert_eq!(first.root.name, ROOT_DIRECTORY_NAME);

        let ctx = service.context_for(user).await.unwrap();
        assert_eq!(ctx.root_directory_id, first.root.id);
    }
}
