//! Service container shared by the server, worker, and CLI.

use std::sync::Arc;

use stowage_core::config::AppConfig;
use stowage_database::MetadataStore;
use stowage_storage::ObjectStoreGateway;

use crate::account::AccountService;
use crate::billing::BillingService;
use crate::deletion::{DeletionEngine, TrashPurger};
use crate::directory::DirectoryService;
use crate::document::DownloadService;
use crate::quota::{QuotaLedger, Reconciler, SizePropagationEngine};
use crate::upload::UploadCoordinator;

/// Every service, wired to one store and one object store gateway.
#[derive(Debug, Clone)]
pub struct Services {
    /// Account provisioning.
    pub accounts: Arc<AccountService>,
    /// Directory operations.
    pub directories: Arc<DirectoryService>,
    /// Upload protocol.
    pub uploads: Arc<UploadCoordinator>,
    /// Download links.
    pub downloads: Arc<DownloadService>,
    /// Recursive deletion.
    pub deletion: Arc<DeletionEngine>,
    /// Trash purge.
    pub purger: Arc<TrashPurger>,
    /// Quota reads.
    pub ledger: Arc<QuotaLedger>,
    /// Size deltas.
    pub propagation: Arc<SizePropagationEngine>,
    /// Counter reconciliation.
    pub reconciler: Arc<Reconciler>,
    /// Billing webhooks.
    pub billing: Arc<BillingService>,
}

impl Services {
    /// Build every service from configuration.
    pub fn build(
        config: &AppConfig,
        store: Arc<dyn MetadataStore>,
        gateway: Arc<ObjectStoreGateway>,
    ) -> Self {
        let deletion = Arc::new(DeletionEngine::new(store.clone(), gateway.clone()));
        Self {
            accounts: Arc::new(AccountService::new(store.clone(), config.quota.clone())),
            directories: Arc::new(DirectoryService::new(store.clone())),
            uploads: Arc::new(UploadCoordinator::new(
                store.clone(),
                gateway.clone(),
                config.upload.clone(),
            )),
            downloads: Arc::new(DownloadService::new(store.clone(), gateway)),
            purger: Arc::new(TrashPurger::new(
                store.clone(),
                deletion.clone(),
                config.quota.trash_retention_days,
            )),
            deletion,
            ledger: Arc::new(QuotaLedger::new(store.clone())),
            propagation: Arc::new(SizePropagationEngine::new(store.clone())),
            reconciler: Arc::new(Reconciler::new(store.clone())),
            billing: Arc::new(BillingService::new(store, &config.billing)),
        }
    }
}
