//! PostgreSQL implementation of the metadata store.
//!
//! A unit of work is one transaction that starts by locking the user's
//! `quota_accounts` row with `SELECT ... FOR UPDATE`. Every counter update
//! is an atomic `SET x = x + $delta`, so serialized units of work never
//! lose an update.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{debug, info};

use stowage_core::error::{AppError, ErrorKind};
use stowage_core::result::AppResult;
use stowage_core::types::{DirectoryId, DocumentId, UserId};
use stowage_entity::billing::{PaymentProvider, SubscriptionRecord};
use stowage_entity::directory::{CreateDirectory, DirectoryNode};
use stowage_entity::document::{CreateDocument, DocumentRecord, UploadState};
use stowage_entity::quota::QuotaAccount;

use crate::connection::DatabasePool;
use crate::repositories::{
    DirectoryRepository, DocumentRepository, QuotaAccountRepository, SubscriptionRepository,
};
use crate::store::{MetadataStore, ProvisionedAccount, UnitOfWork};

/// Metadata store backed by PostgreSQL.
#[derive(Debug, Clone)]
pub struct PgMetadataStore {
    db: DatabasePool,
    directories: DirectoryRepository,
    documents: DocumentRepository,
    accounts: QuotaAccountRepository,
    subscriptions: SubscriptionRepository,
}

impl PgMetadataStore {
    /// Create a store over an existing pool.
    pub fn new(db: DatabasePool) -> Self {
        let pool = db.pool().clone();
        Self {
            directories: DirectoryRepository::new(pool.clone()),
            documents: DocumentRepository::new(pool.clone()),
            accounts: QuotaAccountRepository::new(pool.clone()),
            subscriptions: SubscriptionRepository::new(pool),
            db,
        }
    }

    fn pool(&self) -> &PgPool {
        self.db.pool()
    }

    async fn start(&self) -> AppResult<Transaction<'static, Postgres>> {
        self.pool().begin().await.map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to begin transaction", e)
        })
    }
}

#[async_trait]
impl MetadataStore for PgMetadataStore {
    async fn begin(&self, user_id: UserId) -> AppResult<Box<dyn UnitOfWork>> {
        let mut tx = self.start().await?;
        let account = QuotaAccountRepository::lock(&mut tx, user_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Account {user_id} not provisioned")))?;
        debug!(user_id = %user_id, "Acquired account lock");
        Ok(Box::new(PgUnitOfWork {
            tx,
            user_id,
            account,
        }))
    }

    async fn provision_account(
        &self,
        user_id: UserId,
        root_name: &str,
        max_storage_bytes: i64,
    ) -> AppResult<ProvisionedAccount> {
        let mut tx = self.start().await?;
        let root_id = DirectoryId::new();

        let Some(account) =
            QuotaAccountRepository::create_if_absent(&mut tx, user_id, root_id, max_storage_bytes)
                .await?
        else {
            tx.rollback().await.map_err(|e| {
                AppError::with_source(ErrorKind::Database, "Failed to roll back", e)
            })?;
            let account = self
                .accounts
                .find_by_user(user_id)
                .await?
                .ok_or_else(|| AppError::conflict(format!("Account {user_id} is being provisioned")))?;
            let root = self
                .directories
                .find_by_id(account.root_directory_id)
                .await?
                .ok_or_else(|| {
                    AppError::internal(format!("Root directory of {user_id} is missing"))
                })?;
            return Ok(ProvisionedAccount {
                account,
                root,
                created: false,
            });
        };

        let root = DirectoryRepository::create(
            &mut tx,
            &CreateDirectory {
                id: root_id,
                owner_id: user_id,
                parent_id: None,
                name: root_name.to_string(),
                ancestor_path: Vec::new(),
            },
        )
        .await?;

        tx.commit().await.map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to commit provisioning", e)
        })?;

        info!(user_id = %user_id, root_directory_id = %root.id, "Provisioned account");
        Ok(ProvisionedAccount {
            account,
            root,
            created: true,
        })
    }

    async fn find_account(&self, user_id: UserId) -> AppResult<Option<QuotaAccount>> {
        self.accounts.find_by_user(user_id).await
    }

    async fn list_user_ids(&self) -> AppResult<Vec<UserId>> {
        self.accounts.list_user_ids().await
    }

    async fn find_directory(&self, id: DirectoryId) -> AppResult<Option<DirectoryNode>> {
        self.directories.find_by_id(id).await
    }

    async fn find_document(&self, id: DocumentId) -> AppResult<Option<DocumentRecord>> {
        self.documents.find_by_id(id).await
    }

    async fn find_stale_reservations(
        &self,
        created_before: DateTime<Utc>,
        limit: u32,
    ) -> AppResult<Vec<DocumentRecord>> {
        self.documents.find_reserved_before(created_before, limit).await
    }

    async fn find_expired_trashed_directories(
        &self,
        trashed_before: DateTime<Utc>,
        limit: u32,
    ) -> AppResult<Vec<DirectoryNode>> {
        self.directories.find_trashed_before(trashed_before, limit).await
    }

    async fn find_expired_trashed_documents(
        &self,
        trashed_before: DateTime<Utc>,
        limit: u32,
    ) -> AppResult<Vec<DocumentRecord>> {
        self.documents.find_trashed_before(trashed_before, limit).await
    }

    async fn find_subscription(
        &self,
        provider: PaymentProvider,
        provider_subscription_id: &str,
    ) -> AppResult<Option<SubscriptionRecord>> {
        self.subscriptions
            .find_by_provider_id(provider, provider_subscription_id)
            .await
    }

    async fn list_subscriptions(&self, user_id: UserId) -> AppResult<Vec<SubscriptionRecord>> {
        self.subscriptions.find_by_user(user_id).await
    }

    async fn health_check(&self) -> AppResult<bool> {
        self.db.health_check().await
    }
}

/// One PostgreSQL transaction holding a user's account row lock.
pub struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
    user_id: UserId,
    account: QuotaAccount,
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    fn user_id(&self) -> UserId {
        self.user_id
    }

    async fn account(&mut self) -> AppResult<QuotaAccount> {
        Ok(self.account.clone())
    }

    async fn add_used_bytes(&mut self, delta: i64) -> AppResult<QuotaAccount> {
        let account = QuotaAccountRepository::add_used(&mut self.tx, self.user_id, delta)
            .await?
            .ok_or_else(|| {
                AppError::conflict(format!(
                    "Used bytes of {} would become negative (delta {delta})",
                    self.user_id
                ))
            })?;
        self.account = account.clone();
        Ok(account)
    }

    async fn add_max_bytes(&mut self, delta: i64) -> AppResult<QuotaAccount> {
        let account = QuotaAccountRepository::add_max(&mut self.tx, self.user_id, delta)
            .await?
            .ok_or_else(|| {
                AppError::conflict(format!(
                    "Entitlement of {} would become negative (delta {delta})",
                    self.user_id
                ))
            })?;
        self.account = account.clone();
        Ok(account)
    }

    async fn set_used_bytes(&mut self, used: i64) -> AppResult<()> {
        QuotaAccountRepository::set_used(&mut self.tx, self.user_id, used).await?;
        self.account.used_storage_bytes = used;
        Ok(())
    }

    async fn directory(&mut self, id: DirectoryId) -> AppResult<Option<DirectoryNode>> {
        DirectoryRepository::find_owned(&mut self.tx, self.user_id, id).await
    }

    async fn insert_directory(&mut self, data: &CreateDirectory) -> AppResult<DirectoryNode> {
        DirectoryRepository::create(&mut self.tx, data).await
    }

    async fn add_directory_sizes(&mut self, ids: &[DirectoryId], delta: i64) -> AppResult<u64> {
        DirectoryRepository::add_sizes(&mut self.tx, self.user_id, ids, delta).await
    }

    async fn count_directories(&mut self, ids: &[DirectoryId]) -> AppResult<u64> {
        DirectoryRepository::count_owned(&mut self.tx, self.user_id, ids).await
    }

    async fn set_directory_size(&mut self, id: DirectoryId, size_bytes: i64) -> AppResult<()> {
        DirectoryRepository::set_size(&mut self.tx, self.user_id, id, size_bytes).await
    }

    async fn set_directory_placement(
        &mut self,
        id: DirectoryId,
        parent_id: Option<DirectoryId>,
        ancestor_path: &[DirectoryId],
    ) -> AppResult<()> {
        DirectoryRepository::set_placement(&mut self.tx, self.user_id, id, parent_id, ancestor_path)
            .await
    }

    async fn set_directories_trashed(
        &mut self,
        ids: &[DirectoryId],
        trashed_at: Option<DateTime<Utc>>,
    ) -> AppResult<u64> {
        DirectoryRepository::set_trashed(&mut self.tx, self.user_id, ids, trashed_at).await
    }

    async fn subtree_directories(&mut self, root: DirectoryId) -> AppResult<Vec<DirectoryNode>> {
        DirectoryRepository::find_subtree(&mut self.tx, self.user_id, root).await
    }

    async fn all_directories(&mut self) -> AppResult<Vec<DirectoryNode>> {
        DirectoryRepository::find_all_owned(&mut self.tx, self.user_id).await
    }

    async fn delete_directories(&mut self, ids: &[DirectoryId]) -> AppResult<u64> {
        DirectoryRepository::delete_many(&mut self.tx, self.user_id, ids).await
    }

    async fn document(&mut self, id: DocumentId) -> AppResult<Option<DocumentRecord>> {
        DocumentRepository::find_owned(&mut self.tx, self.user_id, id).await
    }

    async fn insert_document(&mut self, data: &CreateDocument) -> AppResult<DocumentRecord> {
        DocumentRepository::create(&mut self.tx, data).await
    }

    async fn transition_document(
        &mut self,
        id: DocumentId,
        from: UploadState,
        to: UploadState,
        size_bytes: i64,
    ) -> AppResult<Option<DocumentRecord>> {
        DocumentRepository::transition(&mut self.tx, self.user_id, id, from, to, size_bytes).await
    }

    async fn delete_reserved_document(
        &mut self,
        id: DocumentId,
    ) -> AppResult<Option<DocumentRecord>> {
        DocumentRepository::delete_reserved(&mut self.tx, self.user_id, id).await
    }

    async fn documents_in(
        &mut self,
        directory_ids: &[DirectoryId],
    ) -> AppResult<Vec<DocumentRecord>> {
        DocumentRepository::find_in_directories(&mut self.tx, self.user_id, directory_ids).await
    }

    async fn all_documents(&mut self) -> AppResult<Vec<DocumentRecord>> {
        DocumentRepository::find_all_owned(&mut self.tx, self.user_id).await
    }

    async fn set_documents_trashed(
        &mut self,
        ids: &[DocumentId],
        trashed_at: Option<DateTime<Utc>>,
    ) -> AppResult<u64> {
        DocumentRepository::set_trashed(&mut self.tx, self.user_id, ids, trashed_at).await
    }

    async fn delete_documents(&mut self, ids: &[DocumentId]) -> AppResult<u64> {
        DocumentRepository::delete_many(&mut self.tx, self.user_id, ids).await
    }

    async fn subscription(
        &mut self,
        provider: PaymentProvider,
        provider_subscription_id: &str,
    ) -> AppResult<Option<SubscriptionRecord>> {
        SubscriptionRepository::lock(&mut self.tx, self.user_id, provider, provider_subscription_id)
            .await
    }

    async fn insert_subscription(&mut self, record: &SubscriptionRecord) -> AppResult<()> {
        SubscriptionRepository::create(&mut self.tx, record).await
    }

    async fn update_subscription(&mut self, record: &SubscriptionRecord) -> AppResult<()> {
        SubscriptionRepository::update(&mut self.tx, record).await
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        let user_id = self.user_id;
        self.tx.commit().await.map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to commit unit of work", e)
        })?;
        debug!(user_id = %user_id, "Committed unit of work");
        Ok(())
    }
}
