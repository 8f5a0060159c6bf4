//! In-memory implementation of the metadata store.
//!
//! A unit of work takes the store-wide mutex, mutates a private copy of the
//! state, and publishes the copy on commit. Dropping it without committing
//! discards the copy. Used by tests and local tooling.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

use stowage_core::error::AppError;
use stowage_core::result::AppResult;
use stowage_core::types::{DirectoryId, DocumentId, SubscriptionId, UserId};
use stowage_entity::billing::{PaymentProvider, SubscriptionRecord};
use stowage_entity::directory::{CreateDirectory, DirectoryNode};
use stowage_entity::document::{CreateDocument, DocumentRecord, UploadState};
use stowage_entity::quota::QuotaAccount;

use crate::store::{MetadataStore, ProvisionedAccount, UnitOfWork};

/// Complete store contents.
#[derive(Debug, Clone, Default)]
pub struct MemoryState {
    /// Quota accounts by user.
    pub accounts: HashMap<UserId, QuotaAccount>,
    /// Directories by id.
    pub directories: BTreeMap<DirectoryId, DirectoryNode>,
    /// Documents by id.
    pub documents: BTreeMap<DocumentId, DocumentRecord>,
    /// Subscriptions by id.
    pub subscriptions: BTreeMap<SubscriptionId, SubscriptionRecord>,
}

/// Metadata store kept entirely in process memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
    fail_next_commit: Arc<AtomicBool>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Clone the committed state.
    pub async fn snapshot(&self) -> MemoryState {
        self.state.lock().await.clone()
    }

    /// Make the next commit fail with a database error, discarding its writes.
    pub fn fail_next_commit(&self) {
        self.fail_next_commit.store(true, Ordering::SeqCst);
    }

    /// Apply a mutation to the committed state directly, bypassing every
    /// invariant. Used to simulate out-of-band drift.
    pub async fn tamper<F>(&self, f: F)
    where
        F: FnOnce(&mut MemoryState),
    {
        let mut state = self.state.lock().await;
        f(&mut state);
    }
}

#[async_trait]
impl MetadataStore for MemoryStore {
    async fn begin(&self, user_id: UserId) -> AppResult<Box<dyn UnitOfWork>> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        if !guard.accounts.contains_key(&user_id) {
            return Err(AppError::not_found(format!(
                "Account {user_id} not provisioned"
            )));
        }
        let working = guard.clone();
        Ok(Box::new(MemoryUnitOfWork {
            guard,
            working,
            user_id,
            fail_commit: Arc::clone(&self.fail_next_commit),
        }))
    }

    async fn provision_account(
        &self,
        user_id: UserId,
        root_name: &str,
        max_storage_bytes: i64,
    ) -> AppResult<ProvisionedAccount> {
        let mut state = self.state.lock().await;

        if let Some(account) = state.accounts.get(&user_id).cloned() {
            let root = state
                .directories
                .get(&account.root_directory_id)
                .cloned()
                .ok_or_else(|| AppError::internal(format!("Root directory of {user_id} is missing")))?;
            return Ok(ProvisionedAccount {
                account,
                root,
                created: false,
            });
        }

        let now = Utc::now();
        let root = DirectoryNode {
            id: DirectoryId::new(),
            owner_id: user_id,
            parent_id: None,
            name: root_name.to_string(),
            ancestor_path: Vec::new(),
            aggregate_size_bytes: 0,
            trashed_at: None,
            created_at: now,
            updated_at: now,
        };
        let account = QuotaAccount {
            user_id,
            root_directory_id: root.id,
            max_storage_bytes,
            used_storage_bytes: 0,
            created_at: now,
            updated_at: now,
        };
        state.directories.insert(root.id, root.clone());
        state.accounts.insert(user_id, account.clone());

        Ok(ProvisionedAccount {
            account,
            root,
            created: true,
        })
    }

    async fn find_account(&self, user_id: UserId) -> AppResult<Option<QuotaAccount>> {
        Ok(self.state.lock().await.accounts.get(&user_id).cloned())
    }

    async fn list_user_ids(&self) -> AppResult<Vec<UserId>> {
        let state = self.state.lock().await;
        let mut accounts: Vec<&QuotaAccount> = state.accounts.values().collect();
        accounts.sort_by_key(|a| a.created_at);
        Ok(accounts.into_iter().map(|a| a.user_id).collect())
    }

    async fn find_directory(&self, id: DirectoryId) -> AppResult<Option<DirectoryNode>> {
        Ok(self.state.lock().await.directories.get(&id).cloned())
    }

    async fn find_document(&self, id: DocumentId) -> AppResult<Option<DocumentRecord>> {
        Ok(self.state.lock().await.documents.get(&id).cloned())
    }

    async fn find_stale_reservations(
        &self,
        created_before: DateTime<Utc>,
        limit: u32,
    ) -> AppResult<Vec<DocumentRecord>> {
        let state = self.state.lock().await;
        let mut docs: Vec<DocumentRecord> = state
            .documents
            .values()
            .filter(|d| d.upload_state == UploadState::Reserved && d.created_at < created_before)
            .cloned()
            .collect();
        docs.sort_by_key(|d| d.created_at);
        docs.truncate(limit as usize);
        Ok(docs)
    }

    async fn find_expired_trashed_directories(
        &self,
        trashed_before: DateTime<Utc>,
        limit: u32,
    ) -> AppResult<Vec<DirectoryNode>> {
        let state = self.state.lock().await;
        let mut dirs: Vec<DirectoryNode> = state
            .directories
            .values()
            .filter(|d| d.trashed_at.is_some_and(|t| t < trashed_before))
            .cloned()
            .collect();
        dirs.sort_by_key(|d| (d.depth(), d.trashed_at));
        dirs.truncate(limit as usize);
        Ok(dirs)
    }

    async fn find_expired_trashed_documents(
        &self,
        trashed_before: DateTime<Utc>,
        limit: u32,
    ) -> AppResult<Vec<DocumentRecord>> {
        let state = self.state.lock().await;
        let mut docs: Vec<DocumentRecord> = state
            .documents
            .values()
            .filter(|d| d.trashed_at.is_some_and(|t| t < trashed_before))
            .cloned()
            .collect();
        docs.sort_by_key(|d| d.trashed_at);
        docs.truncate(limit as usize);
        Ok(docs)
    }

    async fn find_subscription(
        &self,
        provider: PaymentProvider,
        provider_subscription_id: &str,
    ) -> AppResult<Option<SubscriptionRecord>> {
        let state = self.state.lock().await;
        Ok(state
            .subscriptions
            .values()
            .find(|s| s.provider == provider && s.provider_subscription_id == provider_subscription_id)
            .cloned())
    }

    async fn list_subscriptions(&self, user_id: UserId) -> AppResult<Vec<SubscriptionRecord>> {
        let state = self.state.lock().await;
        let mut subs: Vec<SubscriptionRecord> = state
            .subscriptions
            .values()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect();
        subs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(subs)
    }

    async fn health_check(&self) -> AppResult<bool> {
        Ok(true)
    }
}

/// A unit of work over a private copy of [`MemoryState`].
pub struct MemoryUnitOfWork {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
    user_id: UserId,
    fail_commit: Arc<AtomicBool>,
}

impl MemoryUnitOfWork {
    fn account_mut(&mut self) -> AppResult<&mut QuotaAccount> {
        let user_id = self.user_id;
        self.working
            .accounts
            .get_mut(&user_id)
            .ok_or_else(|| AppError::not_found(format!("Account {user_id} not provisioned")))
    }

    fn owned_directory_mut(&mut self, id: DirectoryId) -> Option<&mut DirectoryNode> {
        let user_id = self.user_id;
        self.working
            .directories
            .get_mut(&id)
            .filter(|d| d.owner_id == user_id)
    }
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    fn user_id(&self) -> UserId {
        self.user_id
    }

    async fn account(&mut self) -> AppResult<QuotaAccount> {
        Ok(self.account_mut()?.clone())
    }

    async fn add_used_bytes(&mut self, delta: i64) -> AppResult<QuotaAccount> {
        let user_id = self.user_id;
        let account = self.account_mut()?;
        let next = account.used_storage_bytes + delta;
        if next < 0 {
            return Err(AppError::conflict(format!(
                "Used bytes of {user_id} would become negative (delta {delta})"
            )));
        }
        account.used_storage_bytes = next;
        account.updated_at = Utc::now();
        Ok(account.clone())
    }

    async fn add_max_bytes(&mut self, delta: i64) -> AppResult<QuotaAccount> {
        let user_id = self.user_id;
        let account = self.account_mut()?;
        let next = account.max_storage_bytes + delta;
        if next < 0 {
            return Err(AppError::conflict(format!(
                "Entitlement of {user_id} would become negative (delta {delta})"
            )));
        }
        account.max_storage_bytes = next;
        account.updated_at = Utc::now();
        Ok(account.clone())
    }

    async fn set_used_bytes(&mut self, used: i64) -> AppResult<()> {
        let account = self.account_mut()?;
        account.used_storage_bytes = used;
        account.updated_at = Utc::now();
        Ok(())
    }

    async fn directory(&mut self, id: DirectoryId) -> AppResult<Option<DirectoryNode>> {
        Ok(self.owned_directory_mut(id).map(|d| d.clone()))
    }

    async fn insert_directory(&mut self, data: &CreateDirectory) -> AppResult<DirectoryNode> {
        if self.working.directories.contains_key(&data.id) {
            return Err(AppError::conflict(format!(
                "Directory {} already exists",
                data.id
            )));
        }
        let now = Utc::now();
        let node = DirectoryNode {
            id: data.id,
            owner_id: data.owner_id,
            parent_id: data.parent_id,
            name: data.name.clone(),
            ancestor_path: data.ancestor_path.clone(),
            aggregate_size_bytes: 0,
            trashed_at: None,
            created_at: now,
            updated_at: now,
        };
        self.working.directories.insert(node.id, node.clone());
        Ok(node)
    }

    async fn add_directory_sizes(&mut self, ids: &[DirectoryId], delta: i64) -> AppResult<u64> {
        let now = Utc::now();
        let mut updated = 0;
        for id in ids {
            if let Some(dir) = self.owned_directory_mut(*id) {
                let next = dir.aggregate_size_bytes + delta;
                if next >= 0 {
                    dir.aggregate_size_bytes = next;
                    dir.updated_at = now;
                    updated += 1;
                }
            }
        }
        Ok(updated)
    }

    async fn count_directories(&mut self, ids: &[DirectoryId]) -> AppResult<u64> {
        let user_id = self.user_id;
        Ok(ids
            .iter()
            .filter(|id| {
                self.working
                    .directories
                    .get(id)
                    .is_some_and(|d| d.owner_id == user_id)
            })
            .count() as u64)
    }

    async fn set_directory_size(&mut self, id: DirectoryId, size_bytes: i64) -> AppResult<()> {
        if let Some(dir) = self.owned_directory_mut(id) {
            dir.aggregate_size_bytes = size_bytes;
            dir.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn set_directory_placement(
        &mut self,
        id: DirectoryId,
        parent_id: Option<DirectoryId>,
        ancestor_path: &[DirectoryId],
    ) -> AppResult<()> {
        if let Some(dir) = self.owned_directory_mut(id) {
            dir.parent_id = parent_id;
            dir.ancestor_path = ancestor_path.to_vec();
            dir.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn set_directories_trashed(
        &mut self,
        ids: &[DirectoryId],
        trashed_at: Option<DateTime<Utc>>,
    ) -> AppResult<u64> {
        let now = Utc::now();
        let mut updated = 0;
        for id in ids {
            if let Some(dir) = self.owned_directory_mut(*id) {
                dir.trashed_at = trashed_at;
                dir.updated_at = now;
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn subtree_directories(&mut self, root: DirectoryId) -> AppResult<Vec<DirectoryNode>> {
        let user_id = self.user_id;
        let mut dirs: Vec<DirectoryNode> = self
            .working
            .directories
            .values()
            .filter(|d| d.owner_id == user_id && d.is_within(root))
            .cloned()
            .collect();
        dirs.sort_by_key(|d| d.depth());
        Ok(dirs)
    }

    async fn all_directories(&mut self) -> AppResult<Vec<DirectoryNode>> {
        let user_id = self.user_id;
        let mut dirs: Vec<DirectoryNode> = self
            .working
            .directories
            .values()
            .filter(|d| d.owner_id == user_id)
            .cloned()
            .collect();
        dirs.sort_by_key(|d| d.depth());
        Ok(dirs)
    }

    async fn delete_directories(&mut self, ids: &[DirectoryId]) -> AppResult<u64> {
        let user_id = self.user_id;
        for id in ids {
            let orphaned = self
                .working
                .documents
                .values()
                .any(|doc| doc.parent_id == *id && doc.owner_id == user_id);
            let has_child = self.working.directories.values().any(|d| {
                d.parent_id == Some(*id) && !ids.contains(&d.id)
            });
            if orphaned || has_child {
                return Err(AppError::database(format!(
                    "Directory {id} is still referenced"
                )));
            }
        }
        let mut deleted = 0;
        for id in ids {
            if self
                .working
                .directories
                .get(id)
                .is_some_and(|d| d.owner_id == user_id)
            {
                self.working.directories.remove(id);
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    async fn document(&mut self, id: DocumentId) -> AppResult<Option<DocumentRecord>> {
        let user_id = self.user_id;
        Ok(self
            .working
            .documents
            .get(&id)
            .filter(|d| d.owner_id == user_id)
            .cloned())
    }

    async fn insert_document(&mut self, data: &CreateDocument) -> AppResult<DocumentRecord> {
        if !self.working.directories.contains_key(&data.parent_id) {
            return Err(AppError::database(format!(
                "Directory {} does not exist",
                data.parent_id
            )));
        }
        let now = Utc::now();
        let doc = DocumentRecord {
            id: data.id,
            parent_id: data.parent_id,
            owner_id: data.owner_id,
            name: data.name.clone(),
            extension: data.extension(),
            content_type: data.content_type.clone(),
            size_bytes: data.declared_size_bytes,
            upload_state: UploadState::Reserved,
            trashed_at: None,
            created_at: now,
            updated_at: now,
            committed_at: None,
        };
        self.working.documents.insert(doc.id, doc.clone());
        Ok(doc)
    }

    async fn transition_document(
        &mut self,
        id: DocumentId,
        from: UploadState,
        to: UploadState,
        size_bytes: i64,
    ) -> AppResult<Option<DocumentRecord>> {
        let user_id = self.user_id;
        let Some(doc) = self
            .working
            .documents
            .get_mut(&id)
            .filter(|d| d.owner_id == user_id && d.upload_state == from)
        else {
            return Ok(None);
        };
        let now = Utc::now();
        doc.upload_state = to;
        doc.size_bytes = size_bytes;
        doc.updated_at = now;
        if to == UploadState::Committed {
            doc.committed_at = Some(now);
        }
        Ok(Some(doc.clone()))
    }

    async fn delete_reserved_document(
        &mut self,
        id: DocumentId,
    ) -> AppResult<Option<DocumentRecord>> {
        let user_id = self.user_id;
        let matches = self
            .working
            .documents
            .get(&id)
            .is_some_and(|d| d.owner_id == user_id && d.upload_state == UploadState::Reserved);
        if !matches {
            return Ok(None);
        }
        Ok(self.working.documents.remove(&id))
    }

    async fn documents_in(
        &mut self,
        directory_ids: &[DirectoryId],
    ) -> AppResult<Vec<DocumentRecord>> {
        let user_id = self.user_id;
        Ok(self
            .working
            .documents
            .values()
            .filter(|d| d.owner_id == user_id && directory_ids.contains(&d.parent_id))
            .cloned()
            .collect())
    }

    async fn all_documents(&mut self) -> AppResult<Vec<DocumentRecord>> {
        let user_id = self.user_id;
        Ok(self
            .working
            .documents
            .values()
            .filter(|d| d.owner_id == user_id)
            .cloned()
            .collect())
    }

    async fn set_documents_trashed(
        &mut self,
        ids: &[DocumentId],
        trashed_at: Option<DateTime<Utc>>,
    ) -> AppResult<u64> {
        let user_id = self.user_id;
        let now = Utc::now();
        let mut updated = 0;
        for id in ids {
            if let Some(doc) = self
                .working
                .documents
                .get_mut(id)
                .filter(|d| d.owner_id == user_id)
            {
                doc.trashed_at = trashed_at;
                doc.updated_at = now;
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn delete_documents(&mut self, ids: &[DocumentId]) -> AppResult<u64> {
        let user_id = self.user_id;
        let mut deleted = 0;
        for id in ids {
            if self
                .working
                .documents
                .get(id)
                .is_some_and(|d| d.owner_id == user_id)
            {
                self.working.documents.remove(id);
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    async fn subscription(
        &mut self,
        provider: PaymentProvider,
        provider_subscription_id: &str,
    ) -> AppResult<Option<SubscriptionRecord>> {
        let user_id = self.user_id;
        Ok(self
            .working
            .subscriptions
            .values()
            .find(|s| {
                s.user_id == user_id
                    && s.provider == provider
                    && s.provider_subscription_id == provider_subscription_id
            })
            .cloned())
    }

    async fn insert_subscription(&mut self, record: &SubscriptionRecord) -> AppResult<()> {
        let duplicate = self.working.subscriptions.values().any(|s| {
            s.provider == record.provider
                && s.provider_subscription_id == record.provider_subscription_id
        });
        if duplicate {
            return Err(AppError::conflict(format!(
                "Subscription {} {} already exists",
                record.provider, record.provider_subscription_id
            )));
        }
        self.working
            .subscriptions
            .insert(record.id, record.clone());
        Ok(())
    }

    async fn update_subscription(&mut self, record: &SubscriptionRecord) -> AppResult<()> {
        match self.working.subscriptions.get_mut(&record.id) {
            Some(existing) => {
                *existing = record.clone();
                Ok(())
            }
            None => Err(AppError::not_found(format!(
                "Subscription {} not found",
                record.id
            ))),
        }
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        let MemoryUnitOfWork {
            mut guard,
            working,
            user_id,
            fail_commit,
        } = *self;
        if fail_commit.swap(false, Ordering::SeqCst) {
            return Err(AppError::database("Injected commit failure"));
        }
        *guard = working;
        debug!(user_id = %user_id, "Committed unit of work");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_provision_is_idempotent() {
        let store = MemoryStore::new();
        let user = UserId::new();
        let first = store.provision_account(user, "root", 1000).await.unwrap();
        let second = store.provision_account(user, "root", 5000).await.unwrap();
        assert!(first.created);
        assert!(!second.created);
        assert_eq!(second.account.max_storage_bytes, 1000);
        assert_eq!(first.root.id, second.root.id);
    }

    #[tokio::test]
    async fn test_drop_without_commit_rolls_back() {
        let store = MemoryStore::new();
        let user = UserId::new();
        store.provision_account(user, "root", 1000).await.unwrap();

        {
            let mut uow = store.begin(user).await.unwrap();
            uow.add_used_bytes(10).await.unwrap();
        }

        let account = store.find_account(user).await.unwrap().unwrap();
        assert_eq!(account.used_storage_bytes, 0);
    }

    #[tokio::test]
    async fn test_commit_publishes_writes() {
        let store = MemoryStore::new();
        let user = UserId::new();
        let provisioned = store.provision_account(user, "root", 1000).await.unwrap();

        let mut uow = store.begin(user).await.unwrap();
        let updated = uow
            .add_directory_sizes(&[provisioned.root.id], 25)
            .await
            .unwrap();
        uow.add_used_bytes(25).await.unwrap();
        uow.commit().await.unwrap();

        assert_eq!(updated, 1);
        let root = store
            .find_directory(provisioned.root.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(root.aggregate_size_bytes, 25);
    }

    #[tokio::test]
    async fn test_negative_counters_rejected() {
        let store = MemoryStore::new();
        let user = UserId::new();
        let provisioned = store.provision_account(user, "root", 1000).await.unwrap();

        let mut uow = store.begin(user).await.unwrap();
        let updated = uow
            .add_directory_sizes(&[provisioned.root.id], -1)
            .await
            .unwrap();
        assert_eq!(updated, 0);
        let err = uow.add_used_bytes(-1).await.unwrap_err();
        assert_eq!(err.kind, stowage_core::error::ErrorKind::ConcurrencyConflict);
    }

    #[tokio::test]
    async fn test_injected_commit_failure_discards_writes() {
        let store = MemoryStore::new();
        let user = UserId::new();
        store.provision_account(user, "root", 1000).await.unwrap();

        store.fail_next_commit();
        let mut uow = store.begin(user).await.unwrap();
        uow.add_max_bytes(500).await.unwrap();
        assert!(uow.commit().await.is_err());

        let account = store.find_account(user).await.unwrap().unwrap();
        assert_eq!(account.max_storage_bytes, 1000);
    }

    #[tokio::test]
    async fn test_unprovisioned_user_cannot_begin() {
        let store = MemoryStore::new();
        let err = store.begin(UserId::new()).await.err().unwrap();
        assert_eq!(err.kind, stowage_core::error::ErrorKind::NotFound);
    }
}
