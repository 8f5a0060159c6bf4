//! Storage-agnostic metadata store traits.
//!
//! Every mutation of a user's hierarchy, documents, quota counters, or
//! subscriptions happens inside a [`UnitOfWork`] opened with
//! [`MetadataStore::begin`]. A unit of work holds that user's lock until it
//! is committed or dropped; dropping it without calling
//! [`UnitOfWork::commit`] rolls every write back.
//!
//! Methods on [`MetadataStore`] itself are unlocked point reads. They must
//! never be called while the caller holds an open unit of work.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use stowage_core::result::AppResult;
use stowage_core::types::{DirectoryId, DocumentId, UserId};
use stowage_entity::billing::{PaymentProvider, SubscriptionRecord};
use stowage_entity::directory::{CreateDirectory, DirectoryNode};
use stowage_entity::document::{CreateDocument, DocumentRecord, UploadState};
use stowage_entity::quota::QuotaAccount;

/// Result of provisioning an account.
#[derive(Debug, Clone)]
pub struct ProvisionedAccount {
    /// The quota account (new or pre-existing).
    pub account: QuotaAccount,
    /// The account's root directory.
    pub root: DirectoryNode,
    /// Whether this call created the account.
    pub created: bool,
}

/// Entry point to the persisted metadata.
#[async_trait]
pub trait MetadataStore: Send + Sync + std::fmt::Debug + 'static {
    /// Open a unit of work holding `user_id`'s lock.
    ///
    /// Fails with `NotFound` if the user has no quota account.
    async fn begin(&self, user_id: UserId) -> AppResult<Box<dyn UnitOfWork>>;

    /// Create the quota account and root directory for a user.
    ///
    /// Returns the existing account untouched when one is already present.
    async fn provision_account(
        &self,
        user_id: UserId,
        root_name: &str,
        max_storage_bytes: i64,
    ) -> AppResult<ProvisionedAccount>;

    /// Find a user's quota account.
    async fn find_account(&self, user_id: UserId) -> AppResult<Option<QuotaAccount>>;

    /// List every provisioned user.
    async fn list_user_ids(&self) -> AppResult<Vec<UserId>>;

    /// Find a directory by id.
    async fn find_directory(&self, id: DirectoryId) -> AppResult<Option<DirectoryNode>>;

    /// Find a document by id.
    async fn find_document(&self, id: DocumentId) -> AppResult<Option<DocumentRecord>>;

    /// Reserved documents created before `created_before`, oldest first.
    async fn find_stale_reservations(
        &self,
        created_before: DateTime<Utc>,
        limit: u32,
    ) -> AppResult<Vec<DocumentRecord>>;

    /// Directories trashed before `trashed_before`, shallowest first.
    async fn find_expired_trashed_directories(
        &self,
        trashed_before: DateTime<Utc>,
        limit: u32,
    ) -> AppResult<Vec<DirectoryNode>>;

    /// Documents trashed before `trashed_before`.
    async fn find_expired_trashed_documents(
        &self,
        trashed_before: DateTime<Utc>,
        limit: u32,
    ) -> AppResult<Vec<DocumentRecord>>;

    /// Find a subscription by its provider-side identity.
    async fn find_subscription(
        &self,
        provider: PaymentProvider,
        provider_subscription_id: &str,
    ) -> AppResult<Option<SubscriptionRecord>>;

    /// List a user's subscriptions, newest first.
    async fn list_subscriptions(&self, user_id: UserId) -> AppResult<Vec<SubscriptionRecord>>;

    /// Check backend connectivity.
    async fn health_check(&self) -> AppResult<bool>;
}

/// A transaction scoped to one user's lock.
///
/// All reads return the unit of work's own view, including its uncommitted
/// writes. Reads of rows owned by another user return `None`.
#[async_trait]
pub trait UnitOfWork: Send {
    /// The user whose lock this unit of work holds.
    fn user_id(&self) -> UserId;

    /// The locked quota account.
    async fn account(&mut self) -> AppResult<QuotaAccount>;

    /// Add `delta` to `used_storage_bytes`.
    ///
    /// Fails with `ConcurrencyConflict` if the counter would go negative.
    async fn add_used_bytes(&mut self, delta: i64) -> AppResult<QuotaAccount>;

    /// Add `delta` to `max_storage_bytes`.
    ///
    /// Fails with `ConcurrencyConflict` if the ceiling would go negative.
    async fn add_max_bytes(&mut self, delta: i64) -> AppResult<QuotaAccount>;

    /// Overwrite `used_storage_bytes` (reconciliation only).
    async fn set_used_bytes(&mut self, used: i64) -> AppResult<()>;

    /// Find one of the user's directories.
    async fn directory(&mut self, id: DirectoryId) -> AppResult<Option<DirectoryNode>>;

    /// Insert a directory.
    async fn insert_directory(&mut self, data: &CreateDirectory) -> AppResult<DirectoryNode>;

    /// Add `delta` to the aggregate of every listed directory.
    ///
    /// Only rows that exist, belong to the user, and stay non-negative are
    /// updated; the number of updated rows is returned so the caller can
    /// detect a partial chain.
    async fn add_directory_sizes(&mut self, ids: &[DirectoryId], delta: i64) -> AppResult<u64>;

    /// Count how many of the listed directories exist for this user.
    async fn count_directories(&mut self, ids: &[DirectoryId]) -> AppResult<u64>;

    /// Overwrite one directory's aggregate (reconciliation only).
    async fn set_directory_size(&mut self, id: DirectoryId, size_bytes: i64) -> AppResult<()>;

    /// Rewrite a directory's parent and ancestor path.
    async fn set_directory_placement(
        &mut self,
        id: DirectoryId,
        parent_id: Option<DirectoryId>,
        ancestor_path: &[DirectoryId],
    ) -> AppResult<()>;

    /// Set or clear `trashed_at` on the listed directories.
    async fn set_directories_trashed(
        &mut self,
        ids: &[DirectoryId],
        trashed_at: Option<DateTime<Utc>>,
    ) -> AppResult<u64>;

    /// The directory itself plus every directory whose ancestor path contains it.
    async fn subtree_directories(&mut self, root: DirectoryId) -> AppResult<Vec<DirectoryNode>>;

    /// Every directory the user owns.
    async fn all_directories(&mut self) -> AppResult<Vec<DirectoryNode>>;

    /// Delete the listed directories.
    async fn delete_directories(&mut self, ids: &[DirectoryId]) -> AppResult<u64>;

    /// Find one of the user's documents.
    async fn document(&mut self, id: DocumentId) -> AppResult<Option<DocumentRecord>>;

    /// Insert a document in the `Reserved` state.
    async fn insert_document(&mut self, data: &CreateDocument) -> AppResult<DocumentRecord>;

    /// Check-and-set a document from `from` to `to`, writing `size_bytes`.
    ///
    /// Returns `None` when the document is gone or not in `from`.
    async fn transition_document(
        &mut self,
        id: DocumentId,
        from: UploadState,
        to: UploadState,
        size_bytes: i64,
    ) -> AppResult<Option<DocumentRecord>>;

    /// Delete a document only if it is still `Reserved`.
    async fn delete_reserved_document(&mut self, id: DocumentId)
    -> AppResult<Option<DocumentRecord>>;

    /// Documents directly inside any of the listed directories.
    async fn documents_in(&mut self, directory_ids: &[DirectoryId])
    -> AppResult<Vec<DocumentRecord>>;

    /// Every document the user owns.
    async fn all_documents(&mut self) -> AppResult<Vec<DocumentRecord>>;

    /// Set or clear `trashed_at` on the listed documents.
    async fn set_documents_trashed(
        &mut self,
        ids: &[DocumentId],
        trashed_at: Option<DateTime<Utc>>,
    ) -> AppResult<u64>;

    /// Delete the listed documents.
    async fn delete_documents(&mut self, ids: &[DocumentId]) -> AppResult<u64>;

    /// Find and lock a subscription by its provider-side identity.
    async fn subscription(
        &mut self,
        provider: PaymentProvider,
        provider_subscription_id: &str,
    ) -> AppResult<Option<SubscriptionRecord>>;

    /// Insert a new subscription record.
    async fn insert_subscription(&mut self, record: &SubscriptionRecord) -> AppResult<()>;

    /// Persist every mutable field of a subscription record.
    async fn update_subscription(&mut self, record: &SubscriptionRecord) -> AppResult<()>;

    /// Make every write visible and release the lock.
    async fn commit(self: Box<Self>) -> AppResult<()>;
}
