//! Size propagation along a directory's ancestor chain.

use std::sync::Arc;

use tracing::{debug, warn};

use stowage_core::error::AppError;
use stowage_core::result::AppResult;
use stowage_core::types::DirectoryId;
use stowage_database::{MetadataStore, UnitOfWork};

/// Applies byte deltas to a directory, all its ancestors, and the owner's
/// `used_storage_bytes`.
///
/// Deltas are atomic increments under the owner's lock, so concurrent
/// deltas on the same chain never lose an update.
#[derive(Debug, Clone)]
pub struct SizePropagationEngine {
    store: Arc<dyn MetadataStore>,
}

impl SizePropagationEngine {
    /// Create a new engine.
    pub fn new(store: Arc<dyn MetadataStore>) -> Self {
        Self { store }
    }

    /// Apply `delta` to `directory_id`'s chain in its own unit of work.
    pub async fn apply_delta(&self, directory_id: DirectoryId, delta: i64) -> AppResult<()> {
        let directory = self
            .store
            .find_directory(directory_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Directory {directory_id} not found")))?;

        let mut uow = self.store.begin(directory.owner_id).await?;
        Self::apply_delta_in(uow.as_mut(), directory_id, delta).await?;
        uow.commit().await
    }

    /// Apply `delta` inside the caller's unit of work.
    ///
    /// Fails with `NotFound` if any node of the chain is missing and with
    /// `ConcurrencyConflict` if any counter would go negative. Either way
    /// the caller must drop the unit of work.
    pub async fn apply_delta_in(
        uow: &mut dyn UnitOfWork,
        directory_id: DirectoryId,
        delta: i64,
    ) -> AppResult<()> {
        if delta == 0 {
            return Ok(());
        }

        let directory = uow
            .directory(directory_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Directory {directory_id} not found")))?;

        Self::shift_chain(uow, &directory.chain(), delta).await?;
        uow.add_used_bytes(delta).await?;

        debug!(
            user_id = %uow.user_id(),
            directory_id = %directory_id,
            delta,
            "Size delta propagated"
        );
        Ok(())
    }

    /// Move `size` bytes of aggregate from one parent chain to another.
    ///
    /// Used when a subtree is re-parented. The owner's total is unchanged.
    pub async fn transfer_in(
        uow: &mut dyn UnitOfWork,
        from_parent: DirectoryId,
        to_parent: DirectoryId,
        size: i64,
    ) -> AppResult<()> {
        if size == 0 || from_parent == to_parent {
            return Ok(());
        }

        let from = uow
            .directory(from_parent)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Directory {from_parent} not found")))?;
        let to = uow
            .directory(to_parent)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Directory {to_parent} not found")))?;

        Self::shift_chain(uow, &from.chain(), -size).await?;
        Self::shift_chain(uow, &to.chain(), size).await
    }

    async fn shift_chain(
        uow: &mut dyn UnitOfWork,
        chain: &[DirectoryId],
        delta: i64,
    ) -> AppResult<()> {
        let expected = chain.len() as u64;
        let updated = uow.add_directory_sizes(chain, delta).await?;
        if updated == expected {
            return Ok(());
        }

        let present = uow.count_directories(chain).await?;
        if present < expected {
            warn!(
                user_id = %uow.user_id(),
                expected,
                present,
                "Ancestor chain is incomplete"
            );
            Err(AppError::not_found(
                "A directory in the ancestor chain no longer exists",
            ))
        } else {
            warn!(
                user_id = %uow.user_id(),
                delta,
                "Size delta would drive an aggregate negative"
            );
            Err(AppError::conflict(
                "Directory aggregate would become negative",
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stowage_core::error::ErrorKind;
    use stowage_core::types::UserId;
    use stowage_database::MemoryStore;
    use stowage_entity::directory::CreateDirectory;

    async fn setup() -> (Arc<MemoryStore>, UserId, DirectoryId, DirectoryId) {
        let store = Arc::new(MemoryStore::new());
        let user = UserId::new();
        let provisioned = store.provision_account(user, "root", 1_000).await.unwrap();
        let root = provisioned.root;

        let mut uow = store.begin(user).await.unwrap();
        let child = uow
            .insert_directory(&CreateDirectory {
                id: DirectoryId::new(),
                owner_id: user,
                parent_id: Some(root.id),
                name: "docs".into(),
                ancestor_path: root.child_ancestor_path(),
            })
            .await
            .unwrap();
        uow.commit().await.unwrap();
        (store, user, root.id, child.id)
    }

    #[tokio::test]
    async fn test_delta_reaches_every_ancestor_and_account() {
        let (store, user, root, child) = setup().await;
        let engine = SizePropagationEngine::new(store.clone());

        engine.apply_delta(child, 300).await.unwrap();

        assert_eq!(store.find_directory(child).await.unwrap().unwrap().aggregate_size_bytes, 300);
        assert_eq!(store.find_directory(root).await.unwrap().unwrap().aggregate_size_bytes, 300);
        assert_eq!(store.find_account(user).await.unwrap().unwrap().used_storage_bytes, 300);
    }

    #[tokio::test]
    async fn test_negative_result_fails_without_writes() {
        let (store, user, root, child) = setup().await;
        let engine = SizePropagationEngine::new(store.clone());
        engine.apply_delta(root, 100).await.unwrap();

        let err = engine.apply_delta(child, -50).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::ConcurrencyConflict);
        assert_eq!(store.find_directory(root).await.unwrap().unwrap().aggregate_size_bytes, 100);
        assert_eq!(store.find_account(user).await.unwrap().unwrap().used_storage_bytes, 100);
    }

    #[tokio::test]
    async fn test_missing_chain_node_is_not_found() {
        let (store, _user, root, child) = setup().await;
        store.tamper(|state| {
            state.directories.remove(&root);
        })
        .await;

        let err = SizePropagationEngine::new(store.clone())
            .apply_delta(child, 10)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
        assert_eq!(store.find_directory(child).await.unwrap().unwrap().aggregate_size_bytes, 0);
    }

    #[tokio::test]
    async fn test_concurrent_deltas_are_not_lost() {
        let (store, user, root, child) = setup().await;
        let engine = SizePropagationEngine::new(store.clone());

        let mut handles = Vec::new();
        for _ in 0..20 {
            let engine = engine.clone();
            handles.push(tokio::spawn(async move { engine.apply_delta(child, 7).await }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(store.find_directory(root).await.unwrap().unwrap().aggregate_size_bytes, 140);
        assert_eq!(store.find_account(user).await.unwrap().unwrap().used_storage_bytes, 140);
    }
}
