//! Directory entity model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use stowage_core::types::{DirectoryId, UserId};

/// A directory in a user's storage hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct DirectoryNode {
    /// Unique directory identifier.
    pub id: DirectoryId,
    /// The directory owner. Never changes.
    pub owner_id: UserId,
    /// Parent directory (None only for the user's root).
    pub parent_id: Option<DirectoryId>,
    /// Directory name.
    pub name: String,
    /// Ancestor ids ordered from the root down to the direct parent.
    pub ancestor_path: Vec<DirectoryId>,
    /// Sum of committed bytes in this directory and all descendants.
    pub aggregate_size_bytes: i64,
    /// When the directory was moved to the trash.
    pub trashed_at: Option<DateTime<Utc>>,
    /// When the directory was created.
    pub created_at: DateTime<Utc>,
    /// When the directory was last updated.
    pub updated_at: DateTime<Utc>,
}

impl DirectoryNode {
    /// Check if this is the user's root directory.
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// Check if the directory is in the trash.
    pub fn is_trashed(&self) -> bool {
        self.trashed_at.is_some()
    }

    /// Depth in the tree (0 for the root).
    pub fn depth(&self) -> usize {
        self.ancestor_path.len()
    }

    /// Every directory whose aggregate includes this one: ancestors then self.
    pub fn chain(&self) -> Vec<DirectoryId> {
        let mut chain = self.ancestor_path.clone();
        chain.push(self.id);
        chain
    }

    /// The ancestor path a direct child of this directory carries.
    pub fn child_ancestor_path(&self) -> Vec<DirectoryId> {
        self.chain()
    }

    /// Whether `other` is this directory or one of its ancestors.
    pub fn is_within(&self, other: DirectoryId) -> bool {
        self.id == other || self.ancestor_path.contains(&other)
    }
}

/// Data required to create a new directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateDirectory {
    /// Pre-generated identifier.
    pub id: DirectoryId,
    /// The directory owner.
    pub owner_id: UserId,
    /// Parent directory (None for the root).
    pub parent_id: Option<DirectoryId>,
    /// Directory name.
    pub name: String,
    /// Ancestor ids, root first.
    pub ancestor_path: Vec<DirectoryId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(ancestors: Vec<DirectoryId>) -> DirectoryNode {
        let now = Utc::now();
        DirectoryNode {
            id: DirectoryId::new(),
            owner_id: UserId::new(),
            parent_id: ancestors.last().copied(),
            name: "docs".into(),
            ancestor_path: ancestors,
            aggregate_size_bytes: 0,
            trashed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_chain_ends_with_self() {
        let root = DirectoryId::new();
        let mid = DirectoryId::new();
        let dir = node(vec![root, mid]);
        assert_eq!(dir.chain(), vec![root, mid, dir.id]);
        assert_eq!(dir.depth(), 2);
        assert!(!dir.is_root());
    }

    #[test]
    fn test_is_within() {
        let root = DirectoryId::new();
        let dir = node(vec![root]);
        assert!(dir.is_within(root));
        assert!(dir.is_within(dir.id));
        assert!(!dir.is_within(DirectoryId::new()));
    }
}
