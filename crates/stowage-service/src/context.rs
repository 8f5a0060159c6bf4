//! Request context carrying the pre-authenticated user.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stowage_core::types::{DirectoryId, UserId};
use stowage_entity::quota::QuotaAccount;

/// Context for the current request.
///
/// Supplied by the identity layer and passed into service methods so that
/// every operation knows *who* is acting. The identity layer is trusted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestContext {
    /// The acting user's ID.
    pub user_id: UserId,
    /// The user's root directory.
    pub root_directory_id: DirectoryId,
    /// When the request was received.
    pub request_time: DateTime<Utc>,
}

impl RequestContext {
    /// Creates a new request context.
    pub fn new(user_id: UserId, root_directory_id: DirectoryId) -> Self {
        Self {
            user_id,
            root_directory_id,
            request_time: Utc::now(),
        }
    }

    /// Context acting as the owner of an account (background jobs, CLI).
    pub fn for_account(account: &QuotaAccount) -> Self {
        Self::new(account.user_id, account.root_directory_id)
    }
}
