//! Metadata database settings.

use serde::{Deserialize, Serialize};
use validator::Validate;

/// PostgreSQL pool and session settings for the metadata store.
///
/// Every unit of work holds a `FOR UPDATE` lock on the owner's quota row for
/// its whole transaction, so the pool is sized and timed around lock waits:
/// `lock_wait_timeout_seconds` bounds how long a writer queues behind another
/// writer of the same user, and `statement_timeout_seconds` bounds how long a
/// stuck statement can keep both the lock and its pool slot.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL.
    #[validate(length(min = 1))]
    pub url: String,
    /// Pool ceiling. Also the maximum number of concurrently open units of work.
    #[serde(default = "default_max_connections")]
    #[validate(range(min = 1, max = 1_000))]
    pub max_connections: u32,
    /// Connections kept warm.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    /// Seconds to wait for a free pool slot. Must cover a full lock wait.
    #[serde(default = "default_acquire_timeout")]
    #[validate(range(min = 1, max = 300))]
    pub acquire_timeout_seconds: u64,
    /// Idle connection lifetime in seconds.
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_seconds: u64,
    /// Session `lock_timeout`: seconds a unit of work waits for a user's row lock.
    #[serde(default = "default_lock_wait_timeout")]
    #[validate(range(min = 1, max = 300))]
    pub lock_wait_timeout_seconds: u64,
    /// Session `statement_timeout` in seconds.
    #[serde(default = "default_statement_timeout")]
    #[validate(range(min = 1, max = 3_600))]
    pub statement_timeout_seconds: u64,
}

impl DatabaseConfig {
    /// Whether a unit of work blocked on a lock gives up before its caller
    /// gives up waiting for a pool slot.
    pub fn lock_wait_fits_acquire(&self) -> bool {
        self.lock_wait_timeout_seconds <= self.acquire_timeout_seconds
    }
}

fn default_max_connections() -> u32 {
    20
}

fn default_min_connections() -> u32 {
    2
}

fn default_acquire_timeout() -> u64 {
    15
}

fn default_idle_timeout() -> u64 {
    600
}

fn default_lock_wait_timeout() -> u64 {
    10
}

fn default_statement_timeout() -> u64 {
    30
}
