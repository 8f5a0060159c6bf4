//! PostgreSQL repository implementations for all Stowage entities.
//!
//! Each repository owns a pool for unlocked point reads and exposes
//! associated functions taking a `&mut PgConnection` for statements that
//! must run inside a [`crate::postgres::PgUnitOfWork`] transaction.

pub mod directory;
pub mod document;
pub mod quota;
pub mod subscription;

pub use directory::DirectoryRepository;
pub use document::DocumentRepository;
pub use quota::QuotaAccountRepository;
pub use subscription::SubscriptionRepository;
