//! # stowage-database
//!
//! Metadata persistence for Stowage: the [`MetadataStore`] and
//! [`UnitOfWork`] traits, the PostgreSQL implementation with its
//! repositories and migrations, and an in-memory implementation.

pub mod connection;
pub mod memory;
pub mod migration;
pub mod postgres;
pub mod repositories;
pub mod store;

pub use connection::DatabasePool;
pub use memory::MemoryStore;
pub use postgres::PgMetadataStore;
pub use store::{MetadataStore, ProvisionedAccount, UnitOfWork};
