//! # stowage-entity
//!
//! Domain entity models for Stowage. Every struct in this crate
//! represents a database table row or a domain value object. All entities
//! derive `Debug`, `Clone`, `Serialize`, `Deserialize`, and database
//! entities additionally derive `sqlx::FromRow`.

pub mod billing;
pub mod directory;
pub mod document;
pub mod job;
pub mod quota;
