//! Quota accounting entities.

pub mod model;

pub use model::QuotaAccount;
