//! # stowage-storage
//!
//! Object store implementations for Stowage: the local filesystem store
//! with HMAC-signed URLs, the S3 store with presigned URLs (feature `s3`),
//! and the [`ObjectStoreGateway`] that bounds every call with a timeout.

pub mod gateway;
pub mod providers;
pub mod signing;

pub use gateway::{ObjectStoreGateway, build_object_store};
pub use providers::LocalObjectStore;
