//! Core traits defined in `stowage-core` and implemented by other crates.

pub mod storage;

pub use storage::{ContentDisposition, DeleteReport, ObjectHead, ObjectStore, PresignedUrl};
