//! Directory tree entities.

pub mod model;

pub use model::{CreateDirectory, DirectoryNode};
