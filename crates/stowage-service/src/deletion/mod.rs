//! Recursive deletion and trash purge.

pub mod engine;
pub mod purge;

pub use engine::{DeletionEngine, DeletionReport};
pub use purge::{PurgeReport, TrashPurger};
