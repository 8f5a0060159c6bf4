//! Quota accounting: size propagation, admission, and reconciliation.

pub mod ledger;
pub mod propagation;
pub mod reconcile;

pub use ledger::QuotaLedger;
pub use propagation::SizePropagationEngine;
pub use reconcile::{DirectoryCorrection, Reconciler, ReconciliationReport};
