//! # stowage-service
//!
//! Business logic for Stowage: size propagation and reconciliation, quota
//! admission, the reserve/verify/commit upload protocol, recursive deletion,
//! directory operations, download links, account provisioning, and the
//! billing entitlement state machine.
//!
//! Services follow constructor injection: all dependencies are provided
//! at construction time via `Arc` references.

pub mod account;
pub mod billing;
pub mod context;
pub mod deletion;
pub mod directory;
pub mod document;
pub mod quota;
pub mod services;
pub mod upload;

pub use account::AccountService;
pub use billing::{BillingService, EventOutcome, SignatureHeaders};
pub use context::RequestContext;
pub use deletion::{DeletionEngine, DeletionReport, PurgeReport, TrashPurger};
pub use directory::DirectoryService;
pub use document::{DownloadLink, DownloadService};
pub use quota::{QuotaLedger, Reconciler, ReconciliationReport, SizePropagationEngine};
pub use services::Services;
pub use upload::{ReserveUploadRequest, SweepReport, UploadCoordinator, UploadReservation};
