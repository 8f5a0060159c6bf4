//! Reserve, verify, and commit uploads sent directly to the object store.

pub mod coordinator;

pub use coordinator::{
    CompleteUploadRequest, ReserveUploadRequest, SweepReport, UploadCoordinator, UploadReservation,
};
