//! Document (file record) entities.

pub mod model;
pub mod state;

pub use model::{CreateDocument, DocumentRecord, extension_of};
pub use state::{UploadPhase, UploadState};
