//! Upload state and phase enumerations.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Persisted upload state of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "upload_state", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum UploadState {
    /// Record exists but the bytes have not been verified.
    Reserved,
    /// Bytes verified and counted in every aggregate.
    Committed,
}

impl UploadState {
    /// Return the state as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reserved => "reserved",
            Self::Committed => "committed",
        }
    }
}

impl fmt::Display for UploadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Phase of the upload protocol, reported in structured logs only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadPhase {
    /// Request received, not yet validated.
    Requested,
    /// Record persisted in the `Reserved` state.
    Reserved,
    /// Upload URL handed out to the client.
    AwaitingExternalUpload,
    /// Object being inspected.
    Verifying,
    /// Bytes counted.
    Committed,
    /// Verification failed.
    Failed,
    /// Reservation removed.
    RolledBack,
}

impl UploadPhase {
    /// Return the phase as a snake_case string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Requested => "requested",
            Self::Reserved => "reserved",
            Self::AwaitingExternalUpload => "awaiting_external_upload",
            Self::Verifying => "verifying",
            Self::Committed => "committed",
            Self::Failed => "failed",
            Self::RolledBack => "rolled_back",
        }
    }
}

impl fmt::Display for UploadPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
