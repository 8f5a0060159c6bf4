//! Typed job payload definitions.

use serde::{Deserialize, Serialize};

use stowage_core::types::UserId;

/// Typed payloads for known job types.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "job_type")]
pub enum JobPayload {
    /// Cancel reservations older than the configured TTL.
    #[serde(rename = "reservation_sweep")]
    ReservationSweep,
    /// Recompute aggregates for one user, or every user when `None`.
    #[serde(rename = "quota_reconciliation")]
    QuotaReconciliation {
        /// Restrict to a single user.
        user_id: Option<UserId>,
    },
    /// Hard-delete items trashed longer than the retention period.
    #[serde(rename = "trash_purge")]
    TrashPurge,
}

impl JobPayload {
    /// The job type string handlers are registered under.
    pub fn job_type(&self) -> &'static str {
        match self {
            Self::ReservationSweep => "reservation_sweep",
            Self::QuotaReconciliation { .. } => "quota_reconciliation",
            Self::TrashPurge => "trash_purge",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_tagged_by_job_type() {
        let value = serde_json::to_value(JobPayload::TrashPurge).unwrap();
        assert_eq!(value["job_type"], "trash_purge");

        let user_id = UserId::new();
        let value = serde_json::to_value(JobPayload::QuotaReconciliation {
            user_id: Some(user_id),
        })
        .unwrap();
        let back: JobPayload = serde_json::from_value(value).unwrap();
        assert_eq!(back.job_type(), "quota_reconciliation");
    }
}
