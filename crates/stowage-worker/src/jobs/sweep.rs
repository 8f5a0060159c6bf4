//! Stale upload reservation sweep.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tracing;

use stowage_entity::job::{Job, JobPayload};
use stowage_service::UploadCoordinator;

use crate::executor::{JobExecutionError, JobHandler};

/// Cancels reservations older than the configured TTL
#[derive(Debug)]
pub struct ReservationSweepJobHandler {
    uploads: Arc<UploadCoordinator>,
}

impl ReservationSweepJobHandler {
    /// Create a new sweep handler
    pub fn new(uploads: Arc<UploadCoordinator>) -> Self {
        Self { uploads }
    }
}

#[async_trait]
impl JobHandler for ReservationSweepJobHandler {
    fn job_type(&self) -> &str {
        "reservation_sweep"
    }

    async fn execute(&self, job: &Job) -> Result<Value, JobExecutionError> {
        if job.payload != JobPayload::ReservationSweep {
            return Err(JobExecutionError::Permanent(format!(
                "Unexpected payload for reservation_sweep: {}",
                job.payload.job_type()
            )));
        }

        let report = self
            .uploads
            .sweep_stale_reservations(Utc::now())
            .await
            .map_err(JobExecutionError::from_service)?;

        if report.failures > 0 {
            tracing::warn!(
                failures = report.failures,
                cancelled = report.cancelled,
                "Reservation sweep finished with failures"
            );
        }

        serde_json::to_value(&report).map_err(|e| JobExecutionError::Internal(e.into()))
    }
}
