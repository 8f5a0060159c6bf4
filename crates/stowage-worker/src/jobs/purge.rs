//! Trash retention purge.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;

use stowage_entity::job::{Job, JobPayload};
use stowage_service::TrashPurger;

use crate::executor::{JobExecutionError, JobHandler};

/// Hard-deletes items trashed longer than the retention period
#[derive(Debug)]
pub struct TrashPurgeJobHandler {
    purger: Arc<TrashPurger>,
}

impl TrashPurgeJobHandler {
    /// Create a new purge handler
    pub fn new(purger: Arc<TrashPurger>) -> Self {
        Self { purger }
    }
}

#[async_trait]
impl JobHandler for TrashPurgeJobHandler {
    fn job_type(&self) -> &str {
        "trash_purge"
    }

    async fn execute(&self, job: &Job) -> Result<Value, JobExecutionError> {
        if job.payload != JobPayload::TrashPurge {
            return Err(JobExecutionError::Permanent(format!(
                "Unexpected payload for trash_purge: {}",
                job.payload.job_type()
            )));
        }

        let report = self
            .purger
            .purge_expired(Utc::now())
            .await
            .map_err(JobExecutionError::from_service)?;

        serde_json::to_value(&report).map_err(|e| JobExecutionError::Internal(e.into()))
    }
}
