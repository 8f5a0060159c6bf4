//! Quota counter reconciliation.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing;

use stowage_entity::job::{Job, JobPayload};
use stowage_service::Reconciler;

use crate::executor::{JobExecutionError, JobHandler};

/// Recomputes directory aggregates and used bytes from committed documents
#[derive(Debug)]
pub struct QuotaReconciliationJobHandler {
    reconciler: Arc<Reconciler>,
}

impl QuotaReconciliationJobHandler {
    /// Create a new reconciliation handler
    pub fn new(reconciler: Arc<Reconciler>) -> Self {
        Self { reconciler }
    }
}

#[async_trait]
impl JobHandler for QuotaReconciliationJobHandler {
    fn job_type(&self) -> &str {
        "quota_reconciliation"
    }

    async fn execute(&self, job: &Job) -> Result<Value, JobExecutionError> {
        let JobPayload::QuotaReconciliation { user_id } = &job.payload else {
            return Err(JobExecutionError::Permanent(format!(
                "Unexpected payload for quota_reconciliation: {}",
                job.payload.job_type()
            )));
        };

        let reports = match user_id {
            Some(user_id) => vec![
                self.reconciler
                    .recompute(*user_id)
                    .await
                    .map_err(JobExecutionError::from_service)?,
            ],
            None => self
                .reconciler
                .recompute_all()
                .await
                .map_err(JobExecutionError::from_service)?,
        };

        let corrected: Vec<_> = reports.iter().filter(|r| !r.is_clean()).collect();
        for report in &corrected {
            tracing::warn!(
                user_id = %report.user_id,
                corrections = report.corrections.len(),
                used_before = report.used_before,
                used_after = report.used_after,
                "Quota counters drifted and were corrected"
            );
        }

        Ok(serde_json::json!({
            "accounts_checked": reports.len(),
            "accounts_corrected": corrected.len(),
        }))
    }
}
