//! Cron scheduler for periodic maintenance tasks.

use std::sync::Arc;

use tokio_cron_scheduler::{Job as CronJob, JobScheduler};
use tracing;

use stowage_core::config::WorkerConfig;
use stowage_core::error::AppError;
use stowage_entity::job::JobPayload;

use crate::queue::JobQueue;

/// Cron-based scheduler that enqueues maintenance jobs
pub struct CronScheduler {
    scheduler: JobScheduler,
    queue: Arc<JobQueue>,
}

impl std::fmt::Debug for CronScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CronScheduler").finish()
    }
}

impl CronScheduler {
    /// Create a new cron scheduler
    pub async fn new(queue: Arc<JobQueue>) -> Result<Self, AppError> {
        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| AppError::internal(format!("Failed to create scheduler: {}", e)))?;

        Ok(Self { scheduler, queue })
    }

    /// Register the sweep, reconciliation, and purge schedules
    pub async fn register_default_tasks(&self, config: &WorkerConfig) -> Result<(), AppError> {
        self.register("reservation_sweep", &config.sweep_cron, JobPayload::ReservationSweep)
            .await?;
        self.register(
            "quota_reconciliation",
            &config.reconcile_cron,
            JobPayload::QuotaReconciliation { user_id: None },
        )
        .await?;
        self.register("trash_purge", &config.purge_cron, JobPayload::TrashPurge)
            .await?;

        tracing::info!("All scheduled tasks registered");
        Ok(())
    }

    /// Start the scheduler
    pub async fn start(&self) -> Result<(), AppError> {
        self.scheduler
            .start()
            .await
            .map_err(|e| AppError::internal(format!("Failed to start scheduler: {}", e)))?;

        tracing::info!("Cron scheduler started");
        Ok(())
    }

    /// Shutdown the scheduler
    pub async fn shutdown(&mut self) -> Result<(), AppError> {
        self.scheduler
            .shutdown()
            .await
            .map_err(|e| AppError::internal(format!("Failed to shutdown scheduler: {}", e)))?;

        tracing::info!("Cron scheduler shut down");
        Ok(())
    }

    /// Enqueue `payload` on every tick of `schedule`.
    async fn register(
        &self,
        name: &'static str,
        schedule: &str,
        payload: JobPayload,
    ) -> Result<(), AppError> {
        let queue = Arc::clone(&self.queue);
        let job = CronJob::new_async(schedule, move |_uuid, _lock| {
            let queue = Arc::clone(&queue);
            let payload = payload.clone();
            Box::pin(async move {
                tracing::debug!(job_type = name, "Scheduling job");
                if let Err(e) = queue.enqueue(payload, "cron") {
                    tracing::error!(job_type = name, error = %e, "Failed to enqueue scheduled job");
                }
            })
        })
        .map_err(|e| {
            AppError::configuration(format!(
                "Invalid cron expression '{}' for {}: {}",
                schedule, name, e
            ))
        })?;

        self.scheduler
            .add(job)
            .await
            .map_err(|e| AppError::internal(format!("Failed to add {} schedule: {}", name, e)))?;

        tracing::info!(job_type = name, schedule, "Registered scheduled job");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stowage_core::error::ErrorKind;

    #[tokio::test(flavor = "multi_thread")]
    async fn test_default_schedules_register() {
        let scheduler = CronScheduler::new(Arc::new(JobQueue::new(4, 3)))
            .await
            .unwrap();
        scheduler
            .register_default_tasks(&WorkerConfig::default())
            .await
            .unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_invalid_cron_is_configuration_error() {
        let scheduler = CronScheduler::new(Arc::new(JobQueue::new(4, 3)))
            .await
            .unwrap();
        let config = WorkerConfig {
            purge_cron: "every tuesday".into(),
            ..WorkerConfig::default()
        };
        let err = scheduler.register_default_tasks(&config).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Configuration);
    }
}
