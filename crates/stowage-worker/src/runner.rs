//! Worker runner: main loop that takes jobs off the queue and executes them.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Semaphore, watch};
use tracing;

use stowage_core::config::WorkerConfig;
use stowage_entity::job::{Job, JobStatus};

use crate::executor::{JobExecutionError, JobExecutor};
use crate::queue::JobQueue;

/// How long shutdown waits for in-flight jobs.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Worker runner executing queued jobs with bounded concurrency
#[derive(Debug)]
pub struct WorkerRunner {
    queue: Arc<JobQueue>,
    executor: Arc<JobExecutor>,
    concurrency: usize,
    worker_id: String,
}

impl WorkerRunner {
    /// Create a new worker runner
    pub fn new(
        queue: Arc<JobQueue>,
        executor: Arc<JobExecutor>,
        config: &WorkerConfig,
        worker_id: impl Into<String>,
    ) -> Self {
        Self {
            queue,
            executor,
            concurrency: config.concurrency.max(1),
            worker_id: worker_id.into(),
        }
    }

    /// Run until the cancel signal is received, then drain in-flight jobs.
    pub async fn run(&self, mut cancel: watch::Receiver<bool>) {
        tracing::info!(
            worker_id = %self.worker_id,
            concurrency = self.concurrency,
            "Worker started"
        );

        let semaphore = Arc::new(Semaphore::new(self.concurrency));

        loop {
            let permit = tokio::select! {
                changed = cancel.changed() => {
                    if changed.is_err() || *cancel.borrow() {
                        tracing::info!(worker_id = %self.worker_id, "Worker received shutdown signal");
                        break;
                    }
                    continue;
                }
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let job = tokio::select! {
                changed = cancel.changed() => {
                    if changed.is_err() || *cancel.borrow() {
                        tracing::info!(worker_id = %self.worker_id, "Worker received shutdown signal");
                        break;
                    }
                    continue;
                }
                job = self.queue.dequeue() => match job {
                    Some(job) => job,
                    None => break,
                },
            };

            let queue = Arc::clone(&self.queue);
            let executor = Arc::clone(&self.executor);
            tokio::spawn(async move {
                let _permit = permit;
                process(&queue, &executor, job).await;
            });
        }

        tracing::info!(
            worker_id = %self.worker_id,
            pending = self.queue.stats().pending,
            "Worker waiting for in-flight jobs to complete"
        );

        let drained = tokio::time::timeout(
            DRAIN_TIMEOUT,
            semaphore.acquire_many(self.concurrency as u32),
        )
        .await;
        if drained.is_err() {
            tracing::warn!(worker_id = %self.worker_id, "In-flight jobs did not finish before shutdown");
        }

        tracing::info!(worker_id = %self.worker_id, "Worker shut down complete");
    }

    /// Execute one job inline, with the same retry handling as the run loop.
    pub async fn run_job(&self, job: Job) -> JobStatus {
        process(&self.queue, &self.executor, job).await
    }
}

/// Execute a job and settle it: completed, re-queued, or failed.
async fn process(queue: &JobQueue, executor: &JobExecutor, mut job: Job) -> JobStatus {
    job.attempts += 1;
    job.status = JobStatus::Running;
    let job_id = job.id;

    match executor.execute(&job).await {
        Ok(result) => {
            tracing::info!(job_id = %job_id, job_type = %job.job_type, result = %result, "Job completed");
            JobStatus::Completed
        }
        Err(JobExecutionError::Transient(msg)) if job.can_retry() => {
            tracing::warn!(
                job_id = %job_id,
                attempt = job.attempts,
                max_attempts = job.max_attempts,
                error = %msg,
                "Job failed (transient), re-queueing"
            );
            match queue.requeue(job) {
                Ok(()) => JobStatus::Queued,
                Err(e) => {
                    tracing::error!(job_id = %job_id, error = %e, "Failed to re-queue job");
                    JobStatus::Failed
                }
            }
        }
        Err(err) => {
            tracing::error!(
                job_id = %job_id,
                job_type = %job.job_type,
                attempt = job.attempts,
                error = %err,
                "Job failed"
            );
            JobStatus::Failed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use serde_json::Value;
    use stowage_entity::job::JobPayload;

    use crate::executor::JobHandler;

    #[derive(Debug, Default)]
    struct FlakyHandler {
        failures_left: AtomicU32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl JobHandler for FlakyHandler {
        fn job_type(&self) -> &str {
            "reservation_sweep"
        }

        async fn execute(&self, _job: &Job) -> Result<Value, JobExecutionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let left = self.failures_left.load(Ordering::SeqCst);
            if left > 0 {
                self.failures_left.store(left - 1, Ordering::SeqCst);
                return Err(JobExecutionError::Transient("store unavailable".into()));
            }
            Ok(Value::Null)
        }
    }

    fn runner(handler: Arc<FlakyHandler>, max_attempts: u32) -> WorkerRunner {
        let mut executor = JobExecutor::new();
        executor.register(handler);
        WorkerRunner::new(
            Arc::new(JobQueue::new(8, max_attempts)),
            Arc::new(executor),
            &WorkerConfig::default(),
            "test-worker",
        )
    }

    #[tokio::test]
    async fn test_transient_failure_requeues_until_attempts_exhausted() {
        let handler = Arc::new(FlakyHandler {
            failures_left: AtomicU32::new(10),
            ..Default::default()
        });
        let runner = runner(handler.clone(), 3);

        runner.queue.enqueue(JobPayload::ReservationSweep, "test").unwrap();
        let job = runner.queue.dequeue().await.unwrap();
        assert_eq!(runner.run_job(job).await, JobStatus::Queued);

        let job = runner.queue.dequeue().await.unwrap();
        assert_eq!(job.attempts, 1);
        assert_eq!(runner.run_job(job).await, JobStatus::Queued);

        let job = runner.queue.dequeue().await.unwrap();
        assert_eq!(runner.run_job(job).await, JobStatus::Failed);
        assert_eq!(handler.calls.load(Ordering::SeqCst), 3);
        assert_eq!(runner.queue.stats().pending, 0);
    }

    #[tokio::test]
    async fn test_unknown_job_fails_without_retry() {
        let runner = runner(Arc::new(FlakyHandler::default()), 3);
        let job = Job::new(JobPayload::TrashPurge, 3, "test");
        assert_eq!(runner.run_job(job).await, JobStatus::Failed);
        assert_eq!(runner.queue.stats().pending, 0);
    }

    #[tokio::test]
    async fn test_run_loop_processes_jobs_and_stops_on_cancel() {
        let handler = Arc::new(FlakyHandler {
            failures_left: AtomicU32::new(1),
            ..Default::default()
        });
        let runner = Arc::new(runner(handler.clone(), 3));
        runner.queue.enqueue(JobPayload::ReservationSweep, "test").unwrap();

        let (cancel_tx, cancel_rx) = watch::channel(false);
        let task = tokio::spawn({
            let runner = Arc::clone(&runner);
            async move { runner.run(cancel_rx).await }
        });

        tokio::time::timeout(Duration::from_secs(5), async {
            while handler.calls.load(Ordering::SeqCst) < 2 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("job retried and completed");

        cancel_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("runner stops")
            .unwrap();
    }
}
