//! In-process job queue for enqueuing and dequeuing background jobs.

use tokio::sync::{Mutex, mpsc};
use tracing;

use stowage_core::error::AppError;
use stowage_core::result::AppResult;
use stowage_entity::job::{Job, JobPayload, JobStatus};

/// Bounded job queue shared by the scheduler, the CLI, and the runner.
///
/// Enqueuing never waits: a full queue rejects the job so a stalled
/// worker cannot pile up cron ticks.
#[derive(Debug)]
pub struct JobQueue {
    sender: mpsc::Sender<Job>,
    receiver: Mutex<mpsc::Receiver<Job>>,
    capacity: usize,
    max_attempts: u32,
}

impl JobQueue {
    /// Create a queue holding at most `capacity` pending jobs.
    pub fn new(capacity: usize, max_attempts: u32) -> Self {
        let capacity = capacity.max(1);
        let (sender, receiver) = mpsc::channel(capacity);
        Self {
            sender,
            receiver: Mutex::new(receiver),
            capacity,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Enqueue a new job for a payload.
    pub fn enqueue(&self, payload: JobPayload, source: &str) -> AppResult<Job> {
        let job = Job::new(payload, self.max_attempts, source);
        self.push(job.clone())?;

        tracing::debug!(
            job_id = %job.id,
            job_type = %job.job_type,
            source,
            "Enqueued job"
        );
        Ok(job)
    }

    /// Put a job that failed transiently back at the end of the queue.
    pub fn requeue(&self, mut job: Job) -> AppResult<()> {
        job.status = JobStatus::Queued;
        let job_id = job.id;
        self.push(job)?;
        tracing::debug!(job_id = %job_id, "Job re-queued");
        Ok(())
    }

    fn push(&self, job: Job) -> AppResult<()> {
        self.sender.try_send(job).map_err(|e| match e {
            mpsc::error::TrySendError::Full(job) => AppError::conflict(format!(
                "Job queue is full; dropped {} job {}",
                job.job_type, job.id
            )),
            mpsc::error::TrySendError::Closed(_) => AppError::internal("Job queue is closed"),
        })
    }

    /// Wait for the next job.
    pub async fn dequeue(&self) -> Option<Job> {
        let job = self.receiver.lock().await.recv().await;
        if let Some(job) = &job {
            tracing::debug!(job_id = %job.id, job_type = %job.job_type, "Dequeued job");
        }
        job
    }

    /// Get queue statistics
    pub fn stats(&self) -> QueueStats {
        QueueStats {
            pending: self.capacity - self.sender.capacity(),
            capacity: self.capacity,
        }
    }
}

/// Queue statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueStats {
    /// Number of jobs waiting for a worker
    pub pending: usize,
    /// Maximum number of waiting jobs
    pub capacity: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use stowage_core::error::ErrorKind;

    #[tokio::test]
    async fn test_fifo_order() {
        let queue = JobQueue::new(4, 3);
        queue.enqueue(JobPayload::ReservationSweep, "cron").unwrap();
        queue.enqueue(JobPayload::TrashPurge, "cron").unwrap();
        assert_eq!(queue.stats().pending, 2);

        assert_eq!(queue.dequeue().await.unwrap().job_type, "reservation_sweep");
        assert_eq!(queue.dequeue().await.unwrap().job_type, "trash_purge");
        assert_eq!(queue.stats().pending, 0);
    }

    #[tokio::test]
    async fn test_full_queue_rejects() {
        let queue = JobQueue::new(1, 3);
        queue.enqueue(JobPayload::TrashPurge, "cron").unwrap();
        let err = queue.enqueue(JobPayload::TrashPurge, "cron").unwrap_err();
        assert_eq!(err.kind, ErrorKind::ConcurrencyConflict);
    }

    #[tokio::test]
    async fn test_jobs_carry_configured_attempts() {
        let queue = JobQueue::new(2, 5);
        let job = queue
            .enqueue(JobPayload::QuotaReconciliation { user_id: None }, "cli")
            .unwrap();
        assert_eq!(job.max_attempts, 5);
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.source, "cli");
    }
}
