//! Job entity model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::payload::JobPayload;
use super::status::JobStatus;

/// A background job travelling through the in-process queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Unique job identifier.
    pub id: Uuid,
    /// Job type identifier (e.g., `"reservation_sweep"`).
    pub job_type: String,
    /// Job-specific payload.
    pub payload: JobPayload,
    /// Current job status.
    pub status: JobStatus,
    /// Number of execution attempts so far.
    pub attempts: u32,
    /// Maximum allowed attempts.
    pub max_attempts: u32,
    /// What enqueued the job (`"cron"`, `"cli"`, ...).
    pub source: String,
    /// When the job was created.
    pub created_at: DateTime<Utc>,
}

impl Job {
    /// Create a queued job for a payload.
    pub fn new(payload: JobPayload, max_attempts: u32, source: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            job_type: payload.job_type().to_string(),
            payload,
            status: JobStatus::Queued,
            attempts: 0,
            max_attempts,
            source: source.into(),
            created_at: Utc::now(),
        }
    }

    /// Check if the job can be retried after a transient failure.
    pub fn can_retry(&self) -> bool {
        self.attempts < self.max_attempts
    }
}
