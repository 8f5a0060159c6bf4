//! Background worker configuration.

use serde::{Deserialize, Serialize};

/// Background job worker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Whether the worker is enabled.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Number of concurrent job processing tasks.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Capacity of the in-process job queue.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Maximum attempts for a job failing with a transient error.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Cron expression for the stale reservation sweep.
    #[serde(default = "default_sweep_cron")]
    pub sweep_cron: String,
    /// Cron expression for the nightly quota reconciliation.
    #[serde(default = "default_reconcile_cron")]
    pub reconcile_cron: String,
    /// Cron expression for the trash purge.
    #[serde(default = "default_purge_cron")]
    pub purge_cron: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            concurrency: default_concurrency(),
            queue_capacity: default_queue_capacity(),
            max_attempts: default_max_attempts(),
            sweep_cron: default_sweep_cron(),
            reconcile_cron: default_reconcile_cron(),
            purge_cron: default_purge_cron(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_concurrency() -> usize {
    4
}

fn default_queue_capacity() -> usize {
    64
}

fn default_max_attempts() -> u32 {
    3
}

// Six-field expressions (seconds first) as tokio-cron-scheduler expects.
fn default_sweep_cron() -> String {
    "0 */10 * * * *".to_string()
}

fn default_reconcile_cron() -> String {
    "0 30 3 * * *".to_string()
}

fn default_purge_cron() -> String {
    "0 0 4 * * *".to_string()
}
