//! Background job processing and scheduled maintenance for Stowage.
//!
//! This crate provides:
//! - An in-process job queue fed by the cron scheduler and the CLI
//! - A worker runner that executes queued jobs with bounded concurrency
//! - A job executor that dispatches jobs to the correct handler
//! - Handlers for the reservation sweep, quota reconciliation, and trash purge

pub mod executor;
pub mod jobs;
pub mod queue;
pub mod runner;
pub mod scheduler;

pub use executor::{JobExecutionError, JobExecutor, JobHandler};
pub use queue::JobQueue;
pub use runner::WorkerRunner;
pub use scheduler::CronScheduler;
