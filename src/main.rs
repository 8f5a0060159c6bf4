//! Stowage server: storage accounting, upload protocol, and billing daemon.
//!
//! Wires the store, object store gateway, services, and background worker
//! together and runs until a shutdown signal arrives.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing;
use tracing_subscriber::{EnvFilter, fmt};

use stowage_core::config::AppConfig;
use stowage_core::error::AppError;
use stowage_database::{DatabasePool, PgMetadataStore};
use stowage_service::Services;
use stowage_storage::{ObjectStoreGateway, build_object_store};
use stowage_worker::jobs::default_executor;
use stowage_worker::{CronScheduler, JobQueue, WorkerRunner};

#[tokio::main]
async fn main() {
    let env = std::env::var("STOWAGE_ENV").unwrap_or_else(|_| "development".to_string());
    let config = match AppConfig::load(&env) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    init_logging(&config);
    tracing::info!(env = %env, "Configuration loaded");

    if let Err(e) = run(config).await {
        tracing::error!(error = %e, "Server error");
        std::process::exit(1);
    }
}

/// Initialize tracing/logging
fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .init();
        }
        _ => {
            fmt()
                .pretty()
                .with_env_filter(filter)
                .with_target(true)
                .init();
        }
    }
}

/// Main server run function
async fn run(config: AppConfig) -> Result<(), AppError> {
    tracing::info!("Starting Stowage v{}", env!("CARGO_PKG_VERSION"));

    // Database connection + migrations
    let db = DatabasePool::connect(&config.database).await?;
    stowage_database::migration::run_migrations(db.pool()).await?;
    let store = Arc::new(PgMetadataStore::new(db.clone()));

    // Object store
    let objects = build_object_store(&config.object_store).await?;
    let gateway = Arc::new(ObjectStoreGateway::from_config(objects, &config.object_store));
    if !gateway.health_check().await {
        tracing::warn!("Object store is not reachable yet; continuing");
    }

    let services = Services::build(&config, store, gateway);
    tracing::info!(
        plans = services.billing.plans().plans().len(),
        "Services initialized"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Background worker + cron scheduler
    let mut scheduler = None;
    let worker_handle = if config.worker.enabled {
        let queue = Arc::new(JobQueue::new(
            config.worker.queue_capacity,
            config.worker.max_attempts,
        ));
        let executor = Arc::new(default_executor(&services));
        tracing::info!(job_types = ?executor.registered_types(), "Job handlers registered");

        let runner = WorkerRunner::new(
            Arc::clone(&queue),
            executor,
            &config.worker,
            format!("stowage-worker-{}", std::process::id()),
        );

        let cron = CronScheduler::new(Arc::clone(&queue)).await?;
        cron.register_default_tasks(&config.worker).await?;
        cron.start().await?;
        scheduler = Some(cron);

        let worker_cancel = shutdown_rx.clone();
        let handle = tokio::spawn(async move {
            runner.run(worker_cancel).await;
        });

        tracing::info!("Background worker started");
        Some(handle)
    } else {
        tracing::info!("Background worker disabled");
        None
    };

    shutdown_signal().await;
    tracing::info!("Shutdown signal received, starting graceful shutdown...");
    let _ = shutdown_tx.send(true);

    if let Some(mut cron) = scheduler {
        if let Err(e) = cron.shutdown().await {
            tracing::warn!(error = %e, "Cron scheduler did not shut down cleanly");
        }
    }
    if let Some(handle) = worker_handle {
        let _ = tokio::time::timeout(Duration::from_secs(35), handle).await;
    }

    db.close().await;
    tracing::info!("Stowage server shut down gracefully");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
