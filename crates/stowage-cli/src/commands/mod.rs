//! CLI command definitions and dispatch.

pub mod account;
pub mod migrate;
pub mod reconcile;
pub mod subscription;
pub mod sweep;
pub mod webhook;

use std::sync::Arc;

use clap::{Parser, Subcommand};

use stowage_core::config::AppConfig;
use stowage_core::result::AppResult;
use stowage_database::{DatabasePool, PgMetadataStore};
use stowage_service::Services;
use stowage_storage::{ObjectStoreGateway, build_object_store};

use crate::output::OutputFormat;

/// Stowage operator tools: accounts, counters, maintenance, and billing replay
#[derive(Debug, Parser)]
#[command(name = "stowage", version, about, long_about = None)]
pub struct Cli {
    /// Configuration environment overlay (`config/<env>.toml`)
    #[arg(short, long, default_value = "development")]
    pub env: String,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    pub format: OutputFormat,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Apply pending database migrations
    Migrate(migrate::MigrateArgs),
    /// Quota account management
    Account(account::AccountArgs),
    /// Recompute directory aggregates and used bytes
    Reconcile(reconcile::ReconcileArgs),
    /// Run maintenance sweeps now
    Sweep(sweep::SweepArgs),
    /// Subscription inspection
    Subscription(subscription::SubscriptionArgs),
    /// Payment webhook tools
    Webhook(webhook::WebhookArgs),
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(&self) -> AppResult<()> {
        let config = AppConfig::load(&self.env)?;
        match &self.command {
            Commands::Migrate(args) => migrate::execute(args, &config).await,
            Commands::Account(args) => account::execute(args, &config, self.format).await,
            Commands::Reconcile(args) => reconcile::execute(args, &config, self.format).await,
            Commands::Sweep(args) => sweep::execute(args, &config, self.format).await,
            Commands::Subscription(args) => {
                subscription::execute(args, &config, self.format).await
            }
            Commands::Webhook(args) => webhook::execute(args, &config, self.format).await,
        }
    }
}

/// Helper: connect to the database and the object store and build services
pub async fn build_services(config: &AppConfig) -> AppResult<Services> {
    let db = DatabasePool::connect(&config.database).await?;
    let store = Arc::new(PgMetadataStore::new(db));
    let objects = build_object_store(&config.object_store).await?;
    let gateway = Arc::new(ObjectStoreGateway::from_config(objects, &config.object_store));
    Ok(Services::build(config, store, gateway))
}

/// Helper: ask before a destructive operation unless `--yes` was given
pub fn confirm(prompt: &str, assume_yes: bool) -> AppResult<bool> {
    if assume_yes {
        return Ok(true);
    }
    dialoguer::Confirm::new()
        .with_prompt(prompt)
        .default(false)
        .interact()
        .map_err(|e| stowage_core::error::AppError::internal(format!("Input error: {}", e)))
}
