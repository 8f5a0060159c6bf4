//! Database migration command.

use clap::Args;

use stowage_core::config::AppConfig;
use stowage_core::result::AppResult;
use stowage_database::DatabasePool;
use stowage_database::migration::{pending_migrations, run_migrations};

use crate::output;

/// Arguments for `migrate`.
#[derive(Debug, Args)]
pub struct MigrateArgs {
    /// List pending migrations without applying them
    #[arg(long)]
    pub check: bool,
}

/// Apply (or list) pending migrations
pub async fn execute(args: &MigrateArgs, config: &AppConfig) -> AppResult<()> {
    let db = DatabasePool::connect(&config.database).await?;
    let result = if args.check {
        pending_migrations(db.pool()).await
    } else {
        run_migrations(db.pool()).await
    };
    db.close().await;
    let migrations = result?;

    if migrations.is_empty() {
        output::print_success("Schema is up to date.");
        return Ok(());
    }
    for migration in &migrations {
        output::print_kv(&migration.version.to_string(), &migration.description);
    }
    if args.check {
        output::print_warning(&format!("{} migration(s) pending.", migrations.len()));
    } else {
        output::print_success(&format!("Applied {} migration(s).", migrations.len()));
    }
    Ok(())
}
