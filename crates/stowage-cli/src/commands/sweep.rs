//! Maintenance sweep commands.

use chrono::Utc;
use clap::{Args, Subcommand};

use stowage_core::config::AppConfig;
use stowage_core::result::AppResult;

use crate::output::{self, OutputFormat};

/// Arguments for sweep commands
#[derive(Debug, Args)]
pub struct SweepArgs {
    /// Sweep subcommand
    #[command(subcommand)]
    pub command: SweepCommand,
}

/// Sweep subcommands
#[derive(Debug, Subcommand)]
pub enum SweepCommand {
    /// Cancel upload reservations older than the reservation TTL
    Reservations,
    /// Hard-delete items trashed longer than the retention period
    Trash {
        /// Skip confirmation prompt
        #[arg(long)]
        yes: bool,
    },
}

/// Execute sweep commands
pub async fn execute(args: &SweepArgs, config: &AppConfig, format: OutputFormat) -> AppResult<()> {
    match &args.command {
        SweepCommand::Reservations => {
            let services = super::build_services(config).await?;
            let report = services.uploads.sweep_stale_reservations(Utc::now()).await?;
            let pairs = [
                ("Examined", report.examined.to_string()),
                ("Cancelled", report.cancelled.to_string()),
                ("Failures", report.failures.to_string()),
                ("Orphaned objects", report.orphaned_keys.len().to_string()),
            ];
            output::print_item(&report, &pairs, format);
        }
        SweepCommand::Trash { yes } => {
            let prompt = format!(
                "Permanently delete items trashed more than {} days ago?",
                config.quota.trash_retention_days
            );
            if !super::confirm(&prompt, *yes)? {
                println!("Cancelled.");
                return Ok(());
            }

            let services = super::build_services(config).await?;
            let report = services.purger.purge_expired(Utc::now()).await?;
            let pairs = [
                ("Directories purged", report.directories_purged.to_string()),
                ("Documents purged", report.documents_purged.to_string()),
                ("Released bytes", report.deleted.released_bytes.to_string()),
                ("Failures", report.failures.to_string()),
                (
                    "Orphaned objects",
                    report.deleted.orphaned_keys.len().to_string(),
                ),
            ];
            output::print_item(&report, &pairs, format);
        }
    }
    Ok(())
}
