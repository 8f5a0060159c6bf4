//! Quota reconciliation command.

use clap::Args;
use serde::Serialize;
use tabled::Tabled;

use stowage_core::config::AppConfig;
use stowage_core::error::AppError;
use stowage_core::result::AppResult;
use stowage_core::types::UserId;
use stowage_service::ReconciliationReport;

use crate::output::{self, OutputFormat};

/// Arguments for the reconcile command
#[derive(Debug, Args)]
pub struct ReconcileArgs {
    /// Reconcile a single user
    #[arg(long, conflicts_with = "all")]
    pub user: Option<UserId>,
    /// Reconcile every provisioned user
    #[arg(long)]
    pub all: bool,
}

/// Reconciliation display row for table output
#[derive(Debug, Serialize, Tabled)]
struct ReconcileRow {
    /// User ID
    user_id: String,
    /// Directories examined
    directories: usize,
    /// Corrected aggregates
    corrections: usize,
    /// Used bytes before
    used_before: i64,
    /// Used bytes after
    used_after: i64,
}

impl From<&ReconciliationReport> for ReconcileRow {
    fn from(report: &ReconciliationReport) -> Self {
        Self {
            user_id: report.user_id.to_string(),
            directories: report.directories_checked,
            corrections: report.corrections.len(),
            used_before: report.used_before,
            used_after: report.used_after,
        }
    }
}

/// Execute the reconcile command
pub async fn execute(args: &ReconcileArgs, config: &AppConfig, format: OutputFormat) -> AppResult<()> {
    let reports = match (args.user, args.all) {
        (Some(user_id), false) => {
            let services = super::build_services(config).await?;
            vec![services.reconciler.recompute(user_id).await?]
        }
        (None, true) => {
            let services = super::build_services(config).await?;
            services.reconciler.recompute_all().await?
        }
        _ => return Err(AppError::validation("Pass either --user <id> or --all")),
    };

    let rows: Vec<ReconcileRow> = reports.iter().map(ReconcileRow::from).collect();
    output::print_list(&rows, format);

    let drifted = reports.iter().filter(|r| !r.is_clean()).count();
    if drifted > 0 {
        output::print_warning(&format!("{} account(s) had drifted counters", drifted));
    } else if format == OutputFormat::Table {
        output::print_success("All counters consistent.");
    }
    Ok(())
}
