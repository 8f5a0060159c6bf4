//! Subscription inspection commands.

use clap::{Args, Subcommand};
use serde::Serialize;
use tabled::Tabled;

use stowage_core::config::AppConfig;
use stowage_core::result::AppResult;
use stowage_core::types::UserId;
use stowage_entity::billing::SubscriptionRecord;

use crate::output::{self, OutputFormat};

/// Arguments for subscription commands
#[derive(Debug, Args)]
pub struct SubscriptionArgs {
    /// Subscription subcommand
    #[command(subcommand)]
    pub command: SubscriptionCommand,
}

/// Subscription subcommands
#[derive(Debug, Subcommand)]
pub enum SubscriptionCommand {
    /// List a user's subscriptions
    List {
        /// User id (UUID)
        #[arg(long)]
        user: UserId,
    },
}

/// Subscription display row for table output
#[derive(Debug, Serialize, Tabled)]
struct SubscriptionRow {
    /// Provider
    provider: String,
    /// Provider subscription id
    subscription: String,
    /// Plan
    plan: String,
    /// Status
    status: String,
    /// Entitlement applied
    entitled: bool,
    /// Consecutive failed payments
    failed_payments: i32,
    /// Last event time
    last_event: String,
    /// Period end
    period_end: String,
}

impl From<&SubscriptionRecord> for SubscriptionRow {
    fn from(record: &SubscriptionRecord) -> Self {
        let stamp = |t: Option<chrono::DateTime<chrono::Utc>>| {
            t.map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| "-".to_string())
        };
        Self {
            provider: record.provider.to_string(),
            subscription: record.provider_subscription_id.clone(),
            plan: record.plan_id.clone(),
            status: record.status.to_string(),
            entitled: record.entitlement_applied,
            failed_payments: record.failed_payment_count,
            last_event: stamp(record.last_event_at),
            period_end: stamp(record.current_period_end),
        }
    }
}

/// Execute subscription commands
pub async fn execute(
    args: &SubscriptionArgs,
    config: &AppConfig,
    format: OutputFormat,
) -> AppResult<()> {
    let services = super::build_services(config).await?;

    match &args.command {
        SubscriptionCommand::List { user } => {
            let records = services.billing.subscriptions(*user).await?;
            let rows: Vec<SubscriptionRow> = records.iter().map(SubscriptionRow::from).collect();
            output::print_list(&rows, format);
        }
    }

    Ok(())
}
