//! Payment webhook commands.

use std::path::PathBuf;

use clap::{Args, Subcommand};

use stowage_core::config::AppConfig;
use stowage_core::error::AppError;
use stowage_core::result::AppResult;
use stowage_service::{EventOutcome, SignatureHeaders};

use crate::output::{self, OutputFormat};

/// Arguments for webhook commands
#[derive(Debug, Args)]
pub struct WebhookArgs {
    /// Webhook subcommand
    #[command(subcommand)]
    pub command: WebhookCommand,
}

/// Webhook subcommands
#[derive(Debug, Subcommand)]
pub enum WebhookCommand {
    /// Re-apply a captured delivery exactly as the provider sent it
    Replay {
        /// Provider name (`stripe` or `paddle`)
        #[arg(long)]
        provider: String,
        /// File holding the raw request body
        #[arg(long)]
        payload_file: PathBuf,
        /// Request header as `Name: value`; repeatable
        #[arg(long = "header", value_name = "NAME: VALUE")]
        headers: Vec<String>,
    },
}

/// Execute webhook commands
pub async fn execute(args: &WebhookArgs, config: &AppConfig, format: OutputFormat) -> AppResult<()> {
    match &args.command {
        WebhookCommand::Replay {
            provider,
            payload_file,
            headers,
        } => {
            let payload = tokio::fs::read(payload_file).await.map_err(|e| {
                AppError::validation(format!(
                    "Failed to read payload file {}: {}",
                    payload_file.display(),
                    e
                ))
            })?;
            let headers = headers
                .iter()
                .map(|line| SignatureHeaders::parse_line(line))
                .collect::<AppResult<SignatureHeaders>>()?;

            let services = super::build_services(config).await?;
            let outcome = services
                .billing
                .apply_provider_event(provider, &payload, &headers)
                .await?;

            let summary = match &outcome {
                EventOutcome::Applied {
                    subscription_id,
                    status,
                } => format!("Applied: subscription {} is now {}", subscription_id, status),
                EventOutcome::Duplicate => "Duplicate: event already processed".to_string(),
                EventOutcome::Stale => "Stale: recorded without effect".to_string(),
                EventOutcome::Ignored => "Ignored: event type has no effect".to_string(),
            };
            match format {
                OutputFormat::Table => output::print_success(&summary),
                OutputFormat::Json => output::print_item(&outcome, &[], format),
            }
        }
    }
    Ok(())
}
