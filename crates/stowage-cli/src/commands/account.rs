//! Quota account commands.

use clap::{Args, Subcommand};

use stowage_core::config::AppConfig;
use stowage_core::result::AppResult;
use stowage_core::types::UserId;

use crate::output::{self, OutputFormat};

/// Arguments for account commands
#[derive(Debug, Args)]
pub struct AccountArgs {
    /// Account subcommand
    #[command(subcommand)]
    pub command: AccountCommand,
}

/// Account subcommands
#[derive(Debug, Subcommand)]
pub enum AccountCommand {
    /// Create the root directory and quota account for a user
    Provision {
        /// User id (UUID)
        user_id: UserId,
    },
    /// Show a user's quota usage
    Show {
        /// User id (UUID)
        user_id: UserId,
    },
}

/// Execute account commands
pub async fn execute(args: &AccountArgs, config: &AppConfig, format: OutputFormat) -> AppResult<()> {
    let services = super::build_services(config).await?;

    match &args.command {
        AccountCommand::Provision { user_id } => {
            let provisioned = services.accounts.provision(*user_id).await?;
            if provisioned.created {
                output::print_success(&format!("Provisioned account for {}", user_id));
            } else {
                output::print_warning(&format!("Account for {} already exists", user_id));
            }
            output::print_kv("Root directory", &provisioned.root.id.to_string());
            output::print_kv(
                "Max storage bytes",
                &provisioned.account.max_storage_bytes.to_string(),
            );
        }
        AccountCommand::Show { user_id } => {
            let account = services.accounts.get_account(*user_id).await?;
            let pairs = [
                ("User", account.user_id.to_string()),
                ("Root directory", account.root_directory_id.to_string()),
                ("Max storage bytes", account.max_storage_bytes.to_string()),
                ("Used storage bytes", account.used_storage_bytes.to_string()),
                ("Remaining bytes", account.remaining_bytes().to_string()),
                ("Updated", account.updated_at.format("%Y-%m-%d %H:%M").to_string()),
            ];
            output::print_item(&account, &pairs, format);
        }
    }

    Ok(())
}
