//! Application configuration schemas.
//!
//! All configuration structs are deserialized from TOML files via the
//! `config` crate. Each sub-module represents a logical configuration
//! section.

pub mod billing;
pub mod database;
pub mod logging;
pub mod quota;
pub mod storage;
pub mod upload;
pub mod worker;

use serde::{Deserialize, Serialize};
use validator::Validate;

pub use self::billing::{BillingConfig, PlanConfig, ProviderSecretConfig};
pub use self::database::DatabaseConfig;
pub use self::logging::LoggingConfig;
pub use self::quota::QuotaConfig;
pub use self::storage::{LocalObjectStoreConfig, ObjectStoreConfig, S3ObjectStoreConfig};
pub use self::upload::UploadConfig;
pub use self::worker::WorkerConfig;

use crate::error::AppError;

/// Root application configuration.
///
/// This struct is the top-level deserialization target for the merged
/// TOML configuration files (default.toml + environment overlay).
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AppConfig {
    /// Database connection settings.
    #[validate(nested)]
    pub database: DatabaseConfig,
    /// Object store settings.
    #[serde(default)]
    #[validate(nested)]
    pub object_store: ObjectStoreConfig,
    /// Upload protocol settings.
    #[serde(default)]
    #[validate(nested)]
    pub upload: UploadConfig,
    /// Quota defaults and trash retention.
    #[serde(default)]
    pub quota: QuotaConfig,
    /// Payment provider and plan settings.
    #[serde(default)]
    #[validate(nested)]
    pub billing: BillingConfig,
    /// Background worker settings.
    #[serde(default)]
    pub worker: WorkerConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from TOML files.
    ///
    /// Merges the default configuration with an environment-specific overlay
    /// and environment variables prefixed with `STOWAGE__`.
    pub fn load(env: &str) -> Result<Self, AppError> {
        Self::load_from("config/default", env)
    }

    /// Load configuration using an explicit base file (without extension).
    pub fn load_from(base: &str, env: &str) -> Result<Self, AppError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(base).required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("STOWAGE")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to build config: {e}")))?;

        let config: Self = config
            .try_deserialize()
            .map_err(|e| AppError::configuration(format!("Failed to deserialize config: {e}")))?;

        config.check()?;
        Ok(config)
    }

    /// Run field validation and the cross-field checks `validator` cannot express.
    pub fn check(&self) -> Result<(), AppError> {
        self.validate()
            .map_err(|e| AppError::configuration(format!("Invalid configuration: {e}")))?;
        self.billing.check_plans()?;
        if !self.database.lock_wait_fits_acquire() {
            return Err(AppError::configuration(
                "database.lock_wait_timeout_seconds must not exceed acquire_timeout_seconds",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml: &str) -> AppConfig {
        config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()
            .expect("build")
            .try_deserialize()
            .expect("deserialize")
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = parse(
            r#"
            [database]
            url = "postgres://localhost/stowage"
            "#,
        );
        assert_eq!(config.object_store.provider, "local");
        assert_eq!(config.upload.reservation_ttl_seconds, 3600);
        assert_eq!(config.billing.max_failed_payments, 3);
        assert!(config.check().is_ok());
    }

    #[test]
    fn test_duplicate_plan_ids_rejected() {
        let config = parse(
            r#"
            [database]
            url = "postgres://localhost/stowage"

            [[billing.plans]]
            id = "pro"
            storage_bytes = 100

            [[billing.plans]]
            id = "pro"
            storage_bytes = 200
            "#,
        );
        let err = config.check().expect_err("duplicate plan ids");
        assert_eq!(err.kind, crate::error::ErrorKind::Configuration);
    }

    #[test]
    fn test_zero_upload_ttl_rejected() {
        let config = parse(
            r#"
            [database]
            url = "postgres://localhost/stowage"

            [object_store]
            upload_url_ttl_seconds = 0
            "#,
        );
        assert!(config.check().is_err());
    }

    #[test]
    fn test_lock_wait_longer_than_acquire_rejected() {
        let config = parse(
            r#"
            [database]
            url = "postgres://localhost/stowage"
            acquire_timeout_seconds = 5
            lock_wait_timeout_seconds = 20
            "#,
        );
        let err = config.check().expect_err("lock wait exceeds acquire");
        assert_eq!(err.kind, crate::error::ErrorKind::Configuration);
        assert_eq!(config.database.statement_timeout_seconds, 30);
    }
}
