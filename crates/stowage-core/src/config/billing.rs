//! Billing and plan configuration.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::AppError;

/// Payment provider settings and the plan catalogue.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct BillingConfig {
    /// Stripe webhook settings.
    #[serde(default)]
    pub stripe: ProviderSecretConfig,
    /// Paddle webhook settings.
    #[serde(default)]
    pub paddle: ProviderSecretConfig,
    /// Maximum accepted age of a signed webhook timestamp.
    #[serde(default = "default_tolerance")]
    #[validate(range(min = 1, max = 86_400))]
    pub signature_tolerance_seconds: i64,
    /// Consecutive failed payments after which a past-due subscription fails.
    #[serde(default = "default_max_failed_payments")]
    #[validate(range(min = 1, max = 100))]
    pub max_failed_payments: i32,
    /// Purchasable plans.
    #[serde(default)]
    #[validate(nested)]
    pub plans: Vec<PlanConfig>,
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            stripe: ProviderSecretConfig::default(),
            paddle: ProviderSecretConfig::default(),
            signature_tolerance_seconds: default_tolerance(),
            max_failed_payments: default_max_failed_payments(),
            plans: Vec::new(),
        }
    }
}

impl BillingConfig {
    /// Reject catalogues with repeated plan ids.
    pub fn check_plans(&self) -> Result<(), AppError> {
        let mut seen = HashSet::new();
        for plan in &self.plans {
            if !seen.insert(plan.id.as_str()) {
                return Err(AppError::configuration(format!(
                    "Duplicate plan id '{}'",
                    plan.id
                )));
            }
        }
        Ok(())
    }
}

/// Webhook secret for one payment provider.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProviderSecretConfig {
    /// Shared secret used to verify webhook signatures.
    #[serde(default)]
    pub webhook_secret: String,
}

/// A purchasable storage plan.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PlanConfig {
    /// Plan identifier referenced in checkout metadata.
    #[validate(length(min = 1, max = 64))]
    pub id: String,
    /// Bytes granted while the subscription is active.
    #[validate(range(min = 1))]
    pub storage_bytes: i64,
    /// Stripe price id mapped to this plan.
    #[serde(default)]
    pub stripe_price_id: Option<String>,
    /// Paddle price id mapped to this plan.
    #[serde(default)]
    pub paddle_price_id: Option<String>,
}

fn default_tolerance() -> i64 {
    300
}

fn default_max_failed_payments() -> i32 {
    3
}
