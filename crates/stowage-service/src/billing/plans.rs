//! Plan catalogue lookups.

use stowage_core::config::PlanConfig;
use stowage_core::error::AppError;
use stowage_core::result::AppResult;
use stowage_entity::billing::PaymentProvider;

/// The configured plans.
#[derive(Debug, Clone, Default)]
pub struct PlanCatalog {
    plans: Vec<PlanConfig>,
}

impl PlanCatalog {
    /// Create a catalogue from configuration.
    pub fn new(plans: Vec<PlanConfig>) -> Self {
        Self { plans }
    }

    /// All plans.
    pub fn plans(&self) -> &[PlanConfig] {
        &self.plans
    }

    /// Find a plan by id.
    pub fn find(&self, plan_id: &str) -> Option<&PlanConfig> {
        self.plans.iter().find(|p| p.id == plan_id)
    }

    /// Resolve a checkout's plan reference: a plan id or the provider's price id.
    pub fn resolve(&self, provider: PaymentProvider, reference: &str) -> AppResult<&PlanConfig> {
        self.find(reference)
            .or_else(|| {
                self.plans.iter().find(|p| {
                    let price = match provider {
                        PaymentProvider::Stripe => p.stripe_price_id.as_deref(),
                        PaymentProvider::Paddle => p.paddle_price_id.as_deref(),
                    };
                    price == Some(reference)
                })
            })
            .ok_or_else(|| AppError::validation(format!("Unknown plan '{reference}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_by_id_or_price() {
        let catalog = PlanCatalog::new(vec![PlanConfig {
            id: "pro".into(),
            storage_bytes: 500,
            stripe_price_id: Some("price_pro".into()),
            paddle_price_id: Some("pri_pro".into()),
        }]);

        assert_eq!(catalog.resolve(PaymentProvider::Stripe, "pro").unwrap().id, "pro");
        assert_eq!(catalog.resolve(PaymentProvider::Paddle, "pri_pro").unwrap().id, "pro");
        assert!(catalog.resolve(PaymentProvider::Stripe, "pri_pro").is_err());
    }
}
