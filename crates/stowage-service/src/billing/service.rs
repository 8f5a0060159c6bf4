//! Billing service: applies verified provider events to subscriptions and
//! the user's storage entitlement.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use stowage_core::config::BillingConfig;
use stowage_core::error::AppError;
use stowage_core::result::AppResult;
use stowage_core::types::{SubscriptionId, UserId};
use stowage_database::{MetadataStore, UnitOfWork};
use stowage_entity::billing::{
    CanonicalEvent, CanonicalEventKind, PaymentProvider, SubscriptionRecord, SubscriptionStatus,
};

use super::adapter::ProviderAdapter;
use super::headers::SignatureHeaders;
use super::machine::{EntitlementChange, entitlement_change, transition};
use super::paddle::PaddleAdapter;
use super::plans::PlanCatalog;
use super::stripe::StripeAdapter;
use crate::quota::QuotaLedger;

/// What applying an event did. Every variant is safe to acknowledge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EventOutcome {
    /// State advanced (or was confirmed) by this event.
    Applied {
        /// The affected subscription.
        subscription_id: SubscriptionId,
        /// Status after the event.
        status: SubscriptionStatus,
    },
    /// The event id was already processed.
    Duplicate,
    /// The event predates the newest applied one; recorded, not applied.
    Stale,
    /// Nothing to do for this event.
    Ignored,
}

/// Applies provider webhooks.
pub struct BillingService {
    store: Arc<dyn MetadataStore>,
    adapters: HashMap<PaymentProvider, Arc<dyn ProviderAdapter>>,
    plans: PlanCatalog,
    max_failed_payments: i32,
}

impl fmt::Debug for BillingService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BillingService")
            .field("providers", &self.adapters.keys().collect::<Vec<_>>())
            .field("plans", &self.plans.plans().len())
            .field("max_failed_payments", &self.max_failed_payments)
            .finish()
    }
}

impl BillingService {
    /// Create a billing service with the Stripe and Paddle adapters.
    pub fn new(store: Arc<dyn MetadataStore>, config: &BillingConfig) -> Self {
        let tolerance = config.signature_tolerance_seconds;
        let mut adapters: HashMap<PaymentProvider, Arc<dyn ProviderAdapter>> = HashMap::new();
        adapters.insert(
            PaymentProvider::Stripe,
            Arc::new(StripeAdapter::new(&config.stripe.webhook_secret, tolerance)),
        );
        adapters.insert(
            PaymentProvider::Paddle,
            Arc::new(PaddleAdapter::new(&config.paddle.webhook_secret, tolerance)),
        );

        Self {
            store,
            adapters,
            plans: PlanCatalog::new(config.plans.clone()),
            max_failed_payments: config.max_failed_payments,
        }
    }

    /// The plan catalogue.
    pub fn plans(&self) -> &PlanCatalog {
        &self.plans
    }

    /// A user's subscriptions, newest first.
    pub async fn subscriptions(&self, user_id: UserId) -> AppResult<Vec<SubscriptionRecord>> {
        let mut records = self.store.list_subscriptions(user_id).await?;
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }

    /// Verify, normalize, and apply one webhook delivery.
    ///
    /// `Signature` and `Validation` errors must be rejected without retry;
    /// retryable errors must not be acknowledged so the provider redelivers.
    pub async fn apply_provider_event(
        &self,
        provider_name: &str,
        raw_payload: &[u8],
        headers: &SignatureHeaders,
    ) -> AppResult<EventOutcome> {
        let provider: PaymentProvider = provider_name.parse()?;
        let adapter = self.adapters.get(&provider).ok_or_else(|| {
            AppError::configuration(format!("No adapter registered for {provider}"))
        })?;

        let event = adapter
            .verify_and_normalize(raw_payload, headers, Utc::now())
            .inspect_err(|e| {
                warn!(provider = %provider, error = %e, "Webhook delivery rejected");
            })?;
        self.apply_event(event).await
    }

    /// Apply an already verified canonical event.
    pub async fn apply_event(&self, event: CanonicalEvent) -> AppResult<EventOutcome> {
        if let CanonicalEventKind::Ignored { event_type } = &event.kind {
            info!(
                provider = %event.provider,
                event_id = %event.event_id,
                event_type = %event_type,
                "Webhook event ignored"
            );
            return Ok(EventOutcome::Ignored);
        }

        // Unlocked lookup to learn whose lock to take.
        let existing = self
            .store
            .find_subscription(event.provider, &event.provider_subscription_id)
            .await?;
        let user_id: UserId = match (&existing, &event.kind) {
            (Some(record), _) => record.user_id,
            (None, CanonicalEventKind::CheckoutCompleted { user_id, .. }) => *user_id,
            (None, _) => {
                warn!(
                    provider = %event.provider,
                    event_id = %event.event_id,
                    subscription = %event.provider_subscription_id,
                    kind = event.kind.name(),
                    "Event for unknown subscription, awaiting checkout"
                );
                return Err(AppError::conflict(format!(
                    "Subscription {} is not known yet",
                    event.provider_subscription_id
                )));
            }
        };

        let mut uow = self.store.begin(user_id).await?;
        match uow
            .subscription(event.provider, &event.provider_subscription_id)
            .await?
        {
            None => self.create_subscription(uow, &event, user_id).await,
            Some(record) => self.advance_subscription(uow, &event, record).await,
        }
    }

    async fn create_subscription(
        &self,
        mut uow: Box<dyn UnitOfWork>,
        event: &CanonicalEvent,
        user_id: UserId,
    ) -> AppResult<EventOutcome> {
        let CanonicalEventKind::CheckoutCompleted { plan_id, .. } = &event.kind else {
            return Err(AppError::conflict(format!(
                "Subscription {} is not known yet",
                event.provider_subscription_id
            )));
        };
        let plan = self.plans.resolve(event.provider, plan_id)?;

        let now = Utc::now();
        let mut record = SubscriptionRecord {
            id: SubscriptionId::new(),
            user_id,
            plan_id: plan.id.clone(),
            provider: event.provider,
            provider_subscription_id: event.provider_subscription_id.clone(),
            status: SubscriptionStatus::Active,
            entitlement_applied: false,
            granted_bytes: 0,
            failed_payment_count: 0,
            last_event_at: Some(event.occurred_at),
            current_period_end: event.period_end,
            processed_event_ids: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        record.record_event(&event.event_id);

        let quota_mutated = self.apply_entitlement(uow.as_mut(), &mut record).await?;
        uow.insert_subscription(&record).await?;
        commit(uow, event, &record, quota_mutated).await?;

        info!(
            user_id = %user_id,
            subscription_id = %record.id,
            provider = %record.provider,
            plan_id = %record.plan_id,
            granted_bytes = record.granted_bytes,
            "Subscription created"
        );
        Ok(EventOutcome::Applied {
            subscription_id: record.id,
            status: record.status,
        })
    }

    async fn advance_subscription(
        &self,
        mut uow: Box<dyn UnitOfWork>,
        event: &CanonicalEvent,
        mut record: SubscriptionRecord,
    ) -> AppResult<EventOutcome> {
        if record.has_processed(&event.event_id) {
            info!(
                subscription_id = %record.id,
                event_id = %event.event_id,
                "Duplicate webhook event"
            );
            return Ok(EventOutcome::Duplicate);
        }

        let stale = record.is_stale(event.occurred_at);
        if stale || record.status.is_terminal() {
            record.record_event(&event.event_id);
            record.updated_at = Utc::now();
            uow.update_subscription(&record).await?;
            commit(uow, event, &record, false).await?;
            info!(
                subscription_id = %record.id,
                event_id = %event.event_id,
                kind = event.kind.name(),
                status = %record.status,
                stale,
                "Webhook event recorded without effect"
            );
            return Ok(if stale {
                EventOutcome::Stale
            } else {
                EventOutcome::Ignored
            });
        }

        let previous = record.status;
        let next = transition(
            record.status,
            record.failed_payment_count,
            &event.kind,
            self.max_failed_payments,
        );
        record.status = next.status;
        record.failed_payment_count = next.failed_payment_count;
        record.last_event_at = Some(event.occurred_at);
        if event.period_end.is_some() {
            record.current_period_end = event.period_end;
        }
        record.record_event(&event.event_id);
        record.updated_at = Utc::now();

        let quota_mutated = self.apply_entitlement(uow.as_mut(), &mut record).await?;
        uow.update_subscription(&record).await?;
        commit(uow, event, &record, quota_mutated).await?;

        info!(
            user_id = %record.user_id,
            subscription_id = %record.id,
            event_id = %event.event_id,
            kind = event.kind.name(),
            from = %previous,
            to = %record.status,
            entitlement_applied = record.entitlement_applied,
            "Subscription updated"
        );
        Ok(EventOutcome::Applied {
            subscription_id: record.id,
            status: record.status,
        })
    }

    /// Grant or revoke bytes for the record's new status. Returns whether
    /// the quota was touched.
    async fn apply_entitlement(
        &self,
        uow: &mut dyn UnitOfWork,
        record: &mut SubscriptionRecord,
    ) -> AppResult<bool> {
        match entitlement_change(record.status, record.entitlement_applied) {
            EntitlementChange::Grant => {
                let plan = self.plans.find(&record.plan_id).ok_or_else(|| {
                    AppError::configuration(format!(
                        "Plan '{}' is no longer configured",
                        record.plan_id
                    ))
                })?;
                QuotaLedger::adjust_entitlement_in(uow, plan.storage_bytes).await?;
                record.granted_bytes = plan.storage_bytes;
                record.entitlement_applied = true;
                Ok(true)
            }
            EntitlementChange::Revoke => {
                QuotaLedger::adjust_entitlement_in(uow, -record.granted_bytes).await?;
                record.entitlement_applied = false;
                Ok(true)
            }
            EntitlementChange::Keep => Ok(false),
        }
    }
}

async fn commit(
    uow: Box<dyn UnitOfWork>,
    event: &CanonicalEvent,
    record: &SubscriptionRecord,
    quota_mutated: bool,
) -> AppResult<()> {
    if let Err(e) = uow.commit().await {
        if quota_mutated {
            error!(
                alert = true,
                user_id = %record.user_id,
                subscription_id = %record.id,
                event_id = %event.event_id,
                error = %e,
                "Commit failed after entitlement change; manual reconciliation required"
            );
        }
        return Err(e);
    }
    Ok(())
}
