//! Subscription entity model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use stowage_core::types::{SubscriptionId, UserId};

use super::status::{PaymentProvider, SubscriptionStatus};

/// Canonical view of one provider subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct SubscriptionRecord {
    /// Unique subscription identifier.
    pub id: SubscriptionId,
    /// Subscribed user.
    pub user_id: UserId,
    /// Purchased plan.
    pub plan_id: String,
    /// Provider that bills this subscription.
    pub provider: PaymentProvider,
    /// Provider-side subscription id.
    pub provider_subscription_id: String,
    /// Canonical status.
    pub status: SubscriptionStatus,
    /// Whether `granted_bytes` is currently added to the user's entitlement.
    pub entitlement_applied: bool,
    /// Exact number of bytes granted, so revocation is exact.
    pub granted_bytes: i64,
    /// Consecutive failed payments.
    pub failed_payment_count: i32,
    /// Timestamp of the newest applied event.
    pub last_event_at: Option<DateTime<Utc>>,
    /// End of the current billing period.
    pub current_period_end: Option<DateTime<Utc>>,
    /// Provider event ids already applied.
    pub processed_event_ids: Vec<String>,
    /// When the record was created.
    pub created_at: DateTime<Utc>,
    /// When the record was last updated.
    pub updated_at: DateTime<Utc>,
}

impl SubscriptionRecord {
    /// Check if an event id has already been applied.
    pub fn has_processed(&self, event_id: &str) -> bool {
        self.processed_event_ids.iter().any(|id| id == event_id)
    }

    /// Whether an event timestamped `occurred_at` predates the newest applied one.
    pub fn is_stale(&self, occurred_at: DateTime<Utc>) -> bool {
        self.last_event_at.is_some_and(|last| occurred_at < last)
    }

    /// Record an event id as applied.
    pub fn record_event(&mut self, event_id: &str) {
        if !self.has_processed(event_id) {
            self.processed_event_ids.push(event_id.to_string());
        }
    }
}
