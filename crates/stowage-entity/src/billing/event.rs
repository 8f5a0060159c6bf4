//! Provider-agnostic billing events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stowage_core::types::UserId;

use super::status::PaymentProvider;

/// A verified webhook delivery after normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalEvent {
    /// Provider-assigned event id, used as the idempotency key.
    pub event_id: String,
    /// Provider that sent the event.
    pub provider: PaymentProvider,
    /// Provider-side subscription id.
    pub provider_subscription_id: String,
    /// What happened.
    pub kind: CanonicalEventKind,
    /// When the provider says it happened.
    pub occurred_at: DateTime<Utc>,
    /// End of the current billing period, when known.
    pub period_end: Option<DateTime<Utc>>,
    /// Amount in minor currency units, when known.
    pub amount: Option<i64>,
}

/// Canonical event kinds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CanonicalEventKind {
    /// Checkout finished; creates the subscription.
    CheckoutCompleted {
        /// Purchasing user.
        user_id: UserId,
        /// Purchased plan.
        plan_id: String,
    },
    /// A renewal invoice was paid.
    InvoicePaid,
    /// A renewal payment failed.
    InvoiceFailed,
    /// Subscription paused.
    Paused,
    /// Subscription resumed.
    Resumed,
    /// Subscription cancelled immediately.
    Cancelled,
    /// Subscription ended at period end.
    Expired,
    /// An event type this system does not act on.
    Ignored {
        /// Provider event type.
        event_type: String,
    },
}

impl CanonicalEventKind {
    /// Short name used in logs.
    pub fn name(&self) -> &str {
        match self {
            Self::CheckoutCompleted { .. } => "checkout_completed",
            Self::InvoicePaid => "invoice_paid",
            Self::InvoiceFailed => "invoice_failed",
            Self::Paused => "paused",
            Self::Resumed => "resumed",
            Self::Cancelled => "cancelled",
            Self::Expired => "expired",
            Self::Ignored { .. } => "ignored",
        }
    }
}
