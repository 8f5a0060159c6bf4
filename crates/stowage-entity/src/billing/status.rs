//! Subscription status and payment provider enumerations.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use stowage_core::AppError;

/// Canonical subscription status shared by every provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "subscription_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// Paid and entitled.
    Active,
    /// A payment failed; entitlement kept during the grace period.
    PastDue,
    /// Paused by the customer; entitlement revoked.
    Paused,
    /// Cancelled immediately.
    Cancelled,
    /// Ran to the end of its final period.
    Expired,
    /// Too many failed payments.
    Failed,
}

impl SubscriptionStatus {
    /// Terminal states ignore every further event.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Expired | Self::Failed)
    }

    /// Whether a subscription in this state keeps its granted bytes.
    pub fn holds_entitlement(&self) -> bool {
        matches!(self, Self::Active | Self::PastDue)
    }

    /// Return the status as a snake_case string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::PastDue => "past_due",
            Self::Paused => "paused",
            Self::Cancelled => "cancelled",
            Self::Expired => "expired",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// External payment provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "payment_provider", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PaymentProvider {
    /// Stripe.
    Stripe,
    /// Paddle.
    Paddle,
}

impl PaymentProvider {
    /// Return the provider as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stripe => "stripe",
            Self::Paddle => "paddle",
        }
    }
}

impl fmt::Display for PaymentProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PaymentProvider {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "stripe" => Ok(Self::Stripe),
            "paddle" => Ok(Self::Paddle),
            _ => Err(AppError::validation(format!(
                "Unknown payment provider: '{s}'. Expected one of: stripe, paddle"
            ))),
        }
    }
}
