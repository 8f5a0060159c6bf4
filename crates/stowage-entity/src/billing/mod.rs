//! Billing entities: subscriptions and normalized provider events.

pub mod event;
pub mod status;
pub mod subscription;

pub use event::{CanonicalEvent, CanonicalEventKind};
pub use status::{PaymentProvider, SubscriptionStatus};
pub use subscription::SubscriptionRecord;
