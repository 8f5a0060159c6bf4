//! Billing: webhook verification, normalization, and the subscription
//! entitlement state machine.

pub mod adapter;
pub mod headers;
pub mod machine;
pub mod paddle;
pub mod plans;
pub mod service;
pub mod stripe;

pub use adapter::ProviderAdapter;
pub use headers::SignatureHeaders;
pub use machine::{EntitlementChange, Transition, entitlement_change, transition};
pub use paddle::PaddleAdapter;
pub use plans::PlanCatalog;
pub use service::{BillingService, EventOutcome};
pub use stripe::StripeAdapter;
