//! Stripe webhook adapter.
//!
//! `Stripe-Signature: t=<unix>,v1=<hex>[,v1=<hex>...]`, where each `v1` is
//! HMAC-SHA256 of `"<t>.<payload>"`.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use stowage_core::error::AppError;
use stowage_core::result::AppResult;
use stowage_core::types::UserId;
use stowage_entity::billing::{CanonicalEvent, CanonicalEventKind, PaymentProvider};

use super::adapter::{ProviderAdapter, WebhookSigner, parse_json, require_str, str_at};
use super::headers::SignatureHeaders;

/// Header carrying Stripe's signature.
pub const SIGNATURE_HEADER: &str = "stripe-signature";

#[derive(Debug, Deserialize)]
struct StripeEnvelope {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    created: i64,
    data: StripeData,
}

#[derive(Debug, Deserialize)]
struct StripeData {
    object: Value,
}

/// Verifies and normalizes Stripe events.
#[derive(Debug, Clone)]
pub struct StripeAdapter {
    signer: WebhookSigner,
}

impl StripeAdapter {
    /// Create an adapter for the given endpoint secret.
    pub fn new(webhook_secret: &str, tolerance_seconds: i64) -> Self {
        Self {
            signer: WebhookSigner::new(webhook_secret, tolerance_seconds),
        }
    }

    /// Build a `Stripe-Signature` header value for `payload`.
    pub fn signature_header(&self, payload: &[u8], timestamp: i64) -> AppResult<String> {
        let ts = timestamp.to_string();
        let sig = self.signer.sign(&ts, b'.', payload)?;
        Ok(format!("t={ts},v1={sig}"))
    }
}

impl ProviderAdapter for StripeAdapter {
    fn provider(&self) -> PaymentProvider {
        PaymentProvider::Stripe
    }

    fn verify(
        &self,
        payload: &[u8],
        headers: &SignatureHeaders,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        let header = headers
            .get(SIGNATURE_HEADER)
            .ok_or_else(|| AppError::signature("Missing Stripe-Signature header"))?;

        let mut timestamp = None;
        let mut signatures = Vec::new();
        for part in header.split(',') {
            match part.trim().split_once('=') {
                Some(("t", value)) => timestamp = Some(value),
                Some(("v1", value)) => signatures.push(value),
                _ => {}
            }
        }
        let timestamp =
            timestamp.ok_or_else(|| AppError::signature("Stripe-Signature has no timestamp"))?;
        if signatures.is_empty() {
            return Err(AppError::signature("Stripe-Signature has no v1 signature"));
        }
        self.signer
            .verify(timestamp, b'.', payload, &signatures, now)
    }

    fn normalize(&self, payload: &[u8]) -> AppResult<CanonicalEvent> {
        let StripeEnvelope {
            id,
            event_type,
            created,
            data,
        } = parse_json::<StripeEnvelope>(PaymentProvider::Stripe, payload)?;
        let object = &data.object;
        let occurred_at = from_unix(created)?;

        let (kind, subscription_id, period_end, amount) = match event_type.as_str() {
            "checkout.session.completed" => {
                let user = str_at(object, "/client_reference_id")
                    .or_else(|| str_at(object, "/metadata/user_id"))
                    .ok_or_else(|| {
                        AppError::validation("Checkout session has no client_reference_id")
                    })?;
                let user_id: UserId = user
                    .parse()
                    .map_err(|_| AppError::validation(format!("Invalid user id '{user}'")))?;
                let plan_id = require_str(object, "/metadata/plan_id")?;
                (
                    CanonicalEventKind::CheckoutCompleted {
                        user_id,
                        plan_id: plan_id.to_string(),
                    },
                    require_str(object, "/subscription")?,
                    None,
                    object.get("amount_total").and_then(Value::as_i64),
                )
            }
            "invoice.paid" | "invoice.payment_failed" => {
                let Some(subscription) = invoice_subscription(object) else {
                    return Ok(self.ignored(id, event_type.clone(), "", occurred_at));
                };
                let (kind, amount_field) = if event_type == "invoice.paid" {
                    (CanonicalEventKind::InvoicePaid, "amount_paid")
                } else {
                    (CanonicalEventKind::InvoiceFailed, "amount_due")
                };
                let period_end = object
                    .pointer("/lines/data/0/period/end")
                    .or_else(|| object.get("period_end"))
                    .and_then(Value::as_i64)
                    .map(from_unix)
                    .transpose()?;
                (
                    kind,
                    subscription,
                    period_end,
                    object.get(amount_field).and_then(Value::as_i64),
                )
            }
            "customer.subscription.paused"
            | "customer.subscription.resumed"
            | "customer.subscription.deleted" => {
                let kind = match event_type.as_str() {
                    "customer.subscription.paused" => CanonicalEventKind::Paused,
                    "customer.subscription.resumed" => CanonicalEventKind::Resumed,
                    _ if object.get("cancel_at_period_end").and_then(Value::as_bool) == Some(true) => {
                        CanonicalEventKind::Expired
                    }
                    _ => CanonicalEventKind::Cancelled,
                };
                let period_end = object
                    .get("current_period_end")
                    .or_else(|| object.pointer("/items/data/0/current_period_end"))
                    .and_then(Value::as_i64)
                    .map(from_unix)
                    .transpose()?;
                (kind, require_str(object, "/id")?, period_end, None)
            }
            _ => {
                let subscription = str_at(object, "/subscription").unwrap_or_default();
                return Ok(self.ignored(id, event_type.clone(), subscription, occurred_at));
            }
        };

        Ok(CanonicalEvent {
            event_id: id,
            provider: PaymentProvider::Stripe,
            provider_subscription_id: subscription_id.to_string(),
            kind,
            occurred_at,
            period_end,
            amount,
        })
    }
}

impl StripeAdapter {
    fn ignored(
        &self,
        event_id: String,
        event_type: String,
        subscription: &str,
        occurred_at: DateTime<Utc>,
    ) -> CanonicalEvent {
        CanonicalEvent {
            event_id,
            provider: PaymentProvider::Stripe,
            provider_subscription_id: subscription.to_string(),
            kind: CanonicalEventKind::Ignored { event_type },
            occurred_at,
            period_end: None,
            amount: None,
        }
    }
}

/// Newer API versions nest the subscription under `parent`.
fn invoice_subscription(invoice: &Value) -> Option<&str> {
    str_at(invoice, "/subscription")
        .or_else(|| str_at(invoice, "/parent/subscription_details/subscription"))
        .filter(|s| !s.is_empty())
}

fn from_unix(seconds: i64) -> AppResult<DateTime<Utc>> {
    DateTime::from_timestamp(seconds, 0)
        .ok_or_else(|| AppError::validation(format!("Invalid Unix timestamp {seconds}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use stowage_core::error::ErrorKind;

    fn adapter() -> StripeAdapter {
        StripeAdapter::new("whsec_test", 300)
    }

    #[test]
    fn test_verify_accepts_any_matching_v1() {
        let payload = br#"{"id":"evt_1"}"#;
        let now = Utc::now();
        let header = adapter().signature_header(payload, now.timestamp()).unwrap();
        let rotated = format!("{header},v1=deadbeef");

        let headers = SignatureHeaders::new().with("Stripe-Signature", rotated);
        assert!(adapter().verify(payload, &headers, now).is_ok());

        let other = StripeAdapter::new("whsec_other", 300);
        let err = other.verify(payload, &headers, now).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Signature);
    }

    #[test]
    fn test_missing_header_is_signature_error() {
        let err = adapter()
            .verify(b"{}", &SignatureHeaders::new(), Utc::now())
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Signature);
    }

    #[test]
    fn test_normalize_checkout() {
        let user = UserId::new();
        let payload = json!({
            "id": "evt_checkout",
            "type": "checkout.session.completed",
            "created": 1_700_000_000,
            "data": {"object": {
                "client_reference_id": user.to_string(),
                "subscription": "sub_123",
                "amount_total": 999,
                "metadata": {"plan_id": "pro"}
            }}
        });
        let event = adapter().normalize(payload.to_string().as_bytes()).unwrap();
        assert_eq!(event.event_id, "evt_checkout");
        assert_eq!(event.provider_subscription_id, "sub_123");
        assert_eq!(event.amount, Some(999));
        assert_eq!(
            event.kind,
            CanonicalEventKind::CheckoutCompleted {
                user_id: user,
                plan_id: "pro".into()
            }
        );
    }

    #[test]
    fn test_normalize_invoice_and_deletion() {
        let failed = json!({
            "id": "evt_fail",
            "type": "invoice.payment_failed",
            "created": 1_700_000_100,
            "data": {"object": {
                "parent": {"subscription_details": {"subscription": "sub_123"}},
                "amount_due": 999
            }}
        });
        let event = adapter().normalize(failed.to_string().as_bytes()).unwrap();
        assert_eq!(event.kind, CanonicalEventKind::InvoiceFailed);
        assert_eq!(event.provider_subscription_id, "sub_123");

        let deleted = json!({
            "id": "evt_del",
            "type": "customer.subscription.deleted",
            "created": 1_700_000_200,
            "data": {"object": {"id": "sub_123", "cancel_at_period_end": true}}
        });
        let event = adapter().normalize(deleted.to_string().as_bytes()).unwrap();
        assert_eq!(event.kind, CanonicalEventKind::Expired);
    }

    #[test]
    fn test_unknown_type_is_ignored_and_garbage_is_validation() {
        let other = json!({
            "id": "evt_x",
            "type": "customer.created",
            "created": 1_700_000_000,
            "data": {"object": {"id": "cus_1"}}
        });
        let event = adapter().normalize(other.to_string().as_bytes()).unwrap();
        assert!(matches!(event.kind, CanonicalEventKind::Ignored { .. }));

        let err = adapter().normalize(b"not json").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
    }
}
