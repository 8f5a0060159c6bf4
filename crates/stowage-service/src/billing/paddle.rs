//! Paddle webhook adapter.
//!
//! `Paddle-Signature: ts=<unix>;h1=<hex>`, where `h1` is HMAC-SHA256 of
//! `"<ts>:<payload>"`.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use stowage_core::error::AppError;
use stowage_core::result::AppResult;
use stowage_core::types::UserId;
use stowage_entity::billing::{CanonicalEvent, CanonicalEventKind, PaymentProvider};

use super::adapter::{ProviderAdapter, WebhookSigner, parse_json, require_str, str_at};
use super::headers::SignatureHeaders;

/// Header carrying Paddle's signature.
pub const SIGNATURE_HEADER: &str = "paddle-signature";

#[derive(Debug, Deserialize)]
struct PaddleEnvelope {
    event_id: String,
    event_type: String,
    occurred_at: DateTime<Utc>,
    data: Value,
}

/// Verifies and normalizes Paddle Billing events.
#[derive(Debug, Clone)]
pub struct PaddleAdapter {
    signer: WebhookSigner,
}

impl PaddleAdapter {
    /// Create an adapter for the given notification secret.
    pub fn new(webhook_secret: &str, tolerance_seconds: i64) -> Self {
        Self {
            signer: WebhookSigner::new(webhook_secret, tolerance_seconds),
        }
    }

    /// Build a `Paddle-Signature` header value for `payload`.
    pub fn signature_header(&self, payload: &[u8], timestamp: i64) -> AppResult<String> {
        let ts = timestamp.to_string();
        let sig = self.signer.sign(&ts, b':', payload)?;
        Ok(format!("ts={ts};h1={sig}"))
    }
}

impl ProviderAdapter for PaddleAdapter {
    fn provider(&self) -> PaymentProvider {
        PaymentProvider::Paddle
    }

    fn verify(
        &self,
        payload: &[u8],
        headers: &SignatureHeaders,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        let header = headers
            .get(SIGNATURE_HEADER)
            .ok_or_else(|| AppError::signature("Missing Paddle-Signature header"))?;

        let mut timestamp = None;
        let mut signatures = Vec::new();
        for part in header.split(';') {
            match part.trim().split_once('=') {
                Some(("ts", value)) => timestamp = Some(value),
                Some(("h1", value)) => signatures.push(value),
                _ => {}
            }
        }
        let timestamp =
            timestamp.ok_or_else(|| AppError::signature("Paddle-Signature has no timestamp"))?;
        if signatures.is_empty() {
            return Err(AppError::signature("Paddle-Signature has no h1 signature"));
        }
        self.signer
            .verify(timestamp, b':', payload, &signatures, now)
    }

    fn normalize(&self, payload: &[u8]) -> AppResult<CanonicalEvent> {
        let PaddleEnvelope {
            event_id,
            event_type,
            occurred_at,
            data,
        } = parse_json::<PaddleEnvelope>(PaymentProvider::Paddle, payload)?;

        let (kind, subscription_id, period_end, amount) = match event_type.as_str() {
            "subscription.created" | "subscription.activated" => {
                let user = require_str(&data, "/custom_data/user_id")?;
                let user_id: UserId = user
                    .parse()
                    .map_err(|_| AppError::validation(format!("Invalid user id '{user}'")))?;
                // Plan id from custom data, else the first item's price id.
                let plan_id = str_at(&data, "/custom_data/plan_id")
                    .or_else(|| str_at(&data, "/items/0/price/id"))
                    .ok_or_else(|| AppError::validation("Subscription carries no plan"))?;
                (
                    CanonicalEventKind::CheckoutCompleted {
                        user_id,
                        plan_id: plan_id.to_string(),
                    },
                    require_str(&data, "/id")?,
                    rfc3339_at(&data, "/current_billing_period/ends_at")?,
                    None,
                )
            }
            "transaction.completed" | "transaction.payment_failed" => {
                let Some(subscription) = str_at(&data, "/subscription_id").filter(|s| !s.is_empty())
                else {
                    return Ok(ignored(event_id, event_type.clone(), "", occurred_at));
                };
                let kind = if event_type == "transaction.completed" {
                    CanonicalEventKind::InvoicePaid
                } else {
                    CanonicalEventKind::InvoiceFailed
                };
                let amount = str_at(&data, "/details/totals/total").and_then(|t| t.parse().ok());
                (
                    kind,
                    subscription,
                    rfc3339_at(&data, "/billing_period/ends_at")?,
                    amount,
                )
            }
            "subscription.paused" | "subscription.resumed" | "subscription.canceled" => {
                let kind = match event_type.as_str() {
                    "subscription.paused" => CanonicalEventKind::Paused,
                    "subscription.resumed" => CanonicalEventKind::Resumed,
                    _ => CanonicalEventKind::Cancelled,
                };
                (
                    kind,
                    require_str(&data, "/id")?,
                    rfc3339_at(&data, "/current_billing_period/ends_at")?,
                    None,
                )
            }
            _ => {
                let subscription = str_at(&data, "/subscription_id").unwrap_or_default();
                return Ok(ignored(event_id, event_type.clone(), subscription, occurred_at));
            }
        };

        Ok(CanonicalEvent {
            event_id,
            provider: PaymentProvider::Paddle,
            provider_subscription_id: subscription_id.to_string(),
            kind,
            occurred_at,
            period_end,
            amount,
        })
    }
}

fn ignored(
    event_id: String,
    event_type: String,
    subscription: &str,
    occurred_at: DateTime<Utc>,
) -> CanonicalEvent {
    CanonicalEvent {
        event_id,
        provider: PaymentProvider::Paddle,
        provider_subscription_id: subscription.to_string(),
        kind: CanonicalEventKind::Ignored { event_type },
        occurred_at,
        period_end: None,
        amount: None,
    }
}

fn rfc3339_at(value: &Value, pointer: &str) -> AppResult<Option<DateTime<Utc>>> {
    str_at(value, pointer)
        .map(|raw| {
            DateTime::parse_from_rfc3339(raw)
                .map(|ts| ts.with_timezone(&Utc))
                .map_err(|_| AppError::validation(format!("Invalid timestamp at {pointer}")))
        })
        .transpose()
}
