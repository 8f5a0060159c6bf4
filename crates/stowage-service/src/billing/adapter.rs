//! Provider adapter trait and shared HMAC-SHA256 webhook signing.

use std::fmt;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;

use stowage_core::error::{AppError, ErrorKind};
use stowage_core::result::AppResult;
use stowage_entity::billing::{CanonicalEvent, PaymentProvider};

use super::headers::SignatureHeaders;

type HmacSha256 = Hmac<Sha256>;

/// Verifies and normalizes one provider's webhook deliveries.
///
/// Adapters are the only place that knows provider payload shapes.
pub trait ProviderAdapter: Send + Sync + fmt::Debug {
    /// The provider handled by this adapter.
    fn provider(&self) -> PaymentProvider;

    /// Check the delivery's signature against the raw payload.
    fn verify(
        &self,
        payload: &[u8],
        headers: &SignatureHeaders,
        now: DateTime<Utc>,
    ) -> AppResult<()>;

    /// Translate a provider payload into a canonical event.
    fn normalize(&self, payload: &[u8]) -> AppResult<CanonicalEvent>;

    /// Verify, then normalize.
    fn verify_and_normalize(
        &self,
        payload: &[u8],
        headers: &SignatureHeaders,
        now: DateTime<Utc>,
    ) -> AppResult<CanonicalEvent> {
        self.verify(payload, headers, now)?;
        self.normalize(payload)
    }
}

/// HMAC-SHA256 over `"{timestamp}{separator}{payload}"` with a replay window.
#[derive(Clone)]
pub struct WebhookSigner {
    secret: Vec<u8>,
    tolerance_seconds: i64,
}

impl fmt::Debug for WebhookSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebhookSigner")
            .field("secret", &"[REDACTED]")
            .field("tolerance_seconds", &self.tolerance_seconds)
            .finish()
    }
}

impl WebhookSigner {
    /// Create a signer. An empty secret rejects every delivery.
    pub fn new(secret: &str, tolerance_seconds: i64) -> Self {
        Self {
            secret: secret.as_bytes().to_vec(),
            tolerance_seconds,
        }
    }

    fn mac(&self, timestamp: &str, separator: u8, payload: &[u8]) -> AppResult<HmacSha256> {
        if self.secret.is_empty() {
            return Err(AppError::configuration("Webhook secret is not configured"));
        }
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| AppError::with_source(ErrorKind::Internal, "Invalid HMAC key", e))?;
        mac.update(timestamp.as_bytes());
        mac.update(&[separator]);
        mac.update(payload);
        Ok(mac)
    }

    /// Hex signature for a payload.
    pub fn sign(&self, timestamp: &str, separator: u8, payload: &[u8]) -> AppResult<String> {
        let mac = self.mac(timestamp, separator, payload)?;
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Accept if the timestamp is fresh and any candidate signature matches.
    pub fn verify(
        &self,
        timestamp: &str,
        separator: u8,
        payload: &[u8],
        candidates: &[&str],
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        let ts: i64 = timestamp
            .parse()
            .map_err(|_| AppError::signature("Malformed signature timestamp"))?;
        let skew = now.timestamp().checked_sub(ts).map(i64::unsigned_abs);
        if skew.is_none_or(|skew| skew > self.tolerance_seconds.unsigned_abs()) {
            return Err(AppError::signature(
                "Signature timestamp is outside the tolerance window",
            ));
        }

        let mac = self.mac(timestamp, separator, payload)?;
        let matched = candidates.iter().any(|candidate| {
            hex::decode(candidate)
                .map(|expected| mac.clone().verify_slice(&expected).is_ok())
                .unwrap_or(false)
        });
        if matched {
            Ok(())
        } else {
            Err(AppError::signature("Webhook signature mismatch"))
        }
    }
}

/// Parse a JSON payload, reporting malformed bodies as validation errors.
pub(crate) fn parse_json<T: serde::de::DeserializeOwned>(
    provider: PaymentProvider,
    payload: &[u8],
) -> AppResult<T> {
    serde_json::from_slice(payload).map_err(|e| {
        AppError::with_source(
            ErrorKind::Validation,
            format!("Malformed {provider} webhook payload"),
            e,
        )
    })
}

/// String at a JSON pointer.
pub(crate) fn str_at<'a>(value: &'a Value, pointer: &str) -> Option<&'a str> {
    value.pointer(pointer).and_then(Value::as_str)
}

/// String at a JSON pointer, or a validation error naming the field.
pub(crate) fn require_str<'a>(value: &'a Value, pointer: &str) -> AppResult<&'a str> {
    str_at(value, pointer)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::validation(format!("Webhook payload is missing {pointer}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_round_trip_and_tamper() {
        let signer = WebhookSigner::new("whsec_test", 300);
        let now = Utc::now();
        let ts = now.timestamp().to_string();
        let sig = signer.sign(&ts, b'.', b"{}").unwrap();

        assert!(signer.verify(&ts, b'.', b"{}", &[&sig], now).is_ok());
        let err = signer.verify(&ts, b'.', b"{ }", &[&sig], now).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Signature);
        let err = signer.verify(&ts, b'.', b"{}", &["zz-not-hex"], now).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Signature);
    }

    #[test]
    fn test_stale_timestamp_rejected() {
        let signer = WebhookSigner::new("whsec_test", 300);
        let now = Utc::now();
        let ts = (now.timestamp() - 301).to_string();
        let sig = signer.sign(&ts, b'.', b"{}").unwrap();

        let err = signer.verify(&ts, b'.', b"{}", &[&sig], now).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Signature);
    }

    #[test]
    fn test_extreme_timestamp_rejected() {
        let signer = WebhookSigner::new("whsec_test", 300);
        let now = Utc::now();
        for ts in [i64::MIN.to_string(), i64::MAX.to_string()] {
            let err = signer.verify(&ts, b'.', b"{}", &["00"], now).unwrap_err();
            assert_eq!(err.kind, ErrorKind::Signature);
        }
    }

    #[test]
    fn test_missing_secret_is_configuration_error() {
        let signer = WebhookSigner::new("", 300);
        let now = Utc::now();
        let err = signer
            .verify(&now.timestamp().to_string(), b'.', b"{}", &["00"], now)
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Configuration);
    }
}
