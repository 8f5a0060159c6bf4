//! Scenario tests for billing webhooks and entitlements.

mod helpers;

use chrono::{DateTime, TimeZone, Utc};
use serde_json::{Value, json};

use stowage_core::error::ErrorKind;
use stowage_core::types::UserId;
use stowage_database::MetadataStore;
use stowage_entity::billing::{PaymentProvider, SubscriptionStatus};
use stowage_service::billing::{PaddleAdapter, StripeAdapter};
use stowage_service::{EventOutcome, SignatureHeaders};

const BASE_MAX: i64 = 1_000_000;

fn at(seconds: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_760_000_000 + seconds, 0).unwrap()
}

fn stripe_checkout(event_id: &str, user: UserId, when: DateTime<Utc>) -> Value {
    json!({
        "id": event_id,
        "type": "checkout.session.completed",
        "created": when.timestamp(),
        "data": {"object": {
            "client_reference_id": user.to_string(),
            "subscription": "sub_A",
            "metadata": {"plan_id": "pro"}
        }}
    })
}

fn stripe_invoice(event_id: &str, event_type: &str, when: DateTime<Utc>) -> Value {
    json!({
        "id": event_id,
        "type": event_type,
        "created": when.timestamp(),
        "data": {"object": {"subscription": "sub_A", "amount_due": 999, "amount_paid": 999}}
    })
}

fn stripe_subscription(event_id: &str, event_type: &str, when: DateTime<Utc>) -> Value {
    json!({
        "id": event_id,
        "type": event_type,
        "created": when.timestamp(),
        "data": {"object": {"id": "sub_A"}}
    })
}

async fn deliver_stripe(app: &helpers::TestApp, body: &Value) -> Result<EventOutcome, ErrorKind> {
    let payload = body.to_string();
    let header = StripeAdapter::new(helpers::STRIPE_SECRET, 300)
        .signature_header(payload.as_bytes(), Utc::now().timestamp())
        .unwrap();
    let headers = SignatureHeaders::new().with("Stripe-Signature", header);
    app.services
        .billing
        .apply_provider_event("stripe", payload.as_bytes(), &headers)
        .await
        .map_err(|e| e.kind)
}

async fn max_bytes(app: &helpers::TestApp, user: UserId) -> i64 {
    app.account(user).await.max_storage_bytes
}

async fn status(app: &helpers::TestApp) -> SubscriptionStatus {
    app.store
        .find_subscription(PaymentProvider::Stripe, "sub_A")
        .await
        .unwrap()
        .unwrap()
        .status
}

#[tokio::test]
async fn test_checkout_grants_plan_bytes() {
    let app = helpers::TestApp::new().await;
    let ctx = app.user_with_quota(BASE_MAX).await;

    let outcome = deliver_stripe(&app, &stripe_checkout("evt_1", ctx.user_id, at(10)))
        .await
        .unwrap();

    assert!(matches!(
        outcome,
        EventOutcome::Applied {
            status: SubscriptionStatus::Active,
            ..
        }
    ));
    assert_eq!(max_bytes(&app, ctx.user_id).await, BASE_MAX + helpers::PRO_PLAN_BYTES);

    let subscriptions = app.services.billing.subscriptions(ctx.user_id).await.unwrap();
    assert_eq!(subscriptions.len(), 1);
    assert_eq!(subscriptions[0].plan_id, "pro");
}

#[tokio::test]
async fn test_stale_failure_does_not_regress_active() {
    let app = helpers::TestApp::new().await;
    let ctx = app.user_with_quota(BASE_MAX).await;

    deliver_stripe(&app, &stripe_checkout("evt_checkout", ctx.user_id, at(10)))
        .await
        .unwrap();
    let outcome = deliver_stripe(&app, &stripe_invoice("evt_old_fail", "invoice.payment_failed", at(5)))
        .await
        .unwrap();

    assert_eq!(outcome, EventOutcome::Stale);
    assert_eq!(status(&app).await, SubscriptionStatus::Active);
    assert_eq!(max_bytes(&app, ctx.user_id).await, BASE_MAX + helpers::PRO_PLAN_BYTES);

    let record = app
        .store
        .find_subscription(PaymentProvider::Stripe, "sub_A")
        .await
        .unwrap()
        .unwrap();
    assert!(record.has_processed("evt_old_fail"));
    assert_eq!(record.last_event_at, Some(at(10)));
}

#[tokio::test]
async fn test_duplicate_delivery_grants_once() {
    let app = helpers::TestApp::new().await;
    let ctx = app.user_with_quota(BASE_MAX).await;
    let checkout = stripe_checkout("evt_dup", ctx.user_id, at(10));

    deliver_stripe(&app, &checkout).await.unwrap();
    let before = app.store.snapshot().await;
    let outcome = deliver_stripe(&app, &checkout).await.unwrap();
    let after = app.store.snapshot().await;

    assert_eq!(outcome, EventOutcome::Duplicate);
    assert_eq!(max_bytes(&app, ctx.user_id).await, BASE_MAX + helpers::PRO_PLAN_BYTES);
    assert_eq!(
        before.subscriptions.values().collect::<Vec<_>>(),
        after.subscriptions.values().collect::<Vec<_>>()
    );
}

#[tokio::test]
async fn test_event_before_checkout_is_retryable() {
    let app = helpers::TestApp::new().await;
    let ctx = app.user_with_quota(BASE_MAX).await;

    let kind = deliver_stripe(&app, &stripe_invoice("evt_early", "invoice.paid", at(20)))
        .await
        .unwrap_err();
    assert_eq!(kind, ErrorKind::ConcurrencyConflict);
    assert!(kind.is_retryable());

    deliver_stripe(&app, &stripe_checkout("evt_checkout", ctx.user_id, at(10)))
        .await
        .unwrap();
    let outcome = deliver_stripe(&app, &stripe_invoice("evt_early", "invoice.paid", at(20)))
        .await
        .unwrap();
    assert!(matches!(outcome, EventOutcome::Applied { .. }));
}

#[tokio::test]
async fn test_repeated_failures_revoke_entitlement() {
    let app = helpers::TestApp::new().await;
    let ctx = app.user_with_quota(BASE_MAX).await;
    deliver_stripe(&app, &stripe_checkout("evt_0", ctx.user_id, at(0)))
        .await
        .unwrap();

    deliver_stripe(&app, &stripe_invoice("evt_1", "invoice.payment_failed", at(1)))
        .await
        .unwrap();
    assert_eq!(status(&app).await, SubscriptionStatus::PastDue);
    // Grace period keeps the bytes.
    assert_eq!(max_bytes(&app, ctx.user_id).await, BASE_MAX + helpers::PRO_PLAN_BYTES);

    deliver_stripe(&app, &stripe_invoice("evt_2", "invoice.payment_failed", at(2)))
        .await
        .unwrap();
    deliver_stripe(&app, &stripe_invoice("evt_3", "invoice.payment_failed", at(3)))
        .await
        .unwrap();
    assert_eq!(status(&app).await, SubscriptionStatus::Failed);
    assert_eq!(max_bytes(&app, ctx.user_id).await, BASE_MAX);

    // Terminal: a late payment changes nothing.
    let outcome = deliver_stripe(&app, &stripe_invoice("evt_4", "invoice.paid", at(4)))
        .await
        .unwrap();
    assert_eq!(outcome, EventOutcome::Ignored);
    assert_eq!(max_bytes(&app, ctx.user_id).await, BASE_MAX);
}

#[tokio::test]
async fn test_pause_resume_cycle() {
    let app = helpers::TestApp::new().await;
    let ctx = app.user_with_quota(BASE_MAX).await;
    deliver_stripe(&app, &stripe_checkout("evt_0", ctx.user_id, at(0)))
        .await
        .unwrap();

    deliver_stripe(&app, &stripe_subscription("evt_1", "customer.subscription.paused", at(1)))
        .await
        .unwrap();
    assert_eq!(status(&app).await, SubscriptionStatus::Paused);
    assert_eq!(max_bytes(&app, ctx.user_id).await, BASE_MAX);

    deliver_stripe(&app, &stripe_subscription("evt_2", "customer.subscription.resumed", at(2)))
        .await
        .unwrap();
    assert_eq!(status(&app).await, SubscriptionStatus::Active);
    assert_eq!(max_bytes(&app, ctx.user_id).await, BASE_MAX + helpers::PRO_PLAN_BYTES);

    deliver_stripe(&app, &stripe_subscription("evt_3", "customer.subscription.deleted", at(3)))
        .await
        .unwrap();
    assert_eq!(status(&app).await, SubscriptionStatus::Cancelled);
    assert_eq!(max_bytes(&app, ctx.user_id).await, BASE_MAX);
}

#[tokio::test]
async fn test_bad_signature_and_malformed_payload_rejected() {
    let app = helpers::TestApp::new().await;
    let ctx = app.user_with_quota(BASE_MAX).await;
    let payload = stripe_checkout("evt_1", ctx.user_id, at(0)).to_string();

    let forged = StripeAdapter::new("whsec_wrong", 300)
        .signature_header(payload.as_bytes(), Utc::now().timestamp())
        .unwrap();
    let err = app
        .services
        .billing
        .apply_provider_event(
            "stripe",
            payload.as_bytes(),
            &SignatureHeaders::new().with("Stripe-Signature", forged),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Signature);

    let kind = deliver_stripe(&app, &json!({"id": "evt_2"})).await.unwrap_err();
    assert_eq!(kind, ErrorKind::Validation);

    let err = app
        .services
        .billing
        .apply_provider_event("paypal", b"{}", &SignatureHeaders::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Validation);
    assert_eq!(max_bytes(&app, ctx.user_id).await, BASE_MAX);
}

#[tokio::test]
async fn test_failed_commit_is_redelivered_cleanly() {
    let app = helpers::TestApp::new().await;
    let ctx = app.user_with_quota(BASE_MAX).await;
    let checkout = stripe_checkout("evt_1", ctx.user_id, at(0));

    app.store.fail_next_commit();
    let kind = deliver_stripe(&app, &checkout).await.unwrap_err();
    assert_eq!(kind, ErrorKind::Database);
    assert_eq!(max_bytes(&app, ctx.user_id).await, BASE_MAX);

    deliver_stripe(&app, &checkout).await.unwrap();
    assert_eq!(max_bytes(&app, ctx.user_id).await, BASE_MAX + helpers::PRO_PLAN_BYTES);
}

#[tokio::test]
async fn test_paddle_checkout_by_price_id() {
    let app = helpers::TestApp::new().await;
    let ctx = app.user_with_quota(BASE_MAX).await;
    let payload = json!({
        "event_id": "evt_pdl_1",
        "event_type": "subscription.created",
        "occurred_at": Utc::now().to_rfc3339(),
        "data": {
            "id": "sub_pdl",
            "custom_data": {"user_id": ctx.user_id.to_string()},
            "items": [{"price": {"id": "pri_pro"}}]
        }
    })
    .to_string();
    let header = PaddleAdapter::new(helpers::PADDLE_SECRET, 300)
        .signature_header(payload.as_bytes(), Utc::now().timestamp())
        .unwrap();

    let outcome = app
        .services
        .billing
        .apply_provider_event(
            "paddle",
            payload.as_bytes(),
            &SignatureHeaders::new().with("Paddle-Signature", header),
        )
        .await
        .unwrap();

    assert!(matches!(outcome, EventOutcome::Applied { .. }));
    let record = app
        .store
        .find_subscription(PaymentProvider::Paddle, "sub_pdl")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.plan_id, "pro");
    assert_eq!(record.granted_bytes, helpers::PRO_PLAN_BYTES);
    assert_eq!(max_bytes(&app, ctx.user_id).await, BASE_MAX + helpers::PRO_PLAN_BYTES);
}
