//! End-to-end delivery tests against a live PostgreSQL and wiremock
//! receivers: fanout, retries with backoff, terminal failures, timeouts,
//! event-mask filtering, and secret rotation mid-retry.
//!
//! Each test runs its own engine against a shared database; rows are
//! tenant-scoped so concurrent tests do not observe each other. Run with:
//! `DATABASE_URL=... cargo test --features integration`

#![cfg(feature = "integration")]

mod common;

use std::time::Duration;

use common::db::*;
use common::*;
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer};

use smsgate_db::models::{DeliveryFilter, WebhookDelivery};
use smsgate_webhooks::models::{CreateWebhookRequest, SmsEventType};
use smsgate_webhooks::services::subscription_service::SubscriptionService;
use smsgate_webhooks::WebhookEngine;

/// Poll until `check` passes or the timeout elapses.
async fn wait_for<F: Fn() -> bool>(check: F, timeout: Duration, what: &str) {
    let deadline = tokio::time::Instant::now() + timeout;
    while !check() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {what}"
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

async fn create_subscription(
    svc: &SubscriptionService,
    tenant: Uuid,
    url: String,
    events: &[&str],
    max_attempts: i32,
    backoff_base_ms: i64,
) -> (Uuid, String) {
    let info = svc
        .create_subscription(
            tenant,
            CreateWebhookRequest {
                url,
                name: "delivery test".to_string(),
                description: None,
                events: events.iter().map(|s| s.to_string()).collect(),
                max_attempts: Some(max_attempts),
                backoff_base_ms: Some(backoff_base_ms),
                notify_on_failure: None,
            },
        )
        .await
        .expect("create subscription");
    let secret = info.secret.expect("create returns the secret");
    (info.id, secret)
}

async fn single_row(pool: &sqlx::PgPool, subscription_id: Uuid) -> WebhookDelivery {
    let rows = WebhookDelivery::list_for_subscription(
        pool,
        subscription_id,
        &DeliveryFilter::default(),
        10,
        0,
    )
    .await
    .expect("list deliveries");
    assert_eq!(rows.len(), 1, "expected exactly one delivery row");
    rows.into_iter().next().unwrap()
}

/// Happy path: one emission, one POST, one success row, stats updated,
/// signature verifies against the exact body.
#[tokio::test]
async fn test_happy_path_single_delivery() {
    let pool = test_pool().await;
    let svc = subscription_service(&pool);
    let tenant = Uuid::new_v4();

    let mock_server = MockServer::start().await;
    let capture = CaptureResponder::new();
    Mock::given(method("POST"))
        .and(path("/h"))
        .respond_with(capture.clone())
        .mount(&mock_server)
        .await;

    let (sub_id, secret) = create_subscription(
        &svc,
        tenant,
        format!("{}/h", mock_server.uri()),
        &["sms.delivered"],
        3,
        1_000,
    )
    .await;

    let engine = WebhookEngine::start(pool.clone(), TEST_ENCRYPTION_KEY.to_vec(), fast_config())
        .expect("start engine");

    let payload = serde_json::json!({"id": "x1"});
    engine
        .router()
        .emit(tenant, SmsEventType::Delivered, None, payload.clone())
        .await;

    wait_for(
        || capture.request_count() == 1,
        Duration::from_secs(5),
        "one POST",
    )
    .await;
    // Let the row and stats updates land.
    tokio::time::sleep(Duration::from_millis(500)).await;

    let row = single_row(&pool, sub_id).await;
    assert_eq!(row.status, "success");
    assert_eq!(row.attempts_made, 1);
    assert!(row.sent_at.is_some());
    assert_eq!(row.last_http_code, Some(200));

    let stats = svc.get_stats(tenant, sub_id).await.unwrap();
    assert_eq!(stats.stats.total_calls, 1);
    assert_eq!(stats.stats.success_calls, 1);
    assert_eq!(stats.stats.failure_calls, 0);
    assert_eq!(stats.deliveries.success, 1);

    let captured = &capture.requests()[0];
    assert!(verify_captured_signature(captured, &secret));
    assert_eq!(captured.header("x-webhook-event"), Some("sms.delivered"));
    assert_eq!(
        captured.header("x-webhook-delivery"),
        Some(row.id.to_string().as_str())
    );
    let body: serde_json::Value = captured.body_json().unwrap();
    assert_eq!(body, payload);

    engine.shutdown().await;
}

/// Fanout: one emission reaches every active matching subscription,
/// exactly once each.
#[tokio::test]
async fn test_fanout_to_all_matching_subscriptions() {
    let pool = test_pool().await;
    let svc = subscription_service(&pool);
    let tenant = Uuid::new_v4();

    let mock_server = MockServer::start().await;
    let capture_a = CaptureResponder::new();
    let capture_b = CaptureResponder::new();
    Mock::given(method("POST"))
        .and(path("/a"))
        .respond_with(capture_a.clone())
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/b"))
        .respond_with(capture_b.clone())
        .mount(&mock_server)
        .await;

    create_subscription(
        &svc,
        tenant,
        format!("{}/a", mock_server.uri()),
        &["sms.sent", "sms.delivered"],
        3,
        1_000,
    )
    .await;
    create_subscription(
        &svc,
        tenant,
        format!("{}/b", mock_server.uri()),
        &["sms.sent"],
        3,
        1_000,
    )
    .await;

    let engine = WebhookEngine::start(pool.clone(), TEST_ENCRYPTION_KEY.to_vec(), fast_config())
        .expect("start engine");

    engine
        .router()
        .emit(
            tenant,
            SmsEventType::Sent,
            Some(Uuid::new_v4()),
            serde_json::json!({"id": "fanout-1"}),
        )
        .await;

    wait_for(
        || capture_a.request_count() == 1 && capture_b.request_count() == 1,
        Duration::from_secs(5),
        "both receivers",
    )
    .await;
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(capture_a.request_count(), 1);
    assert_eq!(capture_b.request_count(), 1);

    engine.shutdown().await;
}

/// Retry then succeed: 503, 503, 200 with backoff base 1s gives gaps of
/// roughly 1s and 2s, final state success, stats counting one logical
/// delivery.
#[tokio::test]
async fn test_retry_then_succeed_with_backoff() {
    let pool = test_pool().await;
    let svc = subscription_service(&pool);
    let tenant = Uuid::new_v4();

    let mock_server = MockServer::start().await;
    let responder = FailingResponder::fail_times(2);
    Mock::given(method("POST"))
        .and(path("/h"))
        .respond_with(responder.clone())
        .mount(&mock_server)
        .await;

    let (sub_id, secret) = create_subscription(
        &svc,
        tenant,
        format!("{}/h", mock_server.uri()),
        &["sms.delivered"],
        3,
        1_000,
    )
    .await;

    let engine = WebhookEngine::start(pool.clone(), TEST_ENCRYPTION_KEY.to_vec(), fast_config())
        .expect("start engine");

    engine
        .router()
        .emit(
            tenant,
            SmsEventType::Delivered,
            None,
            serde_json::json!({"id": "x2"}),
        )
        .await;

    wait_for(
        || responder.attempt_count() == 3,
        Duration::from_secs(15),
        "three POSTs",
    )
    .await;
    tokio::time::sleep(Duration::from_millis(500)).await;

    let requests = responder.requests();
    let gap1 = requests[1].timestamp - requests[0].timestamp;
    let gap2 = requests[2].timestamp - requests[1].timestamp;
    // base * 2^0 and base * 2^1, plus at most one scheduler tick.
    assert!(gap1.num_milliseconds() >= 900, "first gap was {gap1}");
    assert!(gap2.num_milliseconds() >= 1_800, "second gap was {gap2}");

    let row = single_row(&pool, sub_id).await;
    assert_eq!(row.status, "success");
    assert_eq!(row.attempts_made, 3);

    let stats = svc.get_stats(tenant, sub_id).await.unwrap();
    assert_eq!(stats.stats.total_calls, 1);
    assert_eq!(stats.stats.success_calls, 1);
    assert_eq!(stats.stats.failure_calls, 0);

    // Every attempt, including the failed ones, carried a valid signature.
    for request in &requests {
        assert!(verify_captured_signature(request, &secret));
    }

    engine.shutdown().await;
}

/// Terminal 4xx: exactly one POST regardless of remaining budget.
#[tokio::test]
async fn test_terminal_4xx_fails_without_retry() {
    let pool = test_pool().await;
    let svc = subscription_service(&pool);
    let tenant = Uuid::new_v4();

    let mock_server = MockServer::start().await;
    let counter = CountingResponder::with_status(404);
    Mock::given(method("POST"))
        .and(path("/h"))
        .respond_with(counter.clone())
        .mount(&mock_server)
        .await;

    let (sub_id, _secret) = create_subscription(
        &svc,
        tenant,
        format!("{}/h", mock_server.uri()),
        &["sms.failed"],
        5,
        1_000,
    )
    .await;

    let engine = WebhookEngine::start(pool.clone(), TEST_ENCRYPTION_KEY.to_vec(), fast_config())
        .expect("start engine");

    engine
        .router()
        .emit(
            tenant,
            SmsEventType::Failed,
            None,
            serde_json::json!({"id": "x3"}),
        )
        .await;

    wait_for(|| counter.count() == 1, Duration::from_secs(5), "one POST").await;
    // Long enough that an erroneous retry would have fired.
    tokio::time::sleep(Duration::from_millis(1_500)).await;

    assert_eq!(counter.count(), 1, "terminal 4xx must not be retried");

    let row = single_row(&pool, sub_id).await;
    assert_eq!(row.status, "failed");
    assert_eq!(row.attempts_made, 1);
    assert_eq!(row.last_http_code, Some(404));

    let stats = svc.get_stats(tenant, sub_id).await.unwrap();
    assert_eq!(stats.stats.total_calls, 1);
    assert_eq!(stats.stats.failure_calls, 1);

    engine.shutdown().await;
}

/// Transport timeout: the receiver stalls past the request timeout, both
/// budgeted attempts fail, stats record a transport error.
#[tokio::test]
async fn test_timeout_exhausts_budget_and_records_transport_error() {
    let pool = test_pool().await;
    let svc = subscription_service(&pool);
    let tenant = Uuid::new_v4();

    let mock_server = MockServer::start().await;
    // fast_config uses a 1.5s request timeout; stall well past it.
    Mock::given(method("POST"))
        .and(path("/h"))
        .respond_with(DelayedResponder::new(5_000))
        .mount(&mock_server)
        .await;

    let (sub_id, _secret) = create_subscription(
        &svc,
        tenant,
        format!("{}/h", mock_server.uri()),
        &["sms.bounced"],
        2,
        1_000,
    )
    .await;

    let engine = WebhookEngine::start(pool.clone(), TEST_ENCRYPTION_KEY.to_vec(), fast_config())
        .expect("start engine");

    engine
        .router()
        .emit(
            tenant,
            SmsEventType::Bounced,
            None,
            serde_json::json!({"id": "x4"}),
        )
        .await;

    let deadline = tokio::time::Instant::now() + Duration::from_secs(20);
    loop {
        let rows = WebhookDelivery::list_for_subscription(
            &pool,
            sub_id,
            &DeliveryFilter::default(),
            10,
            0,
        )
        .await
        .unwrap();
        if rows.first().map(|r| r.status == "failed").unwrap_or(false) {
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for terminal failure after two timeouts"
        );
        tokio::time::sleep(Duration::from_millis(200)).await;
    }

    let row = single_row(&pool, sub_id).await;
    assert_eq!(row.status, "failed");
    assert_eq!(row.attempts_made, 2);
    assert_eq!(row.last_http_code, None);

    let stats = svc.get_stats(tenant, sub_id).await.unwrap();
    assert_eq!(stats.stats.last_status_code, Some(-1));
    assert_eq!(stats.stats.failure_calls, 1);

    engine.shutdown().await;
}

/// Event-mask mismatch: no rows, no POSTs, no stats movement.
#[tokio::test]
async fn test_event_mask_mismatch_produces_nothing() {
    let pool = test_pool().await;
    let svc = subscription_service(&pool);
    let tenant = Uuid::new_v4();

    let mock_server = MockServer::start().await;
    let counter = CountingResponder::new();
    Mock::given(method("POST"))
        .and(path("/h"))
        .respond_with(counter.clone())
        .mount(&mock_server)
        .await;

    let (sub_id, _secret) = create_subscription(
        &svc,
        tenant,
        format!("{}/h", mock_server.uri()),
        &["sms.delivered"],
        3,
        1_000,
    )
    .await;

    let engine = WebhookEngine::start(pool.clone(), TEST_ENCRYPTION_KEY.to_vec(), fast_config())
        .expect("start engine");

    engine
        .router()
        .emit(
            tenant,
            SmsEventType::Failed,
            None,
            serde_json::json!({"id": "x5"}),
        )
        .await;

    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(counter.count(), 0);
    let rows = WebhookDelivery::list_for_subscription(
        &pool,
        sub_id,
        &DeliveryFilter::default(),
        10,
        0,
    )
    .await
    .unwrap();
    assert!(rows.is_empty());

    let stats = svc.get_stats(tenant, sub_id).await.unwrap();
    assert_eq!(stats.stats.total_calls, 0);

    engine.shutdown().await;
}

/// Secret rotation between attempts: the retry is re-signed, so the second
/// request verifies under the new secret and only the new secret.
#[tokio::test]
async fn test_secret_rotation_mid_retry() {
    let pool = test_pool().await;
    let svc = subscription_service(&pool);
    let tenant = Uuid::new_v4();

    let mock_server = MockServer::start().await;
    let responder = FailingResponder::fail_times(1);
    Mock::given(method("POST"))
        .and(path("/h"))
        .respond_with(responder.clone())
        .mount(&mock_server)
        .await;

    let (sub_id, old_secret) = create_subscription(
        &svc,
        tenant,
        format!("{}/h", mock_server.uri()),
        &["sms.delivered"],
        3,
        1_000,
    )
    .await;

    let engine = WebhookEngine::start(pool.clone(), TEST_ENCRYPTION_KEY.to_vec(), fast_config())
        .expect("start engine");

    engine
        .router()
        .emit(
            tenant,
            SmsEventType::Delivered,
            None,
            serde_json::json!({"id": "x6"}),
        )
        .await;

    // First attempt fails with 503.
    wait_for(
        || responder.attempt_count() == 1,
        Duration::from_secs(5),
        "first POST",
    )
    .await;

    // Rotate before the retry fires.
    let rotated = svc.rotate_secret(tenant, sub_id).await.unwrap();
    let new_secret = rotated.secret.expect("rotate returns the new secret");
    assert_ne!(new_secret, old_secret);

    wait_for(
        || responder.attempt_count() == 2,
        Duration::from_secs(10),
        "second POST",
    )
    .await;
    tokio::time::sleep(Duration::from_millis(500)).await;

    let requests = responder.requests();
    assert!(verify_captured_signature(&requests[0], &old_secret));
    assert!(verify_captured_signature(&requests[1], &new_secret));
    assert!(!verify_captured_signature(&requests[1], &old_secret));

    let row = single_row(&pool, sub_id).await;
    assert_eq!(row.status, "success");
    assert_eq!(row.attempts_made, 2);

    engine.shutdown().await;
}

/// Retries disabled: a retriable failure is terminal on the first attempt.
#[tokio::test]
async fn test_retry_disabled_fails_immediately() {
    let pool = test_pool().await;
    let svc = subscription_service(&pool);
    let tenant = Uuid::new_v4();

    let mock_server = MockServer::start().await;
    let counter = CountingResponder::with_status(503);
    Mock::given(method("POST"))
        .and(path("/h"))
        .respond_with(counter.clone())
        .mount(&mock_server)
        .await;

    let (sub_id, _secret) = create_subscription(
        &svc,
        tenant,
        format!("{}/h", mock_server.uri()),
        &["sms.delivered"],
        5,
        1_000,
    )
    .await;

    // Turn retries off after creation.
    svc.update_subscription(
        tenant,
        sub_id,
        smsgate_webhooks::models::UpdateWebhookRequest {
            url: None,
            name: None,
            description: None,
            events: None,
            active: None,
            retry_enabled: Some(false),
            max_attempts: None,
            backoff_base_ms: None,
            notify_on_failure: None,
        },
    )
    .await
    .unwrap();

    let engine = WebhookEngine::start(pool.clone(), TEST_ENCRYPTION_KEY.to_vec(), fast_config())
        .expect("start engine");

    engine
        .router()
        .emit(
            tenant,
            SmsEventType::Delivered,
            None,
            serde_json::json!({"id": "x7"}),
        )
        .await;

    wait_for(|| counter.count() == 1, Duration::from_secs(5), "one POST").await;
    tokio::time::sleep(Duration::from_millis(1_500)).await;

    assert_eq!(counter.count(), 1);
    let row = single_row(&pool, sub_id).await;
    assert_eq!(row.status, "failed");
    assert_eq!(row.attempts_made, 1);

    engine.shutdown().await;
}
