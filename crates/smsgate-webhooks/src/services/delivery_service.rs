//! Delivery attempt execution.
//!
//! Takes claimed (`in_flight`) outbox rows, signs the payload, issues the
//! HTTP POST, classifies the outcome three ways (success / retriable /
//! terminal), and records the result on the row and the subscription stats.
//! Nothing here propagates errors upward: every path ends in a row
//! transition, and a row the service cannot transition belongs to another
//! worker.

use std::time::Instant;

use chrono::{Duration, Utc};
use reqwest::Client;
use sqlx::PgPool;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::crypto;
use crate::error::WebhookError;
use crate::models::PROBE_EVENT_TYPE;
use smsgate_db::models::{WebhookDelivery, WebhookSubscription};

/// Hard ceiling on a computed retry delay (1 hour).
pub const BACKOFF_CAP_MS: i64 = 3_600_000;

/// `last_error` strings are truncated to this many characters.
const LAST_ERROR_MAX_CHARS: usize = 512;

/// Signature header carried on every outbound request.
const SIGNATURE_HEADER: &str = "X-Webhook-Signature";
/// Event-type header carried on every outbound request.
const EVENT_HEADER: &str = "X-Webhook-Event";
/// Delivery-id header carried on every outbound request.
const DELIVERY_HEADER: &str = "X-Webhook-Delivery";

/// Three-way outcome classification for an HTTP status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Final status in [200, 400).
    Success,
    /// 408, 425, 429, or any 5xx: the receiver may accept a later attempt.
    Retriable,
    /// Any other 4xx: a contract violation the receiver will not
    /// retroactively accept.
    Terminal,
}

/// Classify a final HTTP status code.
#[must_use]
pub fn classify_status(code: u16) -> Classification {
    match code {
        200..=399 => Classification::Success,
        408 | 425 | 429 => Classification::Retriable,
        c if c >= 500 => Classification::Retriable,
        _ => Classification::Terminal,
    }
}

/// Retry spacing after the attempt numbered `attempts_made` (0-based)
/// failed: `base * 2^attempts_made`, capped at one hour. Integer
/// arithmetic throughout.
#[must_use]
pub fn backoff_delay_ms(backoff_base_ms: i64, attempts_made: i32) -> i64 {
    let shift = attempts_made.clamp(0, 30) as u32;
    backoff_base_ms
        .saturating_mul(1i64 << shift)
        .min(BACKOFF_CAP_MS)
}

/// Result of a synchronous test probe.
#[derive(Debug, Clone)]
pub struct ProbeOutcome {
    pub ok: bool,
    pub http_code: Option<i32>,
    pub latency_ms: i64,
    pub error: Option<String>,
}

/// What a single HTTP exchange produced, before it is applied to the row.
enum AttemptOutcome {
    Delivered { code: u16 },
    Retriable { error: String, code: Option<u16> },
    Terminal { error: String, code: Option<u16> },
}

/// Service executing individual delivery attempts.
#[derive(Clone)]
pub struct DeliveryService {
    pool: PgPool,
    http_client: Client,
    encryption_key: Vec<u8>,
}

impl DeliveryService {
    /// Create a new delivery service with a shared HTTP client.
    ///
    /// # Errors
    ///
    /// Returns `WebhookError::Internal` if the HTTP client cannot be built.
    pub fn new(
        pool: PgPool,
        encryption_key: Vec<u8>,
        config: &EngineConfig,
    ) -> Result<Self, WebhookError> {
        let http_client = Client::builder()
            .timeout(config.request_timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .user_agent(concat!("smsgate-webhooks/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| WebhookError::Internal(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            pool,
            http_client,
            encryption_key,
        })
    }

    /// Process one claimed (`in_flight`) delivery row end to end.
    pub async fn process(&self, delivery: &WebhookDelivery) {
        let subscription =
            match WebhookSubscription::find_by_id(&self.pool, delivery.subscription_id).await {
                Ok(Some(sub)) => sub,
                Ok(None) => {
                    // Subscription deleted mid-flight; the row is gone with
                    // it (schema-level cascade) or about to be.
                    tracing::debug!(
                        target: "webhook_delivery",
                        delivery_id = %delivery.id,
                        subscription_id = %delivery.subscription_id,
                        "Skipping delivery for deleted subscription"
                    );
                    return;
                }
                Err(e) => {
                    tracing::error!(
                        target: "webhook_delivery",
                        delivery_id = %delivery.id,
                        error = %e,
                        "Failed to load subscription; row stays in_flight for the stuck sweep"
                    );
                    return;
                }
            };

        self.execute(delivery, &subscription).await;
    }

    /// Execute a single delivery attempt against the subscription's URL.
    async fn execute(&self, delivery: &WebhookDelivery, subscription: &WebhookSubscription) {
        let body = match serde_json::to_vec(&delivery.payload) {
            Ok(b) => b,
            Err(e) => {
                self.finish_terminal(
                    delivery,
                    subscription,
                    format!("Failed to serialize payload: {e}"),
                    None,
                    None,
                    0,
                )
                .await;
                return;
            }
        };

        // Oversized payloads are rejected before signing or sending; the
        // attempt is terminal because shrinking is not going to happen.
        if body.len() as i64 > subscription.max_payload_bytes {
            self.finish_terminal(
                delivery,
                subscription,
                format!(
                    "Payload of {} bytes exceeds limit of {} bytes",
                    body.len(),
                    subscription.max_payload_bytes
                ),
                None,
                None,
                0,
            )
            .await;
            return;
        }

        let secret = match crypto::decrypt_secret(&subscription.secret_encrypted, &self.encryption_key)
        {
            Ok(s) => s,
            Err(e) => {
                // Never deliver unsigned. A broken secret will not heal on
                // retry either.
                self.finish_terminal(
                    delivery,
                    subscription,
                    format!("Signing secret unavailable: {e}"),
                    None,
                    None,
                    0,
                )
                .await;
                return;
            }
        };

        // Signed fresh on every attempt so a rotation between retries takes
        // effect immediately.
        let signature = crypto::compute_signature(&secret, &body);

        let start = Instant::now();
        let result = self
            .http_client
            .post(&subscription.url)
            .header("Content-Type", "application/json")
            .header(SIGNATURE_HEADER, &signature)
            .header(EVENT_HEADER, &delivery.event_type)
            .header(DELIVERY_HEADER, delivery.id.to_string())
            .body(body)
            .send()
            .await;
        let latency_ms = start.elapsed().as_millis() as i64;

        let outcome = match result {
            Ok(response) => {
                let code = response.status().as_u16();
                match classify_status(code) {
                    Classification::Success => AttemptOutcome::Delivered { code },
                    Classification::Retriable => AttemptOutcome::Retriable {
                        error: format!("HTTP {code}"),
                        code: Some(code),
                    },
                    Classification::Terminal => AttemptOutcome::Terminal {
                        error: format!("HTTP {code}"),
                        code: Some(code),
                    },
                }
            }
            Err(e) => AttemptOutcome::Retriable {
                error: transport_error_message(&e),
                code: None,
            },
        };

        match outcome {
            AttemptOutcome::Delivered { code } => {
                tracing::info!(
                    target: "webhook_delivery",
                    delivery_id = %delivery.id,
                    subscription_id = %subscription.id,
                    tenant_id = %subscription.tenant_id,
                    event_type = %delivery.event_type,
                    response_code = code,
                    latency_ms,
                    attempt = delivery.attempts_made + 1,
                    "Webhook delivery succeeded"
                );

                if let Err(e) = WebhookDelivery::mark_success(
                    &self.pool,
                    delivery.id,
                    i32::from(code),
                    latency_ms as i32,
                    &signature,
                )
                .await
                {
                    tracing::error!(
                        target: "webhook_delivery",
                        delivery_id = %delivery.id,
                        error = %e,
                        "Failed to record delivery success"
                    );
                }

                self.record_stats(subscription.id, true, i32::from(code), latency_ms)
                    .await;
            }
            AttemptOutcome::Retriable { error, code } => {
                self.finish_retriable(delivery, subscription, error, code, &signature, latency_ms)
                    .await;
            }
            AttemptOutcome::Terminal { error, code } => {
                self.finish_terminal(
                    delivery,
                    subscription,
                    error,
                    code,
                    Some(&signature),
                    latency_ms,
                )
                .await;
            }
        }
    }

    /// Retriable failure: schedule the next attempt if budget and policy
    /// allow, otherwise the row is terminal.
    ///
    /// Stats count logical deliveries, so a scheduled retry touches only
    /// the row; the counters move when the chain ends.
    async fn finish_retriable(
        &self,
        delivery: &WebhookDelivery,
        subscription: &WebhookSubscription,
        error: String,
        code: Option<u16>,
        signature: &str,
        latency_ms: i64,
    ) {
        let error = truncate_error(&error);
        let budget_left = delivery.attempts_made + 1 < delivery.max_attempts;

        if budget_left && subscription.retry_enabled {
            let delay_ms = backoff_delay_ms(subscription.backoff_base_ms, delivery.attempts_made);
            let next_retry_at = Utc::now() + Duration::milliseconds(delay_ms);

            tracing::warn!(
                target: "webhook_delivery",
                delivery_id = %delivery.id,
                subscription_id = %subscription.id,
                tenant_id = %subscription.tenant_id,
                error = %error,
                attempt = delivery.attempts_made + 1,
                delay_ms,
                "Webhook delivery failed; retry scheduled"
            );

            if let Err(e) = WebhookDelivery::schedule_retry(
                &self.pool,
                delivery.id,
                next_retry_at,
                &error,
                code.map(i32::from),
                signature,
            )
            .await
            {
                tracing::error!(
                    target: "webhook_delivery",
                    delivery_id = %delivery.id,
                    error = %e,
                    "Failed to schedule retry"
                );
            }
        } else {
            self.finish_terminal(
                delivery,
                subscription,
                error,
                code,
                Some(signature),
                latency_ms,
            )
            .await;
        }
    }

    /// Terminal failure: the row ends `failed` regardless of budget.
    async fn finish_terminal(
        &self,
        delivery: &WebhookDelivery,
        subscription: &WebhookSubscription,
        error: String,
        code: Option<u16>,
        signature: Option<&str>,
        latency_ms: i64,
    ) {
        let error = truncate_error(&error);

        tracing::warn!(
            target: "webhook_delivery",
            delivery_id = %delivery.id,
            subscription_id = %subscription.id,
            tenant_id = %subscription.tenant_id,
            error = %error,
            attempt = delivery.attempts_made + 1,
            "Webhook delivery failed terminally"
        );

        if let Err(e) = WebhookDelivery::mark_failed(
            &self.pool,
            delivery.id,
            &error,
            code.map(i32::from),
            signature,
        )
        .await
        {
            tracing::error!(
                target: "webhook_delivery",
                delivery_id = %delivery.id,
                error = %e,
                "Failed to record terminal failure"
            );
        }

        self.record_stats(
            subscription.id,
            false,
            code.map_or(-1, i32::from),
            latency_ms,
        )
        .await;
    }

    async fn record_stats(&self, subscription_id: Uuid, success: bool, code: i32, latency_ms: i64) {
        if let Err(e) =
            WebhookSubscription::record_outcome(&self.pool, subscription_id, success, code, latency_ms)
                .await
        {
            tracing::error!(
                target: "webhook_delivery",
                subscription_id = %subscription_id,
                error = %e,
                "Failed to update subscription stats"
            );
        }
    }

    /// Synchronous test probe: sign a fixed synthetic payload with the
    /// subscription's current secret and POST it. No outbox row, no stats.
    pub async fn probe(&self, subscription: &WebhookSubscription) -> ProbeOutcome {
        let payload = serde_json::json!({
            "event": PROBE_EVENT_TYPE,
            "data": {
                "message": "smsgate webhook connectivity test",
                "subscription_id": subscription.id,
            },
        });
        let body = serde_json::to_vec(&payload).expect("probe payload serializes");

        let secret =
            match crypto::decrypt_secret(&subscription.secret_encrypted, &self.encryption_key) {
                Ok(s) => s,
                Err(e) => {
                    return ProbeOutcome {
                        ok: false,
                        http_code: None,
                        latency_ms: 0,
                        error: Some(format!("Signing secret unavailable: {e}")),
                    };
                }
            };

        let signature = crypto::compute_signature(&secret, &body);

        let start = Instant::now();
        let result = self
            .http_client
            .post(&subscription.url)
            .header("Content-Type", "application/json")
            .header(SIGNATURE_HEADER, &signature)
            .header(EVENT_HEADER, PROBE_EVENT_TYPE)
            .header(DELIVERY_HEADER, Uuid::new_v4().to_string())
            .body(body)
            .send()
            .await;
        let latency_ms = start.elapsed().as_millis() as i64;

        match result {
            Ok(response) => {
                let code = response.status().as_u16();
                let ok = classify_status(code) == Classification::Success;
                ProbeOutcome {
                    ok,
                    http_code: Some(i32::from(code)),
                    latency_ms,
                    error: (!ok).then(|| format!("HTTP {code}")),
                }
            }
            Err(e) => ProbeOutcome {
                ok: false,
                http_code: None,
                latency_ms,
                error: Some(transport_error_message(&e)),
            },
        }
    }

    /// Get a reference to the connection pool (for the scheduler).
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn transport_error_message(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        "Request timeout".to_string()
    } else if e.is_connect() {
        format!("Connection failed: {e}")
    } else if e.is_redirect() {
        format!("Redirect limit exceeded: {e}")
    } else {
        format!("Request error: {e}")
    }
}

fn truncate_error(s: &str) -> String {
    s.chars().take(LAST_ERROR_MAX_CHARS).collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // --- Status classification ---

    #[test]
    fn test_2xx_and_3xx_are_success() {
        for code in [200, 201, 204, 299, 301, 302, 304, 399] {
            assert_eq!(classify_status(code), Classification::Success, "{code}");
        }
    }

    #[test]
    fn test_retriable_4xx_codes() {
        for code in [408, 425, 429] {
            assert_eq!(classify_status(code), Classification::Retriable, "{code}");
        }
    }

    #[test]
    fn test_5xx_is_retriable() {
        for code in [500, 502, 503, 504, 599] {
            assert_eq!(classify_status(code), Classification::Retriable, "{code}");
        }
    }

    #[test]
    fn test_other_4xx_is_terminal() {
        for code in [400, 401, 403, 404, 410, 422, 451, 499] {
            assert_eq!(classify_status(code), Classification::Terminal, "{code}");
        }
    }

    // --- Backoff ---

    #[test]
    fn test_backoff_doubles_per_attempt() {
        assert_eq!(backoff_delay_ms(1_000, 0), 1_000);
        assert_eq!(backoff_delay_ms(1_000, 1), 2_000);
        assert_eq!(backoff_delay_ms(1_000, 2), 4_000);
        assert_eq!(backoff_delay_ms(1_000, 3), 8_000);
    }

    #[test]
    fn test_backoff_caps_at_one_hour() {
        assert_eq!(backoff_delay_ms(3_600_000, 0), BACKOFF_CAP_MS);
        assert_eq!(backoff_delay_ms(1_000, 20), BACKOFF_CAP_MS);
        assert_eq!(backoff_delay_ms(i64::MAX, 5), BACKOFF_CAP_MS);
    }

    #[test]
    fn test_backoff_large_shift_does_not_overflow() {
        assert_eq!(backoff_delay_ms(1_000, i32::MAX), BACKOFF_CAP_MS);
    }

    // --- Error truncation ---

    #[test]
    fn test_truncate_error_limits_length() {
        let long = "x".repeat(10_000);
        assert_eq!(truncate_error(&long).len(), 512);
        assert_eq!(truncate_error("short"), "short");
    }
}
