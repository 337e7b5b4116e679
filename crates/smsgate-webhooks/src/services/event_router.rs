//! Event fanout.
//!
//! `emit` is the single entry point producers call on an SMS lifecycle
//! transition. It resolves the tenant's matching subscriptions, persists
//! one `pending` outbox row per match, and opportunistically hands each
//! fresh row to the dispatcher over a bounded channel.
//!
//! The channel handoff is a latency optimization only: a row that cannot
//! be handed off (full channel, lost claim race) is already durable and
//! will be picked up by the retry scheduler's sweep. Emission never
//! surfaces delivery failures to the caller.

use chrono::Utc;
use serde_json::Value;
use sqlx::PgPool;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::models::{SmsEvent, SmsEventType};
use smsgate_db::models::{CreateWebhookDelivery, WebhookDelivery, WebhookSubscription};

/// Routes lifecycle events into the delivery outbox.
#[derive(Clone)]
pub struct EventRouter {
    pool: PgPool,
    job_tx: mpsc::Sender<WebhookDelivery>,
}

impl EventRouter {
    pub(crate) fn new(pool: PgPool, job_tx: mpsc::Sender<WebhookDelivery>) -> Self {
        Self { pool, job_tx }
    }

    /// Emit a typed SMS lifecycle event. The wire payload is the event's
    /// own serialization.
    pub async fn emit_event(&self, event: &SmsEvent) {
        self.emit(
            event.tenant_id,
            event.event_type,
            event.source_event_id,
            event.wire_payload(),
        )
        .await;
    }

    /// Emit an event with an explicit payload object.
    ///
    /// The payload is copied verbatim into each matching subscription's
    /// outbox row; receivers get exactly these bytes (re-serialized) as the
    /// callback body. Fire-and-forget: all failures are logged and
    /// swallowed, and the caller's correctness depends only on the
    /// persisted rows.
    pub async fn emit(
        &self,
        tenant_id: Uuid,
        event_type: SmsEventType,
        source_event_id: Option<Uuid>,
        payload: Value,
    ) {
        let subscriptions = match WebhookSubscription::find_active_by_event(
            &self.pool,
            tenant_id,
            event_type.as_str(),
        )
        .await
        {
            Ok(subs) => subs,
            Err(e) => {
                tracing::error!(
                    target: "webhook_delivery",
                    tenant_id = %tenant_id,
                    event_type = %event_type.as_str(),
                    error = %e,
                    "Failed to query matching subscriptions"
                );
                return;
            }
        };

        if subscriptions.is_empty() {
            tracing::debug!(
                target: "webhook_delivery",
                tenant_id = %tenant_id,
                event_type = %event_type.as_str(),
                "No active subscriptions match event type"
            );
            return;
        }

        tracing::info!(
            target: "webhook_delivery",
            tenant_id = %tenant_id,
            event_type = %event_type.as_str(),
            subscription_count = subscriptions.len(),
            "Routing event to matching subscriptions"
        );

        for subscription in subscriptions {
            let row = match WebhookDelivery::insert(
                &self.pool,
                CreateWebhookDelivery {
                    tenant_id,
                    subscription_id: subscription.id,
                    source_event_id,
                    event_type: event_type.as_str().to_string(),
                    payload: payload.clone(),
                    max_attempts: subscription.max_attempts,
                },
            )
            .await
            {
                Ok(row) => row,
                Err(e) => {
                    tracing::error!(
                        target: "webhook_delivery",
                        tenant_id = %tenant_id,
                        subscription_id = %subscription.id,
                        event_type = %event_type.as_str(),
                        error = %e,
                        "Failed to persist delivery row"
                    );
                    continue;
                }
            };

            self.hand_off(row).await;
        }
    }

    /// Try to hand a fresh row to the dispatcher without blocking.
    ///
    /// A channel slot is reserved before the row is claimed, so a row is
    /// only ever moved to `in_flight` when its handoff is guaranteed to
    /// land. On a full channel the row simply stays `pending` for the
    /// sweep.
    async fn hand_off(&self, row: WebhookDelivery) {
        let permit = match self.job_tx.try_reserve() {
            Ok(permit) => permit,
            Err(_) => {
                tracing::debug!(
                    target: "webhook_delivery",
                    delivery_id = %row.id,
                    "Dispatch channel saturated; leaving row for the sweep"
                );
                return;
            }
        };

        match WebhookDelivery::claim_by_id(&self.pool, row.id, Utc::now()).await {
            Ok(Some(claimed)) => permit.send(claimed),
            Ok(None) => {
                // The sweep got there first; it owns the row now.
            }
            Err(e) => {
                tracing::error!(
                    target: "webhook_delivery",
                    delivery_id = %row.id,
                    error = %e,
                    "Failed to claim fresh row; leaving it for the sweep"
                );
            }
        }
    }
}
