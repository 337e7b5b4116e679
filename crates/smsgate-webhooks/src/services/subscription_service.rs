//! Subscription registry business logic.
//!
//! CRUD, secret rotation, and stats aggregation for tenant-owned webhook
//! subscriptions. Every operation enforces tenant isolation by loading the
//! row by id and comparing the stored owner against the caller, so a
//! foreign id is distinguishable as `Forbidden` rather than `NotFound`.

use sqlx::PgPool;
use uuid::Uuid;

use crate::crypto;
use crate::error::WebhookError;
use crate::models::{
    CreateWebhookRequest, DeliveryCounts, DeliveryInfo, DeliveryListResponse, EventTypeCount,
    ListDeliveriesQuery, ListWebhooksQuery, StatsResponse, UpdateWebhookRequest, WebhookInfo,
    WebhookStats,
};
use crate::validation;
use smsgate_db::models::{
    CreateWebhookSubscription, DeliveryFilter, UpdateWebhookSubscription, WebhookDelivery,
    WebhookSubscription,
};

/// Page size bounds for list operations.
const LIST_LIMIT_MAX: i64 = 200;

/// Attempts shown in the stats endpoint's recent-history section.
const RECENT_ATTEMPTS: i64 = 10;

/// Server-side defaults for optional creation fields.
const DEFAULT_MAX_ATTEMPTS: i32 = 5;
const DEFAULT_BACKOFF_BASE_MS: i64 = 60_000;
const DEFAULT_MAX_PAYLOAD_BYTES: i64 = 1_048_576;

/// Service for webhook subscription operations.
#[derive(Clone)]
pub struct SubscriptionService {
    pool: PgPool,
    encryption_key: Vec<u8>,
    max_subscriptions: i64,
    allow_private_hosts: bool,
}

impl SubscriptionService {
    /// Create a new subscription service.
    #[must_use]
    pub fn new(pool: PgPool, encryption_key: Vec<u8>) -> Self {
        Self {
            pool,
            encryption_key,
            max_subscriptions: 25,
            allow_private_hosts: false,
        }
    }

    /// Set the maximum subscriptions per tenant.
    #[must_use]
    pub fn with_max_subscriptions(mut self, max: i64) -> Self {
        self.max_subscriptions = max;
        self
    }

    /// Permit callback URLs on private/internal hosts (tests, local dev).
    #[must_use]
    pub fn with_allow_private_hosts(mut self, allow: bool) -> Self {
        self.allow_private_hosts = allow;
        self
    }

    /// Create a new webhook subscription.
    ///
    /// Generates the signing secret server-side; the create response is one
    /// of the two places the plaintext secret is ever returned (the other
    /// is rotation; `get` re-derives it from storage).
    pub async fn create_subscription(
        &self,
        tenant_id: Uuid,
        request: CreateWebhookRequest,
    ) -> Result<WebhookInfo, WebhookError> {
        validation::validate_webhook_url(&request.url, self.allow_private_hosts)?;
        validation::validate_event_mask(&request.events)?;
        validation::validate_retry_policy(request.max_attempts, request.backoff_base_ms)?;

        let count = WebhookSubscription::count_by_tenant(&self.pool, tenant_id, None).await?;
        if count >= self.max_subscriptions {
            return Err(WebhookError::Validation(format!(
                "Subscription limit ({}) reached for tenant",
                self.max_subscriptions
            )));
        }

        let secret = crypto::generate_secret();
        let secret_encrypted = crypto::encrypt_secret(&secret, &self.encryption_key)?;

        let input = CreateWebhookSubscription {
            tenant_id,
            name: request.name,
            description: request.description,
            url: request.url,
            secret_encrypted,
            event_mask: request.events,
            retry_enabled: true,
            max_attempts: request.max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS),
            backoff_base_ms: request.backoff_base_ms.unwrap_or(DEFAULT_BACKOFF_BASE_MS),
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
            notify_on_failure: request.notify_on_failure.unwrap_or(false),
        };

        let sub = WebhookSubscription::create(&self.pool, input).await?;

        tracing::info!(
            target: "webhook_delivery",
            subscription_id = %sub.id,
            tenant_id = %tenant_id,
            url = %sub.url,
            "Webhook subscription created"
        );

        Ok(WebhookInfo::from_row(sub, Some(secret)))
    }

    /// Get a single subscription, including its plaintext secret.
    pub async fn get_subscription(
        &self,
        tenant_id: Uuid,
        id: Uuid,
    ) -> Result<WebhookInfo, WebhookError> {
        let sub = self.get_owned(tenant_id, id).await?;
        let secret = crypto::decrypt_secret(&sub.secret_encrypted, &self.encryption_key)?;
        Ok(WebhookInfo::from_row(sub, Some(secret)))
    }

    /// List subscriptions for a tenant. Secrets are never included.
    pub async fn list_subscriptions(
        &self,
        tenant_id: Uuid,
        query: ListWebhooksQuery,
    ) -> Result<(Vec<WebhookInfo>, i64, i64, i64), WebhookError> {
        let limit = query.limit.clamp(1, LIST_LIMIT_MAX);
        let offset = query.offset.max(0);

        let subs =
            WebhookSubscription::list_by_tenant(&self.pool, tenant_id, limit, offset, query.active)
                .await?;
        let total =
            WebhookSubscription::count_by_tenant(&self.pool, tenant_id, query.active).await?;

        let items = subs
            .into_iter()
            .map(|sub| WebhookInfo::from_row(sub, None))
            .collect();

        Ok((items, total, limit, offset))
    }

    /// Update a subscription. The secret and the stats are not patchable.
    pub async fn update_subscription(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        request: UpdateWebhookRequest,
    ) -> Result<WebhookInfo, WebhookError> {
        self.get_owned(tenant_id, id).await?;

        if let Some(ref url) = request.url {
            validation::validate_webhook_url(url, self.allow_private_hosts)?;
        }
        if let Some(ref events) = request.events {
            validation::validate_event_mask(events)?;
        }
        validation::validate_retry_policy(request.max_attempts, request.backoff_base_ms)?;

        let input = UpdateWebhookSubscription {
            name: request.name,
            description: request.description,
            url: request.url,
            event_mask: request.events,
            active: request.active,
            retry_enabled: request.retry_enabled,
            max_attempts: request.max_attempts,
            backoff_base_ms: request.backoff_base_ms,
            notify_on_failure: request.notify_on_failure,
        };

        let sub = WebhookSubscription::update(&self.pool, id, input)
            .await?
            .ok_or(WebhookError::NotFound)?;

        Ok(WebhookInfo::from_row(sub, None))
    }

    /// Hard-delete a subscription. Delivery rows cascade with it.
    pub async fn delete_subscription(&self, tenant_id: Uuid, id: Uuid) -> Result<(), WebhookError> {
        self.get_owned(tenant_id, id).await?;

        let deleted = WebhookSubscription::delete(&self.pool, id).await?;
        if !deleted {
            return Err(WebhookError::NotFound);
        }

        tracing::info!(
            target: "webhook_delivery",
            subscription_id = %id,
            tenant_id = %tenant_id,
            "Webhook subscription deleted"
        );

        Ok(())
    }

    /// Replace the signing secret. The old secret is invalid for receiver
    /// verification from this point on; retries in flight are re-signed on
    /// their next attempt.
    pub async fn rotate_secret(
        &self,
        tenant_id: Uuid,
        id: Uuid,
    ) -> Result<WebhookInfo, WebhookError> {
        self.get_owned(tenant_id, id).await?;

        let secret = crypto::generate_secret();
        let secret_encrypted = crypto::encrypt_secret(&secret, &self.encryption_key)?;

        let sub = WebhookSubscription::rotate_secret(&self.pool, id, &secret_encrypted)
            .await?
            .ok_or(WebhookError::NotFound)?;

        tracing::info!(
            target: "webhook_delivery",
            subscription_id = %id,
            tenant_id = %tenant_id,
            "Webhook secret rotated"
        );

        Ok(WebhookInfo::from_row(sub, Some(secret)))
    }

    /// List delivery history for a subscription.
    pub async fn list_deliveries(
        &self,
        tenant_id: Uuid,
        id: Uuid,
        query: ListDeliveriesQuery,
    ) -> Result<DeliveryListResponse, WebhookError> {
        self.get_owned(tenant_id, id).await?;

        let limit = query.limit.clamp(1, LIST_LIMIT_MAX);
        let offset = query.offset.max(0);
        let filter = DeliveryFilter {
            status: query.status,
            event_type: query.event_type,
            start: query.start,
            end: query.end,
        };

        let rows =
            WebhookDelivery::list_for_subscription(&self.pool, id, &filter, limit, offset).await?;
        let total = WebhookDelivery::count_for_subscription(&self.pool, id, &filter).await?;

        Ok(DeliveryListResponse {
            success: true,
            items: rows.into_iter().map(DeliveryInfo::from).collect(),
            total,
            limit,
            offset,
        })
    }

    /// Aggregated statistics: the dispatcher-maintained counters plus an
    /// aggregation over the outbox.
    pub async fn get_stats(&self, tenant_id: Uuid, id: Uuid) -> Result<StatsResponse, WebhookError> {
        let sub = self.get_owned(tenant_id, id).await?;

        let counts = WebhookDelivery::status_counts(&self.pool, id).await?;
        let by_event_type = WebhookDelivery::counts_by_event_type(&self.pool, id).await?;
        let recent = WebhookDelivery::recent_for_subscription(&self.pool, id, RECENT_ATTEMPTS).await?;

        Ok(StatsResponse {
            success: true,
            stats: WebhookStats {
                total_calls: sub.total_calls,
                success_calls: sub.success_calls,
                failure_calls: sub.failure_calls,
                last_call_at: sub.last_call_at,
                last_status_code: sub.last_status_code,
                avg_response_ms: sub.avg_response_ms,
            },
            deliveries: DeliveryCounts {
                pending: counts.pending,
                in_flight: counts.in_flight,
                success: counts.success,
                failed: counts.failed,
            },
            by_event_type: by_event_type
                .into_iter()
                .map(|c| EventTypeCount {
                    event_type: c.event_type,
                    count: c.count,
                })
                .collect(),
            recent: recent.into_iter().map(DeliveryInfo::from).collect(),
        })
    }

    /// Load a subscription row the caller owns.
    ///
    /// `NotFound` when the id is unknown, `Forbidden` when it belongs to a
    /// different tenant.
    pub(crate) async fn get_owned(
        &self,
        tenant_id: Uuid,
        id: Uuid,
    ) -> Result<WebhookSubscription, WebhookError> {
        let sub = WebhookSubscription::find_by_id(&self.pool, id)
            .await?
            .ok_or(WebhookError::NotFound)?;

        if sub.tenant_id != tenant_id {
            return Err(WebhookError::Forbidden);
        }

        Ok(sub)
    }
}
