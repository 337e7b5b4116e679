//! Webhook subscription database model.
//!
//! Tenant-scoped callback registrations with their retry policy, signing
//! secret (encrypted at rest), and dispatcher-maintained delivery stats.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

/// Database entity for a webhook subscription.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct WebhookSubscription {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub url: String,
    pub secret_encrypted: String,
    pub event_mask: Vec<String>,
    pub active: bool,
    pub retry_enabled: bool,
    pub max_attempts: i32,
    pub backoff_base_ms: i64,
    pub max_payload_bytes: i64,
    pub notify_on_failure: bool,
    pub total_calls: i64,
    pub success_calls: i64,
    pub failure_calls: i64,
    pub last_call_at: Option<DateTime<Utc>>,
    pub last_status_code: Option<i32>,
    pub avg_response_ms: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a new webhook subscription.
#[derive(Debug, Clone)]
pub struct CreateWebhookSubscription {
    pub tenant_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub url: String,
    pub secret_encrypted: String,
    pub event_mask: Vec<String>,
    pub retry_enabled: bool,
    pub max_attempts: i32,
    pub backoff_base_ms: i64,
    pub max_payload_bytes: i64,
    pub notify_on_failure: bool,
}

/// Input for updating a webhook subscription. Only non-None fields change.
///
/// The secret and the stats columns are deliberately absent: the secret
/// changes only through `rotate_secret`, the stats only through
/// `record_outcome`.
#[derive(Debug, Clone, Default)]
pub struct UpdateWebhookSubscription {
    pub name: Option<String>,
    pub description: Option<String>,
    pub url: Option<String>,
    pub event_mask: Option<Vec<String>>,
    pub active: Option<bool>,
    pub retry_enabled: Option<bool>,
    pub max_attempts: Option<i32>,
    pub backoff_base_ms: Option<i64>,
    pub notify_on_failure: Option<bool>,
}

impl WebhookSubscription {
    /// Create a new webhook subscription.
    pub async fn create(
        pool: &PgPool,
        input: CreateWebhookSubscription,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as(
            r#"
            INSERT INTO webhook_subscriptions (
                tenant_id, name, description, url, secret_encrypted,
                event_mask, retry_enabled, max_attempts, backoff_base_ms,
                max_payload_bytes, notify_on_failure
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING *
            "#,
        )
        .bind(input.tenant_id)
        .bind(&input.name)
        .bind(&input.description)
        .bind(&input.url)
        .bind(&input.secret_encrypted)
        .bind(&input.event_mask)
        .bind(input.retry_enabled)
        .bind(input.max_attempts)
        .bind(input.backoff_base_ms)
        .bind(input.max_payload_bytes)
        .bind(input.notify_on_failure)
        .fetch_one(pool)
        .await
    }

    /// Find a subscription by ID alone.
    ///
    /// Deliberately not tenant-scoped: the service layer compares the stored
    /// `tenant_id` against the caller to distinguish "not found" from
    /// "belongs to someone else".
    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as(
            r#"
            SELECT * FROM webhook_subscriptions
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// List subscriptions for a tenant with pagination and optional active
    /// filter. Newest first; ties broken by id for a stable page order.
    pub async fn list_by_tenant(
        pool: &PgPool,
        tenant_id: Uuid,
        limit: i64,
        offset: i64,
        active: Option<bool>,
    ) -> Result<Vec<Self>, sqlx::Error> {
        match active {
            Some(a) => {
                sqlx::query_as(
                    r#"
                    SELECT * FROM webhook_subscriptions
                    WHERE tenant_id = $1 AND active = $2
                    ORDER BY created_at DESC, id
                    LIMIT $3 OFFSET $4
                    "#,
                )
                .bind(tenant_id)
                .bind(a)
                .bind(limit)
                .bind(offset)
                .fetch_all(pool)
                .await
            }
            None => {
                sqlx::query_as(
                    r#"
                    SELECT * FROM webhook_subscriptions
                    WHERE tenant_id = $1
                    ORDER BY created_at DESC, id
                    LIMIT $2 OFFSET $3
                    "#,
                )
                .bind(tenant_id)
                .bind(limit)
                .bind(offset)
                .fetch_all(pool)
                .await
            }
        }
    }

    /// Count subscriptions for a tenant with optional active filter.
    pub async fn count_by_tenant(
        pool: &PgPool,
        tenant_id: Uuid,
        active: Option<bool>,
    ) -> Result<i64, sqlx::Error> {
        let row: (i64,) = match active {
            Some(a) => {
                sqlx::query_as(
                    r#"
                    SELECT COUNT(*) FROM webhook_subscriptions
                    WHERE tenant_id = $1 AND active = $2
                    "#,
                )
                .bind(tenant_id)
                .bind(a)
                .fetch_one(pool)
                .await?
            }
            None => {
                sqlx::query_as(
                    r#"
                    SELECT COUNT(*) FROM webhook_subscriptions
                    WHERE tenant_id = $1
                    "#,
                )
                .bind(tenant_id)
                .fetch_one(pool)
                .await?
            }
        };
        Ok(row.0)
    }

    /// Update a webhook subscription. Only non-None fields are updated.
    pub async fn update(
        pool: &PgPool,
        id: Uuid,
        input: UpdateWebhookSubscription,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as(
            r#"
            UPDATE webhook_subscriptions
            SET
                name = COALESCE($2, name),
                description = COALESCE($3, description),
                url = COALESCE($4, url),
                event_mask = COALESCE($5, event_mask),
                active = COALESCE($6, active),
                retry_enabled = COALESCE($7, retry_enabled),
                max_attempts = COALESCE($8, max_attempts),
                backoff_base_ms = COALESCE($9, backoff_base_ms),
                notify_on_failure = COALESCE($10, notify_on_failure),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&input.name)
        .bind(&input.description)
        .bind(&input.url)
        .bind(&input.event_mask)
        .bind(input.active)
        .bind(input.retry_enabled)
        .bind(input.max_attempts)
        .bind(input.backoff_base_ms)
        .bind(input.notify_on_failure)
        .fetch_optional(pool)
        .await
    }

    /// Hard-delete a subscription. Outbox rows cascade at the schema level.
    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            DELETE FROM webhook_subscriptions
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Replace the stored secret in a single statement.
    pub async fn rotate_secret(
        pool: &PgPool,
        id: Uuid,
        secret_encrypted: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as(
            r#"
            UPDATE webhook_subscriptions
            SET secret_encrypted = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(secret_encrypted)
        .fetch_optional(pool)
        .await
    }

    /// Find all active subscriptions for a tenant whose event mask contains
    /// the given event type, in registration order.
    pub async fn find_active_by_event(
        pool: &PgPool,
        tenant_id: Uuid,
        event_type: &str,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as(
            r#"
            SELECT * FROM webhook_subscriptions
            WHERE tenant_id = $1
              AND active = true
              AND event_mask @> ARRAY[$2]::text[]
            ORDER BY created_at ASC, id
            "#,
        )
        .bind(tenant_id)
        .bind(event_type)
        .fetch_all(pool)
        .await
    }

    /// Record one delivery outcome in the subscription stats.
    ///
    /// A single UPDATE so concurrent dispatch never loses an increment. The
    /// response-time average is folded in as `avg + (sample - avg) / n`
    /// where `n` is the new total; column references on the right-hand side
    /// read the pre-update values.
    pub async fn record_outcome(
        pool: &PgPool,
        id: Uuid,
        success: bool,
        status_code: i32,
        latency_ms: i64,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE webhook_subscriptions
            SET
                total_calls = total_calls + 1,
                success_calls = success_calls + CASE WHEN $2 THEN 1 ELSE 0 END,
                failure_calls = failure_calls + CASE WHEN $2 THEN 0 ELSE 1 END,
                last_call_at = NOW(),
                last_status_code = $3,
                avg_response_ms = avg_response_ms
                    + ($4::double precision - avg_response_ms) / (total_calls + 1)
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(success)
        .bind(status_code)
        .bind(latency_ms)
        .execute(pool)
        .await?;

        Ok(())
    }
}
