//! Webhook delivery outbox model.
//!
//! One row per logical delivery (a single emission to a single
//! subscription), carrying the whole attempt chain: payload, status,
//! attempt counter, retry schedule, and the last attempt's outcome.
//!
//! Rows move through `pending -> in_flight -> success | failed`, with
//! `in_flight -> pending` on a scheduled retry. Every transition is a
//! conditional single-row UPDATE; a transition whose WHERE clause no longer
//! matches returns `None` and the caller treats it as a silent no-op, since
//! the row belongs to another worker.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

/// Database entity for a webhook delivery.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct WebhookDelivery {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub subscription_id: Uuid,
    pub source_event_id: Option<Uuid>,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub status: String,
    pub attempts_made: i32,
    pub max_attempts: i32,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub last_http_code: Option<i32>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub signature: Option<String>,
    pub request_duration_ms: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
}

/// Input for creating a new outbox row.
#[derive(Debug, Clone)]
pub struct CreateWebhookDelivery {
    pub tenant_id: Uuid,
    pub subscription_id: Uuid,
    pub source_event_id: Option<Uuid>,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub max_attempts: i32,
}

/// Admin listing filters for delivery rows.
#[derive(Debug, Clone, Default)]
pub struct DeliveryFilter {
    pub status: Option<String>,
    pub event_type: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

/// Per-status delivery counts for one subscription.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeliveryStatusCounts {
    pub pending: i64,
    pub in_flight: i64,
    pub success: i64,
    pub failed: i64,
}

/// Delivery count for one event type.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct EventTypeCount {
    pub event_type: String,
    pub count: i64,
}

impl WebhookDelivery {
    /// Persist a new `pending` row with zero attempts.
    pub async fn insert(pool: &PgPool, input: CreateWebhookDelivery) -> Result<Self, sqlx::Error> {
        sqlx::query_as(
            r#"
            INSERT INTO webhook_deliveries (
                tenant_id, subscription_id, source_event_id, event_type,
                payload, max_attempts
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(input.tenant_id)
        .bind(input.subscription_id)
        .bind(input.source_event_id)
        .bind(&input.event_type)
        .bind(&input.payload)
        .bind(input.max_attempts)
        .fetch_one(pool)
        .await
    }

    /// Claim up to `max` due rows, transitioning them to `in_flight`.
    ///
    /// Due means `pending` and never attempted (`next_retry_at IS NULL`) or
    /// scheduled at or before `now`. Never-attempted rows sort first, then
    /// earliest schedule, then insertion order. `FOR UPDATE SKIP LOCKED`
    /// keeps two competing sweepers from claiming the same row.
    pub async fn claim_due(
        pool: &PgPool,
        now: DateTime<Utc>,
        max: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as(
            r#"
            UPDATE webhook_deliveries
            SET status = 'in_flight', last_attempt_at = $1
            WHERE id IN (
                SELECT id FROM webhook_deliveries
                WHERE status = 'pending'
                  AND (next_retry_at IS NULL OR next_retry_at <= $1)
                ORDER BY next_retry_at ASC NULLS FIRST, created_at ASC
                LIMIT $2
                FOR UPDATE SKIP LOCKED
            )
            RETURNING *
            "#,
        )
        .bind(now)
        .bind(max)
        .fetch_all(pool)
        .await
    }

    /// Claim a single freshly-inserted row for immediate dispatch.
    ///
    /// Returns `None` when the row was already taken by the sweep.
    pub async fn claim_by_id(
        pool: &PgPool,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as(
            r#"
            UPDATE webhook_deliveries
            SET status = 'in_flight', last_attempt_at = $2
            WHERE id = $1 AND status = 'pending'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(now)
        .fetch_optional(pool)
        .await
    }

    /// Terminal success. Valid only from `in_flight`; anything else is a
    /// silent no-op.
    pub async fn mark_success(
        pool: &PgPool,
        id: Uuid,
        http_code: i32,
        duration_ms: i32,
        signature: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as(
            r#"
            UPDATE webhook_deliveries
            SET
                status = 'success',
                attempts_made = attempts_made + 1,
                next_retry_at = NULL,
                last_error = NULL,
                last_http_code = $2,
                request_duration_ms = $3,
                signature = $4,
                sent_at = NOW()
            WHERE id = $1 AND status = 'in_flight'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(http_code)
        .bind(duration_ms)
        .bind(signature)
        .fetch_optional(pool)
        .await
    }

    /// Failed attempt with retry budget left: back to `pending` with a
    /// schedule. Valid only from `in_flight`.
    pub async fn schedule_retry(
        pool: &PgPool,
        id: Uuid,
        next_retry_at: DateTime<Utc>,
        error: &str,
        http_code: Option<i32>,
        signature: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as(
            r#"
            UPDATE webhook_deliveries
            SET
                status = 'pending',
                attempts_made = attempts_made + 1,
                next_retry_at = $2,
                last_error = $3,
                last_http_code = $4,
                signature = $5
            WHERE id = $1 AND status = 'in_flight'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(next_retry_at)
        .bind(error)
        .bind(http_code)
        .bind(signature)
        .fetch_optional(pool)
        .await
    }

    /// Terminal failure. Valid only from `in_flight`.
    pub async fn mark_failed(
        pool: &PgPool,
        id: Uuid,
        error: &str,
        http_code: Option<i32>,
        signature: Option<&str>,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as(
            r#"
            UPDATE webhook_deliveries
            SET
                status = 'failed',
                attempts_made = attempts_made + 1,
                next_retry_at = NULL,
                last_error = $2,
                last_http_code = $3,
                signature = COALESCE($4, signature)
            WHERE id = $1 AND status = 'in_flight'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(error)
        .bind(http_code)
        .bind(signature)
        .fetch_optional(pool)
        .await
    }

    /// Return rows stuck `in_flight` since before `cutoff` to `pending`.
    ///
    /// The previous attempt is treated as a crash: the counter is left
    /// untouched so the retry budget is not consumed by worker deaths.
    pub async fn reclaim_stuck(
        pool: &PgPool,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE webhook_deliveries
            SET status = 'pending'
            WHERE status = 'in_flight' AND last_attempt_at < $1
            "#,
        )
        .bind(cutoff)
        .execute(pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Drop rows older than `cutoff` (retention sweep).
    pub async fn purge_older_than(
        pool: &PgPool,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            DELETE FROM webhook_deliveries
            WHERE created_at < $1
            "#,
        )
        .bind(cutoff)
        .execute(pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// List deliveries for a subscription, newest first, with optional
    /// status / event-type / time-window filters.
    pub async fn list_for_subscription(
        pool: &PgPool,
        subscription_id: Uuid,
        filter: &DeliveryFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let mut qb = QueryBuilder::<Postgres>::new(
            "SELECT * FROM webhook_deliveries WHERE subscription_id = ",
        );
        qb.push_bind(subscription_id);
        push_filters(&mut qb, filter);
        qb.push(" ORDER BY created_at DESC, id LIMIT ");
        qb.push_bind(limit);
        qb.push(" OFFSET ");
        qb.push_bind(offset);

        qb.build_query_as().fetch_all(pool).await
    }

    /// Count deliveries for a subscription under the same filters.
    pub async fn count_for_subscription(
        pool: &PgPool,
        subscription_id: Uuid,
        filter: &DeliveryFilter,
    ) -> Result<i64, sqlx::Error> {
        let mut qb = QueryBuilder::<Postgres>::new(
            "SELECT COUNT(*) FROM webhook_deliveries WHERE subscription_id = ",
        );
        qb.push_bind(subscription_id);
        push_filters(&mut qb, filter);

        let row: (i64,) = qb.build_query_as().fetch_one(pool).await?;
        Ok(row.0)
    }

    /// Per-status counts for one subscription.
    pub async fn status_counts(
        pool: &PgPool,
        subscription_id: Uuid,
    ) -> Result<DeliveryStatusCounts, sqlx::Error> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT status, COUNT(*) FROM webhook_deliveries
            WHERE subscription_id = $1
            GROUP BY status
            "#,
        )
        .bind(subscription_id)
        .fetch_all(pool)
        .await?;

        let mut counts = DeliveryStatusCounts::default();
        for (status, count) in rows {
            match status.as_str() {
                "pending" => counts.pending = count,
                "in_flight" => counts.in_flight = count,
                "success" => counts.success = count,
                "failed" => counts.failed = count,
                _ => {}
            }
        }
        Ok(counts)
    }

    /// Delivery counts per event type for one subscription.
    pub async fn counts_by_event_type(
        pool: &PgPool,
        subscription_id: Uuid,
    ) -> Result<Vec<EventTypeCount>, sqlx::Error> {
        sqlx::query_as(
            r#"
            SELECT event_type, COUNT(*) AS count FROM webhook_deliveries
            WHERE subscription_id = $1
            GROUP BY event_type
            ORDER BY event_type
            "#,
        )
        .bind(subscription_id)
        .fetch_all(pool)
        .await
    }

    /// Most recent deliveries for one subscription.
    pub async fn recent_for_subscription(
        pool: &PgPool,
        subscription_id: Uuid,
        limit: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as(
            r#"
            SELECT * FROM webhook_deliveries
            WHERE subscription_id = $1
            ORDER BY created_at DESC, id
            LIMIT $2
            "#,
        )
        .bind(subscription_id)
        .bind(limit)
        .fetch_all(pool)
        .await
    }
}

fn push_filters(qb: &mut QueryBuilder<'_, Postgres>, filter: &DeliveryFilter) {
    if let Some(ref status) = filter.status {
        qb.push(" AND status = ");
        qb.push_bind(status.clone());
    }
    if let Some(ref event_type) = filter.event_type {
        qb.push(" AND event_type = ");
        qb.push_bind(event_type.clone());
    }
    if let Some(start) = filter.start {
        qb.push(" AND created_at >= ");
        qb.push_bind(start);
    }
    if let Some(end) = filter.end {
        qb.push(" AND created_at <= ");
        qb.push_bind(end);
    }
}
