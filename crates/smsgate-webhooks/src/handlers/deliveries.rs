//! Handlers for the test probe, delivery history, and stats.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use uuid::Uuid;

use crate::error::ApiResult;
use crate::models::{DeliveryListResponse, ListDeliveriesQuery, ProbeResponse, StatsResponse};
use crate::router::WebhooksState;
use crate::tenant::TenantContext;

/// Send a synchronous test probe to the subscription's URL.
///
/// The probe is signed with the current secret and leaves no trace in the
/// outbox or the stats; `ok` in the response reflects the receiver's
/// answer.
#[utoipa::path(
    post,
    path = "/webhooks/{id}/test",
    tag = "Webhooks",
    params(
        ("id" = Uuid, Path, description = "Subscription ID")
    ),
    responses(
        (status = 200, description = "Probe result", body = ProbeResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Belongs to another tenant"),
        (status = 404, description = "Subscription not found"),
    ),
    security(("bearer_auth" = []))
)]
pub async fn test_webhook_handler(
    State(state): State<WebhooksState>,
    tenant: TenantContext,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ProbeResponse>> {
    let subscription = state.subscriptions.get_owned(tenant.tenant_id, id).await?;
    let outcome = state.deliveries.probe(&subscription).await;

    Ok(Json(ProbeResponse {
        success: true,
        ok: outcome.ok,
        http_code: outcome.http_code,
        latency_ms: outcome.latency_ms,
        error: outcome.error,
    }))
}

/// List delivery attempts for a subscription.
#[utoipa::path(
    get,
    path = "/webhooks/{id}/events",
    tag = "Webhooks",
    params(
        ("id" = Uuid, Path, description = "Subscription ID"),
        ListDeliveriesQuery
    ),
    responses(
        (status = 200, description = "Paginated delivery history", body = DeliveryListResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Belongs to another tenant"),
        (status = 404, description = "Subscription not found"),
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_events_handler(
    State(state): State<WebhooksState>,
    tenant: TenantContext,
    Path(id): Path<Uuid>,
    Query(query): Query<ListDeliveriesQuery>,
) -> ApiResult<Json<DeliveryListResponse>> {
    let response = state
        .subscriptions
        .list_deliveries(tenant.tenant_id, id, query)
        .await?;

    Ok(Json(response))
}

/// Aggregated delivery statistics for a subscription.
#[utoipa::path(
    get,
    path = "/webhooks/{id}/stats",
    tag = "Webhooks",
    params(
        ("id" = Uuid, Path, description = "Subscription ID")
    ),
    responses(
        (status = 200, description = "Aggregated stats", body = StatsResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Belongs to another tenant"),
        (status = 404, description = "Subscription not found"),
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_stats_handler(
    State(state): State<WebhooksState>,
    tenant: TenantContext,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<StatsResponse>> {
    let response = state.subscriptions.get_stats(tenant.tenant_id, id).await?;

    Ok(Json(response))
}
