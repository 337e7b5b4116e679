//! CRUD handlers for webhook subscriptions.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;
use validator::Validate;

use crate::error::{ApiResult, WebhookError};
use crate::models::{
    AckResponse, CreateWebhookRequest, EventTypeInfo, EventTypeListResponse, ListWebhooksQuery,
    SmsEventType, UpdateWebhookRequest, WebhookListResponse, WebhookResponse,
};
use crate::router::WebhooksState;
use crate::tenant::TenantContext;

// ---------------------------------------------------------------------------
// Subscription CRUD handlers
// ---------------------------------------------------------------------------

/// Create a new webhook subscription.
///
/// The response carries the generated signing secret; store it, it is not
/// returned by list operations.
#[utoipa::path(
    post,
    path = "/webhooks",
    tag = "Webhooks",
    request_body = CreateWebhookRequest,
    responses(
        (status = 201, description = "Subscription created", body = WebhookResponse),
        (status = 400, description = "Validation error"),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_webhook_handler(
    State(state): State<WebhooksState>,
    tenant: TenantContext,
    Json(request): Json<CreateWebhookRequest>,
) -> ApiResult<(StatusCode, Json<WebhookResponse>)> {
    request
        .validate()
        .map_err(|e| WebhookError::Validation(e.to_string()))?;

    let webhook = state
        .subscriptions
        .create_subscription(tenant.tenant_id, request)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(WebhookResponse {
            success: true,
            webhook,
        }),
    ))
}

/// List webhook subscriptions. Secrets are never included.
#[utoipa::path(
    get,
    path = "/webhooks",
    tag = "Webhooks",
    params(ListWebhooksQuery),
    responses(
        (status = 200, description = "Paginated subscription list", body = WebhookListResponse),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_webhooks_handler(
    State(state): State<WebhooksState>,
    tenant: TenantContext,
    Query(query): Query<ListWebhooksQuery>,
) -> ApiResult<Json<WebhookListResponse>> {
    let (items, total, limit, offset) = state
        .subscriptions
        .list_subscriptions(tenant.tenant_id, query)
        .await?;

    Ok(Json(WebhookListResponse {
        success: true,
        items,
        total,
        limit,
        offset,
    }))
}

/// Get a single webhook subscription, including its signing secret.
#[utoipa::path(
    get,
    path = "/webhooks/{id}",
    tag = "Webhooks",
    params(
        ("id" = Uuid, Path, description = "Subscription ID")
    ),
    responses(
        (status = 200, description = "Subscription details", body = WebhookResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Belongs to another tenant"),
        (status = 404, description = "Subscription not found"),
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_webhook_handler(
    State(state): State<WebhooksState>,
    tenant: TenantContext,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<WebhookResponse>> {
    let webhook = state
        .subscriptions
        .get_subscription(tenant.tenant_id, id)
        .await?;

    Ok(Json(WebhookResponse {
        success: true,
        webhook,
    }))
}

/// Update a webhook subscription.
#[utoipa::path(
    put,
    path = "/webhooks/{id}",
    tag = "Webhooks",
    params(
        ("id" = Uuid, Path, description = "Subscription ID")
    ),
    request_body = UpdateWebhookRequest,
    responses(
        (status = 200, description = "Subscription updated", body = WebhookResponse),
        (status = 400, description = "Validation error"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Belongs to another tenant"),
        (status = 404, description = "Subscription not found"),
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_webhook_handler(
    State(state): State<WebhooksState>,
    tenant: TenantContext,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateWebhookRequest>,
) -> ApiResult<Json<WebhookResponse>> {
    request
        .validate()
        .map_err(|e| WebhookError::Validation(e.to_string()))?;

    let webhook = state
        .subscriptions
        .update_subscription(tenant.tenant_id, id, request)
        .await?;

    Ok(Json(WebhookResponse {
        success: true,
        webhook,
    }))
}

/// Delete a webhook subscription.
#[utoipa::path(
    delete,
    path = "/webhooks/{id}",
    tag = "Webhooks",
    params(
        ("id" = Uuid, Path, description = "Subscription ID")
    ),
    responses(
        (status = 200, description = "Subscription deleted", body = AckResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Belongs to another tenant"),
        (status = 404, description = "Subscription not found"),
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_webhook_handler(
    State(state): State<WebhooksState>,
    tenant: TenantContext,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<AckResponse>> {
    state
        .subscriptions
        .delete_subscription(tenant.tenant_id, id)
        .await?;

    Ok(Json(AckResponse { success: true }))
}

/// Rotate a subscription's signing secret.
///
/// The response carries the new secret; the old one stops verifying
/// immediately, and any retry in flight is re-signed with the new secret
/// on its next attempt.
#[utoipa::path(
    post,
    path = "/webhooks/{id}/rotate-secret",
    tag = "Webhooks",
    params(
        ("id" = Uuid, Path, description = "Subscription ID")
    ),
    responses(
        (status = 200, description = "Secret rotated", body = WebhookResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Belongs to another tenant"),
        (status = 404, description = "Subscription not found"),
    ),
    security(("bearer_auth" = []))
)]
pub async fn rotate_secret_handler(
    State(state): State<WebhooksState>,
    tenant: TenantContext,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<WebhookResponse>> {
    let webhook = state
        .subscriptions
        .rotate_secret(tenant.tenant_id, id)
        .await?;

    Ok(Json(WebhookResponse {
        success: true,
        webhook,
    }))
}

// ---------------------------------------------------------------------------
// Event types handler
// ---------------------------------------------------------------------------

/// List all supported SMS lifecycle event types.
#[utoipa::path(
    get,
    path = "/webhooks/event-types",
    tag = "Webhooks",
    responses(
        (status = 200, description = "List of event types", body = EventTypeListResponse),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_event_types_handler(_tenant: TenantContext) -> Json<EventTypeListResponse> {
    let event_types = SmsEventType::all()
        .into_iter()
        .map(|et| EventTypeInfo {
            event_type: et.as_str().to_string(),
            description: et.description().to_string(),
        })
        .collect();

    Json(EventTypeListResponse {
        success: true,
        event_types,
    })
}
