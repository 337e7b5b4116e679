//! Axum router setup for the webhook admin endpoints.

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use sqlx::PgPool;

use crate::config::EngineConfig;
use crate::error::WebhookError;
use crate::handlers::{deliveries, subscriptions};
use crate::services::delivery_service::DeliveryService;
use crate::services::subscription_service::SubscriptionService;

/// Shared state for webhook handlers.
#[derive(Clone)]
pub struct WebhooksState {
    pub subscriptions: Arc<SubscriptionService>,
    pub deliveries: Arc<DeliveryService>,
}

impl WebhooksState {
    /// Create the handler state.
    ///
    /// # Errors
    ///
    /// Returns `WebhookError::Internal` if the probe HTTP client cannot be
    /// built.
    pub fn new(
        pool: PgPool,
        encryption_key: Vec<u8>,
        config: &EngineConfig,
    ) -> Result<Self, WebhookError> {
        let subscriptions = SubscriptionService::new(pool.clone(), encryption_key.clone())
            .with_max_subscriptions(config.max_subscriptions_per_tenant)
            .with_allow_private_hosts(config.allow_private_hosts);
        let deliveries = DeliveryService::new(pool, encryption_key, config)?;

        Ok(Self {
            subscriptions: Arc::new(subscriptions),
            deliveries: Arc::new(deliveries),
        })
    }
}

/// Creates the webhook admin router with all routes.
pub fn webhooks_router(state: WebhooksState) -> Router {
    Router::new()
        // Subscription CRUD
        .route(
            "/webhooks",
            post(subscriptions::create_webhook_handler).get(subscriptions::list_webhooks_handler),
        )
        // Event type catalog (static segment, registered before :id)
        .route(
            "/webhooks/event-types",
            get(subscriptions::list_event_types_handler),
        )
        .route(
            "/webhooks/:id",
            get(subscriptions::get_webhook_handler)
                .put(subscriptions::update_webhook_handler)
                .delete(subscriptions::delete_webhook_handler),
        )
        // Secret rotation
        .route(
            "/webhooks/:id/rotate-secret",
            post(subscriptions::rotate_secret_handler),
        )
        // Synchronous connectivity probe
        .route("/webhooks/:id/test", post(deliveries::test_webhook_handler))
        // Delivery history and aggregated stats
        .route("/webhooks/:id/events", get(deliveries::list_events_handler))
        .route("/webhooks/:id/stats", get(deliveries::get_stats_handler))
        .with_state(state)
}
