//! Process-wide composition root.
//!
//! Wires the delivery service, the bounded dispatcher, and the retry
//! scheduler around one shared job channel and permit pool, and hands the
//! caller an [`EventRouter`] to emit through.

use std::sync::Arc;

use sqlx::PgPool;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::EngineConfig;
use crate::dispatcher::Dispatcher;
use crate::error::WebhookError;
use crate::scheduler::RetryScheduler;
use crate::services::delivery_service::DeliveryService;
use crate::services::event_router::EventRouter;

/// Running delivery engine: dispatcher pool plus retry scheduler.
pub struct WebhookEngine {
    router: EventRouter,
    cancellation_token: CancellationToken,
    dispatcher_handle: JoinHandle<()>,
    scheduler_handle: JoinHandle<()>,
}

impl WebhookEngine {
    /// Start the engine's background tasks.
    ///
    /// `encryption_key` is the 32-byte key protecting subscription secrets
    /// at rest; it must match the key the admin surface was built with.
    ///
    /// # Errors
    ///
    /// Returns `WebhookError::Internal` if the outbound HTTP client cannot
    /// be built.
    pub fn start(
        pool: PgPool,
        encryption_key: Vec<u8>,
        config: EngineConfig,
    ) -> Result<Self, WebhookError> {
        let delivery_service = DeliveryService::new(pool.clone(), encryption_key, &config)?;

        let (job_tx, job_rx) = mpsc::channel(config.channel_capacity.max(1));
        let permits = Arc::new(Semaphore::new(config.max_in_flight.max(1)));
        let cancellation_token = CancellationToken::new();

        let dispatcher = Dispatcher::new(
            delivery_service.clone(),
            job_rx,
            permits.clone(),
            config.shutdown_grace,
            cancellation_token.clone(),
        );
        let dispatcher_handle = tokio::spawn(dispatcher.run());

        let scheduler = RetryScheduler::new(
            pool.clone(),
            job_tx.clone(),
            permits,
            &config,
            cancellation_token.clone(),
        );
        let scheduler_handle = tokio::spawn(scheduler.run());

        Ok(Self {
            router: EventRouter::new(pool, job_tx),
            cancellation_token,
            dispatcher_handle,
            scheduler_handle,
        })
    }

    /// The router producers emit lifecycle events through. Cheap to clone.
    #[must_use]
    pub fn router(&self) -> EventRouter {
        self.router.clone()
    }

    /// Stop claiming new work and drain in-flight requests up to the
    /// configured grace period.
    pub async fn shutdown(self) {
        tracing::info!(target: "webhook_delivery", "Webhook engine shutdown requested");

        self.cancellation_token.cancel();
        let _ = self.scheduler_handle.await;
        let _ = self.dispatcher_handle.await;

        tracing::info!(target: "webhook_delivery", "Webhook engine stopped");
    }
}
