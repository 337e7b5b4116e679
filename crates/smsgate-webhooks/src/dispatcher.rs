//! Bounded dispatch pool.
//!
//! Consumes claimed (`in_flight`) outbox rows from the handoff channel,
//! fed by the event router for fresh emissions and by the retry scheduler
//! for due retries, and executes each attempt on its own task under a
//! process-wide concurrency bound.
//!
//! On shutdown the pool stops accepting rows and lets in-flight requests
//! finish within a grace period; whatever remains stays `in_flight` in the
//! store and is recovered by the stuck-claim sweep after restart.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::services::delivery_service::DeliveryService;
use smsgate_db::models::WebhookDelivery;

/// Bounded worker pool executing delivery attempts.
pub struct Dispatcher {
    delivery_service: DeliveryService,
    job_rx: mpsc::Receiver<WebhookDelivery>,
    permits: Arc<Semaphore>,
    shutdown_grace: Duration,
    cancellation_token: CancellationToken,
}

impl Dispatcher {
    /// Create a new dispatcher over the shared job channel and permit pool.
    pub fn new(
        delivery_service: DeliveryService,
        job_rx: mpsc::Receiver<WebhookDelivery>,
        permits: Arc<Semaphore>,
        shutdown_grace: Duration,
        cancellation_token: CancellationToken,
    ) -> Self {
        Self {
            delivery_service,
            job_rx,
            permits,
            shutdown_grace,
            cancellation_token,
        }
    }

    /// Run the pool until cancellation or channel closure.
    pub async fn run(mut self) {
        tracing::info!(target: "webhook_delivery", "Dispatcher started");

        let mut tasks: JoinSet<()> = JoinSet::new();

        loop {
            // Reap finished attempts so the set does not grow unbounded.
            while tasks.try_join_next().is_some() {}

            tokio::select! {
                _ = self.cancellation_token.cancelled() => break,
                job = self.job_rx.recv() => {
                    let Some(delivery) = job else { break };

                    // Waiting for a permit here is the backpressure point:
                    // the channel buffers, the semaphore bounds what is
                    // actually on the wire.
                    let permit = tokio::select! {
                        _ = self.cancellation_token.cancelled() => break,
                        permit = self.permits.clone().acquire_owned() => {
                            permit.expect("semaphore is never closed")
                        }
                    };

                    let service = self.delivery_service.clone();
                    tasks.spawn(async move {
                        let _permit = permit;
                        service.process(&delivery).await;
                    });
                }
            }
        }

        // Let in-flight requests finish, up to the grace deadline.
        let drain = async {
            while tasks.join_next().await.is_some() {}
        };
        if tokio::time::timeout(self.shutdown_grace, drain).await.is_err() {
            tracing::warn!(
                target: "webhook_delivery",
                grace_secs = self.shutdown_grace.as_secs(),
                "Shutdown grace elapsed; remaining in-flight rows are left for the restart sweep"
            );
            tasks.abort_all();
        }

        tracing::info!(target: "webhook_delivery", "Dispatcher stopped");
    }
}
