//! Retry scheduler.
//!
//! A single periodic loop per process (safe without leader election because
//! the claim is atomic). Each tick:
//!
//! 1. Returns claims stuck `in_flight` past the crash cutoff to `pending`,
//!    attempt counter untouched.
//! 2. Claims due rows in a batch and hands them to the dispatcher, unless
//!    the pool has no free permits.
//!
//! A second, slower interval purges rows past the retention window.

use std::sync::Arc;

use chrono::Utc;
use sqlx::PgPool;
use tokio::sync::{mpsc, Semaphore};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::config::EngineConfig;
use smsgate_db::models::WebhookDelivery;

/// Periodic sweep electing due retries and recovering crashed claims.
pub struct RetryScheduler {
    pool: PgPool,
    job_tx: mpsc::Sender<WebhookDelivery>,
    permits: Arc<Semaphore>,
    sweep_interval: std::time::Duration,
    purge_interval: std::time::Duration,
    claim_batch: i64,
    stuck_after: chrono::Duration,
    retention: chrono::Duration,
    cancellation_token: CancellationToken,
}

impl RetryScheduler {
    /// Create a new scheduler over the shared job channel and permit pool.
    pub fn new(
        pool: PgPool,
        job_tx: mpsc::Sender<WebhookDelivery>,
        permits: Arc<Semaphore>,
        config: &EngineConfig,
        cancellation_token: CancellationToken,
    ) -> Self {
        Self {
            pool,
            job_tx,
            permits,
            sweep_interval: config.sweep_interval,
            purge_interval: config.purge_interval,
            claim_batch: config.claim_batch,
            stuck_after: chrono::Duration::milliseconds(config.stuck_after.as_millis() as i64),
            retention: chrono::Duration::milliseconds(config.retention.as_millis() as i64),
            cancellation_token,
        }
    }

    /// Run the scheduler until cancellation.
    pub async fn run(self) {
        tracing::info!(
            target: "webhook_delivery",
            tick_secs = self.sweep_interval.as_secs(),
            "Retry scheduler started"
        );

        let mut sweep = tokio::time::interval(self.sweep_interval);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut purge = tokio::time::interval(self.purge_interval);
        purge.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.cancellation_token.cancelled() => {
                    tracing::info!(target: "webhook_delivery", "Retry scheduler shutting down");
                    break;
                }
                _ = sweep.tick() => {
                    self.sweep_once().await;
                }
                _ = purge.tick() => {
                    self.purge_once().await;
                }
            }
        }
    }

    /// One sweep tick: reclaim crashed claims, then claim and dispatch due
    /// rows.
    async fn sweep_once(&self) {
        let now = Utc::now();

        match WebhookDelivery::reclaim_stuck(&self.pool, now - self.stuck_after).await {
            Ok(0) => {}
            Ok(reclaimed) => {
                tracing::warn!(
                    target: "webhook_delivery",
                    reclaimed,
                    "Returned stuck in-flight rows to pending"
                );
            }
            Err(e) => {
                tracing::error!(
                    target: "webhook_delivery",
                    error = %e,
                    "Failed to reclaim stuck rows"
                );
            }
        }

        if self.permits.available_permits() == 0 {
            tracing::debug!(
                target: "webhook_delivery",
                "Dispatch pool saturated; skipping claim this tick"
            );
            return;
        }

        let due = match WebhookDelivery::claim_due(&self.pool, now, self.claim_batch).await {
            Ok(rows) => rows,
            Err(e) => {
                tracing::error!(
                    target: "webhook_delivery",
                    error = %e,
                    "Failed to claim due deliveries"
                );
                return;
            }
        };

        if due.is_empty() {
            return;
        }

        tracing::info!(
            target: "webhook_delivery",
            count = due.len(),
            "Dispatching due deliveries"
        );

        for delivery in due {
            if self.job_tx.send(delivery).await.is_err() {
                // Dispatcher is gone; claimed rows stay in_flight and the
                // next process start's sweep recovers them.
                break;
            }
        }
    }

    /// One retention tick: drop rows past the retention window.
    async fn purge_once(&self) {
        match WebhookDelivery::purge_older_than(&self.pool, Utc::now() - self.retention).await {
            Ok(0) => {}
            Ok(purged) => {
                tracing::info!(
                    target: "webhook_delivery",
                    purged,
                    "Purged expired delivery rows"
                );
            }
            Err(e) => {
                tracing::error!(
                    target: "webhook_delivery",
                    error = %e,
                    "Failed to purge expired delivery rows"
                );
            }
        }
    }
}
