//! Webhook delivery engine for SMS lifecycle event subscriptions.
//!
//! Turns SMS lifecycle transitions (`sms.sent`, `sms.delivered`,
//! `sms.failed`, `sms.bounced`, `sms.read`) into signed HTTPS callbacks with
//! at-least-once delivery, per-subscription retry policies, and persisted
//! per-attempt state.
//!
//! ## Architecture
//!
//! - **Subscription registry** — tenant-scoped callback registrations with
//!   an event mask, a signing secret (encrypted at rest), and delivery
//!   stats maintained by the dispatcher.
//! - **Event router** — [`EventRouter::emit`] resolves matching
//!   subscriptions and writes one durable outbox row per match, then hands
//!   fresh rows to the dispatcher over a bounded channel. The channel is a
//!   latency optimization only; correctness rests on the durable row.
//! - **Dispatcher** — a semaphore-bounded pool that signs and POSTs each
//!   attempt, classifies the outcome (success / retriable / terminal), and
//!   records it on the row and the subscription stats.
//! - **Retry scheduler** — a periodic sweep that reclaims stuck claims,
//!   elects due retries, and feeds them back to the dispatcher.
//! - **Admin surface** — an axum router for subscription CRUD, secret
//!   rotation, synchronous test probes, delivery history, and stats, with
//!   tenant isolation on every operation.
//!
//! The engine is a library: an embedding application supplies the database
//! pool, the secret-encryption key, and an authentication layer that
//! resolves bearer tokens to a [`TenantContext`].

pub mod config;
pub mod crypto;
pub mod error;
pub mod models;
pub mod validation;

pub mod dispatcher;
pub mod engine;
pub mod handlers;
pub mod router;
pub mod scheduler;
pub mod services;
pub mod tenant;

pub use config::EngineConfig;
pub use engine::WebhookEngine;
pub use error::WebhookError;
pub use models::{DeliveryStatus, SmsEvent, SmsEventType};
pub use router::{webhooks_router, WebhooksState};
pub use services::delivery_service::DeliveryService;
pub use services::event_router::EventRouter;
pub use services::subscription_service::SubscriptionService;
pub use tenant::TenantContext;
