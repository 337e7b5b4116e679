//! Persistence layer for the smsgate webhook delivery engine.
//!
//! Owns the two durable collections the engine depends on:
//!
//! - `webhook_subscriptions` — per-tenant callback registrations with their
//!   retry policy, signing secret (encrypted at rest), and delivery stats.
//! - `webhook_deliveries` — the delivery outbox: one row per logical
//!   delivery to a single subscription, carrying the full attempt chain.
//!
//! All row mutations on the outbox are conditional single-row updates so
//! that competing workers can never observe a row in two states at once.

pub mod error;
pub mod migrations;
pub mod models;
pub mod pool;

pub use error::DbError;
pub use migrations::run_migrations;
pub use pool::{DbPool, DbPoolOptions};
