//! Engine configuration.

use std::time::Duration;

/// Tunables for the delivery engine.
///
/// Defaults match production sizing; tests shrink the intervals to keep
/// wall-clock time down.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum concurrent outbound requests across the process.
    pub max_in_flight: usize,

    /// Capacity of the fresh-emission handoff channel. When full, new rows
    /// wait for the sweep instead.
    pub channel_capacity: usize,

    /// Per-request timeout for outbound POSTs.
    pub request_timeout: Duration,

    /// Maximum redirects followed per outbound POST.
    pub max_redirects: usize,

    /// Retry scheduler tick.
    pub sweep_interval: Duration,

    /// Maximum rows claimed per sweep tick.
    pub claim_batch: i64,

    /// Age after which an `in_flight` claim is considered crashed and
    /// returned to `pending`. Defaults to five request timeouts.
    pub stuck_after: Duration,

    /// How long shutdown waits for in-flight requests before abandoning
    /// them to the next restart's sweep.
    pub shutdown_grace: Duration,

    /// Delivery rows older than this are purged.
    pub retention: Duration,

    /// How often the retention purge runs.
    pub purge_interval: Duration,

    /// Permit callback URLs resolving to private/internal hosts. For tests
    /// and local development only.
    pub allow_private_hosts: bool,

    /// Maximum subscriptions a single tenant may hold.
    pub max_subscriptions_per_tenant: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let request_timeout = Duration::from_secs(10);
        Self {
            max_in_flight: 32,
            channel_capacity: 1024,
            request_timeout,
            max_redirects: 3,
            sweep_interval: Duration::from_secs(60),
            claim_batch: 200,
            stuck_after: request_timeout * 5,
            shutdown_grace: Duration::from_secs(15),
            retention: Duration::from_secs(90 * 24 * 60 * 60),
            purge_interval: Duration::from_secs(60 * 60),
            allow_private_hosts: false,
            max_subscriptions_per_tenant: 25,
        }
    }
}
