//! Common test utilities for smsgate-webhooks tests.
//!
//! Provides wiremock responders and fixtures for verifying callback
//! delivery behavior, plus database helpers for the feature-gated
//! end-to-end tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use uuid::Uuid;
use wiremock::{Request, Respond, ResponseTemplate};

// ---------------------------------------------------------------------------
// Test fixtures
// ---------------------------------------------------------------------------

/// Standard test tenant IDs
pub const TENANT_A: Uuid = Uuid::from_bytes([
    0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11,
]);

pub const TENANT_B: Uuid = Uuid::from_bytes([
    0x22, 0x22, 0x22, 0x22, 0x22, 0x22, 0x22, 0x22, 0x22, 0x22, 0x22, 0x22, 0x22, 0x22, 0x22, 0x22,
]);

/// 32-byte key protecting subscription secrets at rest in tests.
pub const TEST_ENCRYPTION_KEY: [u8; 32] = [0x42u8; 32];

// ---------------------------------------------------------------------------
// CapturedRequest - for inspecting callback requests
// ---------------------------------------------------------------------------

/// A captured HTTP request with body and headers.
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub body: Vec<u8>,
    pub headers: HashMap<String, String>,
    pub timestamp: DateTime<Utc>,
}

impl CapturedRequest {
    /// Parse the body as JSON.
    pub fn body_json<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    /// Get a header value by name (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        let name_lower = name.to_lowercase();
        self.headers
            .iter()
            .find(|(k, _)| k.to_lowercase() == name_lower)
            .map(|(_, v)| v.as_str())
    }
}

// ---------------------------------------------------------------------------
// CaptureResponder - captures requests and returns success
// ---------------------------------------------------------------------------

/// A wiremock responder that captures incoming requests.
#[derive(Clone)]
pub struct CaptureResponder {
    requests: Arc<Mutex<Vec<CapturedRequest>>>,
    response_code: u16,
}

impl CaptureResponder {
    /// Create a new capture responder that returns 200 OK.
    pub fn new() -> Self {
        Self {
            requests: Arc::new(Mutex::new(Vec::new())),
            response_code: 200,
        }
    }

    /// Create a capture responder that returns a custom status code.
    pub fn with_status(status: u16) -> Self {
        Self {
            requests: Arc::new(Mutex::new(Vec::new())),
            response_code: status,
        }
    }

    /// Get all captured requests.
    pub fn requests(&self) -> Vec<CapturedRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Get the number of captured requests.
    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

impl Default for CaptureResponder {
    fn default() -> Self {
        Self::new()
    }
}

impl Respond for CaptureResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let captured = CapturedRequest {
            body: request.body.clone(),
            headers: request
                .headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or("").to_string()))
                .collect(),
            timestamp: Utc::now(),
        };
        self.requests.lock().unwrap().push(captured);
        ResponseTemplate::new(self.response_code)
    }
}

// ---------------------------------------------------------------------------
// CountingResponder - counts requests
// ---------------------------------------------------------------------------

/// A wiremock responder that counts incoming requests.
#[derive(Clone)]
pub struct CountingResponder {
    count: Arc<AtomicU32>,
    response_code: u16,
}

impl CountingResponder {
    /// Create a new counting responder that returns 200 OK.
    pub fn new() -> Self {
        Self {
            count: Arc::new(AtomicU32::new(0)),
            response_code: 200,
        }
    }

    /// Create a counting responder that returns a custom status code.
    pub fn with_status(status: u16) -> Self {
        Self {
            count: Arc::new(AtomicU32::new(0)),
            response_code: status,
        }
    }

    /// Get the current request count.
    pub fn count(&self) -> u32 {
        self.count.load(Ordering::SeqCst)
    }
}

impl Default for CountingResponder {
    fn default() -> Self {
        Self::new()
    }
}

impl Respond for CountingResponder {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        self.count.fetch_add(1, Ordering::SeqCst);
        ResponseTemplate::new(self.response_code)
    }
}

// ---------------------------------------------------------------------------
// FailingResponder - fails N times then succeeds, capturing everything
// ---------------------------------------------------------------------------

/// A wiremock responder that fails a specified number of times before
/// succeeding, capturing every request it sees.
#[derive(Clone)]
pub struct FailingResponder {
    requests: Arc<Mutex<Vec<CapturedRequest>>>,
    failures_before_success: u32,
    failure_code: u16,
    success_code: u16,
}

impl FailingResponder {
    /// Create a responder that fails `n` times with 503, then returns 200.
    pub fn fail_times(n: u32) -> Self {
        Self {
            requests: Arc::new(Mutex::new(Vec::new())),
            failures_before_success: n,
            failure_code: 503,
            success_code: 200,
        }
    }

    /// Create a responder that fails with a custom status code.
    pub fn fail_with_status(n: u32, failure_code: u16) -> Self {
        Self {
            requests: Arc::new(Mutex::new(Vec::new())),
            failures_before_success: n,
            failure_code,
            success_code: 200,
        }
    }

    /// Get all captured requests.
    pub fn requests(&self) -> Vec<CapturedRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Get the current attempt count.
    pub fn attempt_count(&self) -> u32 {
        self.requests.lock().unwrap().len() as u32
    }
}

impl Respond for FailingResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let mut guard = self.requests.lock().unwrap();
        let n = guard.len() as u32;
        guard.push(CapturedRequest {
            body: request.body.clone(),
            headers: request
                .headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or("").to_string()))
                .collect(),
            timestamp: Utc::now(),
        });

        if n < self.failures_before_success {
            ResponseTemplate::new(self.failure_code)
        } else {
            ResponseTemplate::new(self.success_code)
        }
    }
}

// ---------------------------------------------------------------------------
// DelayedResponder - adds response delay
// ---------------------------------------------------------------------------

/// A wiremock responder that adds a delay before responding.
#[derive(Clone)]
pub struct DelayedResponder {
    delay_ms: u64,
    response_code: u16,
}

impl DelayedResponder {
    /// Create a responder that delays for `ms` milliseconds.
    pub fn new(delay_ms: u64) -> Self {
        Self {
            delay_ms,
            response_code: 200,
        }
    }
}

impl Respond for DelayedResponder {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        ResponseTemplate::new(self.response_code)
            .set_delay(std::time::Duration::from_millis(self.delay_ms))
    }
}

// ---------------------------------------------------------------------------
// Signature verification helpers
// ---------------------------------------------------------------------------

/// Verify a captured request's signature header against the body bytes.
///
/// The header carries the bare lowercase-hex HMAC-SHA256 of the exact body.
pub fn verify_captured_signature(request: &CapturedRequest, secret: &str) -> bool {
    let Some(signature) = request.header("x-webhook-signature") else {
        return false;
    };
    smsgate_webhooks::crypto::verify_signature(secret, &request.body, signature)
}

// ---------------------------------------------------------------------------
// Database-backed helpers (feature-gated end-to-end tests)
// ---------------------------------------------------------------------------

#[cfg(feature = "integration")]
pub mod db {
    use super::TEST_ENCRYPTION_KEY;
    use smsgate_webhooks::config::EngineConfig;
    use smsgate_webhooks::services::subscription_service::SubscriptionService;
    use sqlx::PgPool;
    use std::time::Duration;

    /// Connect to the test database and apply migrations.
    pub async fn test_pool() -> PgPool {
        let url = std::env::var("DATABASE_URL")
            .expect("DATABASE_URL must be set for integration tests");
        let pool = smsgate_db::DbPool::connect(&url)
            .await
            .expect("connect to test database");
        smsgate_db::run_migrations(&pool)
            .await
            .expect("apply migrations");
        pool.inner().clone()
    }

    /// Engine config tuned for fast tests: short sweep tick, short request
    /// timeout, private hosts allowed for the local mock receivers.
    pub fn fast_config() -> EngineConfig {
        EngineConfig {
            sweep_interval: Duration::from_millis(200),
            request_timeout: Duration::from_millis(1_500),
            stuck_after: Duration::from_secs(30),
            allow_private_hosts: true,
            ..EngineConfig::default()
        }
    }

    /// Subscription service wired like the engine under test.
    pub fn subscription_service(pool: &PgPool) -> SubscriptionService {
        SubscriptionService::new(pool.clone(), TEST_ENCRYPTION_KEY.to_vec())
            .with_allow_private_hosts(true)
    }
}
