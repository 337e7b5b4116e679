//! Request/response types, enums, and wire payload structures.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use smsgate_db::models::{WebhookDelivery, WebhookSubscription};

/// Event type used by the synchronous test probe. Not part of the SMS
/// lifecycle and never routable through a subscription's event mask.
pub const PROBE_EVENT_TYPE: &str = "webhook.test";

// ---------------------------------------------------------------------------
// SmsEventType enum
// ---------------------------------------------------------------------------

/// SMS lifecycle event types a subscription can register for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum SmsEventType {
    #[serde(rename = "sms.sent")]
    Sent,
    #[serde(rename = "sms.delivered")]
    Delivered,
    #[serde(rename = "sms.failed")]
    Failed,
    #[serde(rename = "sms.bounced")]
    Bounced,
    #[serde(rename = "sms.read")]
    Read,
}

impl SmsEventType {
    /// Returns all supported event types.
    #[must_use]
    pub fn all() -> Vec<Self> {
        vec![
            Self::Sent,
            Self::Delivered,
            Self::Failed,
            Self::Bounced,
            Self::Read,
        ]
    }

    /// Returns the string representation used on the wire.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sent => "sms.sent",
            Self::Delivered => "sms.delivered",
            Self::Failed => "sms.failed",
            Self::Bounced => "sms.bounced",
            Self::Read => "sms.read",
        }
    }

    /// Returns a human-readable description.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::Sent => "The provider accepted the message for delivery",
            Self::Delivered => "The handset confirmed receipt",
            Self::Failed => "The provider reported a delivery failure",
            Self::Bounced => "The destination number rejected the message",
            Self::Read => "The recipient opened the message",
        }
    }

    /// Parse a string into an `SmsEventType`. Returns None for unknown types.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "sms.sent" => Some(Self::Sent),
            "sms.delivered" => Some(Self::Delivered),
            "sms.failed" => Some(Self::Failed),
            "sms.bounced" => Some(Self::Bounced),
            "sms.read" => Some(Self::Read),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// DeliveryStatus enum
// ---------------------------------------------------------------------------

/// Lifecycle status of a delivery row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    InFlight,
    Success,
    Failed,
}

impl DeliveryStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InFlight => "in_flight",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "in_flight" => Some(Self::InFlight),
            "success" => Some(Self::Success),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// SMS lifecycle event (produced by the provider adapters)
// ---------------------------------------------------------------------------

/// An SMS lifecycle event as handed to the router by a provider adapter.
///
/// [`SmsEvent::wire_payload`] serializes exactly these fields; that JSON
/// object is the callback body receivers see, byte for byte.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SmsEvent {
    pub tenant_id: Uuid,
    pub source_event_id: Option<Uuid>,
    pub event_type: SmsEventType,
    pub recipient: String,
    pub provider: String,
    pub provider_message_id: Option<String>,
    pub cost: Option<f64>,
    pub currency: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub error_reason: Option<String>,
    pub error_code: Option<String>,
}

impl SmsEvent {
    /// The JSON object delivered to receivers.
    #[must_use]
    pub fn wire_payload(&self) -> serde_json::Value {
        serde_json::to_value(self).expect("SmsEvent serializes to JSON")
    }
}

// ---------------------------------------------------------------------------
// Request types
// ---------------------------------------------------------------------------

/// Request body for creating a webhook subscription.
///
/// The signing secret is generated server-side and returned once in the
/// create response; it is never accepted as input.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateWebhookRequest {
    /// Target URL for callback delivery.
    #[validate(length(
        min = 1,
        max = 2000,
        message = "URL must be between 1 and 2000 characters"
    ))]
    pub url: String,

    /// Display name for this subscription.
    #[validate(length(
        min = 1,
        max = 255,
        message = "Name must be between 1 and 255 characters"
    ))]
    pub name: String,

    /// Optional description.
    #[validate(length(max = 1000, message = "Description cannot exceed 1000 characters"))]
    pub description: Option<String>,

    /// Event types this subscription receives.
    #[validate(length(min = 1, message = "Must subscribe to at least one event type"))]
    pub events: Vec<String>,

    /// Attempt budget per delivery (1-10, default 5).
    pub max_attempts: Option<i32>,

    /// First retry spacing in milliseconds (1s-1h, default 60s).
    pub backoff_base_ms: Option<i64>,

    /// Reserved: hint for an out-of-band failure notifier.
    pub notify_on_failure: Option<bool>,
}

/// Request body for updating a webhook subscription.
///
/// The secret and the stats are not patchable here; the secret changes only
/// through the rotate endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct UpdateWebhookRequest {
    #[validate(length(
        min = 1,
        max = 2000,
        message = "URL must be between 1 and 2000 characters"
    ))]
    pub url: Option<String>,

    #[validate(length(
        min = 1,
        max = 255,
        message = "Name must be between 1 and 255 characters"
    ))]
    pub name: Option<String>,

    #[validate(length(max = 1000, message = "Description cannot exceed 1000 characters"))]
    pub description: Option<String>,

    #[validate(length(min = 1, message = "Must subscribe to at least one event type"))]
    pub events: Option<Vec<String>>,

    pub active: Option<bool>,
    pub retry_enabled: Option<bool>,
    pub max_attempts: Option<i32>,
    pub backoff_base_ms: Option<i64>,
    pub notify_on_failure: Option<bool>,
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

/// Dispatcher-maintained delivery stats for one subscription.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WebhookStats {
    pub total_calls: i64,
    pub success_calls: i64,
    pub failure_calls: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_call_at: Option<DateTime<Utc>>,
    /// HTTP status of the last attempt, or -1 for a transport error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_status_code: Option<i32>,
    pub avg_response_ms: f64,
}

/// A webhook subscription as returned by the API.
///
/// `secret` is present only on create, get, and rotate responses.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WebhookInfo {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub url: String,
    pub events: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
    pub active: bool,
    pub retry_enabled: bool,
    pub max_attempts: i32,
    pub backoff_base_ms: i64,
    pub max_payload_bytes: i64,
    pub notify_on_failure: bool,
    pub stats: WebhookStats,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WebhookInfo {
    /// Build a response view from a row, optionally attaching the plaintext
    /// secret.
    #[must_use]
    pub fn from_row(sub: WebhookSubscription, secret: Option<String>) -> Self {
        Self {
            id: sub.id,
            tenant_id: sub.tenant_id,
            name: sub.name,
            description: sub.description,
            url: sub.url,
            events: sub.event_mask,
            secret,
            active: sub.active,
            retry_enabled: sub.retry_enabled,
            max_attempts: sub.max_attempts,
            backoff_base_ms: sub.backoff_base_ms,
            max_payload_bytes: sub.max_payload_bytes,
            notify_on_failure: sub.notify_on_failure,
            stats: WebhookStats {
                total_calls: sub.total_calls,
                success_calls: sub.success_calls,
                failure_calls: sub.failure_calls,
                last_call_at: sub.last_call_at,
                last_status_code: sub.last_status_code,
                avg_response_ms: sub.avg_response_ms,
            },
            created_at: sub.created_at,
            updated_at: sub.updated_at,
        }
    }
}

/// Single-subscription response envelope.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WebhookResponse {
    pub success: bool,
    pub webhook: WebhookInfo,
}

/// Paginated subscription list.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WebhookListResponse {
    pub success: bool,
    pub items: Vec<WebhookInfo>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

/// Empty-body acknowledgement.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AckResponse {
    pub success: bool,
}

/// Result of a synchronous test probe.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProbeResponse {
    pub success: bool,
    /// Whether the receiver answered with a success status.
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_code: Option<i32>,
    pub latency_ms: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A delivery row as returned by the history endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DeliveryInfo {
    pub id: Uuid,
    pub subscription_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_event_id: Option<Uuid>,
    pub event_type: String,
    pub status: String,
    pub attempts_made: i32,
    pub max_attempts: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_retry_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_http_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_attempt_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_duration_ms: Option<i32>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sent_at: Option<DateTime<Utc>>,
}

impl From<WebhookDelivery> for DeliveryInfo {
    fn from(d: WebhookDelivery) -> Self {
        Self {
            id: d.id,
            subscription_id: d.subscription_id,
            source_event_id: d.source_event_id,
            event_type: d.event_type,
            status: d.status,
            attempts_made: d.attempts_made,
            max_attempts: d.max_attempts,
            next_retry_at: d.next_retry_at,
            last_error: d.last_error,
            last_http_code: d.last_http_code,
            last_attempt_at: d.last_attempt_at,
            request_duration_ms: d.request_duration_ms,
            created_at: d.created_at,
            sent_at: d.sent_at,
        }
    }
}

/// Paginated delivery history.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DeliveryListResponse {
    pub success: bool,
    pub items: Vec<DeliveryInfo>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

/// Per-status delivery counts.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DeliveryCounts {
    pub pending: i64,
    pub in_flight: i64,
    pub success: i64,
    pub failed: i64,
}

/// Delivery count for one event type.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct EventTypeCount {
    pub event_type: String,
    pub count: i64,
}

/// Aggregated statistics for one subscription.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StatsResponse {
    pub success: bool,
    pub stats: WebhookStats,
    pub deliveries: DeliveryCounts,
    pub by_event_type: Vec<EventTypeCount>,
    pub recent: Vec<DeliveryInfo>,
}

/// Information about a supported event type.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct EventTypeInfo {
    pub event_type: String,
    pub description: String,
}

/// List of all available event types.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct EventTypeListResponse {
    pub success: bool,
    pub event_types: Vec<EventTypeInfo>,
}

// ---------------------------------------------------------------------------
// Query parameters
// ---------------------------------------------------------------------------

/// Query parameters for listing subscriptions.
#[derive(Debug, Clone, Deserialize, IntoParams)]
pub struct ListWebhooksQuery {
    /// Maximum results to return (default: 20, max: 200).
    #[serde(default = "default_limit")]
    pub limit: i64,

    /// Number of results to skip (default: 0).
    #[serde(default)]
    pub offset: i64,

    /// Filter by active/inactive status.
    pub active: Option<bool>,
}

/// Query parameters for listing deliveries.
#[derive(Debug, Clone, Deserialize, IntoParams)]
pub struct ListDeliveriesQuery {
    /// Maximum results to return (default: 20, max: 200).
    #[serde(default = "default_limit")]
    pub limit: i64,

    /// Number of results to skip (default: 0).
    #[serde(default)]
    pub offset: i64,

    /// Filter by delivery status.
    pub status: Option<String>,

    /// Filter by event type.
    pub event_type: Option<String>,

    /// Only deliveries created at or after this instant.
    pub start: Option<DateTime<Utc>>,

    /// Only deliveries created at or before this instant.
    pub end: Option<DateTime<Utc>>,
}

fn default_limit() -> i64 {
    20
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
