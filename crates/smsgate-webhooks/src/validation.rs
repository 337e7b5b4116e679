//! Validation for subscription input: callback URLs, destination host
//! screening, event masks, and retry-policy bounds.

use std::net::IpAddr;

use crate::error::WebhookError;
use crate::models::SmsEventType;

/// Allowed attempt budget per delivery.
pub const MAX_ATTEMPTS_MIN: i32 = 1;
pub const MAX_ATTEMPTS_MAX: i32 = 10;

/// Allowed first-retry spacing in milliseconds (1 s to 1 h).
pub const BACKOFF_BASE_MS_MIN: i64 = 1_000;
pub const BACKOFF_BASE_MS_MAX: i64 = 3_600_000;

// ---------------------------------------------------------------------------
// URL validation
// ---------------------------------------------------------------------------

/// Validate a callback URL.
///
/// Checks:
/// 1. URL is parseable and absolute
/// 2. Scheme is http or https
/// 3. Host is not a private/internal address unless `allow_private_hosts`
///    (used by tests and local development)
pub fn validate_webhook_url(url: &str, allow_private_hosts: bool) -> Result<(), WebhookError> {
    let parsed = url::Url::parse(url)
        .map_err(|e| WebhookError::Validation(format!("Invalid URL format: {e}")))?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => {
            return Err(WebhookError::Validation(format!(
                "Unsupported URL scheme: {scheme}"
            )));
        }
    }

    let host = parsed
        .host_str()
        .ok_or_else(|| WebhookError::Validation("URL must have a host".to_string()))?;

    if !allow_private_hosts {
        validate_host_not_internal(host)?;
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Destination host screening
// ---------------------------------------------------------------------------

/// Reject callback hosts inside our own network perimeter.
///
/// A tenant-supplied URL must not be usable to reach the SMS backend's
/// infrastructure, so raw IPs are screened against the non-routable and
/// internal ranges and hostnames against the conventional internal
/// suffixes.
pub fn validate_host_not_internal(host: &str) -> Result<(), WebhookError> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return match blocked_range(ip) {
            Some(range) => Err(WebhookError::Validation(format!(
                "Destination host {host} is a private/internal address ({range})"
            ))),
            None => Ok(()),
        };
    }

    let name = host.to_ascii_lowercase();
    let internal_name = name == "localhost"
        || name == "metadata.google.internal"
        || [".internal", ".local"].iter().any(|s| name.ends_with(s));
    if internal_name {
        return Err(WebhookError::Validation(format!(
            "Destination host {host} is a restricted internal hostname"
        )));
    }

    Ok(())
}

/// Name the blocked range an address falls in, or None for hosts a
/// delivery worker may legitimately reach.
fn blocked_range(ip: IpAddr) -> Option<&'static str> {
    match ip {
        IpAddr::V4(v4) => {
            let [first, second, ..] = v4.octets();
            if v4.is_loopback() {
                Some("loopback")
            } else if v4.is_private() {
                Some("rfc1918")
            } else if v4.is_link_local() {
                // Cloud metadata services answer on this range.
                Some("link-local")
            } else if first == 100 && (64..128).contains(&second) {
                Some("carrier-grade NAT")
            } else if v4.is_unspecified() || v4.is_broadcast() {
                Some("non-routable")
            } else {
                None
            }
        }
        IpAddr::V6(v6) => {
            if v6.is_loopback() || v6.is_unspecified() {
                Some("non-routable")
            } else {
                None
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Event mask validation
// ---------------------------------------------------------------------------

/// Validate that the mask is non-empty and every entry is a known
/// `SmsEventType`.
pub fn validate_event_mask(events: &[String]) -> Result<(), WebhookError> {
    if events.is_empty() {
        return Err(WebhookError::Validation(
            "Event mask must not be empty".to_string(),
        ));
    }
    for et in events {
        if SmsEventType::parse(et).is_none() {
            return Err(WebhookError::Validation(format!("Unknown event type: {et}")));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Retry policy validation
// ---------------------------------------------------------------------------

/// Validate attempt budget and backoff base against the allowed ranges.
pub fn validate_retry_policy(
    max_attempts: Option<i32>,
    backoff_base_ms: Option<i64>,
) -> Result<(), WebhookError> {
    if let Some(attempts) = max_attempts {
        if !(MAX_ATTEMPTS_MIN..=MAX_ATTEMPTS_MAX).contains(&attempts) {
            return Err(WebhookError::Validation(format!(
                "max_attempts must be between {MAX_ATTEMPTS_MIN} and {MAX_ATTEMPTS_MAX}"
            )));
        }
    }
    if let Some(backoff) = backoff_base_ms {
        if !(BACKOFF_BASE_MS_MIN..=BACKOFF_BASE_MS_MAX).contains(&backoff) {
            return Err(WebhookError::Validation(format!(
                "backoff_base_ms must be between {BACKOFF_BASE_MS_MIN} and {BACKOFF_BASE_MS_MAX}"
            )));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
