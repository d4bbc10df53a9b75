//! Common types used across the server
//!
//! Wire shapes shared by the middleware and the sidecar transport: the
//! sidecar's request and response bodies and the JSON body of a 429.

use chrono::Local;
use serde::{Deserialize, Serialize};
use turnstile::{RateLimitStatus, Rejection, RequestContext};

/// Sidecar admission request
///
/// Everything but `path` is optional. A missing `peer_addr` is filled in
/// with the TCP peer of the caller.
///
/// # Example
///
/// ```json
/// {
///   "path": "/api/auth/login",
///   "forwarded_for": "203.0.113.5, 10.0.0.1",
///   "peer_addr": "10.0.0.1"
/// }
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdmitRequest {
    pub path: String,
    /// Authenticated principal name, if any
    #[serde(default)]
    pub principal: Option<String>,
    /// Raw `X-Forwarded-For` header value
    #[serde(default)]
    pub forwarded_for: Option<String>,
    /// Raw `X-Real-IP` header value
    #[serde(default)]
    pub real_ip: Option<String>,
    #[serde(default)]
    pub peer_addr: Option<String>,
}

impl AdmitRequest {
    /// Borrow the request as a classification context
    ///
    /// `fallback_peer` is used when the body carries no `peer_addr`.
    pub fn context<'a>(&'a self, fallback_peer: Option<&'a str>) -> RequestContext<'a> {
        RequestContext {
            path: &self.path,
            principal: self.principal.as_deref(),
            forwarded_for: self.forwarded_for.as_deref(),
            real_ip: self.real_ip.as_deref(),
            peer_addr: self.peer_addr.as_deref().or(fallback_peer),
        }
    }
}

/// Sidecar response for a request that may proceed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "lowercase")]
pub enum AdmitResponse {
    Allowed {
        class: String,
        key: String,
        limit: u64,
        remaining: u64,
        reset: u64,
    },
    Bypass,
}

impl From<&RateLimitStatus> for AdmitResponse {
    fn from(status: &RateLimitStatus) -> Self {
        AdmitResponse::Allowed {
            class: status.class.to_string(),
            key: status.key.to_string(),
            limit: status.limit,
            remaining: status.remaining,
            reset: status.reset_seconds,
        }
    }
}

/// JSON body of a 429 response
///
/// ```json
/// {
///   "timestamp": "2024-05-01T12:00:00.123",
///   "status": 429,
///   "error": "Too many authentication attempts. Please try again in 12 seconds.",
///   "retryAfter": 12
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectionBody {
    /// Local time of the rejection, ISO-8601 without offset
    pub timestamp: String,
    pub status: u16,
    pub error: String,
    #[serde(rename = "retryAfter")]
    pub retry_after: u64,
}

impl From<&Rejection> for RejectionBody {
    fn from(rejection: &Rejection) -> Self {
        Self {
            timestamp: Local::now().format("%Y-%m-%dT%H:%M:%S%.3f").to_string(),
            status: 429,
            error: rejection.message(),
            retry_after: rejection.retry_after_seconds,
        }
    }
}
