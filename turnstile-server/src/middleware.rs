//! Axum admission middleware
//!
//! [`admission_middleware`] runs every request through the shared
//! [`AdmissionController`] before the inner service sees it:
//!
//! - bypassed paths pass through untouched
//! - admitted requests reach the handler and the response gains
//!   `X-RateLimit-Limit`, `X-RateLimit-Remaining` and `X-RateLimit-Reset`
//! - rejected requests are answered with 429 and a JSON body, and the handler
//!   never runs
//!
//! # Example
//!
//! ```no_run
//! use axum::{Router, middleware, routing::get};
//! use std::sync::Arc;
//! use turnstile::AdmissionController;
//! use turnstile_server::metrics::Metrics;
//! use turnstile_server::middleware::{AdmissionState, admission_middleware};
//!
//! let state = AdmissionState::new(
//!     Arc::new(AdmissionController::default()),
//!     Arc::new(Metrics::new()),
//! );
//!
//! let app: Router = Router::new()
//!     .route("/api/tasks", get(|| async { "tasks" }))
//!     .layer(middleware::from_fn_with_state(state, admission_middleware));
//! ```
//!
//! The caller's identity comes from a [`Principal`] request extension, which
//! the host's authentication layer inserts before this middleware runs.

use crate::metrics::Metrics;
use crate::types::RejectionBody;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{Extensions, HeaderMap, HeaderValue, StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Json, Response};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use turnstile::{AdmissionController, Decision, RateLimitStatus, Rejection, RequestContext};

pub const X_RATELIMIT_LIMIT: &str = "x-ratelimit-limit";
pub const X_RATELIMIT_REMAINING: &str = "x-ratelimit-remaining";
pub const X_RATELIMIT_RESET: &str = "x-ratelimit-reset";
pub const X_FORWARDED_FOR: &str = "x-forwarded-for";
pub const X_REAL_IP: &str = "x-real-ip";

/// Name of the authenticated caller, set by the authentication layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal(pub String);

impl Principal {
    pub fn new(name: impl Into<String>) -> Self {
        Principal(name.into())
    }
}

/// Shared state for the middleware and the sidecar transport
#[derive(Clone)]
pub struct AdmissionState {
    controller: Arc<AdmissionController>,
    metrics: Arc<Metrics>,
}

impl AdmissionState {
    pub fn new(controller: Arc<AdmissionController>, metrics: Arc<Metrics>) -> Self {
        Self {
            controller,
            metrics,
        }
    }

    pub fn controller(&self) -> &Arc<AdmissionController> {
        &self.controller
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Decide one request and record the outcome
    pub fn admit(&self, ctx: &RequestContext<'_>) -> Decision {
        let start = Instant::now();
        let decision = self.controller.admit(ctx, start);
        let latency_us = start.elapsed().as_micros() as u64;
        self.metrics.record_decision(&decision, latency_us);

        if let Decision::Rejected(rejection) = &decision {
            tracing::warn!(
                class = %rejection.class,
                key = %rejection.key,
                retry_after = rejection.retry_after_seconds,
                "rate limit exceeded"
            );
        }

        decision
    }
}

/// Admission layer for `axum::middleware::from_fn_with_state`
pub async fn admission_middleware(
    State(state): State<AdmissionState>,
    request: Request,
    next: Next,
) -> Response {
    let decision = {
        let peer = peer_address(request.extensions());
        let headers = request.headers();
        let ctx = RequestContext {
            path: request.uri().path(),
            principal: request
                .extensions()
                .get::<Principal>()
                .map(|principal| principal.0.as_str()),
            forwarded_for: header_str(headers, X_FORWARDED_FOR),
            real_ip: header_str(headers, X_REAL_IP),
            peer_addr: peer.as_deref(),
        };
        state.admit(&ctx)
    };

    match decision {
        Decision::Bypass => next.run(request).await,
        Decision::Allowed(status) => {
            let mut response = next.run(request).await;
            apply_rate_limit_headers(response.headers_mut(), &status);
            response
        }
        Decision::Rejected(rejection) => rejection_response(&rejection),
    }
}

/// Annotate an admitted response
pub fn apply_rate_limit_headers(headers: &mut HeaderMap, status: &RateLimitStatus) {
    headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(status.limit));
    headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(status.remaining));
    headers.insert(X_RATELIMIT_RESET, HeaderValue::from(status.reset_seconds));
}

/// 429 response for a rejected request
pub fn rejection_response(rejection: &Rejection) -> Response {
    let mut response = (
        StatusCode::TOO_MANY_REQUESTS,
        Json(RejectionBody::from(rejection)),
    )
        .into_response();

    let headers = response.headers_mut();
    headers.insert(
        header::RETRY_AFTER,
        HeaderValue::from(rejection.retry_after_seconds),
    );
    headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(rejection.limit));
    headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(0u64));
    headers.insert(
        X_RATELIMIT_RESET,
        HeaderValue::from(rejection.retry_after_seconds),
    );

    response
}

/// IP of the TCP peer, when the server was started with connect info
pub(crate) fn peer_address(extensions: &Extensions) -> Option<String> {
    extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}
