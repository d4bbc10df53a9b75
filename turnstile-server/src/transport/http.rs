//! HTTP/JSON sidecar transport
//!
//! # API Endpoints
//!
//! ## POST /admit
//!
//! Ask for a decision on behalf of a proxied request.
//!
//! ### Request Body
//!
//! ```json
//! {
//!   "path": "/api/tasks",
//!   "principal": "alice",
//!   "forwarded_for": "203.0.113.5",
//!   "real_ip": null,
//!   "peer_addr": "10.0.0.1"
//! }
//! ```
//!
//! Only `path` is required. Without `peer_addr` the TCP peer of the caller
//! stands in for the client.
//!
//! ### Response
//!
//! Admitted, with `X-RateLimit-*` headers:
//!
//! ```json
//! {"decision": "allowed", "class": "API", "key": "API:alice", "limit": 100, "remaining": 99, "reset": 0}
//! ```
//!
//! Exempt path: `{"decision": "bypass"}`. Rejected: 429 with `Retry-After`
//! and the same body the middleware sends.
//!
//! ## GET /actuator/health
//!
//! Returns "OK" with 200 status.
//!
//! ## GET /actuator/prometheus
//!
//! Metrics in Prometheus text format.

use super::Transport;
use crate::middleware::{
    AdmissionState, apply_rate_limit_headers, peer_address, rejection_response,
};
use crate::types::{AdmitRequest, AdmitResponse};
use anyhow::{Context, Result};
use async_trait::async_trait;
use axum::extract::{FromRequest, Request, State};
use axum::http::header;
use axum::response::{IntoResponse, Json, Response};
use axum::Router;
use axum::routing::{get, post};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use turnstile::Decision;

/// HTTP transport implementation
pub struct HttpTransport {
    addr: SocketAddr,
}

impl HttpTransport {
    pub fn new(host: &str, port: u16) -> Result<Self> {
        let addr = format!("{host}:{port}")
            .parse()
            .with_context(|| format!("invalid listen address {host}:{port}"))?;
        Ok(Self { addr })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn start(self, state: AdmissionState) -> Result<()> {
        let listener = TcpListener::bind(self.addr)
            .await
            .with_context(|| format!("failed to bind {}", self.addr))?;

        tracing::info!("HTTP server listening on {}", self.addr);

        serve(listener, state).await
    }
}

/// Routes of the sidecar
pub fn router(state: AdmissionState) -> Router {
    Router::new()
        .route("/admit", post(handle_admit))
        .route("/actuator/health", get(|| async { "OK" }))
        .route("/actuator/prometheus", get(handle_prometheus))
        .with_state(state)
}

/// Serve the sidecar on an already bound listener
pub async fn serve(listener: TcpListener, state: AdmissionState) -> Result<()> {
    axum::serve(
        listener,
        router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

async fn handle_admit(State(state): State<AdmissionState>, request: Request) -> Response {
    let peer = peer_address(request.extensions());

    let body = match Json::<AdmitRequest>::from_request(request, &()).await {
        Ok(Json(body)) => body,
        Err(rejection) => return rejection.into_response(),
    };

    match state.admit(&body.context(peer.as_deref())) {
        Decision::Bypass => Json(AdmitResponse::Bypass).into_response(),
        Decision::Allowed(status) => {
            let mut response = Json(AdmitResponse::from(&status)).into_response();
            apply_rate_limit_headers(response.headers_mut(), &status);
            response
        }
        Decision::Rejected(rejection) => rejection_response(&rejection),
    }
}

async fn handle_prometheus(State(state): State<AdmissionState>) -> Response {
    let stats = state.controller().store().stats();
    state.metrics().update_active_keys(stats.entries);
    state
        .metrics()
        .update_evictions(stats.evicted_idle, stats.evicted_capacity);

    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics().export_prometheus(),
    )
        .into_response()
}
