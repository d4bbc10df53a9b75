//! Transport layer for the admission sidecar
//!
//! Transports expose the shared [`AdmissionState`] to callers that cannot
//! embed the middleware, such as a gateway asking for a decision before it
//! proxies a request.
//!
//! # Available Transports
//!
//! - [`http`]: REST API with JSON, plus health and Prometheus endpoints

pub mod http;


use crate::middleware::AdmissionState;
use anyhow::Result;
use async_trait::async_trait;

/// Common interface for transport implementations
#[async_trait]
pub trait Transport {
    /// Start the transport server
    ///
    /// Binds the configured address and serves admission requests against
    /// `state` until an error occurs or the server shuts down.
    async fn start(self, state: AdmissionState) -> Result<()>;
}
