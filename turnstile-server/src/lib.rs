//! # Turnstile Server
//!
//! HTTP integration for [`turnstile`] admission control.
//!
//! ## Purpose
//!
//! The crate offers two ways to put per-class quotas in front of a service:
//!
//! - **Embedded**: [`middleware::admission_middleware`] wraps an axum router,
//!   so over-quota requests never reach a handler
//! - **Sidecar**: the `turnstile` binary answers `POST /admit` for gateways
//!   that proxy to services written in anything
//!
//! Both share one [`turnstile::AdmissionController`] and one metrics registry
//! per process.
//!
//! ## Quick Start
//!
//! ```bash
//! # Show all available options
//! turnstile --help
//!
//! # Sidecar on port 8080 with the reference quotas
//! turnstile --host 0.0.0.0 --port 8080
//!
//! # Tighter login budget, smaller store
//! turnstile --auth-capacity 3 --store-max-entries 20000
//! ```
//!
//! ## Configuration
//!
//! Configure via CLI arguments or environment variables (CLI takes precedence):
//!
//! ```bash
//! export TURNSTILE_PORT=9090
//! export TURNSTILE_STORE_IDLE_TIMEOUT=300
//! turnstile
//!
//! # List all available environment variables
//! turnstile --list-env-vars
//! ```
//!
//! ## Responses
//!
//! Admitted requests carry `X-RateLimit-Limit`, `X-RateLimit-Remaining` and
//! `X-RateLimit-Reset`. Rejected requests get a 429 with `Retry-After` and
//! a JSON body:
//!
//! ```json
//! {
//!   "timestamp": "2024-05-01T12:00:00.123",
//!   "status": 429,
//!   "error": "Too many authentication attempts. Please try again in 12 seconds.",
//!   "retryAfter": 12
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌─────────────┐
//! │ Middleware  │   │   Sidecar   │
//! │  (embedded) │   │ POST /admit │
//! └──────┬──────┘   └──────┬──────┘
//!        └────────┬────────┘
//!           ┌─────▼─────┐     ┌─────────┐
//!           │ Admission │◄────┤ Janitor │
//!           │Controller │     │ (sweep) │
//!           └─────┬─────┘     └─────────┘
//!           ┌─────▼─────┐
//!           │  Sharded  │
//!           │BucketStore│
//!           └───────────┘
//! ```
//!
//! Requests never queue behind one another: the store locks one shard for
//! the lookup and one bucket for the consume.

pub mod config;
pub mod janitor;
pub mod metrics;
pub mod middleware;
pub mod transport;
pub mod types;
