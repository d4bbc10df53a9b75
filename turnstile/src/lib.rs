//! # Turnstile
//!
//! Per-class token bucket admission control for HTTP services.
//!
//! ## Overview
//!
//! Every inbound request is classified into one of three traffic classes,
//! each with its own budget:
//!
//! | Class  | Applies to                          | Keyed by        | Budget     |
//! |--------|-------------------------------------|-----------------|------------|
//! | AUTH   | paths under `/api/auth/`            | client address  | 5 / min    |
//! | API    | authenticated callers               | principal name  | 100 / min  |
//! | PUBLIC | everything else                     | client address  | 20 / min   |
//!
//! Health, documentation, console and websocket paths bypass admission
//! entirely. Buckets refill continuously (greedy refill) rather than
//! resetting at window boundaries.
//!
//! ## Quick Start
//!
//! ```
//! use turnstile::{AdmissionController, Decision, RequestContext};
//! use std::time::Instant;
//!
//! let controller = AdmissionController::default();
//!
//! let ctx = RequestContext::new("/api/tasks")
//!     .with_forwarded_for("203.0.113.5, 10.0.0.1")
//!     .with_peer_addr("10.0.0.1");
//!
//! match controller.admit(&ctx, Instant::now()) {
//!     Decision::Bypass => println!("exempt"),
//!     Decision::Allowed(status) => {
//!         println!("{} left of {}", status.remaining, status.limit);
//!     }
//!     Decision::Rejected(rejection) => {
//!         println!("429, retry in {}s: {}", rejection.retry_after_seconds, rejection.message());
//!     }
//! }
//! ```
//!
//! ## Client Address Resolution
//!
//! AUTH and PUBLIC buckets are keyed by the left-most `X-Forwarded-For`
//! entry, else `X-Real-IP`, else the transport peer address. Blank values
//! fall through to the next source.
//!
//! ## Bucket Store
//!
//! [`BucketStore`] shards keys across independently locked maps and locks
//! each bucket on its own, so unrelated keys do not contend. Entries idle
//! for longer than the idle window (10 minutes by default) are evicted, as
//! are the least recently used entries once the store grows past its entry
//! ceiling (100,000 by default). An evicted key starts over with a full
//! bucket.
//!
//! ```
//! use turnstile::{AdmissionController, BucketStore, Classifier, QuotaTable};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let store = Arc::new(
//!     BucketStore::builder()
//!         .max_entries(50_000)
//!         .idle_timeout(Duration::from_secs(300))
//!         .build(),
//! );
//! let controller = AdmissionController::new(Classifier::default(), QuotaTable::default(), store);
//! ```
//!
//! ## Thread Safety
//!
//! [`AdmissionController`] and [`BucketStore`] are `Send + Sync` and meant to
//! be shared behind an `Arc`; no call blocks on anything but short lock
//! sections.
//!
//! ## Features
//!
//! - `ahash` (default): Use AHash for faster hashing

pub mod core;

pub use core::{
    AdmissionController, BucketHandle, BucketKey, BucketStore, BucketStoreBuilder,
    Classification, Classifier, ConsumptionResult, Decision, PolicyError, QuotaPolicy,
    QuotaTable, RateLimitStatus, Rejection, RequestContext, StoreStats, TokenBucket,
    TrafficClass, resolve_client_address,
};

pub use crate::core::classify;
pub use crate::core::store;
