//! Core components of the turnstile admission library
//!
//! This module contains the fundamental building blocks:
//! - [`policy`]: Traffic classes and their quota policies
//! - [`bucket`]: The token bucket refill and consume arithmetic
//! - [`store`]: Bounded concurrent storage for buckets
//! - [`classify`]: Request classification and bucket key derivation
//! - [`admission`]: The controller tying them together

pub mod admission;
pub mod bucket;
pub mod classify;
pub mod policy;
pub mod store;

pub use admission::{AdmissionController, Decision, RateLimitStatus, Rejection};
pub use bucket::{BucketHandle, ConsumptionResult, TokenBucket};
pub use classify::{
    BucketKey, Classification, Classifier, RequestContext, resolve_client_address,
};
pub use policy::{QuotaPolicy, QuotaTable, TrafficClass};
pub use store::{BucketStore, BucketStoreBuilder, StoreStats};

use std::error::Error;
use std::fmt;

/// Errors raised while building quota policies
///
/// # Example
///
/// ```
/// use turnstile::{PolicyError, QuotaPolicy};
/// use std::time::Duration;
///
/// match QuotaPolicy::new(0, Duration::from_secs(60)) {
///     Err(PolicyError::ZeroCapacity) => {}
///     other => panic!("unexpected {other:?}"),
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyError {
    /// A bucket must hold at least one token
    ZeroCapacity,
    /// Tokens must refill over a non-zero period
    ZeroRefillPeriod,
    /// Capacity times the refill period in nanoseconds does not fit in 128 bits
    QuotaTooLarge,
}

impl fmt::Display for PolicyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyError::ZeroCapacity => write!(f, "quota capacity must be greater than zero"),
            PolicyError::ZeroRefillPeriod => {
                write!(f, "quota refill period must be greater than zero")
            }
            PolicyError::QuotaTooLarge => write!(
                f,
                "quota capacity and refill period are too large to track exactly"
            ),
        }
    }
}

impl Error for PolicyError {}
