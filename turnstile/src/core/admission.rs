//! Admission controller: classify, key, consume, decide
//!
//! This module provides [`AdmissionController`], which runs the per-request
//! sequence against a shared [`BucketStore`] and turns the consumption
//! outcome into a [`Decision`] carrying everything a transport needs to
//! write rate-limit headers or a 429 response.

use super::bucket::TokenBucket;
use super::classify::{BucketKey, Classification, Classifier, RequestContext};
use super::store::BucketStore;
use super::{QuotaTable, TrafficClass};
use std::sync::Arc;
use std::time::Instant;

/// Rate-limit state reported on an admitted request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitStatus {
    pub class: TrafficClass,
    pub key: BucketKey,
    /// Bucket capacity for the class (`X-RateLimit-Limit`)
    pub limit: u64,
    /// Whole tokens left after this request (`X-RateLimit-Remaining`)
    pub remaining: u64,
    /// Seconds until a token is available again (`X-RateLimit-Reset`)
    pub reset_seconds: u64,
}

/// A request turned away because its bucket is empty
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub class: TrafficClass,
    pub key: BucketKey,
    pub limit: u64,
    /// Seconds until one token is available (`Retry-After`), at least 1
    pub retry_after_seconds: u64,
}

impl Rejection {
    /// Client-facing error message for the class
    pub fn message(&self) -> String {
        match self.class {
            TrafficClass::Auth => format!(
                "Too many authentication attempts. Please try again in {} seconds.",
                self.retry_after_seconds
            ),
            TrafficClass::Api => "API rate limit exceeded. Please slow down your requests.".to_string(),
            TrafficClass::Public => {
                "Too many requests from your IP address. Please try again later.".to_string()
            }
        }
    }
}

/// Outcome of admission for one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Path is exempt; proceed without headers
    Bypass,
    /// Token consumed; proceed and annotate the response
    Allowed(RateLimitStatus),
    /// Quota exceeded; answer 429 without running the handler
    Rejected(Rejection),
}

impl Decision {
    pub fn is_rejected(&self) -> bool {
        matches!(self, Decision::Rejected(_))
    }

    pub fn class(&self) -> Option<TrafficClass> {
        match self {
            Decision::Bypass => None,
            Decision::Allowed(status) => Some(status.class),
            Decision::Rejected(rejection) => Some(rejection.class),
        }
    }
}

/// Per-class token bucket admission
///
/// Cheap to share: all state lives in the [`BucketStore`], and `admit`
/// takes `&self`.
///
/// # Example
///
/// ```
/// use turnstile::{AdmissionController, Decision, RequestContext};
/// use std::time::Instant;
///
/// let controller = AdmissionController::default();
/// let ctx = RequestContext::new("/api/auth/login").with_peer_addr("10.0.0.1");
/// let now = Instant::now();
///
/// for expected in [4, 3, 2, 1, 0] {
///     match controller.admit(&ctx, now) {
///         Decision::Allowed(status) => assert_eq!(status.remaining, expected),
///         other => panic!("unexpected {other:?}"),
///     }
/// }
///
/// let Decision::Rejected(rejection) = controller.admit(&ctx, now) else {
///     panic!("sixth attempt should be rejected");
/// };
/// assert_eq!(rejection.retry_after_seconds, 12);
/// ```
pub struct AdmissionController {
    classifier: Classifier,
    quotas: QuotaTable,
    store: Arc<BucketStore>,
}

impl AdmissionController {
    pub fn new(classifier: Classifier, quotas: QuotaTable, store: Arc<BucketStore>) -> Self {
        AdmissionController {
            classifier,
            quotas,
            store,
        }
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    pub fn quotas(&self) -> &QuotaTable {
        &self.quotas
    }

    pub fn store(&self) -> &Arc<BucketStore> {
        &self.store
    }

    /// Run admission for one request at `now`
    pub fn admit(&self, ctx: &RequestContext<'_>, now: Instant) -> Decision {
        let class = match self.classifier.classify(ctx) {
            Classification::Bypass => return Decision::Bypass,
            Classification::Limited(class) => class,
        };

        let key = self.classifier.bucket_key(class, ctx);
        let policy = self.quotas.policy(class);
        let bucket = self
            .store
            .get_or_create(key.as_str(), now, || TokenBucket::new(policy, now));
        let result = bucket.try_consume(1, now);

        if result.consumed {
            Decision::Allowed(RateLimitStatus {
                class,
                key,
                limit: policy.capacity(),
                remaining: result.remaining_tokens,
                reset_seconds: result.seconds_until_next_token(),
            })
        } else {
            Decision::Rejected(Rejection {
                class,
                key,
                limit: policy.capacity(),
                retry_after_seconds: result.seconds_until_next_token().max(1),
            })
        }
    }
}

impl Default for AdmissionController {
    fn default() -> Self {
        AdmissionController::new(
            Classifier::default(),
            QuotaTable::default(),
            Arc::new(BucketStore::new()),
        )
    }
}
