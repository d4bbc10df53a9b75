//! Token bucket with greedy (continuous) refill
//!
//! Tokens accrue continuously at `capacity / refill_period`, capped at
//! `capacity`. Internally the bucket counts in fixed-point units where one
//! token equals `refill_period` nanoseconds' worth of units and every elapsed
//! nanosecond adds `capacity` units. The arithmetic is exact, so slow
//! policies never lose fractional accrual to rounding.

use super::QuotaPolicy;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;

const NANOS_PER_SECOND: u64 = 1_000_000_000;

/// Outcome of a consume attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsumptionResult {
    /// Whether the requested tokens were taken
    pub consumed: bool,
    /// Whole tokens left after the attempt
    pub remaining_tokens: u64,
    /// Minimum wait before the attempt could succeed (0 when consumed)
    pub nanos_until_next_token: u64,
}

impl ConsumptionResult {
    /// `nanos_until_next_token` rounded up to whole seconds
    pub fn seconds_until_next_token(&self) -> u64 {
        self.nanos_until_next_token.div_ceil(NANOS_PER_SECOND)
    }
}

/// A single token bucket
///
/// Not synchronized on its own; the store hands out [`BucketHandle`]s which
/// serialize access per bucket.
///
/// # Example
///
/// ```
/// use turnstile::{QuotaPolicy, TokenBucket};
/// use std::time::{Duration, Instant};
///
/// let now = Instant::now();
/// let mut bucket = TokenBucket::new(&QuotaPolicy::per_minute(2), now);
///
/// assert!(bucket.try_consume(1, now).consumed);
/// assert!(bucket.try_consume(1, now).consumed);
///
/// let denied = bucket.try_consume(1, now);
/// assert!(!denied.consumed);
/// assert_eq!(denied.seconds_until_next_token(), 30);
///
/// // One token interval later a single token is back
/// assert!(bucket.try_consume(1, now + Duration::from_secs(30)).consumed);
/// ```
#[derive(Debug, Clone)]
pub struct TokenBucket {
    capacity: u64,
    // Units per token
    period_nanos: u128,
    available_units: u128,
    last_refill: Instant,
}

impl TokenBucket {
    /// Create a full bucket for `policy`
    pub fn new(policy: &QuotaPolicy, now: Instant) -> Self {
        let capacity = policy.capacity();
        let period_nanos = policy.refill_period().as_nanos().max(1);
        TokenBucket {
            capacity,
            period_nanos,
            available_units: capacity as u128 * period_nanos,
            last_refill: now,
        }
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Tokens regained per elapsed nanosecond
    pub fn refill_rate_per_nanosecond(&self) -> f64 {
        self.capacity as f64 / self.period_nanos as f64
    }

    pub fn last_refill(&self) -> Instant {
        self.last_refill
    }

    /// Fractional token count after refilling up to `now`
    pub fn available_tokens(&mut self, now: Instant) -> f64 {
        self.refill(now);
        self.available_units as f64 / self.period_nanos as f64
    }

    fn max_units(&self) -> u128 {
        self.capacity as u128 * self.period_nanos
    }

    fn refill(&mut self, now: Instant) {
        // An instant older than the last refill adds nothing and never rewinds
        if now <= self.last_refill {
            return;
        }
        let elapsed = now.duration_since(self.last_refill).as_nanos();
        let accrued = elapsed.saturating_mul(self.capacity as u128);
        self.available_units = self
            .available_units
            .saturating_add(accrued)
            .min(self.max_units());
        self.last_refill = now;
    }

    /// Refill up to `now`, then take `quantity` tokens if they are available
    pub fn try_consume(&mut self, quantity: u64, now: Instant) -> ConsumptionResult {
        self.refill(now);

        let needed = (quantity as u128).saturating_mul(self.period_nanos);
        if self.available_units >= needed {
            self.available_units -= needed;
            return ConsumptionResult {
                consumed: true,
                remaining_tokens: self.whole_tokens(),
                nanos_until_next_token: 0,
            };
        }

        let deficit = needed - self.available_units;
        let wait = deficit.div_ceil(self.capacity as u128);
        ConsumptionResult {
            consumed: false,
            remaining_tokens: self.whole_tokens(),
            nanos_until_next_token: u64::try_from(wait).unwrap_or(u64::MAX),
        }
    }

    fn whole_tokens(&self) -> u64 {
        (self.available_units / self.period_nanos) as u64
    }
}

/// Shared, individually locked bucket as handed out by the store
///
/// Cloning yields another handle to the same bucket.
#[derive(Debug, Clone)]
pub struct BucketHandle {
    inner: Arc<Mutex<TokenBucket>>,
}

impl BucketHandle {
    pub fn new(bucket: TokenBucket) -> Self {
        BucketHandle {
            inner: Arc::new(Mutex::new(bucket)),
        }
    }

    /// Refill and consume as one critical section on this bucket
    pub fn try_consume(&self, quantity: u64, now: Instant) -> ConsumptionResult {
        self.inner.lock().try_consume(quantity, now)
    }

    pub fn available_tokens(&self, now: Instant) -> f64 {
        self.inner.lock().available_tokens(now)
    }

    pub fn capacity(&self) -> u64 {
        self.inner.lock().capacity()
    }

    /// True when both handles point at the same bucket instance
    pub fn same_bucket(&self, other: &BucketHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}
