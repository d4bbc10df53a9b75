//! Traffic classes and their quota policies
//!
//! Every admitted request belongs to exactly one [`TrafficClass`]. The class
//! decides which [`QuotaPolicy`] applies and how the bucket identifier is
//! resolved (principal name for [`TrafficClass::Api`], client address for the
//! others).

use super::PolicyError;
use std::fmt;
use std::time::Duration;


/// Coarse category of an inbound request
///
/// Determined per request, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrafficClass {
    /// Requests to the authentication endpoints, keyed by client address
    Auth,
    /// Requests carrying an authenticated principal, keyed by principal name
    Api,
    /// Everything else, keyed by client address
    Public,
}

impl TrafficClass {
    /// All classes, in classification order after the bypass check
    pub const ALL: [TrafficClass; 3] = [TrafficClass::Auth, TrafficClass::Api, TrafficClass::Public];

    /// Upper-case label used in bucket keys, logs and metric labels
    pub fn as_str(&self) -> &'static str {
        match self {
            TrafficClass::Auth => "AUTH",
            TrafficClass::Api => "API",
            TrafficClass::Public => "PUBLIC",
        }
    }
}

impl fmt::Display for TrafficClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Token budget for one traffic class
///
/// A bucket built from this policy holds at most `capacity` tokens and
/// regains all of them over `refill_period`, continuously.
///
/// # Example
///
/// ```
/// use turnstile::QuotaPolicy;
/// use std::time::Duration;
///
/// // 100 requests per minute
/// let policy = QuotaPolicy::per_minute(100);
/// assert_eq!(policy.capacity(), 100);
/// assert_eq!(policy.token_interval(), Duration::from_millis(600));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaPolicy {
    capacity: u64,
    refill_period: Duration,
}

impl QuotaPolicy {
    /// Creates a policy, rejecting a zero capacity or a zero refill period
    ///
    /// Buckets count in units of `capacity × refill_period` nanoseconds, so
    /// that product has to fit in a `u128`.
    pub fn new(capacity: u64, refill_period: Duration) -> Result<Self, PolicyError> {
        if capacity == 0 {
            return Err(PolicyError::ZeroCapacity);
        }
        if refill_period.is_zero() {
            return Err(PolicyError::ZeroRefillPeriod);
        }
        if (capacity as u128)
            .checked_mul(refill_period.as_nanos())
            .is_none()
        {
            return Err(PolicyError::QuotaTooLarge);
        }
        Ok(QuotaPolicy {
            capacity,
            refill_period,
        })
    }

    /// `n` tokens per minute; `n` must be non-zero
    pub const fn per_minute(n: u64) -> Self {
        assert!(n > 0, "capacity must be non-zero");
        QuotaPolicy {
            capacity: n,
            refill_period: Duration::from_secs(60),
        }
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn refill_period(&self) -> Duration {
        self.refill_period
    }

    /// Time it takes to regain a single token
    pub fn token_interval(&self) -> Duration {
        let nanos = self.refill_period.as_nanos() / self.capacity as u128;
        Duration::from_nanos(nanos as u64)
    }
}

/// Quota policy per traffic class
///
/// The defaults are the reference budgets: AUTH 5/min, API 100/min,
/// PUBLIC 20/min.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaTable {
    auth: QuotaPolicy,
    api: QuotaPolicy,
    public: QuotaPolicy,
}

pub const DEFAULT_AUTH_POLICY: QuotaPolicy = QuotaPolicy::per_minute(5);
pub const DEFAULT_API_POLICY: QuotaPolicy = QuotaPolicy::per_minute(100);
pub const DEFAULT_PUBLIC_POLICY: QuotaPolicy = QuotaPolicy::per_minute(20);

impl QuotaTable {
    pub fn new(auth: QuotaPolicy, api: QuotaPolicy, public: QuotaPolicy) -> Self {
        QuotaTable { auth, api, public }
    }

    pub fn policy(&self, class: TrafficClass) -> &QuotaPolicy {
        match class {
            TrafficClass::Auth => &self.auth,
            TrafficClass::Api => &self.api,
            TrafficClass::Public => &self.public,
        }
    }

    /// Replace the policy for one class
    pub fn with_policy(mut self, class: TrafficClass, policy: QuotaPolicy) -> Self {
        match class {
            TrafficClass::Auth => self.auth = policy,
            TrafficClass::Api => self.api = policy,
            TrafficClass::Public => self.public = policy,
        }
        self
    }
}

impl Default for QuotaTable {
    fn default() -> Self {
        QuotaTable::new(DEFAULT_AUTH_POLICY, DEFAULT_API_POLICY, DEFAULT_PUBLIC_POLICY)
    }
}
