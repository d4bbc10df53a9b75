//! Bounded concurrent storage for token buckets
//!
//! Keys are spread over independently locked shards so unrelated keys rarely
//! contend, and each bucket carries its own lock so consumption never holds a
//! shard lock. Entries are evicted when idle past the configured window or,
//! least recently used across the whole store first, once the total entry
//! count exceeds the ceiling.

use super::bucket::{BucketHandle, TokenBucket};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::hash::BuildHasher;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

#[cfg(feature = "ahash")]
use ahash::{AHashMap as HashMap, RandomState};
#[cfg(not(feature = "ahash"))]
use std::collections::{HashMap, hash_map::RandomState};


#[cfg(test)]
mod eviction_test;

// Configuration constants
const DEFAULT_MAX_ENTRIES: usize = 100_000;
const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 600;
const DEFAULT_CLEANUP_INTERVAL_SECS: u64 = 60;
const SHARDS_PER_CPU: usize = 4;

struct Entry {
    bucket: BucketHandle,
    last_access: Instant,
    // Position in the shard's access order
    stamp: u64,
}

struct ShardState {
    entries: HashMap<String, Entry>,
    // Access stamp to key, oldest first
    order: BTreeMap<u64, String>,
    next_sweep: Instant,
}

impl ShardState {
    fn insert(&mut self, key: &str, bucket: BucketHandle, now: Instant, stamp: u64) {
        self.entries.insert(
            key.to_owned(),
            Entry {
                bucket,
                last_access: now,
                stamp,
            },
        );
        self.order.insert(stamp, key.to_owned());
    }

    fn remove(&mut self, key: &str) -> bool {
        match self.entries.remove(key) {
            Some(entry) => {
                self.order.remove(&entry.stamp);
                true
            }
            None => false,
        }
    }

    fn remove_idle(&mut self, now: Instant, idle_timeout: Duration) -> usize {
        let ShardState { entries, order, .. } = self;
        let before = entries.len();
        entries.retain(|_, entry| {
            if is_idle(entry, now, idle_timeout) {
                order.remove(&entry.stamp);
                false
            } else {
                true
            }
        });
        before - entries.len()
    }

    fn clear(&mut self) -> usize {
        let removed = self.entries.len();
        self.entries.clear();
        self.order.clear();
        removed
    }

    /// Stamp of the least recently accessed entry other than `keep`
    fn oldest(&self, keep: &str) -> Option<u64> {
        self.order
            .iter()
            .find(|(_, key)| key.as_str() != keep)
            .map(|(stamp, _)| *stamp)
    }

    /// Remove the entry still holding `stamp`; false if it was touched or
    /// removed in the meantime
    fn remove_stamp(&mut self, stamp: u64) -> bool {
        match self.order.remove(&stamp) {
            Some(key) => {
                self.entries.remove(key.as_str());
                true
            }
            None => false,
        }
    }
}

fn is_idle(entry: &Entry, now: Instant, idle_timeout: Duration) -> bool {
    now.saturating_duration_since(entry.last_access) > idle_timeout
}

/// Snapshot of store occupancy and eviction totals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StoreStats {
    pub entries: usize,
    pub evicted_idle: u64,
    pub evicted_capacity: u64,
}

/// Concurrent map from bucket key to token bucket
///
/// # Example
///
/// ```
/// use turnstile::{BucketStore, QuotaPolicy, TokenBucket};
/// use std::time::{Duration, Instant};
///
/// let store = BucketStore::builder()
///     .max_entries(10_000)
///     .idle_timeout(Duration::from_secs(600))
///     .build();
///
/// let now = Instant::now();
/// let policy = QuotaPolicy::per_minute(20);
/// let bucket = store.get_or_create("PUBLIC:10.0.0.1", now, || TokenBucket::new(&policy, now));
/// assert!(bucket.try_consume(1, now).consumed);
///
/// let again = store.get_or_create("PUBLIC:10.0.0.1", now, || TokenBucket::new(&policy, now));
/// assert!(bucket.same_bucket(&again));
/// ```
pub struct BucketStore {
    shards: Box<[Mutex<ShardState>]>,
    hasher: RandomState,
    idle_timeout: Duration,
    cleanup_interval: Duration,
    max_entries: usize,
    entry_count: AtomicUsize,
    access_clock: AtomicU64,
    evicted_idle: AtomicU64,
    evicted_capacity: AtomicU64,
}

/// Builder for configuring a BucketStore
///
/// # Example
///
/// ```
/// use turnstile::BucketStore;
/// use std::time::Duration;
///
/// let store = BucketStore::builder()
///     .max_entries(100_000)
///     .idle_timeout(Duration::from_secs(600))
///     .cleanup_interval(Duration::from_secs(30))
///     .shards(16)
///     .build();
/// assert!(store.is_empty());
/// ```
pub struct BucketStoreBuilder {
    max_entries: usize,
    idle_timeout: Duration,
    cleanup_interval: Duration,
    shards: Option<usize>,
}

impl BucketStore {
    /// Create a store with the reference configuration
    ///
    /// 100,000 entries, 10 minute idle window, 60 second lazy sweep interval.
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> BucketStoreBuilder {
        BucketStoreBuilder::default()
    }

    fn with_config(
        max_entries: usize,
        idle_timeout: Duration,
        cleanup_interval: Duration,
        shards: usize,
    ) -> Self {
        let max_entries = max_entries.max(1);
        let shard_count = shards.clamp(1, max_entries);
        let first_sweep = Instant::now() + cleanup_interval;

        let shards = (0..shard_count)
            .map(|_| {
                Mutex::new(ShardState {
                    entries: HashMap::new(),
                    order: BTreeMap::new(),
                    next_sweep: first_sweep,
                })
            })
            .collect();

        BucketStore {
            shards,
            hasher: RandomState::new(),
            idle_timeout,
            cleanup_interval,
            max_entries,
            entry_count: AtomicUsize::new(0),
            access_clock: AtomicU64::new(0),
            evicted_idle: AtomicU64::new(0),
            evicted_capacity: AtomicU64::new(0),
        }
    }

    fn shard_index(&self, key: &str) -> usize {
        (BuildHasher::hash_one(&self.hasher, key) as usize) % self.shards.len()
    }

    fn shard(&self, key: &str) -> &Mutex<ShardState> {
        &self.shards[self.shard_index(key)]
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Return the live bucket for `key`, or insert a fresh one from `factory`
    ///
    /// Lookup and insertion happen under the key's shard lock, so concurrent
    /// callers for the same key observe exactly one bucket. The hit refreshes
    /// the entry's last-access instant. An entry found idle past the window is
    /// replaced as if it had already been swept.
    ///
    /// An insert that takes the store past `max_entries` evicts the least
    /// recently used entries of the whole store until it is back at the
    /// ceiling. The entry just inserted is never the one evicted.
    pub fn get_or_create<F>(&self, key: &str, now: Instant, factory: F) -> BucketHandle
    where
        F: FnOnce() -> TokenBucket,
    {
        let bucket = {
            let mut guard = self.shard(key).lock();
            let shard = &mut *guard;

            if now >= shard.next_sweep {
                let removed = shard.remove_idle(now, self.idle_timeout);
                self.record_idle_evictions(removed);
                shard.next_sweep = now + self.cleanup_interval;
            }

            let stamp = self.access_clock.fetch_add(1, Ordering::Relaxed);

            if let Some(entry) = shard.entries.get_mut(key) {
                if !is_idle(entry, now, self.idle_timeout) {
                    entry.last_access = entry.last_access.max(now);
                    let previous = std::mem::replace(&mut entry.stamp, stamp);
                    let bucket = entry.bucket.clone();
                    if let Some(owned) = shard.order.remove(&previous) {
                        shard.order.insert(stamp, owned);
                    }
                    return bucket;
                }
                shard.remove(key);
                self.record_idle_evictions(1);
            }

            let bucket = BucketHandle::new(factory());
            shard.insert(key, bucket.clone(), now, stamp);
            self.entry_count.fetch_add(1, Ordering::AcqRel);
            bucket
        };

        // Shard lock released: eviction may need to lock any shard
        self.enforce_ceiling(key);

        bucket
    }

    /// Evict least recently used entries while the store is over its ceiling
    fn enforce_ceiling(&self, keep: &str) {
        // Each successful reservation accounts for exactly one eviction, so
        // concurrent inserters never evict more than the overflow
        while self
            .entry_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                (count > self.max_entries).then(|| count - 1)
            })
            .is_ok()
        {
            if self.evict_oldest(keep) {
                self.evicted_capacity.fetch_add(1, Ordering::Relaxed);
            } else {
                self.entry_count.fetch_add(1, Ordering::AcqRel);
                break;
            }
        }
    }

    /// Remove the least recently accessed entry in the store other than `keep`
    fn evict_oldest(&self, keep: &str) -> bool {
        loop {
            let mut oldest: Option<(u64, usize)> = None;
            for (index, shard) in self.shards.iter().enumerate() {
                if let Some(stamp) = shard.lock().oldest(keep) {
                    if oldest.is_none_or(|(best, _)| stamp < best) {
                        oldest = Some((stamp, index));
                    }
                }
            }

            let Some((stamp, index)) = oldest else {
                return false;
            };
            if self.shards[index].lock().remove_stamp(stamp) {
                return true;
            }
            // Touched or removed since the scan; look again
        }
    }

    fn record_idle_evictions(&self, removed: usize) {
        if removed > 0 {
            self.entry_count.fetch_sub(removed, Ordering::AcqRel);
            self.evicted_idle
                .fetch_add(removed as u64, Ordering::Relaxed);
        }
    }

    /// Remove every entry idle past the window, returning how many went
    pub fn sweep(&self, now: Instant) -> usize {
        let mut removed = 0;
        for shard in self.shards.iter() {
            let mut shard = shard.lock();
            removed += shard.remove_idle(now, self.idle_timeout);
            shard.next_sweep = now + self.cleanup_interval;
        }
        self.record_idle_evictions(removed);
        removed
    }

    /// Forcefully drop the bucket for `key`
    ///
    /// The next request for the key starts from a full bucket.
    pub fn evict(&self, key: &str) -> bool {
        let removed = self.shard(key).lock().remove(key);
        if removed {
            self.entry_count.fetch_sub(1, Ordering::AcqRel);
        }
        removed
    }

    pub fn contains(&self, key: &str) -> bool {
        self.shard(key).lock().entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.shards.iter().map(|shard| shard.lock().entries.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.shards
            .iter()
            .all(|shard| shard.lock().entries.is_empty())
    }

    pub fn clear(&self) {
        for shard in self.shards.iter() {
            let removed = shard.lock().clear();
            self.entry_count.fetch_sub(removed, Ordering::AcqRel);
        }
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            entries: self.len(),
            evicted_idle: self.evicted_idle.load(Ordering::Relaxed),
            evicted_capacity: self.evicted_capacity.load(Ordering::Relaxed),
        }
    }
}

impl Default for BucketStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Default for BucketStoreBuilder {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES,
            idle_timeout: Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECS),
            cleanup_interval: Duration::from_secs(DEFAULT_CLEANUP_INTERVAL_SECS),
            shards: None,
        }
    }
}

impl BucketStoreBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ceiling on live buckets across all shards
    ///
    /// Only the overflow is evicted, one least recently used entry at a time,
    /// so no client loses its bucket while the store is at or below the
    /// ceiling. Each such eviction scans the oldest entry of every shard.
    pub fn max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }

    /// Entries not accessed for longer than this are evicted
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// How often `get_or_create` sweeps a shard for idle entries
    ///
    /// A background task calling [`BucketStore::sweep`] covers shards that
    /// see no traffic.
    pub fn cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }

    /// Number of independently locked shards
    ///
    /// Defaults to four per available CPU. Clamped to `1..=max_entries`.
    pub fn shards(mut self, shards: usize) -> Self {
        self.shards = Some(shards);
        self
    }

    pub fn build(self) -> BucketStore {
        let shards = self.shards.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
                * SHARDS_PER_CPU
        });
        BucketStore::with_config(
            self.max_entries,
            self.idle_timeout,
            self.cleanup_interval,
            shards,
        )
    }
}
