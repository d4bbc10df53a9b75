//! Background sweeper for idle buckets
//!
//! The store already sweeps lazily as requests arrive. The janitor covers
//! quiet periods, so idle entries are released even when no traffic reaches
//! their shard, and keeps the store gauges in [`Metrics`] current.

use crate::metrics::Metrics;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use turnstile::BucketStore;

/// Run one sweep and publish the store's counters
pub fn sweep_once(store: &BucketStore, metrics: &Metrics, now: Instant) -> usize {
    let removed = store.sweep(now);
    let stats = store.stats();

    metrics.update_active_keys(stats.entries);
    metrics.update_evictions(stats.evicted_idle, stats.evicted_capacity);

    tracing::debug!(
        removed,
        entries = stats.entries,
        evicted_idle = stats.evicted_idle,
        evicted_capacity = stats.evicted_capacity,
        "swept idle buckets"
    );

    removed
}

/// Spawn the sweeper on the current runtime
///
/// The first sweep runs one `interval` after spawning.
pub fn spawn(store: Arc<BucketStore>, metrics: Arc<Metrics>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            sweep_once(&store, &metrics, Instant::now());
        }
    })
}
