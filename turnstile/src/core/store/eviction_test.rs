use super::*;
use crate::core::QuotaPolicy;
use std::sync::Arc;
use std::thread;

fn bucket(now: Instant) -> TokenBucket {
    TokenBucket::new(&QuotaPolicy::per_minute(5), now)
}

fn drain(handle: &BucketHandle, now: Instant) {
    while handle.try_consume(1, now).consumed {}
}

#[test]
fn test_sweep_removes_idle_entries() {
    let store = BucketStore::builder()
        .idle_timeout(Duration::from_secs(600))
        .shards(4)
        .build();
    let now = Instant::now();

    for i in 0..100 {
        store.get_or_create(&format!("PUBLIC:10.0.0.{i}"), now, || bucket(now));
    }
    let later = now + Duration::from_secs(300);
    for i in 0..10 {
        store.get_or_create(&format!("PUBLIC:10.0.0.{i}"), later, || bucket(later));
    }

    // 11 minutes after the first wave, 6 after the refreshed ones
    let removed = store.sweep(now + Duration::from_secs(660));
    assert_eq!(removed, 90);
    assert_eq!(store.len(), 10);
    assert_eq!(store.stats().evicted_idle, 90);
}

#[test]
fn test_sweep_keeps_recent_entries() {
    let store = BucketStore::new();
    let now = Instant::now();
    for i in 0..50 {
        store.get_or_create(&format!("API:user{i}"), now, || bucket(now));
    }

    assert_eq!(store.sweep(now + Duration::from_secs(600)), 0);
    assert_eq!(store.len(), 50);
}

#[test]
fn test_lazy_sweep_on_access() {
    let store = BucketStore::builder()
        .idle_timeout(Duration::from_secs(10))
        .cleanup_interval(Duration::from_secs(5))
        .shards(1)
        .build();
    let now = Instant::now();

    for i in 0..20 {
        store.get_or_create(&format!("PUBLIC:{i}"), now, || bucket(now));
    }
    assert_eq!(store.len(), 20);

    // Any access after the cleanup interval sweeps the shard
    let later = now + Duration::from_secs(30);
    store.get_or_create("PUBLIC:fresh", later, || bucket(later));
    assert_eq!(store.len(), 1);
}

#[test]
fn test_idle_entry_is_replaced_on_access() {
    let store = BucketStore::builder()
        .idle_timeout(Duration::from_secs(600))
        .cleanup_interval(Duration::from_secs(3600))
        .build();
    let now = Instant::now();

    let old = store.get_or_create("AUTH:10.1.1.1", now, || bucket(now));
    drain(&old, now);

    let later = now + Duration::from_secs(601);
    let fresh = store.get_or_create("AUTH:10.1.1.1", later, || bucket(later));
    assert!(!old.same_bucket(&fresh));
    assert_eq!(fresh.try_consume(1, later).remaining_tokens, 4);
    assert_eq!(store.stats().evicted_idle, 1);
}

#[test]
fn test_access_refreshes_idle_clock() {
    let store = BucketStore::builder()
        .idle_timeout(Duration::from_secs(600))
        .build();
    let now = Instant::now();

    let first = store.get_or_create("API:carol", now, || bucket(now));
    let mid = now + Duration::from_secs(500);
    store.get_or_create("API:carol", mid, || bucket(mid));

    let later = now + Duration::from_secs(1_000);
    let again = store.get_or_create("API:carol", later, || bucket(later));
    assert!(first.same_bucket(&again));
}

#[test]
fn test_capacity_evicts_least_recently_used() {
    let store = BucketStore::builder().max_entries(3).shards(1).build();
    let now = Instant::now();
    let at = |secs| now + Duration::from_secs(secs);

    store.get_or_create("PUBLIC:a", at(1), || bucket(now));
    store.get_or_create("PUBLIC:b", at(2), || bucket(now));
    store.get_or_create("PUBLIC:c", at(3), || bucket(now));
    // Touch "a" so "b" becomes the oldest
    store.get_or_create("PUBLIC:a", at(4), || bucket(now));

    store.get_or_create("PUBLIC:d", at(5), || bucket(now));

    assert_eq!(store.len(), 3);
    assert!(store.contains("PUBLIC:a"));
    assert!(!store.contains("PUBLIC:b"));
    assert!(store.contains("PUBLIC:c"));
    assert!(store.contains("PUBLIC:d"));
    assert_eq!(store.stats().evicted_capacity, 1);
}

#[test]
fn test_capacity_never_evicts_new_entry() {
    let store = BucketStore::builder().max_entries(1).shards(1).build();
    let now = Instant::now();

    store.get_or_create("PUBLIC:a", now, || bucket(now));
    // Same instant as the existing entry
    store.get_or_create("PUBLIC:b", now, || bucket(now));

    assert_eq!(store.len(), 1);
    assert!(store.contains("PUBLIC:b"));
}

#[test]
fn test_capacity_bound_holds_under_load() {
    let store = BucketStore::builder().max_entries(1_000).shards(8).build();
    let now = Instant::now();

    for i in 0..10_000u64 {
        let t = now + Duration::from_millis(i);
        store.get_or_create(&format!("PUBLIC:{i}"), t, || bucket(t));
    }

    let stats = store.stats();
    assert_eq!(stats.entries, 1_000);
    assert_eq!(stats.evicted_capacity, 9_000);
}

#[test]
fn test_full_store_across_shards_keeps_every_entry() {
    for (max_entries, shards) in [(100_000, 64), (4, 4), (10, 3)] {
        let store = BucketStore::builder()
            .max_entries(max_entries)
            .shards(shards)
            .build();
        let now = Instant::now();

        for i in 0..max_entries {
            store.get_or_create(&format!("PUBLIC:{i}"), now, || bucket(now));
        }

        let stats = store.stats();
        assert_eq!(stats.entries, max_entries, "{max_entries} over {shards} shards");
        assert_eq!(stats.evicted_capacity, 0, "{max_entries} over {shards} shards");
    }
}

#[test]
fn test_overflow_evicts_one_entry() {
    let store = BucketStore::builder().max_entries(64).shards(8).build();
    let now = Instant::now();
    let at = |millis| now + Duration::from_millis(millis);

    for i in 0..64u64 {
        store.get_or_create(&format!("API:user{i}"), at(i), || bucket(now));
    }
    store.get_or_create("API:late", at(100), || bucket(now));

    assert_eq!(store.len(), 64);
    assert_eq!(store.stats().evicted_capacity, 1);
    assert!(!store.contains("API:user0"));
    assert!(store.contains("API:user1"));
    assert!(store.contains("API:late"));
}

#[test]
fn test_capacity_evicts_oldest_in_any_shard() {
    let store = BucketStore::builder().max_entries(8).shards(4).build();
    let now = Instant::now();
    let at = |secs| now + Duration::from_secs(secs);

    for i in 0..8u64 {
        store.get_or_create(&format!("PUBLIC:{i}"), at(i), || bucket(now));
    }
    // "PUBLIC:1" becomes the oldest wherever it and the rest landed
    store.get_or_create("PUBLIC:0", at(10), || bucket(now));
    store.get_or_create("PUBLIC:new", at(11), || bucket(now));

    assert_eq!(store.len(), 8);
    assert!(store.contains("PUBLIC:0"));
    assert!(!store.contains("PUBLIC:1"));
    for i in 2..8 {
        assert!(store.contains(&format!("PUBLIC:{i}")));
    }
}

#[test]
fn test_removed_entries_free_capacity() {
    let store = BucketStore::builder()
        .max_entries(10)
        .idle_timeout(Duration::from_secs(60))
        .shards(4)
        .build();
    let now = Instant::now();

    for i in 0..10 {
        store.get_or_create(&format!("PUBLIC:old{i}"), now, || bucket(now));
    }
    assert!(store.evict("PUBLIC:old0"));
    assert_eq!(store.sweep(now + Duration::from_secs(61)), 9);

    let later = now + Duration::from_secs(62);
    for i in 0..10 {
        store.get_or_create(&format!("PUBLIC:new{i}"), later, || bucket(later));
    }
    assert_eq!(store.len(), 10);
    assert_eq!(store.stats().evicted_capacity, 0);

    store.clear();
    for i in 0..10 {
        store.get_or_create(&format!("PUBLIC:again{i}"), later, || bucket(later));
    }
    assert_eq!(store.len(), 10);
    assert_eq!(store.stats().evicted_capacity, 0);
}

#[test]
fn test_concurrent_inserts_evict_only_overflow() {
    let store = Arc::new(BucketStore::builder().max_entries(1_000).shards(16).build());
    let now = Instant::now();

    let threads: Vec<_> = (0..8)
        .map(|t| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for i in 0..2_000 {
                    store.get_or_create(&format!("API:t{t}-{i}"), now, || bucket(now));
                }
            })
        })
        .collect();
    for t in threads {
        t.join().unwrap();
    }

    let stats = store.stats();
    assert_eq!(stats.entries, 1_000);
    assert_eq!(stats.evicted_capacity, 15_000);
}

#[test]
fn test_evicted_key_returns_full() {
    let store = BucketStore::new();
    let now = Instant::now();

    let handle = store.get_or_create("AUTH:10.9.9.9", now, || bucket(now));
    drain(&handle, now);
    assert!(!handle.try_consume(1, now).consumed);

    assert!(store.evict("AUTH:10.9.9.9"));

    let fresh = store.get_or_create("AUTH:10.9.9.9", now, || bucket(now));
    let result = fresh.try_consume(1, now);
    assert!(result.consumed);
    assert_eq!(result.remaining_tokens, 4);
}
