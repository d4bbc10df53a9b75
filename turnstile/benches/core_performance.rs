use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use turnstile::{AdmissionController, BucketStore, Classifier, QuotaTable, RequestContext};

fn benchmark_admission(c: &mut Criterion) {
    let mut group = c.benchmark_group("admission");
    group.throughput(Throughput::Elements(1));
    group.measurement_time(Duration::from_secs(10));

    group.bench_function("single_key_allowed", |b| {
        let controller = AdmissionController::default();
        let ctx = RequestContext::new("/api/tasks").with_principal("bench-user");
        let mut now = Instant::now();

        b.iter(|| {
            // Advance far enough that the bucket is never empty
            now += Duration::from_secs(1);
            black_box(controller.admit(black_box(&ctx), now))
        });
    });

    group.bench_function("single_key_denied", |b| {
        let controller = AdmissionController::default();
        let ctx = RequestContext::new("/api/auth/login").with_peer_addr("10.0.0.1");
        let now = Instant::now();
        for _ in 0..5 {
            controller.admit(&ctx, now);
        }

        b.iter(|| black_box(controller.admit(black_box(&ctx), now)));
    });

    group.bench_function("bypass", |b| {
        let controller = AdmissionController::default();
        let ctx = RequestContext::new("/actuator/health");
        let now = Instant::now();

        b.iter(|| black_box(controller.admit(black_box(&ctx), now)));
    });

    group.bench_function("rotating_keys_10k", |b| {
        let controller = AdmissionController::default();
        let addresses: Vec<String> = (0..10_000)
            .map(|i| format!("10.{}.{}.{}", i >> 16, (i >> 8) & 0xff, i & 0xff))
            .collect();
        let mut counter = 0usize;
        let now = Instant::now();

        b.iter(|| {
            let addr = &addresses[counter % addresses.len()];
            counter += 1;
            let ctx = RequestContext::new("/").with_forwarded_for(addr);
            black_box(controller.admit(&ctx, now))
        });
    });

    group.finish();
}

fn benchmark_contention(c: &mut Criterion) {
    let mut group = c.benchmark_group("store_contention");
    group.measurement_time(Duration::from_secs(10));

    for shards in [1usize, 16, 64] {
        group.bench_with_input(BenchmarkId::new("shards", shards), &shards, |b, &shards| {
            let store = Arc::new(BucketStore::builder().shards(shards).build());
            let controller = Arc::new(AdmissionController::new(
                Classifier::default(),
                QuotaTable::default(),
                store,
            ));

            b.iter(|| {
                let workers: Vec<_> = (0..4)
                    .map(|t| {
                        let controller = Arc::clone(&controller);
                        thread::spawn(move || {
                            let now = Instant::now();
                            for i in 0..1_000 {
                                let addr = format!("10.0.{t}.{}", i % 250);
                                let ctx = RequestContext::new("/").with_peer_addr(&addr);
                                black_box(controller.admit(&ctx, now));
                            }
                        })
                    })
                    .collect();
                for worker in workers {
                    let _ = worker.join();
                }
            });
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_admission, benchmark_contention);
criterion_main!(benches);
