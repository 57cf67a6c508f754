//! Benchmarks for the hot paths of retry, breaker and store.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use faultline::resilience::{admit, record, BreakerState, JitterStrategy, RetryPolicy};
use faultline::state::{InMemoryStateStore, StateStore};
use std::time::Duration;

fn backoff_benchmark(c: &mut Criterion) {
    let policy = RetryPolicy::new(5, Duration::from_millis(100), 2.0).with_max_delay_ms(10_000);
    c.bench_function("backoff_delay", |b| {
        b.iter(|| {
            for i in 0..5 {
                black_box(policy.backoff_delay(black_box(i)));
            }
        });
    });

    let jittered = policy.clone().with_jitter(JitterStrategy::Full);
    c.bench_function("delay_for_full_jitter", |b| {
        b.iter(|| black_box(jittered.delay_for(black_box(3))));
    });
}

fn breaker_benchmark(c: &mut Criterion) {
    let now = chrono::Utc::now();
    let timeout = Duration::from_secs(60);
    c.bench_function("breaker_admit_record", |b| {
        b.iter(|| {
            let mut state = BreakerState::default();
            for i in 0..10 {
                let (next, admission, _) = admit(state, now, timeout);
                let (next, _) = record(next, admission, i % 3 != 0, now, 5);
                state = next;
            }
            black_box(state)
        });
    });
}

fn store_benchmark(c: &mut Criterion) {
    let Ok(runtime) = tokio::runtime::Runtime::new() else {
        return;
    };
    let store = InMemoryStateStore::new();
    c.bench_function("store_put_take", |b| {
        b.iter(|| {
            runtime.block_on(async {
                let _ = store.put("job", serde_json::json!({"score": 1})).await;
                black_box(store.take("job").await)
            })
        });
    });
}

criterion_group!(benches, backoff_benchmark, breaker_benchmark, store_benchmark);
criterion_main!(benches);
