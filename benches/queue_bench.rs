//! Benchmarks for the event scheduler.
//!
//! Benchmarks cover:
//! - Priority queue insert, bulk insert, and batched removal
//! - Pool acquire/release round trips
//! - Full tick throughput with and without an item budget

use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::hint::black_box;
use std::sync::Arc;
use std::time::Duration;

use prometheus_event_scheduler::core::{
    EventScheduler, PoolRegistry, Poolable, PriorityQueue, ProcessorSettings, TimedEvent,
};
use prometheus_event_scheduler::runtime::{InlineDriver, ManualClock};

#[derive(Default)]
struct BenchEvent {
    value: u64,
}

impl TimedEvent for BenchEvent {
    fn execute(&mut self, _now: Duration) {
        black_box(self.value);
    }
}

struct Particle {
    ttl: u32,
}

impl Poolable for Particle {
    fn create() -> Self {
        Self { ttl: 0 }
    }

    fn reset(&mut self) {
        self.ttl = 0;
    }
}

fn random_keys(count: usize) -> Vec<u64> {
    let mut rng = StdRng::seed_from_u64(7);
    (0..count).map(|_| rng.random_range(0..1_000_000)).collect()
}

fn bench_queue(c: &mut Criterion) {
    let mut group = c.benchmark_group("priority_queue");
    for size in [100_usize, 1_000, 10_000] {
        let keys = random_keys(size);
        group.throughput(Throughput::Elements(size as u64));

        group.bench_with_input(BenchmarkId::new("insert", size), &keys, |b, keys| {
            b.iter(|| {
                let queue = PriorityQueue::with_capacity(keys.len());
                for key in keys {
                    queue.insert(*key);
                }
                black_box(queue.count())
            });
        });

        group.bench_with_input(BenchmarkId::new("insert_many", size), &keys, |b, keys| {
            b.iter(|| {
                let queue = PriorityQueue::new();
                queue.insert_many(keys.iter().copied());
                black_box(queue.count())
            });
        });

        for take in [size / 10, size] {
            group.bench_with_input(
                BenchmarkId::new(format!("remove_batch_{take}"), size),
                &keys,
                |b, keys| {
                    b.iter_batched(
                        || {
                            let queue = PriorityQueue::new();
                            queue.insert_many(keys.iter().copied());
                            queue
                        },
                        |queue| black_box(queue.remove_batch(take)),
                        BatchSize::SmallInput,
                    );
                },
            );
        }
    }
    group.finish();
}

fn bench_pool(c: &mut Criterion) {
    let pools = PoolRegistry::new();
    pools.prewarm::<Particle>(64);

    c.bench_function("pool_acquire_release", |b| {
        b.iter(|| {
            let mut particle: Particle = pools.acquire();
            particle.ttl = 30;
            black_box(pools.release(particle))
        });
    });
}

fn bench_tick(c: &mut Criterion) {
    let mut group = c.benchmark_group("tick");
    for budget in [None, Some(256_usize)] {
        let label = budget.map_or_else(|| "unbounded".to_string(), |b| format!("budget_{b}"));
        group.throughput(Throughput::Elements(1_000));
        group.bench_function(BenchmarkId::new("schedule_and_tick_1000", label), |b| {
            let clock = Arc::new(ManualClock::new());
            let scheduler = EventScheduler::with_settings(
                clock.clone(),
                Arc::new(InlineDriver),
                &ProcessorSettings {
                    item_budget: budget,
                    time_budget: None,
                    default_pool_cap: 2_048,
                    ..ProcessorSettings::default()
                },
            );
            scheduler.prewarm::<BenchEvent>(1_024);

            b.iter(|| {
                for value in 0..1_000_u64 {
                    scheduler.schedule_with::<BenchEvent, _>(
                        Duration::from_micros(value % 50),
                        |event| event.value = value,
                    );
                }
                clock.advance(Duration::from_millis(1));
                while scheduler.pending_count() > 0 {
                    black_box(scheduler.tick_now());
                }
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_queue, bench_pool, bench_tick);
criterion_main!(benches);
