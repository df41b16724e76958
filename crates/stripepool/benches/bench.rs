use core::{hint::black_box, num::NonZeroUsize};
use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use crossbeam_channel::unbounded;
use std::{
    sync::{Arc, Barrier},
    thread::scope,
    time::Instant,
};
use stripepool::{
    AdmissionGate, KeyRouter, PoolConfig, RoundRobinRouter, Router, StripedConfig,
    StripedExecutor, Task, WorkerPool,
};

// Operations per benchmark iteration (split across threads when contended).
const TOTAL_OPS: usize = 4096;

fn stripes(n: usize) -> NonZeroUsize {
    NonZeroUsize::new(n).unwrap()
}

/// Benchmarks single-threaded routing with an arbitrary router.
fn bench_router<R>(c: &mut Criterion, group_name: &str, router: R)
where
    R: Router,
{
    let mut group = c.benchmark_group(group_name);
    group.throughput(Throughput::Elements(TOTAL_OPS as u64));

    group.bench_function(format!("elems/{}", TOTAL_OPS), |b| {
        b.iter(|| {
            for key in 0..TOTAL_OPS as u64 {
                black_box(router.route(black_box(key)));
            }
        });
    });

    group.finish();
}

/// Benchmarks a shared round-robin cursor across threads.
fn bench_round_robin_contended(c: &mut Criterion) {
    let mut group = c.benchmark_group("router/round_robin/contended");

    for thread_count in [1, 2, 4, 8] {
        let ops_per_thread = TOTAL_OPS / thread_count;

        group.throughput(Throughput::Elements(TOTAL_OPS as u64));
        group.bench_function(
            format!("elems/{}/threads/{}", TOTAL_OPS, thread_count),
            |b| {
                b.iter_custom(|iters| {
                    let router = RoundRobinRouter::new(stripes(8));
                    let start = Instant::now();

                    for _ in 0..iters {
                        let barrier = Arc::new(Barrier::new(thread_count + 1));
                        scope(|s| {
                            for _ in 0..thread_count {
                                let barrier = Arc::clone(&barrier);
                                let router = &router;
                                s.spawn(move || {
                                    barrier.wait();
                                    for _ in 0..ops_per_thread {
                                        black_box(router.next());
                                    }
                                });
                            }
                            barrier.wait();
                        });
                    }

                    start.elapsed()
                });
            },
        );
    }

    group.finish();
}

/// Benchmarks acquire/release pairs on a gate shared across threads.
fn bench_gate_contended(c: &mut Criterion) {
    let mut group = c.benchmark_group("gate/acquire_release");

    for thread_count in [1, 2, 4, 8] {
        let ops_per_thread = TOTAL_OPS / thread_count;

        group.throughput(Throughput::Elements(TOTAL_OPS as u64));
        group.bench_function(
            format!("elems/{}/threads/{}", TOTAL_OPS, thread_count),
            |b| {
                b.iter_custom(|iters| {
                    // Fewer permits than threads forces the slow path.
                    let gate = AdmissionGate::new(stripes(2));
                    let start = Instant::now();

                    for _ in 0..iters {
                        let barrier = Arc::new(Barrier::new(thread_count + 1));
                        scope(|s| {
                            for _ in 0..thread_count {
                                let barrier = Arc::clone(&barrier);
                                let gate = &gate;
                                s.spawn(move || {
                                    barrier.wait();
                                    for _ in 0..ops_per_thread {
                                        drop(black_box(gate.acquire()));
                                    }
                                });
                            }
                            barrier.wait();
                        });
                    }

                    start.elapsed()
                });
            },
        );
    }

    group.finish();
}

/// Benchmarks end-to-end submission through a bounded striped executor.
fn bench_striped_submit(c: &mut Criterion, group_name: &str, round_robin: bool) {
    let config = StripedConfig {
        stripes: 4,
        pool: PoolConfig {
            queue_capacity: Some(256),
            name_prefix: "bench".into(),
            ..PoolConfig::fixed(1)
        },
        admission_budget: None,
    };

    let mut group = c.benchmark_group(group_name);
    group.throughput(Throughput::Elements(TOTAL_OPS as u64));

    group.bench_function(format!("elems/{}", TOTAL_OPS), |b| {
        b.iter_custom(|iters| {
            let (done_tx, done_rx) = unbounded();
            let submit = |executor: &dyn Fn(Task, u64)| {
                for key in 0..TOTAL_OPS as u64 {
                    let done_tx = done_tx.clone();
                    executor(Task::new(move || done_tx.send(()).unwrap()), key);
                }
                for _ in 0..TOTAL_OPS {
                    done_rx.recv().unwrap();
                }
            };

            let start = Instant::now();
            if round_robin {
                let executor = StripedExecutor::bounded_round_robin(config.clone()).unwrap();
                for _ in 0..iters {
                    submit(&|task, _| executor.execute_unkeyed(task).unwrap());
                }
                executor.shutdown();
            } else {
                let executor = StripedExecutor::bounded(config.clone()).unwrap();
                for _ in 0..iters {
                    submit(&|task, key| executor.execute(task, key).unwrap());
                }
                executor.shutdown();
            }
            start.elapsed()
        });
    });

    group.finish();
}

fn benchmark_router_key_masked(c: &mut Criterion) {
    bench_router(c, "router/key/masked", KeyRouter::new(stripes(8)));
}

fn benchmark_router_key_modulo(c: &mut Criterion) {
    bench_router(c, "router/key/modulo", KeyRouter::new(stripes(6)));
}

fn benchmark_router_round_robin(c: &mut Criterion) {
    bench_router(c, "router/round_robin", RoundRobinRouter::new(stripes(8)));
}

fn benchmark_striped_key(c: &mut Criterion) {
    bench_striped_submit(c, "striped/bounded/key", false);
}

fn benchmark_striped_round_robin(c: &mut Criterion) {
    bench_striped_submit(c, "striped/bounded/round_robin", true);
}

criterion_group!(
    benches,
    benchmark_router_key_masked,
    benchmark_router_key_modulo,
    benchmark_router_round_robin,
    bench_round_robin_contended,
    bench_gate_contended,
    benchmark_striped_key,
    benchmark_striped_round_robin,
);
criterion_main!(benches);
