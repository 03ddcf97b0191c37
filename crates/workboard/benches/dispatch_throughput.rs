//! Dispatch throughput benchmark
//!
//! Benchmarks the critical path: post → dispatch → hand-off → run
//! with trivial work, so the numbers measure matching overhead only.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tokio::runtime::Runtime;
use tokio::sync::Notify;

use workboard::{Board, SimpleWork, Worker};

const ITEMS_PER_ITER: u64 = 1_000;

/// Post `ITEMS_PER_ITER` units and wait until all of them ran
async fn run_batch(worker_count: usize, worker_slots: usize) -> Duration {
    let board = Board::with_capacity(64, worker_slots).unwrap();
    let workers: Vec<Worker> = (0..worker_count).map(|_| Worker::new()).collect();
    for worker in &workers {
        worker.work(&board).unwrap();
    }
    board.start_dispatch().unwrap();

    let completed = Arc::new(AtomicU64::new(0));
    let all_done = Arc::new(Notify::new());

    let start = Instant::now();
    for _ in 0..ITEMS_PER_ITER {
        let completed = completed.clone();
        let all_done = all_done.clone();
        board
            .post_work(SimpleWork::new(move || {
                if completed.fetch_add(1, Ordering::SeqCst) + 1 == ITEMS_PER_ITER {
                    all_done.notify_one();
                }
            }))
            .await
            .unwrap();
    }
    all_done.notified().await;
    let elapsed = start.elapsed();

    for worker in &workers {
        worker.stop();
    }
    board.close().await;
    for worker in &workers {
        worker.close().await;
    }

    elapsed
}

/// Benchmark throughput while scaling the worker population
fn bench_worker_scaling(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    let mut group = c.benchmark_group("dispatch/workers");
    group.throughput(Throughput::Elements(ITEMS_PER_ITER));
    group.sample_size(20);

    for worker_count in [1, 4, 16] {
        group.bench_with_input(
            BenchmarkId::new("workers", worker_count),
            &worker_count,
            |b, &worker_count| {
                b.to_async(&rt).iter_custom(|iters| async move {
                    let mut total = Duration::ZERO;
                    for _ in 0..iters {
                        total += run_batch(worker_count, worker_count).await;
                    }
                    total
                });
            },
        );
    }

    group.finish();
}

/// Benchmark the offer throttle with a fixed worker population
fn bench_worker_slots(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    let mut group = c.benchmark_group("dispatch/slots");
    group.throughput(Throughput::Elements(ITEMS_PER_ITER));
    group.sample_size(20);

    for slots in [1, 4, 8] {
        group.bench_with_input(BenchmarkId::new("slots", slots), &slots, |b, &slots| {
            b.to_async(&rt).iter_custom(|iters| async move {
                let mut total = Duration::ZERO;
                for _ in 0..iters {
                    total += run_batch(8, slots).await;
                }
                total
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_worker_scaling, bench_worker_slots);
criterion_main!(benches);
