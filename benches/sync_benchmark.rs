/*!
 * Synchronization Primitives Benchmarks
 *
 * Uncontended fast paths, pooled contended hand-off, and a multi-task
 * lock workload
 */

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;
use tokio::runtime::Runtime;
use tokio_test::task::spawn;
use waitcore::{CountdownEvent, Lock, ReaderWriterLock, Semaphore, SyncConfig};

fn bench_uncontended(c: &mut Criterion) {
    let mut group = c.benchmark_group("uncontended");

    let sem = Semaphore::new(1);
    group.bench_function("semaphore_wait_release", |b| {
        b.iter(|| {
            let mut wait = spawn(sem.wait());
            black_box(wait.poll());
            sem.release(1).unwrap();
        });
    });

    let lock = Lock::new();
    group.bench_function("lock_acquire_release", |b| {
        b.iter(|| {
            let mut acquire = spawn(lock.acquire());
            let held = black_box(acquire.poll());
            drop(held);
        });
    });

    let rwlock = ReaderWriterLock::new();
    group.bench_function("rwlock_read", |b| {
        b.iter(|| {
            let mut read = spawn(rwlock.read());
            let held = black_box(read.poll());
            drop(held);
        });
    });

    let event = CountdownEvent::new(0);
    group.bench_function("countdown_wait_set", |b| {
        b.iter(|| {
            let mut wait = spawn(event.wait());
            black_box(wait.poll());
        });
    });

    group.finish();
}

fn bench_handoff(c: &mut Criterion) {
    let mut group = c.benchmark_group("handoff");

    for waiters in [1usize, 4, 16] {
        group.bench_with_input(BenchmarkId::from_parameter(waiters), &waiters, |b, &waiters| {
            let sem = Semaphore::with_config(0, SyncConfig::inline(), None);
            b.iter(|| {
                let mut waits: Vec<_> = (0..waiters).map(|_| spawn(sem.wait())).collect();
                for wait in &mut waits {
                    let _ = wait.poll();
                }
                sem.release(waiters).unwrap();
                for wait in &mut waits {
                    black_box(wait.poll());
                }
            });
        });
    }

    group.finish();
}

fn bench_lock_contention(c: &mut Criterion) {
    let mut group = c.benchmark_group("lock_contention");
    group.sample_size(20);

    let runtime = Runtime::new().unwrap();
    for tasks in [2usize, 8] {
        group.bench_with_input(BenchmarkId::from_parameter(tasks), &tasks, |b, &tasks| {
            b.iter(|| {
                runtime.block_on(async {
                    let lock = Arc::new(Lock::new());
                    let handles: Vec<_> = (0..tasks)
                        .map(|_| {
                            let lock = lock.clone();
                            tokio::spawn(async move {
                                for _ in 0..100 {
                                    let held = lock.acquire().await.unwrap();
                                    black_box(&held);
                                }
                            })
                        })
                        .collect();
                    for handle in handles {
                        handle.await.unwrap();
                    }
                });
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_uncontended, bench_handoff, bench_lock_contention);
criterion_main!(benches);
