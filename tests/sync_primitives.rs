/*!
 * Synchronization Primitives Integration Tests
 *
 * End-to-end behavior of every primitive on a real runtime, plus the
 * inline and scheduled continuation paths
 */

use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::Waker;
use tokio_test::task::spawn;
use tokio_test::{assert_pending, assert_ready_ok};
use waitcore::{
    Barrier, CountdownEvent, Lock, ReaderWriterLock, Schedule, Semaphore, SyncConfig,
};

/// Scheduler that holds wakes until flushed
#[derive(Default)]
struct DeferredSchedule {
    pending: Mutex<Vec<Waker>>,
}

impl DeferredSchedule {
    fn flush(&self) -> usize {
        let wakers: Vec<_> = std::mem::take(&mut *self.pending.lock());
        let count = wakers.len();
        wakers.into_iter().for_each(Waker::wake);
        count
    }
}

impl Schedule for DeferredSchedule {
    fn schedule(&self, waker: Waker) {
        self.pending.lock().push(waker);
    }

    fn name(&self) -> &'static str {
        "deferred"
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_lock_mutual_exclusion() {
    const TASKS: usize = 16;
    const ROUNDS: u64 = 200;

    let lock = Arc::new(Lock::new());
    let counter = Arc::new(AtomicU64::new(0));
    let inside = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..TASKS)
        .map(|_| {
            let lock = lock.clone();
            let counter = counter.clone();
            let inside = inside.clone();
            tokio::spawn(async move {
                for _ in 0..ROUNDS {
                    let _held = lock.acquire().await.unwrap();
                    assert_eq!(inside.fetch_add(1, Ordering::SeqCst), 0);

                    // Non-atomic read-modify-write across a suspension point
                    let value = counter.load(Ordering::Relaxed);
                    tokio::task::yield_now().await;
                    counter.store(value + 1, Ordering::Relaxed);

                    inside.fetch_sub(1, Ordering::SeqCst);
                }
            })
        })
        .collect();

    for handle in futures::future::join_all(handles).await {
        handle.unwrap();
    }

    assert_eq!(counter.load(Ordering::SeqCst), TASKS as u64 * ROUNDS);
    assert!(!lock.is_locked());
}

#[test]
fn test_semaphore_fifo_handoff() {
    let sem = Semaphore::with_config(0, SyncConfig::inline(), None);

    let mut waits: Vec<_> = (0..3).map(|_| spawn(sem.wait())).collect();
    for wait in &mut waits {
        assert_pending!(wait.poll());
    }

    assert_eq!(sem.release(2).unwrap(), 0);
    assert!(waits[0].is_woken());
    assert!(waits[1].is_woken());
    assert!(!waits[2].is_woken());
    assert_eq!(sem.available(), 0);

    assert_ready_ok!(waits[0].poll());
    assert_ready_ok!(waits[1].poll());
    assert_pending!(waits[2].poll());

    assert_eq!(sem.release(3).unwrap(), 0);
    assert_ready_ok!(waits[2].poll());
    assert_eq!(sem.available(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_semaphore_bounds_concurrency() {
    const LIMIT: usize = 3;

    let sem = Arc::new(Semaphore::new(LIMIT));
    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..32)
        .map(|_| {
            let sem = sem.clone();
            let active = active.clone();
            let peak = peak.clone();
            tokio::spawn(async move {
                sem.wait().await.unwrap();
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::task::yield_now().await;
                active.fetch_sub(1, Ordering::SeqCst);
                sem.release(1).unwrap();
            })
        })
        .collect();

    for handle in futures::future::join_all(handles).await {
        handle.unwrap();
    }

    assert!(peak.load(Ordering::SeqCst) <= LIMIT);
    assert_eq!(sem.available(), LIMIT);
    assert_eq!(sem.waiting(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_countdown_releases_all_waiters() {
    let event = Arc::new(CountdownEvent::new(3));

    let waiters: Vec<_> = (0..4)
        .map(|_| {
            let event = event.clone();
            tokio::spawn(async move { event.wait().await })
        })
        .collect();

    let signallers: Vec<_> = (0..3)
        .map(|_| {
            let event = event.clone();
            tokio::spawn(async move { event.signal_one() })
        })
        .collect();

    // Exactly one of the three callers brings the count to zero
    let mut reached_zero = 0;
    for signal in futures::future::join_all(signallers).await {
        if signal.unwrap().unwrap() {
            reached_zero += 1;
        }
    }
    assert_eq!(reached_zero, 1);

    for waiter in futures::future::join_all(waiters).await {
        assert_eq!(waiter.unwrap(), Ok(()));
    }
    assert!(event.is_set());
    assert!(event.wait().is_completed());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_barrier_cyclic_phases() {
    const PARTIES: usize = 4;
    const PHASES: u64 = 10;

    let barrier = Arc::new(Barrier::new(PARTIES));

    let handles: Vec<_> = (0..PARTIES)
        .map(|_| {
            let barrier = barrier.clone();
            tokio::spawn(async move {
                let mut seen = Vec::new();
                for _ in 0..PHASES {
                    seen.push(barrier.signal_and_wait().unwrap().await.unwrap());
                }
                seen
            })
        })
        .collect();

    let expected: Vec<u64> = (0..PHASES).collect();
    for handle in futures::future::join_all(handles).await {
        assert_eq!(handle.unwrap(), expected);
    }
    assert_eq!(barrier.current_phase(), PHASES);
    assert_eq!(barrier.remaining(), PARTIES);
}

#[test]
fn test_rwlock_reader_batch_after_writer() {
    let lock = ReaderWriterLock::with_config(SyncConfig::inline(), None);
    let writer = lock.try_write().unwrap();

    let mut readers: Vec<_> = (0..5).map(|_| spawn(lock.read())).collect();
    for reader in &mut readers {
        assert_pending!(reader.poll());
    }

    drop(writer);
    assert_eq!(lock.readers(), 5);
    assert!(readers.iter().all(|reader| reader.is_woken()));
}

#[test]
fn test_rwlock_writer_before_readers() {
    let lock = ReaderWriterLock::with_config(SyncConfig::inline(), None);
    let writer = lock.try_write().unwrap();

    let mut next_writer = spawn(lock.write());
    assert_pending!(next_writer.poll());
    let mut readers: Vec<_> = (0..3).map(|_| spawn(lock.read())).collect();
    for reader in &mut readers {
        assert_pending!(reader.poll());
    }

    drop(writer);
    assert!(next_writer.is_woken());
    assert!(readers.iter().all(|reader| !reader.is_woken()));
    assert!(lock.is_write_locked());
    assert_eq!(lock.waiting_readers(), 3);

    drop(assert_ready_ok!(next_writer.poll()));
    assert_eq!(lock.readers(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_rwlock_mixed_workload() {
    let lock = Arc::new(ReaderWriterLock::new());
    let value = Arc::new(AtomicU64::new(0));

    let handles: Vec<_> = (0..24)
        .map(|i| {
            let lock = lock.clone();
            let value = value.clone();
            tokio::spawn(async move {
                for _ in 0..50 {
                    if i % 4 == 0 {
                        let _write = lock.write().await.unwrap();
                        let current = value.load(Ordering::Relaxed);
                        tokio::task::yield_now().await;
                        value.store(current + 1, Ordering::Relaxed);
                    } else {
                        let _read = lock.read().await.unwrap();
                        assert!(!lock.is_write_locked());
                    }
                }
            })
        })
        .collect();

    for handle in futures::future::join_all(handles).await {
        handle.unwrap();
    }

    assert_eq!(value.load(Ordering::SeqCst), 6 * 50);
    assert_eq!(lock.readers(), 0);
    assert!(!lock.is_write_locked());
}

#[test]
fn test_inline_continuation_wakes_synchronously() {
    let sem = Semaphore::with_config(0, SyncConfig::inline(), None);
    let mut wait = spawn(sem.wait());
    assert_pending!(wait.poll());

    sem.release(1).unwrap();
    assert!(wait.is_woken());
    assert_ready_ok!(wait.poll());
}

#[test]
fn test_scheduled_continuation_is_deferred() {
    let scheduler = Arc::new(DeferredSchedule::default());
    let config = SyncConfig::scheduled().with_scheduler(scheduler.clone());
    let sem = Semaphore::with_config(0, config, None);

    let mut wait = spawn(sem.wait());
    assert_pending!(wait.poll());

    sem.release(1).unwrap();
    assert!(!wait.is_woken());
    assert!(wait.is_completed());

    assert_eq!(scheduler.flush(), 1);
    assert!(wait.is_woken());
    assert_ready_ok!(wait.poll());
}

#[tokio::test]
async fn test_default_config_wakes_through_runtime() {
    let sem = Arc::new(Semaphore::new(0));

    let waiter = {
        let sem = sem.clone();
        tokio::spawn(async move { sem.wait().await })
    };
    tokio::task::yield_now().await;

    sem.release(1).unwrap();
    assert_eq!(waiter.await.unwrap(), Ok(()));
}
