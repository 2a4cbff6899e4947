/*!
 * Waiter Pool Tests
 *
 * Reuse of waiters across primitives sharing one pool, and the retain limit
 */

use pretty_assertions::assert_eq;
use tokio_test::task::spawn;
use tokio_test::{assert_pending, assert_ready_ok};
use waitcore::{Lock, PoolStats, Semaphore, SyncConfig, WaiterPool};

/// Park `count` waits on a semaphore with no permits, then grant them all
fn churn(sem: &Semaphore, count: usize) {
    let mut waits: Vec<_> = (0..count).map(|_| spawn(sem.wait())).collect();
    for wait in &mut waits {
        assert_pending!(wait.poll());
    }
    sem.release(count).unwrap();
    for wait in &mut waits {
        assert_ready_ok!(wait.poll());
    }
}

#[test]
fn test_shared_pool_reuses_across_primitives() {
    let pool = WaiterPool::<()>::new();
    let a = Semaphore::with_config(0, SyncConfig::inline(), Some(pool.clone()));
    let b = Semaphore::with_config(0, SyncConfig::inline(), Some(pool.clone()));
    assert!(a.pool().ptr_eq(b.pool()));

    // The first wait of each burst uses the semaphore's embedded waiter
    churn(&a, 3);
    assert_eq!(
        pool.stats(),
        PoolStats {
            created: 2,
            reused: 0,
            idle: 2
        }
    );

    churn(&b, 3);
    assert_eq!(
        pool.stats(),
        PoolStats {
            created: 2,
            reused: 2,
            idle: 2
        }
    );
}

#[test]
fn test_warm_pool_stops_allocating() {
    let sem = Semaphore::with_config(0, SyncConfig::inline(), None);
    churn(&sem, 8);
    let warm = sem.pool().stats().created;

    for _ in 0..10 {
        churn(&sem, 8);
    }
    assert_eq!(sem.pool().stats().created, warm);
}

#[test]
fn test_retain_limit_caps_idle_waiters() {
    let pool = WaiterPool::<()>::with_retain(1);
    let sem = Semaphore::with_config(0, SyncConfig::inline(), Some(pool.clone()));

    churn(&sem, 4);
    let stats = pool.stats();
    assert_eq!(stats.created, 3);
    assert_eq!(stats.idle, 1);
}

#[test]
fn test_config_retain_applies_to_private_pool() {
    let config = SyncConfig::inline().with_pool_retain(0);
    let sem = Semaphore::with_config(0, config, None);

    churn(&sem, 3);
    assert_eq!(sem.pool().stats().idle, 0);
}

#[test]
fn test_pool_outlives_primitive() {
    let pool = WaiterPool::<()>::new();
    {
        let lock = Lock::with_config(SyncConfig::inline(), Some(pool.clone()));
        let held = lock.try_acquire().unwrap();
        let mut first = spawn(lock.acquire());
        let mut second = spawn(lock.acquire());
        assert_pending!(first.poll());
        assert_pending!(second.poll());
        drop(held);
        drop(assert_ready_ok!(first.poll()));
        drop(assert_ready_ok!(second.poll()));
    }
    assert_eq!(pool.stats().idle, 1);

    let sem = Semaphore::with_config(0, SyncConfig::inline(), Some(pool.clone()));
    churn(&sem, 2);
    assert_eq!(pool.stats().reused, 1);
}
