/*!
 * Waiter Pooling
 * Recycles waiter cells so contended waits stop allocating once warm
 *
 * A pool is an explicit, cloneable handle. Primitives that are given the same
 * handle share one idle list; a primitive created without one gets a private
 * pool. Cells return to the pool exactly once, from the consuming handle,
 * after being reset to Idle, so an idle cell is never Armed elsewhere.
 */

use super::cell::WaiterCell;
use crate::core::limits::POOL_GROWTH_LOG_INTERVAL;
use crossbeam_queue::SegQueue;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

/// Shared pool state
pub(crate) struct PoolShared<T> {
    idle: SegQueue<Arc<WaiterCell<T>>>,
    idle_len: AtomicUsize,
    retain: Option<usize>,
    created: AtomicU64,
    reused: AtomicU64,
}

impl<T> PoolShared<T> {
    /// Make a reset cell available again
    pub(crate) fn release(&self, cell: Arc<WaiterCell<T>>) {
        // Reserve the idle slot before pushing so concurrent releases
        // cannot overshoot the limit
        let reserved = match self.retain {
            Some(limit) => self
                .idle_len
                .fetch_update(Ordering::AcqRel, Ordering::Relaxed, |idle| {
                    (idle < limit).then_some(idle + 1)
                })
                .is_ok(),
            None => {
                self.idle_len.fetch_add(1, Ordering::Relaxed);
                true
            }
        };

        if reserved {
            self.idle.push(cell);
        } else {
            trace!(limit = self.retain, "waiter pool at retain limit, dropping waiter");
        }
    }
}

/// Pool usage counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStats {
    /// Cells allocated by this pool
    pub created: u64,
    /// Acquisitions served from the idle list
    pub reused: u64,
    /// Cells currently idle
    pub idle: usize,
}

/// Shared pool of waiter cells for one result type
///
/// # Performance
///
/// - **Lock-free**: idle list is a `SegQueue`, safe for concurrent
///   acquire/release from unrelated primitives
/// - **Growth**: unbounded unless a retain limit is set
///
/// # Example
///
/// ```
/// use waitcore::{Semaphore, SyncConfig, WaiterPool};
///
/// let pool = WaiterPool::<()>::new();
/// let a = Semaphore::with_config(0, SyncConfig::default(), Some(pool.clone()));
/// let b = Semaphore::with_config(0, SyncConfig::default(), Some(pool.clone()));
/// # let _ = (a, b);
/// ```
pub struct WaiterPool<T> {
    shared: Arc<PoolShared<T>>,
}

impl<T> WaiterPool<T> {
    /// Create an unbounded pool
    pub fn new() -> Self {
        Self::with_retain_limit(None)
    }

    /// Create a pool that keeps at most `limit` idle cells
    pub fn with_retain(limit: usize) -> Self {
        Self::with_retain_limit(Some(limit))
    }

    pub(crate) fn with_retain_limit(retain: Option<usize>) -> Self {
        Self {
            shared: Arc::new(PoolShared {
                idle: SegQueue::new(),
                idle_len: AtomicUsize::new(0),
                retain,
                created: AtomicU64::new(0),
                reused: AtomicU64::new(0),
            }),
        }
    }

    /// Reuse an idle cell or allocate a new one
    pub(crate) fn acquire(&self) -> Arc<WaiterCell<T>> {
        if let Some(cell) = self.shared.idle.pop() {
            self.shared.idle_len.fetch_sub(1, Ordering::Relaxed);
            self.shared.reused.fetch_add(1, Ordering::Relaxed);
            return cell;
        }

        let created = self.shared.created.fetch_add(1, Ordering::Relaxed) + 1;
        if created % POOL_GROWTH_LOG_INTERVAL == 0 {
            debug!(created, "waiter pool grew");
        }
        WaiterCell::pooled(Arc::downgrade(&self.shared))
    }

    /// Snapshot of the pool counters
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            created: self.shared.created.load(Ordering::Relaxed),
            reused: self.shared.reused.load(Ordering::Relaxed),
            idle: self.shared.idle_len.load(Ordering::Relaxed),
        }
    }

    /// Whether two handles refer to the same pool
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

impl<T> Default for WaiterPool<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for WaiterPool<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> fmt::Debug for WaiterPool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WaiterPool")
            .field("stats", &self.stats())
            .field("retain", &self.shared.retain)
            .finish()
    }
}
