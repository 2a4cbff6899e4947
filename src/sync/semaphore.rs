/*!
 * Counting Semaphore
 *
 * Permits are granted strictly FIFO. A release first hands permits directly
 * to queued waiters and only adds the remainder to the available count, so
 * `available > 0` never coexists with a non-empty queue.
 *
 * There is no maximum count: releasing more than was acquired simply grows
 * the available count.
 */

use super::cancel::CancelSource;
use super::config::SyncConfig;
use super::waiter::{is_cancelled, WaitCore, WaitFuture, WaitOwner, WaiterCell, WaiterPool, WaiterQueue};
use crate::core::errors::{SyncError, SyncResult};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};

struct SemaphoreState {
    available: usize,
    waiters: WaiterQueue<()>,
}

struct SemaphoreInner {
    state: Mutex<SemaphoreState>,
    core: WaitCore<()>,
}

impl SemaphoreInner {
    fn release(&self, count: usize) -> SyncResult<usize> {
        if count == 0 {
            return Err(SyncError::InvalidCount);
        }

        let (chain, previous) = {
            let mut state = self.state.lock();
            let handoff = count.min(state.waiters.len());
            let previous = state.available;
            state.available = previous
                .checked_add(count - handoff)
                .ok_or(SyncError::CountOverflow)?;
            (state.waiters.detach_first(handoff), previous)
        };

        if !chain.is_empty() {
            debug!(granted = chain.len(), "semaphore handed permits to waiters");
        }
        self.core.complete(chain, ());
        Ok(previous)
    }
}

/// Async counting semaphore
///
/// # Example
///
/// ```
/// use waitcore::Semaphore;
///
/// # tokio_test::block_on(async {
/// let sem = Semaphore::new(1);
/// sem.wait().await.unwrap();
/// assert_eq!(sem.available(), 0);
/// sem.release(1).unwrap();
/// # });
/// ```
pub struct Semaphore {
    inner: Arc<SemaphoreInner>,
}

impl Semaphore {
    /// Create a semaphore with `initial` available permits
    pub fn new(initial: usize) -> Self {
        Self::with_config(initial, SyncConfig::default(), None)
    }

    /// Create with explicit configuration and an optional shared pool
    pub fn with_config(initial: usize, config: SyncConfig, pool: Option<WaiterPool<()>>) -> Self {
        Self {
            inner: Arc::new(SemaphoreInner {
                state: Mutex::new(SemaphoreState {
                    available: initial,
                    waiters: WaiterQueue::new(),
                }),
                core: WaitCore::new(&config, pool),
            }),
        }
    }

    /// Wait for one permit
    pub fn wait(&self) -> WaitFuture<'_, ()> {
        self.wait_inner(None)
    }

    /// Wait for one permit, giving up when `cancel` fires
    pub fn wait_with_cancel(&self, cancel: &CancelSource) -> WaitFuture<'_, ()> {
        self.wait_inner(Some(cancel))
    }

    fn wait_inner(&self, cancel: Option<&CancelSource>) -> WaitFuture<'_, ()> {
        if is_cancelled(cancel) {
            return WaitFuture::failed(SyncError::Cancelled);
        }

        let inner = &self.inner;
        let parked = {
            let mut state = inner.state.lock();
            if state.available > 0 {
                state.available -= 1;
                return WaitFuture::ready((), &**inner);
            }
            inner.core.park(&mut state.waiters)
        };

        trace!("semaphore wait suspended");
        inner.core.suspend(parked, inner, cancel)
    }

    /// Take a permit only if one is available right now
    pub fn try_wait(&self) -> bool {
        let mut state = self.inner.state.lock();
        if state.available > 0 {
            state.available -= 1;
            true
        } else {
            false
        }
    }

    /// Release `count` permits, returning the previous available count
    ///
    /// Queued waiters are served first, in arrival order.
    pub fn release(&self, count: usize) -> SyncResult<usize> {
        self.inner.release(count)
    }

    /// Currently available permits
    pub fn available(&self) -> usize {
        self.inner.state.lock().available
    }

    /// Waits currently queued
    pub fn waiting(&self) -> usize {
        self.inner.state.lock().waiters.len()
    }

    /// Pool backing this semaphore's contended waits
    pub fn pool(&self) -> &WaiterPool<()> {
        self.inner.core.pool()
    }
}

impl WaitOwner<()> for SemaphoreInner {
    fn remove_waiter(&self, cell: &Arc<WaiterCell<()>>, version: u64) -> bool {
        self.state.lock().waiters.remove(cell, version)
    }

    fn abandon(&self, _value: ()) {
        // Returns the permit this handle was granted
        let released = self.release(1);
        debug_assert!(released.is_ok(), "returning a granted permit overflowed");
    }
}

impl fmt::Debug for Semaphore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Semaphore")
            .field("available", &state.available)
            .field("waiting", &state.waiters.len())
            .field("local_in_use", &self.inner.core.local_in_use())
            .finish()
    }
}
