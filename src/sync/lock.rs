/*!
 * Exclusive Lock
 *
 * Non-reentrant async mutex over a single `taken` flag. The uncontended
 * acquire is one compare-and-swap with no critical section; contended
 * acquirers queue FIFO and receive ownership directly from the releasing
 * holder, so `taken` stays set across a hand-off.
 *
 * Acquisition yields a `LockReleaser` guard. Dropping the guard releases.
 */

use super::cancel::CancelSource;
use super::config::SyncConfig;
use super::waiter::{is_cancelled, WaitCore, WaitFuture, WaitOwner, WaiterCell, WaiterPool, WaiterQueue};
use crate::core::errors::{SyncError, SyncResult};
use parking_lot::Mutex;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tracing::trace;

/// Async exclusive lock
///
/// # Example
///
/// ```
/// use waitcore::Lock;
///
/// # tokio_test::block_on(async {
/// let lock = Lock::new();
/// {
///     let _held = lock.acquire().await.unwrap();
///     assert!(lock.is_locked());
/// }
/// assert!(!lock.is_locked());
/// # });
/// ```
pub struct Lock {
    inner: Arc<LockInner>,
}

struct LockInner {
    taken: AtomicBool,
    waiters: Mutex<WaiterQueue<()>>,
    core: WaitCore<()>,
}

impl LockInner {
    #[inline]
    fn try_take(&self) -> bool {
        self.taken
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    fn release(&self) {
        let chain = {
            let mut waiters = self.waiters.lock();
            if waiters.is_empty() {
                self.taken.store(false, Ordering::Release);
                return;
            }
            waiters.detach_first(1)
        };

        trace!("lock handed to next waiter");
        self.core.complete(chain, ());
    }
}

impl Lock {
    pub fn new() -> Self {
        Self::with_config(SyncConfig::default(), None)
    }

    /// Create with explicit configuration and an optional shared pool
    pub fn with_config(config: SyncConfig, pool: Option<WaiterPool<()>>) -> Self {
        Self {
            inner: Arc::new(LockInner {
                taken: AtomicBool::new(false),
                waiters: Mutex::new(WaiterQueue::new()),
                core: WaitCore::new(&config, pool),
            }),
        }
    }

    /// Acquire the lock
    pub fn acquire(&self) -> LockFuture<'_> {
        self.acquire_inner(None)
    }

    /// Acquire the lock unless `cancel` fires first
    pub fn acquire_with_cancel(&self, cancel: &CancelSource) -> LockFuture<'_> {
        self.acquire_inner(Some(cancel))
    }

    fn acquire_inner(&self, cancel: Option<&CancelSource>) -> LockFuture<'_> {
        let inner = if is_cancelled(cancel) {
            WaitFuture::failed(SyncError::Cancelled)
        } else if self.inner.try_take() {
            WaitFuture::ready((), &*self.inner)
        } else {
            self.acquire_slow(cancel)
        };
        LockFuture { inner, lock: self }
    }

    #[cold]
    fn acquire_slow(&self, cancel: Option<&CancelSource>) -> WaitFuture<'_, ()> {
        let inner = &self.inner;
        let parked = {
            let mut waiters = inner.waiters.lock();
            // A release may have cleared the flag since the fast path
            if inner.try_take() {
                return WaitFuture::ready((), &**inner);
            }
            inner.core.park(&mut waiters)
        };

        trace!("lock acquire suspended");
        inner.core.suspend(parked, inner, cancel)
    }

    /// Acquire only if the lock is free right now
    pub fn try_acquire(&self) -> Option<LockReleaser<'_>> {
        self.inner.try_take().then(|| LockReleaser { lock: self })
    }

    /// Whether the lock is currently held or being handed off
    pub fn is_locked(&self) -> bool {
        self.inner.taken.load(Ordering::Acquire)
    }

    /// Waits currently queued
    pub fn waiting(&self) -> usize {
        self.inner.waiters.lock().len()
    }

    /// Pool backing contended waits, clone it to share with another instance
    pub fn pool(&self) -> &WaiterPool<()> {
        self.inner.core.pool()
    }
}

impl Default for Lock {
    fn default() -> Self {
        Self::new()
    }
}

impl WaitOwner<()> for LockInner {
    fn remove_waiter(&self, cell: &Arc<WaiterCell<()>>, version: u64) -> bool {
        self.waiters.lock().remove(cell, version)
    }

    fn abandon(&self, _value: ()) {
        self.release();
    }
}

impl fmt::Debug for Lock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lock")
            .field("locked", &self.is_locked())
            .field("waiting", &self.waiting())
            .finish()
    }
}

/// Awaitable lock acquisition
#[must_use = "futures do nothing unless polled"]
#[derive(Debug)]
pub struct LockFuture<'a> {
    inner: WaitFuture<'a, ()>,
    lock: &'a Lock,
}

impl LockFuture<'_> {
    /// Whether the acquisition resolves without suspending
    pub fn is_completed(&self) -> bool {
        self.inner.is_completed()
    }
}

impl<'a> Future for LockFuture<'a> {
    type Output = SyncResult<LockReleaser<'a>>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let lock = self.lock;
        Pin::new(&mut self.inner)
            .poll(cx)
            .map(|outcome| outcome.map(|()| LockReleaser { lock }))
    }
}

/// Held lock; dropping it releases
#[must_use = "the lock is released as soon as the releaser is dropped"]
pub struct LockReleaser<'a> {
    lock: &'a Lock,
}

impl LockReleaser<'_> {
    /// Release explicitly
    pub fn release(self) {}
}

impl Drop for LockReleaser<'_> {
    fn drop(&mut self) {
        self.lock.inner.release();
    }
}

impl fmt::Debug for LockReleaser<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockReleaser").finish_non_exhaustive()
    }
}
