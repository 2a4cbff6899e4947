/*!
 * Waiter Infrastructure
 *
 * Shared completion machinery beneath every primitive:
 *
 * - **cell**: the reusable, versioned completion object
 * - **pool**: cross-primitive recycling of cells
 * - **local**: the per-primitive embedded cell
 * - **queue**: intrusive FIFO with O(1) removal and batch detach
 * - **future**: the awaitable handle and the cancellation race
 *
 * `WaitCore` bundles the pieces a primitive needs so that each primitive is
 * left with only its counters and its state machine.
 */

mod cell;
mod future;
mod local;
mod pool;
mod queue;

pub use future::WaitFuture;
pub use pool::{PoolStats, WaiterPool};

pub(crate) use cell::WaiterCell;
pub(crate) use future::{is_cancelled, WaitOwner};

use future::cancel_waiter;
pub(crate) use queue::{Chain, WaiterQueue};

use super::cancel::CancelSource;
use super::config::SyncConfig;
use super::schedule::Dispatcher;
use local::WaiterSource;
use std::sync::Arc;

/// A cell armed and queued under a primitive's lock, not yet wrapped in a handle
#[must_use]
pub(crate) struct Parked<T> {
    cell: Arc<WaiterCell<T>>,
    version: u64,
}

/// Per-primitive waiter plumbing
pub(crate) struct WaitCore<T> {
    source: WaiterSource<T>,
    dispatcher: Dispatcher,
    spin_limit: u32,
}

impl<T> WaitCore<T> {
    pub(crate) fn new(config: &SyncConfig, pool: Option<WaiterPool<T>>) -> Self {
        let pool = pool.unwrap_or_else(|| WaiterPool::with_retain_limit(config.pool_retain));
        Self {
            source: WaiterSource::new(pool),
            dispatcher: config.dispatcher(),
            spin_limit: config.spin_limit,
        }
    }

    /// Arm a cell and append it to `queue`
    ///
    /// Called with the primitive's lock held.
    pub(crate) fn park(&self, queue: &mut WaiterQueue<T>) -> Parked<T> {
        let cell = self.source.claim();
        let version = cell.arm(self.dispatcher.run_inline());
        queue.enqueue(&cell);
        Parked { cell, version }
    }

    pub(crate) fn pool(&self) -> &WaiterPool<T> {
        self.source.pool()
    }

    pub(crate) fn local_in_use(&self) -> bool {
        self.source.local_in_use()
    }
}

impl<T: Send + 'static> WaitCore<T> {
    /// Wrap a parked cell in its handle, after the lock is released
    ///
    /// With a cancel source, registers the callback that withdraws the cell
    /// when the source fires. The callback reaches the primitive through a
    /// weak reference, so it never keeps the primitive alive.
    pub(crate) fn suspend<'a, O>(
        &self,
        parked: Parked<T>,
        owner: &'a Arc<O>,
        cancel: Option<&CancelSource>,
    ) -> WaitFuture<'a, T>
    where
        O: WaitOwner<T> + 'static,
    {
        let Parked { cell, version } = parked;
        let registration = cancel.map(|source| {
            let weak = Arc::downgrade(owner);
            let cell = Arc::clone(&cell);
            let dispatcher = self.dispatcher.clone();
            source.register(move || {
                if let Some(owner) = weak.upgrade() {
                    cancel_waiter(&*owner, &cell, version, &dispatcher);
                }
            })
        });
        WaitFuture::pending(cell, version, &**owner, registration, self.spin_limit)
    }
}

impl<T: Clone> WaitCore<T> {
    /// Complete a detached chain outside the lock
    #[inline]
    pub(crate) fn complete(&self, chain: Chain<T>, value: T) {
        if !chain.is_empty() {
            chain.complete(value, &self.dispatcher);
        }
    }
}
