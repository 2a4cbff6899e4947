/*!
 * Embedded Waiter Slot
 *
 * Each primitive owns one non-pooled cell. While a primitive has at most one
 * outstanding wait, that wait uses the embedded cell and skips the pool
 * entirely; any further concurrent wait falls back to the pool.
 */

use super::cell::WaiterCell;
use super::pool::WaiterPool;
use std::sync::Arc;
use tracing::trace;

/// Embedded cell with pool fallback
pub(crate) struct WaiterSource<T> {
    local: Arc<WaiterCell<T>>,
    pool: WaiterPool<T>,
}

impl<T> WaiterSource<T> {
    pub(crate) fn new(pool: WaiterPool<T>) -> Self {
        Self {
            local: WaiterCell::local(),
            pool,
        }
    }

    /// Claim the embedded cell if free, else take one from the pool
    #[inline]
    pub(crate) fn claim(&self) -> Arc<WaiterCell<T>> {
        if self.local.try_claim() {
            trace!("using embedded waiter");
            return Arc::clone(&self.local);
        }
        self.pool.acquire()
    }

    pub(crate) fn pool(&self) -> &WaiterPool<T> {
        &self.pool
    }

    /// Whether the embedded cell currently backs a wait
    pub(crate) fn local_in_use(&self) -> bool {
        self.local.is_claimed()
    }
}
