/*!
 * Waiter Queue
 *
 * Intrusive FIFO of waiter cells. Link fields live in the cells, so
 * enqueue, arbitrary removal and detaching the whole queue are O(1) and
 * never allocate.
 *
 * # Locking
 *
 * Every queue operation runs under the owning primitive's critical section.
 * Detached runs of cells (`Chain`) are completed after that section is
 * released, because completion dispatches continuations that may re-enter
 * the primitive.
 *
 * # Membership
 *
 * A cell records which queue it belongs to and the queue's detach epoch at
 * enqueue time. `detach_all` bumps the epoch instead of visiting every cell,
 * which makes `remove` on any cell from that run report "not a member".
 * `remove` also checks the arm version, so a late cancellation callback
 * cannot unlink a recycled cell that was queued again for another wait.
 * Its return value is the single arbitration point between the signaling
 * path and cancellation.
 */

use super::cell::{Membership, WaiterCell};
use crate::sync::schedule::Dispatcher;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_QUEUE_ID: AtomicU64 = AtomicU64::new(1);

/// Intrusive FIFO of armed waiters
pub(crate) struct WaiterQueue<T> {
    id: u64,
    epoch: u64,
    head: Option<Arc<WaiterCell<T>>>,
    tail: Option<Arc<WaiterCell<T>>>,
    len: usize,
}

impl<T> WaiterQueue<T> {
    pub(crate) fn new() -> Self {
        Self {
            id: NEXT_QUEUE_ID.fetch_add(1, Ordering::Relaxed),
            epoch: 0,
            head: None,
            tail: None,
            len: 0,
        }
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    fn membership(&self) -> Membership {
        Membership {
            queue: self.id,
            epoch: self.epoch,
        }
    }

    /// Append an armed cell at the tail
    pub(crate) fn enqueue(&mut self, cell: &Arc<WaiterCell<T>>) {
        {
            let mut inner = cell.lock();
            debug_assert!(inner.links.is_detached(), "waiter enqueued twice");
            inner.links.member = Some(self.membership());
            inner.links.prev = self.tail.as_ref().map(Arc::downgrade);
        }

        match &self.tail {
            Some(tail) => tail.lock().links.next = Some(Arc::clone(cell)),
            None => self.head = Some(Arc::clone(cell)),
        }
        self.tail = Some(Arc::clone(cell));
        self.len += 1;
    }

    /// Unlink `cell` if it is a member of this queue in arm cycle `version`
    ///
    /// Returns whether the cell was removed. Safe to call for cells that were
    /// never queued here or were already detached.
    pub(crate) fn remove(&mut self, cell: &Arc<WaiterCell<T>>, version: u64) -> bool {
        let (prev, next) = {
            let mut inner = cell.lock();
            if inner.links.member != Some(self.membership()) || inner.version() != version {
                return false;
            }
            inner.links.member = None;
            (inner.links.prev.take(), inner.links.next.take())
        };

        let prev = prev.and_then(|weak| weak.upgrade());

        match &prev {
            Some(prev) => prev.lock().links.next = next.clone(),
            None => self.head = next.clone(),
        }
        match next {
            Some(next) => next.lock().links.prev = prev.as_ref().map(Arc::downgrade),
            None => self.tail = prev,
        }

        self.len -= 1;
        true
    }

    /// Empty the queue, returning its former contents as a chain
    pub(crate) fn detach_all(&mut self) -> Chain<T> {
        let chain = Chain {
            head: self.head.take(),
            len: self.len,
        };
        self.tail = None;
        self.len = 0;
        self.epoch = self.epoch.wrapping_add(1);
        chain
    }

    /// Detach `min(n, len)` cells from the head
    pub(crate) fn detach_first(&mut self, n: usize) -> Chain<T> {
        let count = n.min(self.len);
        if count == 0 {
            return Chain::empty();
        }
        if count == self.len {
            return self.detach_all();
        }

        let head = self.head.take();
        let mut cursor = head.clone();
        for taken in 1..=count {
            let Some(node) = cursor else { break };
            let mut inner = node.lock();
            inner.links.member = None;

            if taken == count {
                // Cut the chain here; the remainder becomes the new queue head
                let rest = inner.links.next.take();
                drop(inner);
                if let Some(rest) = &rest {
                    rest.lock().links.prev = None;
                }
                self.head = rest;
                cursor = None;
            } else {
                cursor = inner.links.next.clone();
            }
        }

        self.len -= count;
        Chain { head, len: count }
    }
}

impl<T> Drop for WaiterQueue<T> {
    fn drop(&mut self) {
        // Unlink iteratively so long queues don't recurse through Arc drops
        let mut cursor = self.head.take();
        self.tail = None;
        while let Some(node) = cursor {
            cursor = node.lock().links.next.take();
        }
    }
}

/// A run of cells detached from a queue, awaiting completion
#[must_use = "detached waiters must be completed"]
pub(crate) struct Chain<T> {
    head: Option<Arc<WaiterCell<T>>>,
    len: usize,
}

impl<T> Chain<T> {
    pub(crate) const fn empty() -> Self {
        Self { head: None, len: 0 }
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.head.is_none()
    }
}

impl<T: Clone> Chain<T> {
    /// Complete every cell in the chain with `value`
    ///
    /// Must be called without holding the primitive's lock. Every outcome is
    /// stored before the first continuation is dispatched, so no woken task
    /// can observe a batch that is only partially granted.
    pub(crate) fn complete(mut self, value: T, dispatcher: &Dispatcher) {
        let mut cursor = self.head.clone();
        while let Some(node) = cursor {
            let mut inner = node.lock();
            inner.signal(Ok(value.clone()));
            cursor = inner.links.next.clone();
        }

        let mut cursor = self.head.take();
        while let Some(node) = cursor {
            let (next, waker, run_inline) = node.lock().publish();
            if let Some(waker) = waker {
                dispatcher.dispatch(waker, run_inline);
            }
            cursor = next;
        }
    }
}

impl<T> Drop for Chain<T> {
    fn drop(&mut self) {
        let mut cursor = self.head.take();
        while let Some(node) = cursor {
            cursor = node.lock().links.next.take();
        }
    }
}
