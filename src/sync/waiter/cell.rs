/*!
 * Waiter Cell
 *
 * The reusable completion object behind every suspended wait.
 *
 * # Lifecycle
 *
 * ```text
 * Idle ──arm──► Armed ──signal──► Signaled ──publish──► Completed ──consume──► Idle
 *                 │                                          ▲
 *                 └───────────── remove + complete ──────────┘
 * ```
 *
 * A cell is armed when its wait is queued, signaled and published by the
 * signaling side (or completed by the cancellation callback after it won
 * the removal race), and consumed exactly once by the handle that armed
 * it. Consumption resets the cell and returns it home: to its pool, or by
 * clearing the in-use flag of a primitive's embedded slot.
 *
 * Queue link fields live here too, guarded by this cell's mutex but only
 * ever mutated by the queue that owns the cell (under the primitive's lock)
 * or by the chain walk that completes it.
 */

use super::pool::PoolShared;
use crate::core::errors::SyncResult;
use crate::sync::schedule::Dispatcher;
use parking_lot::{Mutex, MutexGuard};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::task::Waker;

/// Waiter state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WaiterState {
    /// Parked in a pool or an unclaimed embedded slot
    Idle,
    /// Queued on a primitive, or detached and about to be signaled
    Armed,
    /// Outcome stored, continuation not yet dispatched
    Signaled,
    /// Outcome stored and continuation dispatched
    Completed,
}

/// Identifies the queue (and detach generation) a cell is linked into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Membership {
    pub(crate) queue: u64,
    pub(crate) epoch: u64,
}

/// Intrusive link fields
pub(crate) struct Links<T> {
    pub(crate) member: Option<Membership>,
    pub(crate) next: Option<Arc<WaiterCell<T>>>,
    pub(crate) prev: Option<Weak<WaiterCell<T>>>,
}

impl<T> Links<T> {
    const fn detached() -> Self {
        Self {
            member: None,
            next: None,
            prev: None,
        }
    }

    #[inline]
    pub(crate) fn is_detached(&self) -> bool {
        self.member.is_none() && self.next.is_none() && self.prev.is_none()
    }
}

/// Mutable waiter state, guarded by the cell mutex
pub(crate) struct WaiterInner<T> {
    state: WaiterState,
    version: u64,
    outcome: Option<SyncResult<T>>,
    waker: Option<Waker>,
    run_inline: bool,
    pub(crate) links: Links<T>,
}

impl<T> WaiterInner<T> {
    /// Store the outcome of an armed waiter
    pub(crate) fn signal(&mut self, outcome: SyncResult<T>) {
        assert_eq!(
            self.state,
            WaiterState::Armed,
            "waiter completed more than once"
        );
        self.outcome = Some(outcome);
        self.state = WaiterState::Signaled;
    }

    /// Finish a signaled waiter
    ///
    /// Unlinks it from the detached chain and returns the next chain member
    /// together with the continuation to dispatch.
    pub(crate) fn publish(&mut self) -> (Option<Arc<WaiterCell<T>>>, Option<Waker>, bool) {
        debug_assert_eq!(self.state, WaiterState::Signaled);
        self.state = WaiterState::Completed;
        self.links.member = None;
        self.links.prev = None;
        (self.links.next.take(), self.waker.take(), self.run_inline)
    }

    /// Arm cycle the cell is currently in
    #[inline]
    pub(crate) fn version(&self) -> u64 {
        self.version
    }

    fn take_outcome(&mut self, version: u64) -> Option<SyncResult<T>> {
        assert_eq!(self.version, version, "stale waiter handle");
        if self.state != WaiterState::Completed {
            return None;
        }
        let outcome = self
            .outcome
            .take()
            .unwrap_or_else(|| panic!("waiter outcome consumed more than once"));
        Some(outcome)
    }
}

/// Where a cell returns after consumption
enum Home<T> {
    /// Shared pool; weak so idle cells never keep a dropped pool alive
    Pool(Weak<PoolShared<T>>),
    /// Embedded slot of one primitive; the flag is the in-use bit
    Local(AtomicBool),
}

/// Reusable completion object
pub(crate) struct WaiterCell<T> {
    inner: Mutex<WaiterInner<T>>,
    home: Home<T>,
}

impl<T> WaiterCell<T> {
    fn with_home(home: Home<T>) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(WaiterInner {
                state: WaiterState::Idle,
                version: 0,
                outcome: None,
                waker: None,
                run_inline: false,
                links: Links::detached(),
            }),
            home,
        })
    }

    /// Fresh cell owned by a pool
    pub(crate) fn pooled(pool: Weak<PoolShared<T>>) -> Arc<Self> {
        Self::with_home(Home::Pool(pool))
    }

    /// Fresh embedded cell, initially unclaimed
    pub(crate) fn local() -> Arc<Self> {
        Self::with_home(Home::Local(AtomicBool::new(false)))
    }

    #[inline]
    pub(crate) fn lock(&self) -> MutexGuard<'_, WaiterInner<T>> {
        self.inner.lock()
    }

    /// Claim an embedded cell for one wait
    ///
    /// Always fails for pooled cells.
    #[inline]
    pub(crate) fn try_claim(&self) -> bool {
        match &self.home {
            Home::Local(in_use) => in_use
                .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
                .is_ok(),
            Home::Pool(_) => false,
        }
    }

    /// Whether an embedded cell is currently claimed
    pub(crate) fn is_claimed(&self) -> bool {
        match &self.home {
            Home::Local(in_use) => in_use.load(Ordering::Acquire),
            Home::Pool(_) => false,
        }
    }

    /// Idle → Armed, returning the version the handle must present
    pub(crate) fn arm(&self, run_inline: bool) -> u64 {
        let mut inner = self.inner.lock();
        assert_eq!(
            inner.state,
            WaiterState::Idle,
            "waiter armed while already in use"
        );
        debug_assert!(inner.links.is_detached());
        inner.state = WaiterState::Armed;
        inner.version = inner.version.wrapping_add(1);
        inner.run_inline = run_inline;
        inner.version
    }

    /// Complete a single cell and dispatch its continuation
    ///
    /// Only valid after the caller removed the cell from its queue, which
    /// makes it the sole completer.
    pub(crate) fn complete(&self, outcome: SyncResult<T>, dispatcher: &Dispatcher) {
        let (waker, run_inline) = {
            let mut inner = self.inner.lock();
            inner.signal(outcome);
            let (next, waker, run_inline) = inner.publish();
            debug_assert!(next.is_none(), "completed a cell still chained");
            (waker, run_inline)
        };
        if let Some(waker) = waker {
            dispatcher.dispatch(waker, run_inline);
        }
    }

    /// Take the outcome if completed, otherwise register the continuation
    pub(crate) fn poll_outcome(&self, version: u64, waker: &Waker) -> Option<SyncResult<T>> {
        let mut inner = self.inner.lock();
        if let Some(outcome) = inner.take_outcome(version) {
            return Some(outcome);
        }
        match &inner.waker {
            Some(current) if current.will_wake(waker) => {}
            _ => inner.waker = Some(waker.clone()),
        }
        None
    }

    /// Take the outcome if completed, without registering anything
    pub(crate) fn try_take(&self, version: u64) -> Option<SyncResult<T>> {
        self.inner.lock().take_outcome(version)
    }

    /// Non-consuming status query
    pub(crate) fn is_completed(&self, version: u64) -> bool {
        let inner = self.inner.lock();
        inner.version == version && inner.state == WaiterState::Completed
    }

    /// Reset to Idle and return home
    pub(crate) fn recycle(self: Arc<Self>) {
        {
            let mut inner = self.inner.lock();
            debug_assert!(inner.links.is_detached(), "recycled a linked waiter");
            inner.state = WaiterState::Idle;
            inner.outcome = None;
            inner.waker = None;
        }

        let pool = match &self.home {
            Home::Local(in_use) => {
                in_use.store(false, Ordering::Release);
                return;
            }
            Home::Pool(pool) => pool.upgrade(),
        };
        if let Some(pool) = pool {
            pool.release(self);
        }
    }
}
