/*!
 * Countdown Event
 *
 * Starts at a count and releases every waiter at once when signaled down to
 * zero. Unlike the barrier it stays signaled until explicitly reset.
 */

use super::cancel::CancelSource;
use super::config::SyncConfig;
use super::waiter::{is_cancelled, WaitCore, WaitFuture, WaitOwner, WaiterCell, WaiterPool, WaiterQueue};
use crate::core::errors::{SyncError, SyncResult};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};

struct CountdownState {
    current: usize,
    initial: usize,
    waiters: WaiterQueue<()>,
}

struct CountdownInner {
    state: Mutex<CountdownState>,
    core: WaitCore<()>,
}

/// Async countdown event
pub struct CountdownEvent {
    inner: Arc<CountdownInner>,
}

impl CountdownEvent {
    /// Create an event that becomes set after `initial` signals
    ///
    /// An initial count of zero creates an already-set event.
    pub fn new(initial: usize) -> Self {
        Self::with_config(initial, SyncConfig::default(), None)
    }

    /// Create with explicit configuration and an optional shared pool
    pub fn with_config(initial: usize, config: SyncConfig, pool: Option<WaiterPool<()>>) -> Self {
        Self {
            inner: Arc::new(CountdownInner {
                state: Mutex::new(CountdownState {
                    current: initial,
                    initial,
                    waiters: WaiterQueue::new(),
                }),
                core: WaitCore::new(&config, pool),
            }),
        }
    }

    /// Wait until the count reaches zero
    pub fn wait(&self) -> WaitFuture<'_, ()> {
        self.wait_inner(None)
    }

    /// Wait until the count reaches zero or `cancel` fires
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
            if state.current == 0 {
                return WaitFuture::ready((), &**inner);
            }
            inner.core.park(&mut state.waiters)
        };

        trace!("countdown wait suspended");
        inner.core.suspend(parked, inner, cancel)
    }

    /// Signal once
    pub fn signal_one(&self) -> SyncResult<bool> {
        self.signal(1)
    }

    /// Decrement the count by `count`
    ///
    /// Returns true when this call brought the count to zero, in which case
    /// every pending wait has been completed.
    pub fn signal(&self, count: usize) -> SyncResult<bool> {
        if count == 0 {
            return Err(SyncError::InvalidCount);
        }

        let chain = {
            let mut state = self.inner.state.lock();
            if state.current == 0 {
                return Err(SyncError::AlreadySignaled);
            }
            if count > state.current {
                return Err(SyncError::SignalExceedsCount {
                    requested: count,
                    remaining: state.current,
                });
            }

            state.current -= count;
            if state.current > 0 {
                return Ok(false);
            }
            state.waiters.detach_all()
        };

        debug!(released = chain.len(), "countdown reached zero");
        self.inner.core.complete(chain, ());
        Ok(true)
    }

    /// Raise the count by `count`
    ///
    /// Fails once the event is set.
    pub fn add_count(&self, count: usize) -> SyncResult<()> {
        if self.try_add_count(count)? {
            Ok(())
        } else {
            Err(SyncError::AlreadySignaled)
        }
    }

    /// Raise the count unless the event is already set
    ///
    /// Returns false instead of failing when the count is already zero.
    pub fn try_add_count(&self, count: usize) -> SyncResult<bool> {
        if count == 0 {
            return Err(SyncError::InvalidCount);
        }

        let mut state = self.inner.state.lock();
        if state.current == 0 {
            return Ok(false);
        }
        state.current = state
            .current
            .checked_add(count)
            .ok_or(SyncError::CountOverflow)?;
        Ok(true)
    }

    /// Reset to the current initial count
    pub fn reset(&self) -> SyncResult<()> {
        let initial = self.inner.state.lock().initial;
        self.reset_to(initial)
    }

    /// Reset to `count`, which also becomes the new initial count
    ///
    /// Outstanding waits must have completed first.
    pub fn reset_to(&self, count: usize) -> SyncResult<()> {
        let mut state = self.inner.state.lock();
        if !state.waiters.is_empty() {
            return Err(SyncError::ResetWithWaiters {
                waiters: state.waiters.len(),
            });
        }
        state.current = count;
        state.initial = count;
        Ok(())
    }

    /// Remaining signals before the event is set
    pub fn current_count(&self) -> usize {
        self.inner.state.lock().current
    }

    /// Count the event was created with or last reset to
    pub fn initial_count(&self) -> usize {
        self.inner.state.lock().initial
    }

    /// Whether the count has reached zero
    pub fn is_set(&self) -> bool {
        self.inner.state.lock().current == 0
    }

    /// Pool backing contended waits, clone it to share with another instance
    pub fn pool(&self) -> &WaiterPool<()> {
        self.inner.core.pool()
    }
}

impl WaitOwner<()> for CountdownInner {
    fn remove_waiter(&self, cell: &Arc<WaiterCell<()>>, version: u64) -> bool {
        self.state.lock().waiters.remove(cell, version)
    }
}

impl fmt::Debug for CountdownEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("CountdownEvent")
            .field("current", &state.current)
            .field("initial", &state.initial)
            .field("waiting", &state.waiters.len())
            .finish()
    }
}
