/*!
 * Wait Handles
 *
 * `WaitFuture` is the awaitable returned by every wait operation. It is
 * either already resolved (the uncontended path, which never touches a
 * waiter) or backed by an armed waiter cell queued on its primitive.
 *
 * # Exactly-once completion
 *
 * A queued cell can be completed by two actors: the primitive's signal path
 * (which detaches it under the primitive lock) or the callback registered
 * on its `CancelSource` (which asks the primitive to `remove_waiter` under
 * the same lock). Whichever observes membership wins; the loser does
 * nothing. The callback runs inside `cancel()`, so a cancelled wait stops
 * counting as queued before `cancel()` returns, whether or not its handle
 * is being polled.
 *
 * # Dropping
 *
 * Dropping a pending handle withdraws the wait. Dropping a handle whose
 * grant arrived but was never consumed hands the grant back through
 * `WaitOwner::abandon`, so permits and locks are never leaked.
 */

use super::cell::WaiterCell;
use crate::core::errors::{SyncError, SyncResult};
use crate::sync::cancel::{CancelRegistration, CancelSource};
use crate::sync::schedule::Dispatcher;
use crate::sync::spinwait::SpinWait;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tracing::trace;

/// Implemented by every primitive that queues waiters
pub(crate) trait WaitOwner<T>: Send + Sync {
    /// Unlink a queued waiter under the primitive's critical section
    ///
    /// Returns true only if the cell was still queued for arm cycle
    /// `version`, making the caller its sole completer.
    fn remove_waiter(&self, cell: &Arc<WaiterCell<T>>, version: u64) -> bool;

    /// Give back a grant whose handle was dropped before consuming it
    fn abandon(&self, _value: T) {}
}

/// Whether an optional source has already fired
#[inline]
pub(crate) fn is_cancelled(cancel: Option<&CancelSource>) -> bool {
    cancel.is_some_and(CancelSource::is_cancelled)
}

/// Body of the callback a cancellable wait registers on its source
pub(crate) fn cancel_waiter<T>(
    owner: &dyn WaitOwner<T>,
    cell: &Arc<WaiterCell<T>>,
    version: u64,
    dispatcher: &Dispatcher,
) {
    if owner.remove_waiter(cell, version) {
        trace!("wait cancelled before grant");
        cell.complete(Err(SyncError::Cancelled), dispatcher);
    }
}

/// Awaitable handle for one wait
///
/// Resolves to `Ok(value)` when granted or `Err(SyncError::Cancelled)` when
/// its cancellation source won. Polling again after completion panics.
#[must_use = "futures do nothing unless polled"]
pub struct WaitFuture<'a, T> {
    stage: Stage<'a, T>,
}

enum Stage<'a, T> {
    Ready {
        outcome: SyncResult<T>,
        owner: Option<&'a dyn WaitOwner<T>>,
    },
    Waiting(Pending<'a, T>),
    Done,
}

struct Pending<'a, T> {
    cell: Arc<WaiterCell<T>>,
    version: u64,
    owner: &'a dyn WaitOwner<T>,
    registration: Option<CancelRegistration>,
    spin_limit: u32,
}

impl<'a, T> WaitFuture<'a, T> {
    /// Already granted; `owner` receives the grant back if it is dropped unpolled
    pub(crate) fn ready(value: T, owner: &'a dyn WaitOwner<T>) -> Self {
        Self {
            stage: Stage::Ready {
                outcome: Ok(value),
                owner: Some(owner),
            },
        }
    }

    /// Already failed
    pub(crate) fn failed(error: SyncError) -> Self {
        Self {
            stage: Stage::Ready {
                outcome: Err(error),
                owner: None,
            },
        }
    }

    /// Backed by an armed, queued cell
    pub(crate) fn pending(
        cell: Arc<WaiterCell<T>>,
        version: u64,
        owner: &'a dyn WaitOwner<T>,
        registration: Option<CancelRegistration>,
        spin_limit: u32,
    ) -> Self {
        Self {
            stage: Stage::Waiting(Pending {
                cell,
                version,
                owner,
                registration,
                spin_limit,
            }),
        }
    }

    /// Whether the outcome is available without suspending
    pub fn is_completed(&self) -> bool {
        match &self.stage {
            Stage::Ready { .. } | Stage::Done => true,
            Stage::Waiting(pending) => pending.cell.is_completed(pending.version),
        }
    }
}

impl<'a, T> Pending<'a, T> {
    fn poll_wait(&mut self, cx: &mut Context<'_>) -> Poll<SyncResult<T>> {
        match self.cell.poll_outcome(self.version, cx.waker()) {
            Some(outcome) => {
                self.registration = None;
                Arc::clone(&self.cell).recycle();
                Poll::Ready(outcome)
            }
            None => Poll::Pending,
        }
    }

    /// Give up the wait from `Drop`
    fn withdraw(mut self) {
        self.registration = None;
        if self.owner.remove_waiter(&self.cell, self.version) {
            trace!("pending wait withdrawn");
            self.cell.recycle();
            return;
        }

        // Detached by the signal path or a cancellation callback; its
        // publish is already in flight
        let cell = &self.cell;
        let version = self.version;
        let outcome = SpinWait::new(self.spin_limit).until(|| cell.try_take(version));
        self.cell.recycle();

        if let Ok(value) = outcome {
            trace!("granted wait dropped, returning grant");
            self.owner.abandon(value);
        }
    }
}

impl<T> Future for WaitFuture<'_, T> {
    type Output = SyncResult<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match std::mem::replace(&mut this.stage, Stage::Done) {
            Stage::Ready { outcome, .. } => Poll::Ready(outcome),
            Stage::Waiting(mut pending) => match pending.poll_wait(cx) {
                Poll::Ready(outcome) => Poll::Ready(outcome),
                Poll::Pending => {
                    this.stage = Stage::Waiting(pending);
                    Poll::Pending
                }
            },
            Stage::Done => panic!("WaitFuture polled after completion"),
        }
    }
}

// Never pin-projected
impl<T> Unpin for WaitFuture<'_, T> {}

impl<T> Drop for WaitFuture<'_, T> {
    fn drop(&mut self) {
        match std::mem::replace(&mut self.stage, Stage::Done) {
            Stage::Ready {
                outcome: Ok(value),
                owner: Some(owner),
            } => owner.abandon(value),
            Stage::Waiting(pending) => pending.withdraw(),
            _ => {}
        }
    }
}

impl<T> fmt::Debug for WaitFuture<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stage = match &self.stage {
            Stage::Ready { .. } => "ready",
            Stage::Waiting(_) => "waiting",
            Stage::Done => "done",
        };
        f.debug_struct("WaitFuture")
            .field("stage", &stage)
            .field("completed", &self.is_completed())
            .finish()
    }
}
