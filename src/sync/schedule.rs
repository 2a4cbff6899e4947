/*!
 * Continuation Scheduling
 *
 * The executor capability consumed by the waiter core. A continuation is the
 * `Waker` of the suspended task; scheduling it means arranging for
 * `wake()` to run somewhere other than the completing call.
 */

use super::config::ContinuationPolicy;
use std::sync::Arc;
use std::task::Waker;
use tokio::runtime::Handle;
use tracing::debug;

/// Executor capability used for scheduled continuations
pub trait Schedule: Send + Sync {
    /// Arrange for `waker` to be woken outside the current call
    fn schedule(&self, waker: Waker);

    /// Get scheduler name for debugging
    fn name(&self) -> &'static str;
}

/// Wakes immediately on the calling thread
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineSchedule;

impl Schedule for InlineSchedule {
    #[inline]
    fn schedule(&self, waker: Waker) {
        waker.wake();
    }

    fn name(&self) -> &'static str {
        "inline"
    }
}

/// Spawns the wake onto a tokio runtime
#[derive(Debug, Clone)]
pub struct TokioSchedule {
    handle: Handle,
}

impl TokioSchedule {
    /// Schedule onto an explicit runtime
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Schedule onto the runtime the caller is running in, if any
    pub fn current() -> Option<Self> {
        Handle::try_current().ok().map(Self::new)
    }
}

impl Schedule for TokioSchedule {
    fn schedule(&self, waker: Waker) {
        self.handle.spawn(async move { waker.wake() });
    }

    fn name(&self) -> &'static str {
        "tokio"
    }
}

/// Resolved continuation policy for one primitive instance
#[derive(Clone)]
pub(crate) struct Dispatcher {
    policy: ContinuationPolicy,
    scheduler: Option<Arc<dyn Schedule>>,
}

impl Dispatcher {
    pub(crate) fn new(policy: ContinuationPolicy, scheduler: Option<Arc<dyn Schedule>>) -> Self {
        Self { policy, scheduler }
    }

    /// Whether waiters armed under this dispatcher run their continuation inline
    #[inline]
    pub(crate) fn run_inline(&self) -> bool {
        self.policy == ContinuationPolicy::Inline
    }

    /// Run or schedule a continuation
    pub(crate) fn dispatch(&self, waker: Waker, run_inline: bool) {
        if run_inline {
            waker.wake();
            return;
        }

        match &self.scheduler {
            Some(scheduler) => scheduler.schedule(waker),
            None => match Handle::try_current() {
                Ok(handle) => {
                    handle.spawn(async move { waker.wake() });
                }
                Err(_) => {
                    debug!("no runtime available, waking continuation inline");
                    waker.wake();
                }
            },
        }
    }
}
