/*!
 * Cancellation Source
 *
 * A cancellation signal with registered callbacks. A cancellable wait
 * registers a callback when it is queued; `cancel()` runs every registered
 * callback on the cancelling thread before returning, so a cancelled wait
 * has left its queue by the time `cancel()` returns.
 *
 * The source wraps a `CancellationToken` for callers that want to await
 * cancellation or hand it to other tokio code.
 */

use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use tracing::trace;

type Callback = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct Callbacks {
    next_id: u64,
    fired: bool,
    entries: Vec<(u64, Callback)>,
}

#[derive(Default)]
struct CancelShared {
    token: CancellationToken,
    callbacks: Mutex<Callbacks>,
}

/// Cloneable cancellation signal for waits
///
/// # Example
///
/// ```
/// use waitcore::{CancelSource, Semaphore, SyncConfig, SyncError};
///
/// # tokio_test::block_on(async {
/// let sem = Semaphore::with_config(0, SyncConfig::inline(), None);
/// let cancel = CancelSource::new();
/// let wait = sem.wait_with_cancel(&cancel);
///
/// cancel.cancel();
/// assert_eq!(sem.waiting(), 0);
/// assert_eq!(wait.await, Err(SyncError::Cancelled));
/// # });
/// ```
#[derive(Clone, Default)]
pub struct CancelSource {
    shared: Arc<CancelShared>,
}

impl CancelSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire the signal, running every registered callback
    ///
    /// Later calls do nothing.
    pub fn cancel(&self) {
        let entries = {
            let mut callbacks = self.shared.callbacks.lock();
            if callbacks.fired {
                return;
            }
            callbacks.fired = true;
            std::mem::take(&mut callbacks.entries)
        };

        self.shared.token.cancel();
        if !entries.is_empty() {
            trace!(callbacks = entries.len(), "running cancellation callbacks");
        }
        for (_, callback) in entries {
            callback();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.shared.callbacks.lock().fired
    }

    /// Resolves once the source is cancelled
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.shared.token.cancelled()
    }

    /// Token that is cancelled together with this source
    pub fn token(&self) -> CancellationToken {
        self.shared.token.clone()
    }

    /// Run `callback` once when the source is cancelled
    ///
    /// Runs it immediately on the calling thread if the source has already
    /// fired. Dropping the returned registration unregisters a callback that
    /// has not started yet.
    pub(crate) fn register<F>(&self, callback: F) -> CancelRegistration
    where
        F: FnOnce() + Send + 'static,
    {
        let mut callbacks = self.shared.callbacks.lock();
        if callbacks.fired {
            drop(callbacks);
            callback();
            return CancelRegistration {
                shared: Arc::clone(&self.shared),
                id: None,
            };
        }

        let id = callbacks.next_id;
        callbacks.next_id += 1;
        callbacks.entries.push((id, Box::new(callback)));
        CancelRegistration {
            shared: Arc::clone(&self.shared),
            id: Some(id),
        }
    }

    #[cfg(test)]
    fn registered(&self) -> usize {
        self.shared.callbacks.lock().entries.len()
    }
}

impl fmt::Debug for CancelSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let callbacks = self.shared.callbacks.lock();
        f.debug_struct("CancelSource")
            .field("cancelled", &callbacks.fired)
            .field("registered", &callbacks.entries.len())
            .finish()
    }
}

/// Keeps a callback registered until dropped
pub(crate) struct CancelRegistration {
    shared: Arc<CancelShared>,
    id: Option<u64>,
}

impl Drop for CancelRegistration {
    fn drop(&mut self) {
        let Some(id) = self.id else { return };
        let mut callbacks = self.shared.callbacks.lock();
        // Absent once `cancel` has taken it
        if let Some(index) = callbacks.entries.iter().position(|(entry, _)| *entry == id) {
            callbacks.entries.swap_remove(index);
        }
    }
}
