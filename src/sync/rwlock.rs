/*!
 * Reader-Writer Lock
 *
 * `status` encodes the lock: positive is the number of active readers, zero
 * is free, -1 is one active writer. Readers and writers queue separately
 * under a single mutex so hand-off between the two is atomic.
 *
 * # Writer priority
 *
 * A new reader is admitted only while no writer is queued. A waiting writer
 * therefore takes the next release ahead of readers that arrive after it,
 * and readers already holding the lock are unaffected. When a writer
 * releases and no writer waits, every queued reader is admitted at once.
 */

use super::cancel::CancelSource;
use super::config::SyncConfig;
use super::waiter::{
    is_cancelled, Chain, WaitCore, WaitFuture, WaitOwner, WaiterCell, WaiterPool, WaiterQueue,
};
use crate::core::errors::{SyncError, SyncResult};
use parking_lot::Mutex;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tracing::{debug, trace};

const WRITE_LOCKED: isize = -1;

/// Kind of access a reader-writer waiter is granted
///
/// Pools shared between reader-writer locks are `WaiterPool<LockMode>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Read,
    Write,
}

struct RwState {
    status: isize,
    readers: WaiterQueue<LockMode>,
    writers: WaiterQueue<LockMode>,
}

impl RwState {
    #[inline]
    fn admits_reader(&self) -> bool {
        self.status >= 0 && self.writers.is_empty()
    }

    /// Pass a free lock to the next waiter(s)
    ///
    /// A queued writer wins; otherwise the whole reader queue is admitted.
    fn hand_off(&mut self) -> (Chain<LockMode>, LockMode) {
        debug_assert_eq!(self.status, 0);
        if !self.writers.is_empty() {
            self.status = WRITE_LOCKED;
            (self.writers.detach_first(1), LockMode::Write)
        } else {
            self.status = self.readers.len() as isize;
            (self.readers.detach_all(), LockMode::Read)
        }
    }
}

struct RwInner {
    state: Mutex<RwState>,
    core: WaitCore<LockMode>,
}

impl RwInner {
    fn release_read(&self) {
        let (chain, access) = {
            let mut state = self.state.lock();
            debug_assert!(state.status > 0, "reader released without read access");
            state.status -= 1;
            if state.status > 0 {
                return;
            }
            state.hand_off()
        };
        self.grant(chain, access);
    }

    fn release_write(&self) {
        let (chain, access) = {
            let mut state = self.state.lock();
            debug_assert_eq!(state.status, WRITE_LOCKED, "writer released without write access");
            state.status = 0;
            state.hand_off()
        };
        self.grant(chain, access);
    }

    fn grant(&self, chain: Chain<LockMode>, access: LockMode) {
        if chain.is_empty() {
            return;
        }
        match access {
            LockMode::Write => trace!("lock handed to writer"),
            LockMode::Read => debug!(readers = chain.len(), "reader batch admitted"),
        }
        self.core.complete(chain, access);
    }
}

/// Async reader-writer lock with writer priority
pub struct ReaderWriterLock {
    inner: Arc<RwInner>,
}

impl ReaderWriterLock {
    pub fn new() -> Self {
        Self::with_config(SyncConfig::default(), None)
    }

    /// Create with explicit configuration and an optional shared pool
    pub fn with_config(config: SyncConfig, pool: Option<WaiterPool<LockMode>>) -> Self {
        Self {
            inner: Arc::new(RwInner {
                state: Mutex::new(RwState {
                    status: 0,
                    readers: WaiterQueue::new(),
                    writers: WaiterQueue::new(),
                }),
                core: WaitCore::new(&config, pool),
            }),
        }
    }

    /// Acquire shared access
    pub fn read(&self) -> ReadFuture<'_> {
        ReadFuture {
            inner: self.read_inner(None),
            lock: self,
        }
    }

    /// Acquire shared access unless `cancel` fires first
    pub fn read_with_cancel(&self, cancel: &CancelSource) -> ReadFuture<'_> {
        ReadFuture {
            inner: self.read_inner(Some(cancel)),
            lock: self,
        }
    }

    fn read_inner(&self, cancel: Option<&CancelSource>) -> WaitFuture<'_, LockMode> {
        if is_cancelled(cancel) {
            return WaitFuture::failed(SyncError::Cancelled);
        }

        let inner = &self.inner;
        let parked = {
            let mut state = inner.state.lock();
            if state.admits_reader() {
                state.status += 1;
                return WaitFuture::ready(LockMode::Read, &**inner);
            }
            inner.core.park(&mut state.readers)
        };

        trace!("reader suspended");
        inner.core.suspend(parked, inner, cancel)
    }

    /// Acquire exclusive access
    pub fn write(&self) -> WriteFuture<'_> {
        WriteFuture {
            inner: self.write_inner(None),
            lock: self,
        }
    }

    /// Acquire exclusive access unless `cancel` fires first
    pub fn write_with_cancel(&self, cancel: &CancelSource) -> WriteFuture<'_> {
        WriteFuture {
            inner: self.write_inner(Some(cancel)),
            lock: self,
        }
    }

    fn write_inner(&self, cancel: Option<&CancelSource>) -> WaitFuture<'_, LockMode> {
        if is_cancelled(cancel) {
            return WaitFuture::failed(SyncError::Cancelled);
        }

        let inner = &self.inner;
        let parked = {
            let mut state = inner.state.lock();
            if state.status == 0 {
                state.status = WRITE_LOCKED;
                return WaitFuture::ready(LockMode::Write, &**inner);
            }
            inner.core.park(&mut state.writers)
        };

        trace!("writer suspended");
        inner.core.suspend(parked, inner, cancel)
    }

    /// Shared access only if it can be granted right now
    pub fn try_read(&self) -> Option<ReadReleaser<'_>> {
        let mut state = self.inner.state.lock();
        if state.admits_reader() {
            state.status += 1;
            Some(ReadReleaser { lock: self })
        } else {
            None
        }
    }

    /// Exclusive access only if the lock is free right now
    pub fn try_write(&self) -> Option<WriteReleaser<'_>> {
        let mut state = self.inner.state.lock();
        if state.status == 0 {
            state.status = WRITE_LOCKED;
            Some(WriteReleaser { lock: self })
        } else {
            None
        }
    }

    /// Active readers
    pub fn readers(&self) -> usize {
        self.inner.state.lock().status.max(0) as usize
    }

    /// Whether a writer holds the lock
    pub fn is_write_locked(&self) -> bool {
        self.inner.state.lock().status == WRITE_LOCKED
    }

    /// Queued readers
    pub fn waiting_readers(&self) -> usize {
        self.inner.state.lock().readers.len()
    }

    /// Queued writers
    pub fn waiting_writers(&self) -> usize {
        self.inner.state.lock().writers.len()
    }

    /// Pool backing contended waits, clone it to share with another instance
    pub fn pool(&self) -> &WaiterPool<LockMode> {
        self.inner.core.pool()
    }
}

impl Default for ReaderWriterLock {
    fn default() -> Self {
        Self::new()
    }
}

impl WaitOwner<LockMode> for RwInner {
    fn remove_waiter(&self, cell: &Arc<WaiterCell<LockMode>>, version: u64) -> bool {
        let chain = {
            let mut state = self.state.lock();
            if state.readers.remove(cell, version) {
                return true;
            }
            if !state.writers.remove(cell, version) {
                return false;
            }
            // Readers queued only behind the departed writer can go in now
            if !state.admits_reader() || state.readers.is_empty() {
                return true;
            }
            let admitted = state.readers.len() as isize;
            state.status += admitted;
            state.readers.detach_all()
        };

        self.grant(chain, LockMode::Read);
        true
    }

    fn abandon(&self, access: LockMode) {
        match access {
            LockMode::Read => self.release_read(),
            LockMode::Write => self.release_write(),
        }
    }
}

impl fmt::Debug for ReaderWriterLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("ReaderWriterLock")
            .field("status", &state.status)
            .field("waiting_readers", &state.readers.len())
            .field("waiting_writers", &state.writers.len())
            .finish()
    }
}

/// Awaitable shared acquisition
#[must_use = "futures do nothing unless polled"]
#[derive(Debug)]
pub struct ReadFuture<'a> {
    inner: WaitFuture<'a, LockMode>,
    lock: &'a ReaderWriterLock,
}

impl ReadFuture<'_> {
    pub fn is_completed(&self) -> bool {
        self.inner.is_completed()
    }
}

impl<'a> Future for ReadFuture<'a> {
    type Output = SyncResult<ReadReleaser<'a>>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let lock = self.lock;
        Pin::new(&mut self.inner)
            .poll(cx)
            .map(|outcome| outcome.map(|_| ReadReleaser { lock }))
    }
}

/// Awaitable exclusive acquisition
#[must_use = "futures do nothing unless polled"]
#[derive(Debug)]
pub struct WriteFuture<'a> {
    inner: WaitFuture<'a, LockMode>,
    lock: &'a ReaderWriterLock,
}

impl WriteFuture<'_> {
    pub fn is_completed(&self) -> bool {
        self.inner.is_completed()
    }
}

impl<'a> Future for WriteFuture<'a> {
    type Output = SyncResult<WriteReleaser<'a>>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let lock = self.lock;
        Pin::new(&mut self.inner)
            .poll(cx)
            .map(|outcome| outcome.map(|_| WriteReleaser { lock }))
    }
}

/// Shared access; dropping it releases
#[must_use = "read access is released as soon as the releaser is dropped"]
pub struct ReadReleaser<'a> {
    lock: &'a ReaderWriterLock,
}

impl Drop for ReadReleaser<'_> {
    fn drop(&mut self) {
        self.lock.inner.release_read();
    }
}

impl fmt::Debug for ReadReleaser<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadReleaser").finish_non_exhaustive()
    }
}

/// Exclusive access; dropping it releases
#[must_use = "write access is released as soon as the releaser is dropped"]
pub struct WriteReleaser<'a> {
    lock: &'a ReaderWriterLock,
}

impl Drop for WriteReleaser<'_> {
    fn drop(&mut self) {
        self.lock.inner.release_write();
    }
}

impl fmt::Debug for WriteReleaser<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriteReleaser").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::task::spawn;
    use tokio_test::{assert_pending, assert_ready, assert_ready_ok};

    fn inline_lock() -> ReaderWriterLock {
        ReaderWriterLock::with_config(SyncConfig::inline(), None)
    }

    #[test]
    fn test_readers_share() {
        let lock = ReaderWriterLock::new();
        let a = lock.try_read().unwrap();
        let b = assert_ready_ok!(spawn(lock.read()).poll());
        assert_eq!(lock.readers(), 2);
        assert!(lock.try_write().is_none());

        drop(a);
        drop(b);
        assert_eq!(lock.readers(), 0);
        assert!(lock.try_write().is_some());
    }

    #[test]
    fn test_writer_release_admits_reader_batch() {
        let lock = inline_lock();
        let writer = lock.try_write().unwrap();

        let mut readers: Vec<_> = (0..5).map(|_| spawn(lock.read())).collect();
        for reader in &mut readers {
            assert_pending!(reader.poll());
        }
        assert_eq!(lock.waiting_readers(), 5);

        drop(writer);
        assert_eq!(lock.readers(), 5);
        let held: Vec<_> = readers
            .iter_mut()
            .map(|reader| assert_ready_ok!(reader.poll()))
            .collect();
        assert_eq!(held.len(), 5);
        drop(held);
        assert_eq!(lock.readers(), 0);
    }

    #[test]
    fn test_waiting_writer_goes_first() {
        let lock = inline_lock();
        let writer = lock.try_write().unwrap();

        let mut next_writer = spawn(lock.write());
        assert_pending!(next_writer.poll());
        let mut readers: Vec<_> = (0..3).map(|_| spawn(lock.read())).collect();
        for reader in &mut readers {
            assert_pending!(reader.poll());
        }

        drop(writer);
        assert!(lock.is_write_locked());
        assert_eq!(lock.waiting_readers(), 3);
        for reader in &mut readers {
            assert!(!reader.is_woken());
        }

        let second = assert_ready_ok!(next_writer.poll());
        drop(second);
        assert_eq!(lock.readers(), 3);
        for reader in &mut readers {
            let _held = assert_ready_ok!(reader.poll());
        }
    }

    #[test]
    fn test_queued_writer_blocks_new_readers() {
        let lock = inline_lock();
        let reader = lock.try_read().unwrap();

        let mut writer = spawn(lock.write());
        assert_pending!(writer.poll());
        assert!(lock.try_read().is_none());

        let mut late_reader = spawn(lock.read());
        assert_pending!(late_reader.poll());

        drop(reader);
        assert!(lock.is_write_locked());
        let held = assert_ready_ok!(writer.poll());
        assert_pending!(late_reader.poll());

        drop(held);
        assert_ready_ok!(late_reader.poll());
    }

    #[test]
    fn test_withdrawn_writer_admits_readers() {
        let lock = inline_lock();
        let reader = lock.try_read().unwrap();
        let cancel = CancelSource::new();

        let mut writer = spawn(lock.write_with_cancel(&cancel));
        assert_pending!(writer.poll());
        let mut queued_reader = spawn(lock.read());
        assert_pending!(queued_reader.poll());

        cancel.cancel();
        // Readers are admitted by the cancellation itself
        assert_eq!(lock.readers(), 2);
        assert!(matches!(
            assert_ready!(writer.poll()),
            Err(SyncError::Cancelled)
        ));
        assert_eq!(lock.readers(), 2);
        assert!(queued_reader.is_woken());
        let _second = assert_ready_ok!(queued_reader.poll());
        drop(reader);
        assert_eq!(lock.readers(), 1);
    }

    #[test]
    fn test_dropped_writer_grant_releases() {
        let lock = inline_lock();
        let reader = lock.try_read().unwrap();

        let mut writer = spawn(lock.write());
        assert_pending!(writer.poll());
        drop(reader);
        assert!(lock.is_write_locked());

        drop(writer);
        assert!(!lock.is_write_locked());
        assert!(lock.try_write().is_some());
    }

    #[test]
    fn test_cancelled_writer_stops_blocking_readers() {
        let lock = inline_lock();
        let reader = lock.try_read().unwrap();
        let cancel = CancelSource::new();

        let mut writer = spawn(lock.write_with_cancel(&cancel));
        assert_pending!(writer.poll());
        assert!(lock.try_read().is_none());

        cancel.cancel();
        assert_eq!(lock.waiting_writers(), 0);
        let second = lock.try_read().expect("no writer queued");

        // Last reader out finds nobody to hand the lock to
        drop(second);
        drop(reader);
        assert!(!lock.is_write_locked());
        assert_eq!(lock.readers(), 0);
        assert!(matches!(
            assert_ready!(writer.poll()),
            Err(SyncError::Cancelled)
        ));
    }
}
