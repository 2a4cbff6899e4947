/*!
 * Async Synchronization Primitives
 *
 * Semaphore, countdown event, barrier, exclusive lock and reader-writer lock
 * built on one shared waiter layer. Uncontended operations complete without
 * touching a waiter; contended waits reuse an embedded or pooled waiter
 * instead of allocating per wait.
 *
 * # Design
 *
 * Each primitive owns one mutex over its counters and queue(s). Waiters are
 * detached under that mutex and completed after it is released, so wakeups
 * never run inside a critical section. A queued wait is completed exactly
 * once: by the signal path or by the callback its `CancelSource` runs on
 * cancellation, whichever unlinks it first.
 */

mod barrier;
mod cancel;
mod config;
mod countdown;
mod lock;
mod rwlock;
mod schedule;
mod semaphore;
mod spinwait;
mod waiter;

pub use barrier::Barrier;
pub use cancel::CancelSource;
pub use config::{ContinuationPolicy, SyncConfig};
pub use countdown::CountdownEvent;
pub use lock::{Lock, LockFuture, LockReleaser};
pub use rwlock::{LockMode, ReadFuture, ReadReleaser, ReaderWriterLock, WriteFuture, WriteReleaser};
pub use schedule::{InlineSchedule, Schedule, TokioSchedule};
pub use semaphore::Semaphore;
pub use waiter::{PoolStats, WaitFuture, WaiterPool};
