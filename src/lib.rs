/*!
 * Waitcore Library
 * Allocation-free async synchronization primitives
 */

pub mod core;
pub mod monitoring;
pub mod sync;

// Re-exports
pub use crate::core::errors::{SyncError, SyncResult};
pub use monitoring::init_tracing;
pub use sync::{
    Barrier, CancelSource, ContinuationPolicy, CountdownEvent, InlineSchedule, Lock, LockFuture,
    LockMode, LockReleaser, PoolStats, ReadFuture, ReadReleaser, ReaderWriterLock, Schedule,
    Semaphore, SyncConfig, TokioSchedule, WaitFuture, WaiterPool, WriteFuture, WriteReleaser,
};
pub use tokio_util::sync::CancellationToken;
