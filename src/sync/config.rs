/*!
 * Synchronization Configuration
 *
 * Per-instance configuration for continuation dispatch and waiter pooling
 */

use super::schedule::{Dispatcher, Schedule};
use crate::core::limits::{DEFAULT_POOL_RETAIN, DEFAULT_SPIN_LIMIT};
use std::fmt;
use std::sync::Arc;

/// How a completed wait's continuation is run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContinuationPolicy {
    /// Wake the waiting task on the signaling (or cancelling) thread
    Inline,
    /// Hand the wake to the executor so the signaling call returns promptly
    #[default]
    Scheduled,
}

/// Synchronization configuration
#[derive(Clone)]
pub struct SyncConfig {
    /// Inline vs scheduled continuation dispatch
    pub continuation: ContinuationPolicy,
    /// Executor used for scheduled continuations
    ///
    /// `None` uses the tokio runtime current at dispatch time, and wakes
    /// inline when called outside any runtime.
    pub scheduler: Option<Arc<dyn Schedule>>,
    /// Spin iterations before a dropped handle backs off while its
    /// completion is being published
    pub spin_limit: u32,
    /// Idle waiters kept by a pool created from this configuration
    pub pool_retain: Option<usize>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            continuation: ContinuationPolicy::Scheduled,
            scheduler: None,
            spin_limit: DEFAULT_SPIN_LIMIT,
            pool_retain: DEFAULT_POOL_RETAIN,
        }
    }
}

impl fmt::Debug for SyncConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncConfig")
            .field("continuation", &self.continuation)
            .field("scheduler", &self.scheduler.as_ref().map(|s| s.name()))
            .field("spin_limit", &self.spin_limit)
            .field("pool_retain", &self.pool_retain)
            .finish()
    }
}

impl SyncConfig {
    /// Continuations run on the thread that completes the wait
    pub fn inline() -> Self {
        Self {
            continuation: ContinuationPolicy::Inline,
            ..Default::default()
        }
    }

    /// Continuations are handed to the executor (the default)
    pub fn scheduled() -> Self {
        Self::default()
    }

    /// Use an explicit executor for scheduled continuations
    pub fn with_scheduler(mut self, scheduler: Arc<dyn Schedule>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Bound the idle waiters of a pool created from this configuration
    pub fn with_pool_retain(mut self, retain: usize) -> Self {
        self.pool_retain = Some(retain);
        self
    }

    /// Override the spin budget used while awaiting an in-flight completion
    pub fn with_spin_limit(mut self, spin_limit: u32) -> Self {
        self.spin_limit = spin_limit;
        self
    }

    /// Resolve the continuation dispatcher for one primitive instance
    pub(crate) fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(self.continuation, self.scheduler.clone())
    }
}
