/*!
 * Error Types
 * Centralized error handling with thiserror, miette, and serde support
 */

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for synchronization operations
pub type SyncResult<T> = Result<T, SyncError>;

/// Synchronization errors with serialization support
///
/// Usage and capacity errors are returned synchronously from the offending
/// call and are always detected before any state is mutated. `Cancelled` is
/// only ever observed through the cancelled wait's own handle.
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Diagnostic)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum SyncError {
    #[error("Wait was cancelled")]
    #[diagnostic(
        code(sync::cancelled),
        help("The cancellation source fired before the wait was granted. Re-issue the wait if needed.")
    )]
    Cancelled,

    #[error("Count must be at least 1")]
    #[diagnostic(
        code(sync::invalid_count),
        help("Signal, release and participant counts are strictly positive.")
    )]
    InvalidCount,

    #[error("Counter overflow")]
    #[diagnostic(
        code(sync::count_overflow),
        help("The resulting count does not fit in the primitive's counter.")
    )]
    CountOverflow,

    #[error("Event is already signaled")]
    #[diagnostic(
        code(sync::already_signaled),
        help("The countdown reached zero. Reset it before signaling or adding counts again.")
    )]
    AlreadySignaled,

    #[error("Signal count {requested} exceeds remaining count {remaining}")]
    #[diagnostic(
        code(sync::signal_exceeds_count),
        help("A countdown event cannot be signaled past zero.")
    )]
    SignalExceedsCount { requested: usize, remaining: usize },

    #[error("Cannot reset while {waiters} waiters are pending")]
    #[diagnostic(
        code(sync::reset_with_waiters),
        help("Let every outstanding wait complete or cancel it before resetting.")
    )]
    ResetWithWaiters { waiters: usize },

    #[error("Cannot remove {requested} participants, only {available} available")]
    #[diagnostic(
        code(sync::participant_underflow),
        help("Participants that already arrived in the current phase cannot be removed.")
    )]
    ParticipantUnderflow { requested: usize, available: usize },

    #[error("Barrier has no participants")]
    #[diagnostic(
        code(sync::no_participants),
        help("Add participants before signaling the barrier.")
    )]
    NoParticipants,
}

impl SyncError {
    /// Whether this error is the cancellation outcome of a wait
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, SyncError::Cancelled)
    }
}
