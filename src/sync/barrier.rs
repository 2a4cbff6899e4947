/*!
 * Cyclic Barrier
 *
 * Each phase completes when every participant has arrived. The last arrival
 * advances the phase, re-arms the barrier for the next phase and releases
 * everyone queued; it never waits on itself. Every arrival of a phase
 * resolves to that phase's number.
 *
 * A queued arrival that is cancelled or dropped is withdrawn: the phase's
 * remaining count goes back up, so a participant that left cannot complete
 * a phase.
 */

use super::cancel::CancelSource;
use super::config::SyncConfig;
use super::waiter::{
    is_cancelled, Chain, WaitCore, WaitFuture, WaitOwner, WaiterCell, WaiterPool, WaiterQueue,
};
use crate::core::errors::{SyncError, SyncResult};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};

struct BarrierState {
    participants: usize,
    remaining: usize,
    phase: u64,
    waiters: WaiterQueue<u64>,
}

impl BarrierState {
    /// Close the current phase, returning its number and the waiters to release
    fn advance(&mut self) -> (u64, Chain<u64>) {
        let completed = self.phase;
        self.phase = self.phase.wrapping_add(1);
        self.remaining = self.participants;
        (completed, self.waiters.detach_all())
    }
}

struct BarrierInner {
    state: Mutex<BarrierState>,
    core: WaitCore<u64>,
}

/// Async cyclic barrier
pub struct Barrier {
    inner: Arc<BarrierInner>,
}

impl Barrier {
    /// Create a barrier for `participants` participants
    pub fn new(participants: usize) -> Self {
        Self::with_config(participants, SyncConfig::default(), None)
    }

    /// Create with explicit configuration and an optional shared pool
    pub fn with_config(participants: usize, config: SyncConfig, pool: Option<WaiterPool<u64>>) -> Self {
        Self {
            inner: Arc::new(BarrierInner {
                state: Mutex::new(BarrierState {
                    participants,
                    remaining: participants,
                    phase: 0,
                    waiters: WaiterQueue::new(),
                }),
                core: WaitCore::new(&config, pool),
            }),
        }
    }

    /// Arrive and wait for the rest of the phase
    ///
    /// Resolves to the number of the phase this arrival belonged to. Fails
    /// synchronously when the barrier has no participants.
    pub fn signal_and_wait(&self) -> SyncResult<WaitFuture<'_, u64>> {
        self.signal_and_wait_inner(None)
    }

    /// Arrive and wait, withdrawing the arrival if `cancel` fires first
    pub fn signal_and_wait_with_cancel(&self, cancel: &CancelSource) -> SyncResult<WaitFuture<'_, u64>> {
        self.signal_and_wait_inner(Some(cancel))
    }

    fn signal_and_wait_inner(&self, cancel: Option<&CancelSource>) -> SyncResult<WaitFuture<'_, u64>> {
        if is_cancelled(cancel) {
            return Ok(WaitFuture::failed(SyncError::Cancelled));
        }

        let inner = &self.inner;
        let parked = {
            let mut state = inner.state.lock();
            if state.participants == 0 {
                return Err(SyncError::NoParticipants);
            }

            state.remaining -= 1;
            if state.remaining == 0 {
                let (completed, chain) = state.advance();
                drop(state);

                debug!(phase = completed, released = chain.len(), "barrier phase completed");
                inner.core.complete(chain, completed);
                return Ok(WaitFuture::ready(completed, &**inner));
            }
            inner.core.park(&mut state.waiters)
        };

        trace!("barrier arrival suspended");
        Ok(inner.core.suspend(parked, inner, cancel))
    }

    /// Add one participant to the current and later phases
    pub fn add_participant(&self) -> SyncResult<u64> {
        self.add_participants(1)
    }

    /// Add participants, returning the current phase number
    pub fn add_participants(&self, count: usize) -> SyncResult<u64> {
        if count == 0 {
            return Err(SyncError::InvalidCount);
        }

        let mut state = self.inner.state.lock();
        let participants = state
            .participants
            .checked_add(count)
            .ok_or(SyncError::CountOverflow)?;
        let remaining = state
            .remaining
            .checked_add(count)
            .ok_or(SyncError::CountOverflow)?;
        state.participants = participants;
        state.remaining = remaining;
        Ok(state.phase)
    }

    /// Remove one participant
    pub fn remove_participant(&self) -> SyncResult<u64> {
        self.remove_participants(1)
    }

    /// Remove participants that have not yet arrived in the current phase
    ///
    /// If that leaves no one outstanding, the phase completes as if the last
    /// participant had arrived. Returns the phase number current after the call.
    pub fn remove_participants(&self, count: usize) -> SyncResult<u64> {
        if count == 0 {
            return Err(SyncError::InvalidCount);
        }

        let (phase, released) = {
            let mut state = self.inner.state.lock();
            if count > state.remaining {
                return Err(SyncError::ParticipantUnderflow {
                    requested: count,
                    available: state.remaining,
                });
            }

            state.participants -= count;
            state.remaining -= count;
            if state.remaining > 0 || state.participants == 0 {
                // Nobody has arrived when every participant is removed
                debug_assert!(state.remaining > 0 || state.waiters.is_empty());
                return Ok(state.phase);
            }
            (state.phase, state.advance())
        };

        let (completed, chain) = released;
        debug!(phase = completed, released = chain.len(), "barrier phase completed by removal");
        self.inner.core.complete(chain, completed);
        Ok(phase.wrapping_add(1))
    }

    /// Number of the phase currently in progress
    pub fn current_phase(&self) -> u64 {
        self.inner.state.lock().phase
    }

    /// Participants per phase
    pub fn participant_count(&self) -> usize {
        self.inner.state.lock().participants
    }

    /// Participants yet to arrive in the current phase
    pub fn remaining(&self) -> usize {
        self.inner.state.lock().remaining
    }

    /// Pool backing contended waits, clone it to share with another instance
    pub fn pool(&self) -> &WaiterPool<u64> {
        self.inner.core.pool()
    }
}

impl WaitOwner<u64> for BarrierInner {
    fn remove_waiter(&self, cell: &Arc<WaiterCell<u64>>, version: u64) -> bool {
        let mut state = self.state.lock();
        if state.waiters.remove(cell, version) {
            state.remaining += 1;
            true
        } else {
            false
        }
    }
}

impl fmt::Debug for Barrier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Barrier")
            .field("participants", &state.participants)
            .field("remaining", &state.remaining)
            .field("phase", &state.phase)
            .finish()
    }
}
