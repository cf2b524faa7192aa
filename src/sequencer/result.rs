/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 5/8/26
******************************************************************************/

//! Error taxonomy and lock result codes.
//!
//! Every admission and lock call returns a result code; nothing panics
//! across the crate boundary. Fatal conditions additionally latch the
//! sequencer's `Faulted` state, which halts all future promotion until
//! an explicit rearm.

use thiserror::Error;

use super::event::SeqState;

/// Errors surfaced by the sequencer API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SequencerError {
    /// Malformed caller input: invalid pstate, incomplete clock or
    /// voltage coverage, version mismatch, oversized step count.
    #[error("invalid argument: {reason}")]
    InvalidArgument {
        /// What was wrong with the input.
        reason: &'static str,
    },

    /// API misuse for the current state (redundant lock, release while
    /// unlocked, completion outside an in-flight change, rearm while
    /// healthy).
    #[error("invalid state for {operation}: {state:?}")]
    InvalidState {
        /// The operation that was attempted.
        operation: &'static str,
        /// The state it was attempted in.
        state: SeqState,
    },

    /// The fixed synchronous-waiter table has no free slot. The table
    /// never grows; the caller must retry later.
    #[error("synchronous waiter table is full, retry later")]
    WaiterTableFull,

    /// The sequencer task is gone.
    #[error("sequencer has been shut down")]
    Shutdown,

    /// Unrecoverable failure: the execution task reported one, or the
    /// dispatch channel died. The sequencer is latched `Faulted`.
    #[error("fatal: {reason}")]
    Fatal {
        /// What failed.
        reason: &'static str,
    },
}

/// Result code of a lock or unlock call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockStatus {
    /// The lock was taken by this call.
    Acquired,
    /// The lock could not be taken now; the request is remembered and
    /// granted automatically once the sequencer quiesces.
    NotAvailable,
    /// The lock was released.
    Released,
}

impl LockStatus {
    /// Returns `true` if the caller now holds the lock.
    #[inline]
    #[must_use]
    pub fn is_acquired(self) -> bool {
        matches!(self, LockStatus::Acquired)
    }
}
