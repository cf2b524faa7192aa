/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 5/8/26
******************************************************************************/

//! Bounded table of synchronous-completion waiters.
//!
//! A caller that wants to block until its request completes registers a
//! waiter at admission and receives the paired oneshot receiver. The
//! table is a fixed array of slots scanned linearly; it never grows.
//! Firmware memory is bounded, so a full table is a hard error the
//! caller must retry later, never a silent drop.

use tokio::sync::oneshot;

use super::counter::SequenceId;
use super::result::SequencerError;
use crate::types::Requester;

/// Number of waiter slots. Exceeding this rejects the admission.
pub const SYNC_WAITER_SLOTS: usize = 8;

#[derive(Debug)]
struct SyncWaiter {
    sequence: SequenceId,
    requester: Requester,
    reply: oneshot::Sender<SequenceId>,
}

/// Fixed-capacity waiter table.
#[derive(Debug, Default)]
pub struct SyncWaiterQueue {
    slots: [Option<SyncWaiter>; SYNC_WAITER_SLOTS],
}

impl SyncWaiterQueue {
    /// An empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a waiter for `sequence`.
    ///
    /// # Errors
    ///
    /// [`SequencerError::WaiterTableFull`] if no slot is free.
    pub fn insert(
        &mut self,
        sequence: SequenceId,
        requester: Requester,
        reply: oneshot::Sender<SequenceId>,
    ) -> Result<(), SequencerError> {
        let Some(slot) = self.slots.iter_mut().find(|s| s.is_none()) else {
            return Err(SequencerError::WaiterTableFull);
        };
        *slot = Some(SyncWaiter {
            sequence,
            requester,
            reply,
        });
        Ok(())
    }

    /// Removes the waiter registered for exactly `sequence`, if any.
    ///
    /// Used when an admission fails after its waiter was registered, so
    /// a rejected call leaves no residue.
    pub fn remove(&mut self, sequence: SequenceId) {
        for slot in &mut self.slots {
            if slot.as_ref().is_some_and(|w| w.sequence == sequence) {
                *slot = None;
            }
        }
    }

    /// Wakes and frees every waiter whose sequence id is at or before
    /// `completed`. Each woken waiter receives the completed id, once.
    ///
    /// A send can fail only if the caller dropped its receiver; that is
    /// logged and the remaining deliveries continue.
    pub fn notify_completed(&mut self, completed: SequenceId) -> usize {
        let mut woken = 0;
        for slot in &mut self.slots {
            let Some(waiter) = slot.take_if(|w| w.sequence.is_at_or_before(completed)) else {
                continue;
            };
            if waiter.reply.send(completed).is_err() {
                tracing::warn!(
                    sequence = %waiter.sequence,
                    requester = ?waiter.requester,
                    "sync waiter receiver dropped before completion",
                );
            }
            woken += 1;
        }
        woken
    }

    /// Number of occupied slots.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Returns `true` if no waiter is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(|s| s.is_none())
    }
}
