/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 5/8/26
******************************************************************************/

//! Records that cross the sequencer's boundary.
//!
//! This module defines the published state, the dispatch sent to the
//! execution task, the outcome it reports back, and the notification
//! and query records delivered to other tasks.

use serde::{Deserialize, Serialize};

use super::counter::SequenceId;
use super::request::ChangeRequest;
use super::surface::{ScriptHeader, ScriptStep};

/// The sequencer's externally visible state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SeqState {
    /// Nothing queued or running.
    #[default]
    Idle,
    /// Between requests, ready for the next promotion.
    Waiting,
    /// Held by a lock owner; enqueue is accepted, promotion is not.
    Locked,
    /// A change request is being executed.
    InProgress,
    /// Latched after an unrecoverable failure; promotion halts until an
    /// explicit rearm.
    Faulted,
}

impl SeqState {
    /// Returns `true` in the states admission may promote from.
    #[inline]
    #[must_use]
    pub fn is_ready(self) -> bool {
        matches!(self, SeqState::Idle | SeqState::Waiting)
    }
}

/// Snapshot other tasks read for telemetry: the state field plus the
/// last published change record. Written only under the publish lock.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PublishedState {
    /// Current sequencer state.
    pub state: SeqState,
    /// The most recently published completed request.
    pub last_completed: Option<ChangeRequest>,
}

/// Message sent to the execution task for one promoted request.
#[derive(Debug, Clone)]
pub struct ScriptDispatch {
    /// The request to execute.
    pub request: ChangeRequest,
}

/// Step records reported by the execution task for a finished script.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompletedScript {
    /// Executed steps, in order.
    pub steps: Vec<ScriptStep>,
}

impl CompletedScript {
    /// Sum of the per-step times.
    #[must_use]
    pub fn script_ns(&self) -> u64 {
        self.steps.iter().map(|s| s.elapsed_ns).sum()
    }
}

/// Failure report from the execution task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScriptFailure {
    /// Hardware- or task-specific failure code.
    pub code: u32,
    /// Step index the failure occurred at, if known.
    pub failed_step: Option<u32>,
}

/// How one executed (or short-circuited) request ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptOutcome {
    /// The script ran to completion.
    Completed(CompletedScript),
    /// The request was discarded without touching hardware (stale VF
    /// generation). A normal completion variant, not an error.
    NothingToDo,
    /// The script failed unrecoverably.
    Failed(ScriptFailure),
}

/// Completion record delivered to notification subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionNotice {
    /// The completed sequence id.
    pub sequence: SequenceId,
    /// Set when a deferred lock request became satisfiable with this
    /// completion.
    pub lock_acquired: bool,
}

/// Result of a query: header, last published change, and the persisted
/// step records, staged out of the live region first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuerySnapshot {
    /// Sequencer state at query time.
    pub state: SeqState,
    /// Header of the last completed script.
    pub header: ScriptHeader,
    /// The last published change record, if any.
    pub last_completed: Option<ChangeRequest>,
    /// Step records of the last completed script.
    pub steps: Vec<ScriptStep>,
}
