/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 5/8/26
******************************************************************************/

//! Change sequencer: total ordering of operating-point reconfiguration.
//!
//! This module provides the admission-control and state-machine engine
//! that accepts reconfiguration requests from multiple producers and
//! serializes them into a single in-flight operation handed to a
//! separate execution task.
//!
//! # Architecture
//!
//! - Requests are submitted via an async command channel and land in
//!   one of two pending slots; a forced request preempts the regular one
//! - A single task owns all state and promotes at most one request at a
//!   time to "current", dispatched to the execution task over a bounded
//!   channel
//! - The execution task reports back through a completion entry point;
//!   the sequencer publishes the result, wakes synchronous waiters,
//!   notifies subscribers, and drains the next pending request itself
//! - Stale requests (computed against an outdated VF curve) complete as
//!   "nothing to do" without touching hardware
//!
//! # Examples
//!
//! ```no_run
//! use perfseq_rs::policy::StaticPolicy;
//! use perfseq_rs::sequencer::{InMemorySurface, ScriptOutcome, Sequencer};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut sequencer = Sequencer::new(StaticPolicy::default(), InMemorySurface::new());
//! let client = sequencer.client();
//! let (mut scripts, reporter) = sequencer.executor_endpoints();
//! let handle = sequencer.spawn();
//!
//! // A minimal execution task: acknowledge every dispatched script.
//! tokio::spawn(async move {
//!     while let Some(_dispatch) = scripts.recv().await {
//!         reporter
//!             .complete(ScriptOutcome::Completed(Default::default()))
//!             .await
//!             .ok();
//!     }
//! });
//!
//! // Submit changes through `client`...
//! handle.wait().await?;
//! # Ok(())
//! # }
//! ```

pub mod budget;
pub mod core;
pub mod counter;
pub mod event;
pub mod notify;
pub mod profile;
pub mod request;
pub mod result;
pub mod surface;
pub mod waiter;

#[cfg(test)]
mod tests;

// Re-export main types
pub use budget::{TrimmedOffsets, VoltageOffsetBudget, VoltageOffsetRequest};
pub use core::{
    ChangeReceipt, CompletionReporter, ConfigFlags, SEQUENCER_VERSION, Sequencer, SequencerClient,
    SequencerHandle, SequencerInfo, StepMask,
};
pub use counter::{SequenceCounter, SequenceId};
pub use event::{
    CompletedScript, CompletionNotice, PublishedState, QuerySnapshot, ScriptDispatch,
    ScriptFailure, ScriptOutcome, SeqState,
};
pub use notify::{EventKind, MAX_SUBSCRIBERS, StagedRegistry, SubscriberId};
pub use profile::LatencyHistogram;
pub use request::{
    ChangeFlags, ChangeInput, ChangeProfile, ChangeRequest, ClockList, VoltEntry, VoltList,
};
pub use result::{LockStatus, SequencerError};
pub use surface::{
    InMemorySurface, MAX_SCRIPT_STEPS, ScriptHeader, ScriptRegion, ScriptStep, ScriptSurface,
    StepKind,
};
pub use waiter::{SYNC_WAITER_SLOTS, SyncWaiterQueue};
