/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 5/8/26
******************************************************************************/

//! # perfseq-rs
//!
//! A change sequencer for GPU power/perf management firmware.
//!
//! Multiple internal producers (driver RPCs, closed-loop frequency and
//! voltage controllers, memory-tuning heuristics) concurrently request
//! changes to the chip's operating point: clock frequencies, voltage
//! rail targets, memory timing. This crate provides the engine that
//! arbitrates those requests: it admits and validates them, serializes
//! them into a single in-flight operation, hands that operation to a
//! separate execution task, publishes the completed result, and wakes
//! everyone who was waiting on it.
//!
//! The design carries the constraints of its embedded origin: every
//! table is fixed-capacity and never grows (a full waiter table is a
//! hard error, a full profiling table a silent drop), sequence ids are
//! small wrapping integers with a wraparound-safe completion order, and
//! a forced request strictly preempts a queued regular one.
//!
//! # Quick start
//!
//! ```no_run
//! use perfseq_rs::policy::StaticPolicy;
//! use perfseq_rs::sequencer::{
//!     ChangeFlags, ChangeInput, ClockList, InMemorySurface, ScriptOutcome, Sequencer, VoltList,
//! };
//! use perfseq_rs::types::{CacheGeneration, ClockDomain, PstateIndex, Requester, VoltRail};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut sequencer = Sequencer::new(StaticPolicy::default(), InMemorySurface::new());
//! let client = sequencer.client();
//! let (mut scripts, reporter) = sequencer.executor_endpoints();
//! let _handle = sequencer.spawn();
//!
//! // Execution task: here it just acknowledges every script.
//! tokio::spawn(async move {
//!     while let Some(_dispatch) = scripts.recv().await {
//!         reporter
//!             .complete(ScriptOutcome::Completed(Default::default()))
//!             .await
//!             .ok();
//!     }
//! });
//!
//! let mut clocks = ClockList::new();
//! for domain in ClockDomain::ALL {
//!     clocks.set(domain, 1_000_000);
//! }
//! let mut voltages = VoltList::new();
//! for rail in VoltRail::ALL {
//!     voltages.set(rail, 800_000, 750_000);
//! }
//!
//! let receipt = client
//!     .queue_change(
//!         ChangeInput {
//!             pstate: PstateIndex(2),
//!             clocks,
//!             voltages,
//!             flags: ChangeFlags::empty(),
//!             vf_generation: CacheGeneration(0),
//!             memory_timing: None,
//!             queued_at: None,
//!         },
//!         Requester::Driver,
//!     )
//!     .await?;
//!
//! // Synchronous caller: block on the completion receiver.
//! if let Some(completion) = receipt.completion {
//!     let completed = completion.await?;
//!     assert!(receipt.sequence.is_at_or_before(completed));
//! }
//! # Ok(())
//! # }
//! ```

pub mod policy;
pub mod sequencer;
pub mod types;

// Re-export the main entry points at the crate root.
pub use policy::{ChangePolicy, StaticPolicy};
pub use sequencer::{
    ChangeInput, ChangeReceipt, ChangeRequest, CompletionReporter, InMemorySurface, LockStatus,
    ScriptOutcome, ScriptSurface, SeqState, Sequencer, SequencerClient, SequencerError,
    SequencerHandle, SequencerInfo,
};
