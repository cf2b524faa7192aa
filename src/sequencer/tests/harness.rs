/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 5/8/26
******************************************************************************/

//! Shared rigs for the sequencer scenario tests.

use tokio::sync::{mpsc, oneshot};

use crate::policy::StaticPolicy;
use crate::sequencer::core::{CompletionReporter, Sequencer, SequencerClient, SequencerInfo};
use crate::sequencer::event::{CompletedScript, ScriptDispatch, ScriptOutcome};
use crate::sequencer::request::{ChangeFlags, ChangeInput, ClockList, VoltList};
use crate::sequencer::surface::{InMemorySurface, ScriptStep, StepKind};
use crate::sequencer::SequenceId;
use crate::types::{CacheGeneration, ClockDomain, PstateIndex, VoltRail};

/// A sequencer whose execution task the test drives by hand.
pub struct Rig {
    pub client: SequencerClient,
    pub policy: StaticPolicy,
    pub scripts: mpsc::Receiver<ScriptDispatch>,
    pub reporter: CompletionReporter,
    pub first_change: oneshot::Receiver<SequenceId>,
}

/// Step records the stand-in execution task reports.
pub fn executed_steps() -> CompletedScript {
    CompletedScript {
        steps: vec![
            ScriptStep {
                kind: StepKind::Voltage,
                elapsed_ns: 120_000,
            },
            ScriptStep {
                kind: StepKind::Frequency,
                elapsed_ns: 80_000,
            },
        ],
    }
}

/// Spawns a sequencer and hands the execution endpoints to the test.
pub fn manual_rig() -> Rig {
    manual_rig_with(SequencerInfo::default())
}

/// Same as [`manual_rig`], with an explicit configuration.
pub fn manual_rig_with(info: SequencerInfo) -> Rig {
    let policy = StaticPolicy::default();
    let mut sequencer = Sequencer::with_info(policy.clone(), InMemorySurface::new(), info);
    let client = sequencer.client();
    let (scripts, reporter) = sequencer.executor_endpoints();
    let first_change = sequencer.first_change();
    let _handle = sequencer.spawn();

    Rig {
        client,
        policy,
        scripts,
        reporter,
        first_change,
    }
}

/// Spawns a sequencer plus an execution task that acknowledges every
/// dispatched script with [`executed_steps`].
pub fn auto_rig() -> (SequencerClient, StaticPolicy) {
    let Rig {
        client,
        policy,
        mut scripts,
        reporter,
        ..
    } = manual_rig();

    tokio::spawn(async move {
        while let Some(_dispatch) = scripts.recv().await {
            reporter
                .complete(ScriptOutcome::Completed(executed_steps()))
                .await
                .ok();
        }
    });

    (client, policy)
}

/// A synchronous full-coverage change input at pstate 2.
pub fn full_input() -> ChangeInput {
    let mut clocks = ClockList::new();
    for domain in ClockDomain::ALL {
        clocks.set(domain, 1_000_000);
    }
    let mut voltages = VoltList::new();
    for rail in VoltRail::ALL {
        voltages.set(rail, 800_000, 750_000);
    }

    ChangeInput {
        pstate: PstateIndex(2),
        clocks,
        voltages,
        flags: ChangeFlags::empty(),
        vf_generation: CacheGeneration(0),
        memory_timing: None,
        queued_at: None,
    }
}

/// An asynchronous variant of [`full_input`].
pub fn async_input() -> ChangeInput {
    let mut input = full_input();
    input.flags = ChangeFlags::ASYNC;
    input
}
