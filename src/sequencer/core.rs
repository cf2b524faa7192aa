/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 5/8/26
******************************************************************************/

//! Core Sequencer implementation.
//!
//! The sequencer owns the state machine, the pending-request slots, and
//! every bounded table in this crate, and serializes all operating-point
//! changes into a single in-flight operation. All state lives on one
//! spawned task that drains a bounded command channel; callers interact
//! through [`SequencerClient`], and the execution task receives promoted
//! requests through a bounded dispatch channel and reports back through
//! [`CompletionReporter`]. Admission never waits for execution: a
//! synchronous caller gets a oneshot receiver in its receipt and blocks
//! on that instead.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};

use super::budget::{VoltageOffsetBudget, VoltageOffsetRequest};
use super::counter::{SequenceCounter, SequenceId};
use super::event::{
    CompletedScript, CompletionNotice, PublishedState, QuerySnapshot, ScriptDispatch,
    ScriptOutcome, SeqState,
};
use super::notify::{ActiveLists, EventKind, StagedRegistry, SubscriberId};
use super::profile::{LatencyHistogram, ProfilingSampleTable};
use super::request::{ChangeFlags, ChangeInput, ChangeProfile, ChangeRequest};
use super::result::{LockStatus, SequencerError};
use super::surface::{MAX_SCRIPT_STEPS, ScriptHeader, ScriptRegion, ScriptSurface};
use super::waiter::SyncWaiterQueue;
use crate::policy::ChangePolicy;
use crate::types::{ClockDomainMask, MemoryTimingParam, Requester, VoltRail};

/// Version of the sequencer's configuration surface.
pub const SEQUENCER_VERSION: u8 = 1;

/// Depth of the admission command channel.
const COMMAND_QUEUE_DEPTH: usize = 32;

bitflags! {
    /// Feature gates in the sequencer configuration.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
    pub struct ConfigFlags: u8 {
        /// Drain the voltage-offset budget into promoted requests.
        const VOLT_OFFSETS = 1 << 0;
        /// Fold the cached memory-timing parameter into promoted requests.
        const MEMORY_TUNING = 1 << 1;
    }
}

bitflags! {
    /// Step kinds the driver advertises support for.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
    pub struct StepMask: u8 {
        /// Voltage-rail programming steps.
        const VOLTAGE = 1 << 0;
        /// Clock-frequency programming steps.
        const FREQUENCY = 1 << 1;
        /// Memory-timing programming steps.
        const MEMORY_TIMING = 1 << 2;
    }
}

/// Sequencer configuration, readable and writable over the info calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequencerInfo {
    /// Configuration-surface version; writes with any other value are
    /// rejected.
    pub version: u8,
    /// Domains excluded from the required-coverage set.
    pub excluded: ClockDomainMask,
    /// Domains required even if not programmable.
    pub included: ClockDomainMask,
    /// Step kinds the driver advertises.
    pub advertised_steps: StepMask,
    /// Feature gates.
    pub flags: ConfigFlags,
}

impl Default for SequencerInfo {
    fn default() -> Self {
        SequencerInfo {
            version: SEQUENCER_VERSION,
            excluded: ClockDomainMask::empty(),
            included: ClockDomainMask::empty(),
            advertised_steps: StepMask::all(),
            flags: ConfigFlags::all(),
        }
    }
}

/// Receipt returned by a successful admission.
///
/// `completion` is present for synchronous callers and resolves with
/// the completed sequence id once the watched request (or a later one)
/// finishes.
#[derive(Debug)]
pub struct ChangeReceipt {
    /// Sequence id assigned to the admitted request.
    pub sequence: SequenceId,
    /// Completion receiver for synchronous callers.
    pub completion: Option<oneshot::Receiver<SequenceId>>,
}

enum Cmd {
    QueueChange {
        input: ChangeInput,
        requester: Requester,
        reply: oneshot::Sender<Result<ChangeReceipt, SequencerError>>,
    },
    QueueVoltageOffset {
        request: VoltageOffsetRequest,
        reply: oneshot::Sender<Result<(), SequencerError>>,
    },
    QueueMemoryTuning {
        param: MemoryTimingParam,
        reply: oneshot::Sender<Result<(), SequencerError>>,
    },
    Lock {
        acquire: bool,
        reply: oneshot::Sender<Result<LockStatus, SequencerError>>,
    },
    SetControl {
        excluded: ClockDomainMask,
        included: ClockDomainMask,
        reply: oneshot::Sender<Result<(), SequencerError>>,
    },
    Info {
        reply: oneshot::Sender<SequencerInfo>,
    },
    SetInfo {
        info: SequencerInfo,
        reply: oneshot::Sender<Result<(), SequencerError>>,
    },
    Query {
        reply: oneshot::Sender<Result<QuerySnapshot, SequencerError>>,
    },
    Profiling {
        reply: oneshot::Sender<LatencyHistogram>,
    },
    Rearm {
        reply: oneshot::Sender<Result<(), SequencerError>>,
    },
    ScriptCompleted {
        outcome: ScriptOutcome,
    },
}

/// The change sequencer: admission control and state machine for all
/// operating-point reconfiguration.
///
/// # Examples
///
/// ```no_run
/// use perfseq_rs::policy::StaticPolicy;
/// use perfseq_rs::sequencer::{InMemorySurface, Sequencer};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let mut sequencer = Sequencer::new(StaticPolicy::default(), InMemorySurface::new());
/// let client = sequencer.client();
/// let (mut scripts, reporter) = sequencer.executor_endpoints();
/// let handle = sequencer.spawn();
///
/// // The execution task drains `scripts` and reports through `reporter`;
/// // producers submit through `client`.
/// handle.wait().await?;
/// # Ok(())
/// # }
/// ```
pub struct Sequencer<P: ChangePolicy, S: ScriptSurface + Send + 'static> {
    policy: P,
    surface: S,
    info: SequencerInfo,
    counter: SequenceCounter,
    state: SeqState,
    lock_waiting: bool,

    pending_next: Option<ChangeRequest>,
    pending_force: Option<ChangeRequest>,
    current: Option<ChangeRequest>,
    cached_memory_timing: Option<MemoryTimingParam>,

    budget: VoltageOffsetBudget,
    waiters: SyncWaiterQueue,
    staged: Arc<StagedRegistry>,
    active: ActiveLists,
    samples: ProfilingSampleTable,
    histogram: LatencyHistogram,
    published: Arc<RwLock<PublishedState>>,

    total_span: Option<Instant>,
    first_change_tx: Option<oneshot::Sender<SequenceId>>,
    first_change_rx: Option<oneshot::Receiver<SequenceId>>,

    dispatch_tx: mpsc::Sender<ScriptDispatch>,
    dispatch_rx: Option<mpsc::Receiver<ScriptDispatch>>,
    cmd_tx: mpsc::Sender<Cmd>,
    cmd_rx: Option<mpsc::Receiver<Cmd>>,
}

impl<P: ChangePolicy, S: ScriptSurface + Send + 'static> Sequencer<P, S> {
    /// Creates a sequencer with the default configuration.
    #[must_use]
    pub fn new(policy: P, surface: S) -> Self {
        Self::with_info(policy, surface, SequencerInfo::default())
    }

    /// Creates a sequencer with an explicit configuration.
    #[must_use]
    pub fn with_info(policy: P, surface: S, info: SequencerInfo) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
        let (dispatch_tx, dispatch_rx) = mpsc::channel(1);
        let (first_change_tx, first_change_rx) = oneshot::channel();

        Sequencer {
            policy,
            surface,
            info,
            counter: SequenceCounter::new(),
            state: SeqState::Idle,
            lock_waiting: false,
            pending_next: None,
            pending_force: None,
            current: None,
            cached_memory_timing: None,
            budget: VoltageOffsetBudget::new(),
            waiters: SyncWaiterQueue::new(),
            staged: Arc::new(StagedRegistry::new()),
            active: ActiveLists::new(),
            samples: ProfilingSampleTable::new(),
            histogram: LatencyHistogram::new(),
            published: Arc::new(RwLock::new(PublishedState::default())),
            total_span: None,
            first_change_tx: Some(first_change_tx),
            first_change_rx: Some(first_change_rx),
            dispatch_tx,
            dispatch_rx: Some(dispatch_rx),
            cmd_tx,
            cmd_rx: Some(cmd_rx),
        }
    }

    /// Creates a client handle for submitting work.
    #[must_use]
    pub fn client(&self) -> SequencerClient {
        SequencerClient {
            cmd_tx: self.cmd_tx.clone(),
            staged: Arc::clone(&self.staged),
            published: Arc::clone(&self.published),
        }
    }

    /// Takes the execution task's endpoints: the dispatch receiver and
    /// the completion reporter.
    ///
    /// # Panics
    ///
    /// Panics if called more than once on the same Sequencer instance.
    #[must_use]
    pub fn executor_endpoints(&mut self) -> (mpsc::Receiver<ScriptDispatch>, CompletionReporter) {
        let rx = self
            .dispatch_rx
            .take()
            .expect("executor endpoints already taken");
        (
            rx,
            CompletionReporter {
                cmd_tx: self.cmd_tx.clone(),
            },
        )
    }

    /// Takes the one-shot receiver signaled on the first successful
    /// completion, for side effects deferred until a real operating
    /// point is established.
    ///
    /// # Panics
    ///
    /// Panics if called more than once on the same Sequencer instance.
    #[must_use]
    pub fn first_change(&mut self) -> oneshot::Receiver<SequenceId> {
        self.first_change_rx
            .take()
            .expect("first-change signal already taken")
    }

    /// Spawns the sequencer loop on a new task.
    ///
    /// # Panics
    ///
    /// Panics if called more than once on the same Sequencer instance.
    #[must_use]
    pub fn spawn(mut self) -> SequencerHandle {
        let cmd_rx = self.cmd_rx.take().expect("spawn called twice");

        let handle = tokio::spawn(async move {
            self.run_loop(cmd_rx).await;
        });

        SequencerHandle { handle }
    }

    /// Drains the command channel until every client and reporter is
    /// dropped.
    async fn run_loop(&mut self, mut cmd_rx: mpsc::Receiver<Cmd>) {
        while let Some(cmd) = cmd_rx.recv().await {
            match cmd {
                Cmd::QueueChange {
                    input,
                    requester,
                    reply,
                } => {
                    let result = self.admit_change(input, requester).await;
                    let _ = reply.send(result);
                }
                Cmd::QueueVoltageOffset { request, reply } => {
                    let result = self.admit_voltage_offset(request).await;
                    let _ = reply.send(result);
                }
                Cmd::QueueMemoryTuning { param, reply } => {
                    let result = self.admit_memory_tuning(param).await;
                    let _ = reply.send(result);
                }
                Cmd::Lock { acquire, reply } => {
                    let result = self.lock_transition(acquire);
                    let released = matches!(result, Ok(LockStatus::Released));
                    let _ = reply.send(result);
                    if released {
                        if let Err(err) = self.process_pending_change().await {
                            tracing::error!(%err, "promotion after unlock failed");
                        }
                    }
                }
                Cmd::SetControl {
                    excluded,
                    included,
                    reply,
                } => {
                    let _ = reply.send(self.set_control(excluded, included));
                }
                Cmd::Info { reply } => {
                    let _ = reply.send(self.info);
                }
                Cmd::SetInfo { info, reply } => {
                    let _ = reply.send(self.set_info(info));
                }
                Cmd::Query { reply } => {
                    let _ = reply.send(self.query());
                }
                Cmd::Profiling { reply } => {
                    let _ = reply.send(self.histogram.clone());
                }
                Cmd::Rearm { reply } => {
                    let _ = reply.send(self.rearm().await);
                }
                Cmd::ScriptCompleted { outcome } => {
                    if let Err(err) = self.on_script_completion(outcome).await {
                        tracing::error!(%err, "script completion handling failed");
                    }
                }
            }
        }
    }

    /// Full admission protocol for a change request.
    async fn admit_change(
        &mut self,
        input: ChangeInput,
        requester: Requester,
    ) -> Result<ChangeReceipt, SequencerError> {
        if input.pstate.is_invalid() {
            return Err(SequencerError::InvalidArgument {
                reason: "invalid pstate index",
            });
        }

        let sequence = self.counter.next();

        let mut completion = None;
        if !input.flags.contains(ChangeFlags::ASYNC) {
            let (tx, rx) = oneshot::channel();
            self.waiters.insert(sequence, requester, tx)?;
            completion = Some(rx);
        }

        if let Some(started) = input.queued_at {
            self.samples.record(sequence, started);
        }

        // A forced request supersedes whatever was queued at regular
        // priority, even if this admission fails validation below.
        let force = input.flags.contains(ChangeFlags::FORCE);
        if force && self.pending_next.take().is_some() {
            tracing::debug!(%sequence, "forced request supersedes the queued regular request");
        }

        if let Err(err) = self.validate_masks(&input) {
            self.waiters.remove(sequence);
            return Err(err);
        }

        let request = ChangeRequest::admit(input, sequence);
        if force {
            self.pending_force = Some(request);
        } else {
            self.pending_next = Some(request);
        }
        tracing::debug!(%sequence, ?requester, force, "change request admitted");

        if self.state.is_ready() {
            self.process_pending_change().await?;
        }

        Ok(ChangeReceipt {
            sequence,
            completion,
        })
    }

    /// A caller must not omit a domain the policy requires, and partial
    /// voltage programming is never allowed.
    fn validate_masks(&self, input: &ChangeInput) -> Result<(), SequencerError> {
        let required =
            (self.policy.programmable_domains() & !self.info.excluded) | self.info.included;
        if !input.clocks.domains().contains(required) {
            return Err(SequencerError::InvalidArgument {
                reason: "clock list does not cover the required domains",
            });
        }
        if input.voltages.rails() != self.policy.rail_set() {
            return Err(SequencerError::InvalidArgument {
                reason: "voltage list must cover the full rail set",
            });
        }
        Ok(())
    }

    /// Accumulates controller offsets; optionally synthesizes a refresh
    /// so the offsets reach hardware without an explicit request.
    async fn admit_voltage_offset(
        &mut self,
        request: VoltageOffsetRequest,
    ) -> Result<(), SequencerError> {
        for rail in VoltRail::ALL {
            if let Some(offset_uv) = request.offsets[rail.index()] {
                self.budget
                    .accumulate(request.source, rail, offset_uv, request.overwrite);
            }
        }

        if request.force_change && self.pending_next.is_none() && self.pending_force.is_none() {
            self.synthesize_refresh();
        }

        if self.state.is_ready() {
            self.process_pending_change().await?;
        }
        Ok(())
    }

    /// Caches the memory-timing parameter; synthesizes a refresh when
    /// nothing is pending to carry it.
    async fn admit_memory_tuning(
        &mut self,
        param: MemoryTimingParam,
    ) -> Result<(), SequencerError> {
        self.cached_memory_timing = Some(param);

        if self.pending_next.is_none() && self.pending_force.is_none() {
            self.synthesize_refresh();
        }

        if self.state.is_ready() {
            self.process_pending_change().await?;
        }
        Ok(())
    }

    /// Clones the authoritative record (current if in progress, else
    /// last published) into a zero-diff async request, so cached
    /// offsets and timing fold into the next executed script.
    fn synthesize_refresh(&mut self) {
        let base = if self.state == SeqState::InProgress {
            self.current.clone()
        } else {
            read_lock(&self.published).last_completed.clone()
        };
        let Some(base) = base else {
            tracing::debug!("no authoritative change to clone for a synthesized refresh");
            return;
        };

        let sequence = self.counter.next();
        let mut request = base;
        request.sequence = sequence;
        request.flags = ChangeFlags::ASYNC;
        request.vf_generation = self.policy.vf_generation();
        request.profile = ChangeProfile::default();
        tracing::debug!(%sequence, "synthesized zero-diff refresh request");
        self.pending_next = Some(request);
    }

    /// Promotes the highest-priority pending request and hands it to
    /// the execution task. Stale requests are discarded in place and
    /// the loop moves on to whatever is pending next.
    async fn process_pending_change(&mut self) -> Result<(), SequencerError> {
        loop {
            if !self.state.is_ready() {
                return Ok(());
            }
            let Some(mut request) = self
                .pending_force
                .take()
                .or_else(|| self.pending_next.take())
            else {
                return Ok(());
            };

            self.set_state(SeqState::InProgress);
            request.profile = ChangeProfile::default();
            self.total_span = Some(Instant::now());
            self.policy.quiesce_frequency_controller();

            let live = self.policy.vf_generation();
            if request.vf_generation != live && !request.vf_generation.is_override() {
                tracing::debug!(
                    sequence = %request.sequence,
                    requested = request.vf_generation.0,
                    live = live.0,
                    "stale request discarded without executing",
                );
                self.current = Some(request);
                self.complete_nothing_to_do();
                continue;
            }

            if self.info.flags.contains(ConfigFlags::VOLT_OFFSETS) {
                self.budget
                    .apply(&mut request.voltages, |rail| self.policy.offset_range(rail));
            }
            if self.info.flags.contains(ConfigFlags::MEMORY_TUNING) {
                if let Some(param) = self.cached_memory_timing {
                    request.memory_timing = Some(param);
                }
            }

            // The one safe point to adopt staged subscriber changes: no
            // delivery walk can be in progress here.
            self.active.sync_stale(&self.staged);

            self.current = Some(request.clone());
            tracing::debug!(sequence = %request.sequence, "dispatching change to execution task");
            if self
                .dispatch_tx
                .send(ScriptDispatch { request })
                .await
                .is_err()
            {
                tracing::error!("execution task queue is gone, latching fault");
                self.set_state(SeqState::Faulted);
                return Err(SequencerError::Fatal {
                    reason: "execution task unavailable",
                });
            }
            return Ok(());
        }
    }

    /// Completion callback, invoked only by the execution task (or by
    /// promotion itself for stale discards).
    async fn on_script_completion(&mut self, outcome: ScriptOutcome) -> Result<(), SequencerError> {
        if self.state != SeqState::InProgress {
            tracing::error!(state = ?self.state, "completion callback outside an in-flight change");
            return Err(SequencerError::InvalidState {
                operation: "script completion",
                state: self.state,
            });
        }

        match outcome {
            ScriptOutcome::NothingToDo => self.complete_nothing_to_do(),
            ScriptOutcome::Failed(failure) => {
                tracing::error!(
                    code = failure.code,
                    step = ?failure.failed_step,
                    "execution task reported unrecoverable failure",
                );
                // The failed request stays in `current` for post-mortem.
                self.total_span = None;
                self.set_state(SeqState::Faulted);
                return Err(SequencerError::Fatal {
                    reason: "script execution failed",
                });
            }
            ScriptOutcome::Completed(script) => {
                let Some(mut request) = self.current.take() else {
                    tracing::error!("completion with no current request");
                    return Err(SequencerError::InvalidState {
                        operation: "script completion",
                        state: self.state,
                    });
                };

                self.policy.resume_frequency_controller();
                let closed_loop = request.clocks.domains() & self.policy.closed_loop_domains();
                for domain in closed_loop.domains() {
                    let freq_khz = request.clocks.freq(domain).unwrap_or(0);
                    if !self.policy.regime_ok(domain, freq_khz) {
                        tracing::error!(
                            ?domain,
                            freq_khz,
                            "closed-loop domain left in an invalid regime",
                        );
                    }
                }

                let total_ns = self
                    .total_span
                    .take()
                    .map_or(0, |span| span.elapsed().as_nanos() as u64);
                request.profile.total_ns = total_ns;
                request.profile.script_ns = script.script_ns();

                // Publication point: the only write to the last-completed
                // record, held only across the publish step.
                let published = Arc::clone(&self.published);
                {
                    let mut guard = write_lock(&published);
                    guard.last_completed = Some(request.clone());
                    self.persist_completed(&script, total_ns);
                    self.samples
                        .fold_completed(request.sequence, &mut self.histogram);
                }

                if let Some(tx) = self.first_change_tx.take() {
                    let _ = tx.send(request.sequence);
                }

                self.set_state(SeqState::Idle);
                self.deliver_completion(request.sequence);
            }
        }

        if self.state.is_ready() {
            self.process_pending_change().await?;
        }
        Ok(())
    }

    /// Nothing-to-do completion: no publication, no histogram fold; the
    /// discarded request's waiters are still woken.
    fn complete_nothing_to_do(&mut self) {
        let Some(request) = self.current.take() else {
            return;
        };
        self.total_span = None;
        self.set_state(SeqState::Waiting);
        self.deliver_completion(request.sequence);
    }

    /// Writes the executed step records into the current region and
    /// copies it over the last-completed region.
    fn persist_completed(&mut self, script: &CompletedScript, total_ns: u64) {
        if script.steps.len() > MAX_SCRIPT_STEPS {
            tracing::error!(
                steps = script.steps.len(),
                limit = MAX_SCRIPT_STEPS,
                "script step records exceed the region capacity, truncating",
            );
        }
        let count = script.steps.len().min(MAX_SCRIPT_STEPS);
        self.surface.set_header(
            ScriptRegion::Current,
            ScriptHeader {
                step_count: count as u32,
                total_elapsed_ns: total_ns,
            },
        );
        for (index, step) in script.steps.iter().take(count).enumerate() {
            self.surface.set_step(ScriptRegion::Current, index, *step);
        }
        self.surface
            .copy_region(ScriptRegion::Current, ScriptRegion::LastCompleted);
    }

    /// Wakes covered waiters, notifies subscribers, and hands over a
    /// deferred lock once no synchronous waiter remains.
    fn deliver_completion(&mut self, completed: SequenceId) {
        self.waiters.notify_completed(completed);

        let lock_granted = self.lock_waiting && self.waiters.is_empty();
        let notice = CompletionNotice {
            sequence: completed,
            lock_acquired: lock_granted,
        };
        self.active.deliver(EventKind::Completion, notice);

        if lock_granted {
            self.lock_waiting = false;
            self.active.deliver(EventKind::LockGrant, notice);
            self.set_state(SeqState::Locked);
            tracing::debug!(%completed, "deferred lock granted");
        }
    }

    /// Lock/unlock state transitions.
    fn lock_transition(&mut self, acquire: bool) -> Result<LockStatus, SequencerError> {
        if acquire {
            return match self.state {
                SeqState::Locked => Err(SequencerError::InvalidState {
                    operation: "lock",
                    state: self.state,
                }),
                SeqState::InProgress | SeqState::Faulted => {
                    self.lock_waiting = true;
                    Ok(LockStatus::NotAvailable)
                }
                // A synchronous caller's expectations must not be
                // starved by a lock holder.
                SeqState::Waiting if !self.waiters.is_empty() => {
                    self.lock_waiting = true;
                    Ok(LockStatus::NotAvailable)
                }
                SeqState::Waiting | SeqState::Idle => {
                    self.set_state(SeqState::Locked);
                    Ok(LockStatus::Acquired)
                }
            };
        }

        if self.state != SeqState::Locked {
            return Err(SequencerError::InvalidState {
                operation: "unlock",
                state: self.state,
            });
        }
        self.set_state(SeqState::Idle);
        Ok(LockStatus::Released)
    }

    /// Updates the exclusion/inclusion masks; requires the lock.
    fn set_control(
        &mut self,
        excluded: ClockDomainMask,
        included: ClockDomainMask,
    ) -> Result<(), SequencerError> {
        if self.state != SeqState::Locked {
            return Err(SequencerError::InvalidState {
                operation: "set control",
                state: self.state,
            });
        }
        self.info.excluded = excluded;
        self.info.included = included;
        Ok(())
    }

    /// Replaces the configuration; the version must match.
    fn set_info(&mut self, info: SequencerInfo) -> Result<(), SequencerError> {
        if info.version != SEQUENCER_VERSION {
            return Err(SequencerError::InvalidArgument {
                reason: "unsupported sequencer version",
            });
        }
        self.info = info;
        Ok(())
    }

    /// Stages the last-completed script and snapshots it for a caller.
    fn query(&mut self) -> Result<QuerySnapshot, SequencerError> {
        self.surface
            .copy_region(ScriptRegion::LastCompleted, ScriptRegion::QueryStaging);
        let header = self.surface.header(ScriptRegion::QueryStaging);
        if header.step_count as usize > MAX_SCRIPT_STEPS {
            return Err(SequencerError::InvalidArgument {
                reason: "persisted step count exceeds the region capacity",
            });
        }

        let mut steps = Vec::with_capacity(header.step_count as usize);
        for index in 0..header.step_count as usize {
            if let Some(step) = self.surface.step(ScriptRegion::QueryStaging, index) {
                steps.push(step);
            }
        }

        let last_completed = read_lock(&self.published).last_completed.clone();
        Ok(QuerySnapshot {
            state: self.state,
            header,
            last_completed,
            steps,
        })
    }

    /// Explicit recovery transition out of the fault latch.
    async fn rearm(&mut self) -> Result<(), SequencerError> {
        if self.state != SeqState::Faulted {
            return Err(SequencerError::InvalidState {
                operation: "rearm",
                state: self.state,
            });
        }
        self.current = None;
        self.total_span = None;
        self.set_state(SeqState::Idle);
        tracing::warn!("sequencer rearmed after fault");
        self.process_pending_change().await
    }

    fn set_state(&mut self, state: SeqState) {
        if self.state != state {
            tracing::debug!(from = ?self.state, to = ?state, "state transition");
        }
        self.state = state;
        write_lock(&self.published).state = state;
    }
}

fn read_lock(lock: &RwLock<PublishedState>) -> RwLockReadGuard<'_, PublishedState> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write_lock(lock: &RwLock<PublishedState>) -> RwLockWriteGuard<'_, PublishedState> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

/// Cloneable handle for submitting work to a spawned sequencer.
#[derive(Clone)]
pub struct SequencerClient {
    cmd_tx: mpsc::Sender<Cmd>,
    staged: Arc<StagedRegistry>,
    published: Arc<RwLock<PublishedState>>,
}

impl SequencerClient {
    async fn roundtrip<R>(
        &self,
        build: impl FnOnce(oneshot::Sender<R>) -> Cmd,
    ) -> Result<R, SequencerError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(build(tx))
            .await
            .map_err(|_| SequencerError::Shutdown)?;
        rx.await.map_err(|_| SequencerError::Shutdown)
    }

    /// Submits a change request.
    ///
    /// # Errors
    ///
    /// Admission errors per the protocol, or [`SequencerError::Shutdown`]
    /// if the sequencer task is gone.
    pub async fn queue_change(
        &self,
        input: ChangeInput,
        requester: Requester,
    ) -> Result<ChangeReceipt, SequencerError> {
        self.roundtrip(|reply| Cmd::QueueChange {
            input,
            requester,
            reply,
        })
        .await?
    }

    /// Submits controller voltage offsets.
    ///
    /// # Errors
    ///
    /// [`SequencerError::Shutdown`] if the sequencer task is gone, or a
    /// fatal promotion error.
    pub async fn queue_voltage_offset(
        &self,
        request: VoltageOffsetRequest,
    ) -> Result<(), SequencerError> {
        self.roundtrip(|reply| Cmd::QueueVoltageOffset { request, reply })
            .await?
    }

    /// Submits a memory-timing change.
    ///
    /// # Errors
    ///
    /// [`SequencerError::Shutdown`] if the sequencer task is gone, or a
    /// fatal promotion error.
    pub async fn queue_memory_tuning(
        &self,
        param: MemoryTimingParam,
    ) -> Result<(), SequencerError> {
        self.roundtrip(|reply| Cmd::QueueMemoryTuning { param, reply })
            .await?
    }

    /// Requests the sequencer lock.
    ///
    /// # Errors
    ///
    /// [`SequencerError::InvalidState`] if already locked.
    pub async fn lock(&self) -> Result<LockStatus, SequencerError> {
        self.roundtrip(|reply| Cmd::Lock {
            acquire: true,
            reply,
        })
        .await?
    }

    /// Releases the sequencer lock and drains pending work.
    ///
    /// # Errors
    ///
    /// [`SequencerError::InvalidState`] if not locked.
    pub async fn unlock(&self) -> Result<LockStatus, SequencerError> {
        self.roundtrip(|reply| Cmd::Lock {
            acquire: false,
            reply,
        })
        .await?
    }

    /// Updates the exclusion/inclusion masks. The caller must hold the
    /// lock.
    ///
    /// # Errors
    ///
    /// [`SequencerError::InvalidState`] if the lock is not held.
    pub async fn set_control(
        &self,
        excluded: ClockDomainMask,
        included: ClockDomainMask,
    ) -> Result<(), SequencerError> {
        self.roundtrip(|reply| Cmd::SetControl {
            excluded,
            included,
            reply,
        })
        .await?
    }

    /// Reads the sequencer configuration.
    ///
    /// # Errors
    ///
    /// [`SequencerError::Shutdown`] if the sequencer task is gone.
    pub async fn info(&self) -> Result<SequencerInfo, SequencerError> {
        self.roundtrip(|reply| Cmd::Info { reply }).await
    }

    /// Writes the sequencer configuration.
    ///
    /// # Errors
    ///
    /// [`SequencerError::InvalidArgument`] on a version mismatch.
    pub async fn set_info(&self, info: SequencerInfo) -> Result<(), SequencerError> {
        self.roundtrip(|reply| Cmd::SetInfo { info, reply }).await?
    }

    /// Queries the last-completed script and change record.
    ///
    /// # Errors
    ///
    /// [`SequencerError::InvalidArgument`] if the persisted step count
    /// is out of bounds.
    pub async fn query(&self) -> Result<QuerySnapshot, SequencerError> {
        self.roundtrip(|reply| Cmd::Query { reply }).await?
    }

    /// Snapshots the completed-request latency histogram.
    ///
    /// # Errors
    ///
    /// [`SequencerError::Shutdown`] if the sequencer task is gone.
    pub async fn profiling(&self) -> Result<LatencyHistogram, SequencerError> {
        self.roundtrip(|reply| Cmd::Profiling { reply }).await
    }

    /// Rearms a faulted sequencer.
    ///
    /// # Errors
    ///
    /// [`SequencerError::InvalidState`] if the sequencer is not faulted.
    pub async fn rearm(&self) -> Result<(), SequencerError> {
        self.roundtrip(|reply| Cmd::Rearm { reply }).await?
    }

    /// Registers a notification mailbox. Takes effect at the next
    /// promotion safe point.
    pub fn subscribe(&self, kind: EventKind, tx: mpsc::Sender<CompletionNotice>) -> SubscriberId {
        self.staged.register(kind, tx)
    }

    /// Removes a subscription. Takes effect at the next promotion safe
    /// point.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        self.staged.unregister(id)
    }

    /// Snapshot of the published state and last-completed record.
    #[must_use]
    pub fn published(&self) -> PublishedState {
        read_lock(&self.published).clone()
    }

    /// The published sequencer state.
    #[must_use]
    pub fn state(&self) -> SeqState {
        read_lock(&self.published).state
    }
}

/// Completion entry point handed to the execution task.
#[derive(Clone)]
pub struct CompletionReporter {
    cmd_tx: mpsc::Sender<Cmd>,
}

impl CompletionReporter {
    /// Reports how the dispatched script ended.
    ///
    /// # Errors
    ///
    /// [`SequencerError::Shutdown`] if the sequencer task is gone.
    pub async fn complete(&self, outcome: ScriptOutcome) -> Result<(), SequencerError> {
        self.cmd_tx
            .send(Cmd::ScriptCompleted { outcome })
            .await
            .map_err(|_| SequencerError::Shutdown)
    }
}

/// Handle to a spawned sequencer task.
pub struct SequencerHandle {
    handle: tokio::task::JoinHandle<()>,
}

impl SequencerHandle {
    /// Waits for the sequencer to shut down.
    ///
    /// # Errors
    ///
    /// Returns the join error if the sequencer task panicked or was
    /// cancelled.
    pub async fn wait(self) -> Result<(), tokio::task::JoinError> {
        self.handle.await
    }
}
