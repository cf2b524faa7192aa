/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 5/8/26
******************************************************************************/

//! Change-request types.
//!
//! [`ChangeInput`] is what a caller hands to admission; [`ChangeRequest`]
//! is the stamped unit of work that flows through the pending slots, the
//! dispatch to the execution task, and, on success, publication as the
//! last-completed record.
//!
//! The clock and voltage lists are a validity mask plus a fixed array
//! indexed by domain/rail id. Entries exist only for set mask bits, so
//! the list can never claim more entries than its mask has bits, and no
//! allocation happens after construction.

use std::time::Instant;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use super::counter::SequenceId;
use crate::types::{
    CacheGeneration, ClockDomain, ClockDomainMask, FrequencyKhz, MemoryTimingParam, Microvolts,
    OffsetUv, PstateIndex, VoltRail, VoltRailMask,
};

bitflags! {
    /// Behavior flags on a change request.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
    pub struct ChangeFlags: u8 {
        /// Caller does not want a synchronous completion notification.
        const ASYNC = 1 << 0;
        /// High-priority request: supersedes any queued regular request.
        const FORCE = 1 << 1;
    }
}

/// Requested frequencies, keyed by clock domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ClockList {
    domains: ClockDomainMask,
    freq_khz: [FrequencyKhz; ClockDomain::COUNT],
}

impl ClockList {
    /// An empty list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the target frequency for `domain`.
    pub fn set(&mut self, domain: ClockDomain, freq_khz: FrequencyKhz) -> &mut Self {
        self.domains |= domain.mask();
        self.freq_khz[domain.index()] = freq_khz;
        self
    }

    /// The domains this list carries values for.
    #[inline]
    #[must_use]
    pub fn domains(&self) -> ClockDomainMask {
        self.domains
    }

    /// The requested frequency for `domain`, if present.
    #[must_use]
    pub fn freq(&self, domain: ClockDomain) -> Option<FrequencyKhz> {
        self.domains
            .contains(domain.mask())
            .then(|| self.freq_khz[domain.index()])
    }

    /// Number of populated entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.domains.bits().count_ones() as usize
    }

    /// Returns `true` if no entries are populated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }
}

/// Target for one voltage rail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VoltEntry {
    /// Target voltage in microvolts.
    pub target_uv: Microvolts,
    /// Noise-unaware minimum in microvolts.
    pub noise_unaware_min_uv: Microvolts,
    /// Offset folded in from the shared budget at promotion time.
    pub applied_offset_uv: OffsetUv,
}

/// Requested rail targets, keyed by voltage rail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VoltList {
    rails: VoltRailMask,
    entries: [VoltEntry; VoltRail::COUNT],
}

impl VoltList {
    /// An empty list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the target for `rail`.
    pub fn set(&mut self, rail: VoltRail, target_uv: Microvolts, noise_unaware_min_uv: Microvolts) -> &mut Self {
        self.rails |= rail.mask();
        self.entries[rail.index()] = VoltEntry {
            target_uv,
            noise_unaware_min_uv,
            applied_offset_uv: 0,
        };
        self
    }

    /// The rails this list carries values for.
    #[inline]
    #[must_use]
    pub fn rails(&self) -> VoltRailMask {
        self.rails
    }

    /// The entry for `rail`, if present.
    #[must_use]
    pub fn entry(&self, rail: VoltRail) -> Option<&VoltEntry> {
        self.rails
            .contains(rail.mask())
            .then(|| &self.entries[rail.index()])
    }

    /// Folds a trimmed offset into `rail`'s target.
    ///
    /// The target saturates at zero rather than underflowing for
    /// pathological negative offsets.
    pub fn apply_offset(&mut self, rail: VoltRail, offset_uv: OffsetUv) {
        if !self.rails.contains(rail.mask()) {
            return;
        }
        let entry = &mut self.entries[rail.index()];
        entry.applied_offset_uv = offset_uv;
        entry.target_uv = entry.target_uv.saturating_add_signed(offset_uv);
    }

    /// Number of populated entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rails.bits().count_ones() as usize
    }

    /// Returns `true` if no entries are populated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rails.is_empty()
    }
}

/// Per-request elapsed-time record, filled in over the request's life.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ChangeProfile {
    /// Wall time from promotion to publication, in nanoseconds.
    pub total_ns: u64,
    /// Sum of the executed script's per-step times, in nanoseconds.
    pub script_ns: u64,
}

/// What a caller submits to admission.
#[derive(Debug, Clone)]
pub struct ChangeInput {
    /// Target pstate. [`PstateIndex::INVALID`] is rejected.
    pub pstate: PstateIndex,
    /// Requested clock-domain frequencies.
    pub clocks: ClockList,
    /// Requested rail targets. Must cover the full rail set.
    pub voltages: VoltList,
    /// Behavior flags.
    pub flags: ChangeFlags,
    /// VF-curve generation this request was computed against.
    pub vf_generation: CacheGeneration,
    /// Optional memory-timing parameter.
    pub memory_timing: Option<MemoryTimingParam>,
    /// When the caller built the request; feeds the latency histogram.
    pub queued_at: Option<Instant>,
}

/// The unit of work: an admitted, sequence-stamped change request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRequest {
    /// Target pstate.
    pub pstate: PstateIndex,
    /// Requested clock-domain frequencies.
    pub clocks: ClockList,
    /// Requested rail targets, with budget offsets folded in at
    /// promotion time.
    pub voltages: VoltList,
    /// Behavior flags.
    pub flags: ChangeFlags,
    /// VF-curve generation this request was computed against.
    pub vf_generation: CacheGeneration,
    /// Memory-timing parameter, if any.
    pub memory_timing: Option<MemoryTimingParam>,
    /// Sequence id assigned at admission.
    pub sequence: SequenceId,
    /// Elapsed-time record.
    pub profile: ChangeProfile,
}

impl ChangeRequest {
    /// Stamps an admitted input with its sequence id.
    #[must_use]
    pub fn admit(input: ChangeInput, sequence: SequenceId) -> Self {
        ChangeRequest {
            pstate: input.pstate,
            clocks: input.clocks,
            voltages: input.voltages,
            flags: input.flags,
            vf_generation: input.vf_generation,
            memory_timing: input.memory_timing,
            sequence,
            profile: ChangeProfile::default(),
        }
    }

    /// Returns `true` if the caller asked for a synchronous completion.
    #[inline]
    #[must_use]
    pub fn is_sync(&self) -> bool {
        !self.flags.contains(ChangeFlags::ASYNC)
    }
}
