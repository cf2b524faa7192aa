/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 5/8/26
******************************************************************************/

//! The seam between the sequencer and the hardware-object catalog.
//!
//! The sequencer decides *what* request runs next; everything it needs
//! to know about the chip (which clock domains are programmable, which
//! run under closed-loop control, the full rail set, per-rail offset
//! headroom, the live VF-curve generation) comes through
//! [`ChangePolicy`]. The trait also carries the two coordination hooks
//! for the closed-loop frequency controller: it is quiesced before a
//! change is dispatched and resumed (with a working-set reload) after a
//! successful completion.
//!
//! [`StaticPolicy`] is a table-driven implementation for hosts without
//! hardware: bring-up rigs, benchmarks, and the test suite.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::types::{
    CacheGeneration, ClockDomain, ClockDomainMask, FrequencyKhz, OffsetRange, VoltRail,
    VoltRailMask,
};

/// Chip-side knowledge and controller coordination for the sequencer.
pub trait ChangePolicy: Send + 'static {
    /// Domains that can be reprogrammed at all.
    fn programmable_domains(&self) -> ClockDomainMask;

    /// Domains capable of closed-loop operation.
    ///
    /// After a successful change, each touched domain in this set must
    /// be left in a valid operating regime; see [`regime_ok`].
    ///
    /// [`regime_ok`]: ChangePolicy::regime_ok
    fn closed_loop_domains(&self) -> ClockDomainMask;

    /// The complete rail set. Partial voltage programming is never
    /// allowed, so admission requires a request's rail mask to equal
    /// this exactly.
    fn rail_set(&self) -> VoltRailMask;

    /// Live generation of the voltage/frequency curve.
    fn vf_generation(&self) -> CacheGeneration;

    /// Legal offset range for `rail`.
    fn offset_range(&self, rail: VoltRail) -> OffsetRange;

    /// Stops the closed-loop frequency controller so it cannot race the
    /// manual reprogramming about to be dispatched.
    fn quiesce_frequency_controller(&mut self);

    /// Re-enables the closed-loop frequency controller and reloads its
    /// working set after a completed change.
    fn resume_frequency_controller(&mut self);

    /// Returns `true` if `freq_khz` is a valid operating regime for a
    /// closed-loop-capable `domain`.
    fn regime_ok(&self, domain: ClockDomain, freq_khz: FrequencyKhz) -> bool;
}

/// Table-driven [`ChangePolicy`] with no hardware behind it.
///
/// The VF generation lives in a shared atomic so a test (or a mock VF
/// publisher) can bump it while the sequencer owns the policy, and the
/// quiesce/resume hooks count invocations the same way.
///
/// # Examples
///
/// ```
/// use perfseq_rs::policy::{ChangePolicy, StaticPolicy};
/// use perfseq_rs::types::ClockDomainMask;
///
/// let policy = StaticPolicy::default();
/// assert_eq!(policy.programmable_domains(), ClockDomainMask::all());
/// ```
#[derive(Debug, Clone)]
pub struct StaticPolicy {
    /// Domains that may be reprogrammed.
    pub programmable: ClockDomainMask,
    /// Closed-loop-capable domains.
    pub closed_loop: ClockDomainMask,
    /// Complete rail set.
    pub rails: VoltRailMask,
    /// Per-rail legal offset range.
    pub offset_ranges: [OffsetRange; VoltRail::COUNT],
    /// Lowest frequency accepted as a valid closed-loop regime.
    pub closed_loop_floor_khz: FrequencyKhz,
    /// Live VF-curve generation, shared so it can be bumped externally.
    pub generation: Arc<AtomicU32>,
    /// Count of quiesce calls, shared for observation.
    pub quiesce_calls: Arc<AtomicU32>,
    /// Count of resume calls, shared for observation.
    pub resume_calls: Arc<AtomicU32>,
}

impl Default for StaticPolicy {
    fn default() -> Self {
        StaticPolicy {
            programmable: ClockDomainMask::all(),
            closed_loop: ClockDomainMask::GPC,
            rails: VoltRailMask::all(),
            offset_ranges: [OffsetRange::symmetric(25_000); VoltRail::COUNT],
            closed_loop_floor_khz: 0,
            generation: Arc::new(AtomicU32::new(0)),
            quiesce_calls: Arc::new(AtomicU32::new(0)),
            resume_calls: Arc::new(AtomicU32::new(0)),
        }
    }
}

impl ChangePolicy for StaticPolicy {
    fn programmable_domains(&self) -> ClockDomainMask {
        self.programmable
    }

    fn closed_loop_domains(&self) -> ClockDomainMask {
        self.closed_loop
    }

    fn rail_set(&self) -> VoltRailMask {
        self.rails
    }

    fn vf_generation(&self) -> CacheGeneration {
        CacheGeneration(self.generation.load(Ordering::Relaxed))
    }

    fn offset_range(&self, rail: VoltRail) -> OffsetRange {
        self.offset_ranges[rail.index()]
    }

    fn quiesce_frequency_controller(&mut self) {
        self.quiesce_calls.fetch_add(1, Ordering::Relaxed);
    }

    fn resume_frequency_controller(&mut self) {
        self.resume_calls.fetch_add(1, Ordering::Relaxed);
    }

    fn regime_ok(&self, _domain: ClockDomain, freq_khz: FrequencyKhz) -> bool {
        freq_khz >= self.closed_loop_floor_khz
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_is_shared() {
        let policy = StaticPolicy::default();
        let handle = policy.generation.clone();
        handle.store(7, Ordering::Relaxed);
        assert_eq!(policy.vf_generation(), CacheGeneration(7));
    }

    #[test]
    fn test_quiesce_resume_counters() {
        let mut policy = StaticPolicy::default();
        policy.quiesce_frequency_controller();
        policy.quiesce_frequency_controller();
        policy.resume_frequency_controller();
        assert_eq!(policy.quiesce_calls.load(Ordering::Relaxed), 2);
        assert_eq!(policy.resume_calls.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_regime_floor() {
        let policy = StaticPolicy {
            closed_loop_floor_khz: 500_000,
            ..StaticPolicy::default()
        };
        assert!(!policy.regime_ok(ClockDomain::Gpc, 400_000));
        assert!(policy.regime_ok(ClockDomain::Gpc, 500_000));
    }
}
