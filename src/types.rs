/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 5/8/26
******************************************************************************/

//! Hardware identity and unit types shared across the crate.
//!
//! Clock domains and voltage rails are closed enums with a companion
//! fixed-size bitmask type, so the three-mask admission algebra
//! (subset-of, union, invert) reads as named set operations instead of
//! raw bit twiddling.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// Clock frequency in kHz.
pub type FrequencyKhz = u32;

/// Voltage in microvolts.
pub type Microvolts = u32;

/// Signed voltage offset in microvolts.
pub type OffsetUv = i32;

/// A single memory-timing tunable (e.g. row-activation spacing).
pub type MemoryTimingParam = u16;

/// Independently programmable clock sources on the chip.
///
/// The discriminant doubles as the index into fixed-size per-domain
/// tables and as the bit position in [`ClockDomainMask`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ClockDomain {
    /// Graphics core clock.
    Gpc = 0,
    /// System clock.
    Sys = 1,
    /// Crossbar clock.
    Xbar = 2,
    /// Hub clock.
    Hub = 3,
    /// Host interface clock.
    Host = 4,
    /// Display clock.
    Disp = 5,
    /// Video decode clock.
    Nvd = 6,
    /// Memory clock.
    Mclk = 7,
}

impl ClockDomain {
    /// Number of clock domains.
    pub const COUNT: usize = 8;

    /// All domains, in index order.
    pub const ALL: [ClockDomain; Self::COUNT] = [
        ClockDomain::Gpc,
        ClockDomain::Sys,
        ClockDomain::Xbar,
        ClockDomain::Hub,
        ClockDomain::Host,
        ClockDomain::Disp,
        ClockDomain::Nvd,
        ClockDomain::Mclk,
    ];

    /// Index of this domain into fixed per-domain tables.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// The single-bit mask for this domain.
    #[inline]
    #[must_use]
    pub const fn mask(self) -> ClockDomainMask {
        ClockDomainMask::from_bits_truncate(1 << self as u8)
    }
}

/// Independently programmable voltage supplies on the chip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum VoltRail {
    /// Main logic rail.
    Logic = 0,
    /// SRAM rail.
    Sram = 1,
    /// Memory subsystem rail.
    Msvdd = 2,
}

impl VoltRail {
    /// Number of voltage rails.
    pub const COUNT: usize = 3;

    /// All rails, in index order.
    pub const ALL: [VoltRail; Self::COUNT] = [VoltRail::Logic, VoltRail::Sram, VoltRail::Msvdd];

    /// Index of this rail into fixed per-rail tables.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// The single-bit mask for this rail.
    #[inline]
    #[must_use]
    pub const fn mask(self) -> VoltRailMask {
        VoltRailMask::from_bits_truncate(1 << self as u8)
    }
}

bitflags! {
    /// Set of [`ClockDomain`]s.
    ///
    /// # Examples
    ///
    /// ```
    /// use perfseq_rs::types::{ClockDomain, ClockDomainMask};
    ///
    /// let required = ClockDomain::Gpc.mask() | ClockDomain::Sys.mask();
    /// let supplied = required | ClockDomain::Mclk.mask();
    /// assert!(supplied.contains(required));
    /// ```
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
    pub struct ClockDomainMask: u8 {
        /// Graphics core clock.
        const GPC = 1 << 0;
        /// System clock.
        const SYS = 1 << 1;
        /// Crossbar clock.
        const XBAR = 1 << 2;
        /// Hub clock.
        const HUB = 1 << 3;
        /// Host interface clock.
        const HOST = 1 << 4;
        /// Display clock.
        const DISP = 1 << 5;
        /// Video decode clock.
        const NVD = 1 << 6;
        /// Memory clock.
        const MCLK = 1 << 7;
    }
}

bitflags! {
    /// Set of [`VoltRail`]s.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
    pub struct VoltRailMask: u8 {
        /// Main logic rail.
        const LOGIC = 1 << 0;
        /// SRAM rail.
        const SRAM = 1 << 1;
        /// Memory subsystem rail.
        const MSVDD = 1 << 2;
    }
}

impl ClockDomainMask {
    /// Iterates the domains present in this mask, in index order.
    pub fn domains(self) -> impl Iterator<Item = ClockDomain> {
        ClockDomain::ALL
            .into_iter()
            .filter(move |d| self.contains(d.mask()))
    }
}

impl VoltRailMask {
    /// Iterates the rails present in this mask, in index order.
    pub fn rails(self) -> impl Iterator<Item = VoltRail> {
        VoltRail::ALL
            .into_iter()
            .filter(move |r| self.contains(r.mask()))
    }
}

/// Discrete hardware performance level index.
///
/// [`PstateIndex::INVALID`] is the sentinel for "no pstate"; admission
/// rejects it outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PstateIndex(pub u8);

impl PstateIndex {
    /// Sentinel for an unset/invalid pstate.
    pub const INVALID: PstateIndex = PstateIndex(u8::MAX);

    /// Returns `true` if this is the invalid sentinel.
    #[inline]
    #[must_use]
    pub const fn is_invalid(self) -> bool {
        self.0 == u8::MAX
    }
}

/// Generation counter of the voltage/frequency curve a request was
/// computed against.
///
/// A request whose generation no longer matches the live curve at
/// promotion time is stale and is discarded without executing.
/// [`CacheGeneration::TOOLING_OVERRIDE`] bypasses the staleness check
/// (used by diagnostic tooling that programs points off-curve).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheGeneration(pub u32);

impl CacheGeneration {
    /// Sentinel that bypasses the staleness check.
    pub const TOOLING_OVERRIDE: CacheGeneration = CacheGeneration(u32::MAX);

    /// Returns `true` if this is the tooling-override sentinel.
    #[inline]
    #[must_use]
    pub const fn is_override(self) -> bool {
        self.0 == u32::MAX
    }
}

/// Identity of the task submitting a change request.
///
/// Recorded alongside synchronous waiters so a stuck waiter can be
/// attributed in diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Requester {
    /// Driver-originated RPC.
    Driver,
    /// Closed-loop frequency controller.
    FreqController,
    /// Closed-loop voltage controller.
    VoltController,
    /// Memory-tuning heuristic.
    MemoryTuning,
}

/// Producers that contribute voltage offsets into the shared budget.
///
/// [`OffsetSource::TRIM_ORDER`] fixes which source gets first call on
/// the per-rail headroom when contributions are trimmed; see
/// [`VoltageOffsetBudget`](crate::sequencer::VoltageOffsetBudget).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum OffsetSource {
    /// Closed-loop frequency controller.
    FreqController = 0,
    /// Closed-loop voltage controller.
    VoltController = 1,
    /// Manually configured margin.
    Margin = 2,
}

impl OffsetSource {
    /// Number of offset sources.
    pub const COUNT: usize = 3;

    /// The order in which cached offsets are clamped against the
    /// remaining per-rail headroom. The frequency controller claims
    /// headroom first, the manual margin last. This ordering is policy
    /// and must not be changed.
    pub const TRIM_ORDER: [OffsetSource; Self::COUNT] = [
        OffsetSource::FreqController,
        OffsetSource::VoltController,
        OffsetSource::Margin,
    ];

    /// Index of this source into fixed per-source tables.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }
}

/// Legal offset range for one rail, from the rail policy.
///
/// `negative_max_uv` is the most negative offset allowed (`<= 0`),
/// `positive_max_uv` the most positive (`>= 0`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffsetRange {
    /// Largest allowed negative offset, in microvolts (non-positive).
    pub negative_max_uv: OffsetUv,
    /// Largest allowed positive offset, in microvolts (non-negative).
    pub positive_max_uv: OffsetUv,
}

impl OffsetRange {
    /// A range that allows no offset at all.
    pub const ZERO: OffsetRange = OffsetRange {
        negative_max_uv: 0,
        positive_max_uv: 0,
    };

    /// Symmetric range `[-bound, +bound]`.
    #[must_use]
    pub const fn symmetric(bound_uv: OffsetUv) -> Self {
        OffsetRange {
            negative_max_uv: -bound_uv,
            positive_max_uv: bound_uv,
        }
    }
}
