/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 5/8/26
******************************************************************************/

//! Shared per-rail voltage-offset budget.
//!
//! Independent controllers contribute signed offsets per rail. At
//! promotion time the cached contributions are drained into the
//! outgoing request: each source's offset is clamped into whatever
//! headroom the rail policy still allows, and the clamped amount is
//! subtracted from the remaining headroom before the next source is
//! processed. [`OffsetSource::TRIM_ORDER`] fixes who gets first call:
//! the closed-loop frequency controller is trimmed least, the manual
//! margin most. Order-dependent clamping, not proportional sharing.

use crate::types::{OffsetRange, OffsetSource, OffsetUv, VoltRail};

use super::request::VoltList;

/// One controller's offset submission.
///
/// `force_change` asks the sequencer to make the offsets reach hardware
/// even when no request is pending, by synthesizing a zero-diff refresh
/// of the authoritative operating point.
#[derive(Debug, Clone, Copy)]
pub struct VoltageOffsetRequest {
    /// Which controller is contributing.
    pub source: OffsetSource,
    /// Offset per rail; `None` leaves that rail's cache untouched.
    pub offsets: [Option<OffsetUv>; VoltRail::COUNT],
    /// Replace the cached value instead of accumulating into it.
    pub overwrite: bool,
    /// Synthesize a refresh if nothing is pending.
    pub force_change: bool,
}

impl VoltageOffsetRequest {
    /// An empty submission for `source`.
    #[must_use]
    pub fn new(source: OffsetSource) -> Self {
        VoltageOffsetRequest {
            source,
            offsets: [None; VoltRail::COUNT],
            overwrite: false,
            force_change: false,
        }
    }

    /// Sets the offset for one rail.
    #[must_use]
    pub fn with_offset(mut self, rail: VoltRail, offset_uv: OffsetUv) -> Self {
        self.offsets[rail.index()] = Some(offset_uv);
        self
    }
}

/// Result of trimming one rail's cached offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TrimmedOffsets {
    /// Clamped contribution per source, in trim order index.
    pub per_source: [OffsetUv; OffsetSource::COUNT],
    /// Sum of the clamped contributions.
    pub total_uv: OffsetUv,
}

/// Accumulator of per-rail, per-source voltage offsets.
///
/// # Examples
///
/// ```
/// use perfseq_rs::sequencer::VoltageOffsetBudget;
/// use perfseq_rs::types::{OffsetRange, OffsetSource, VoltRail};
///
/// let mut budget = VoltageOffsetBudget::new();
/// budget.accumulate(OffsetSource::Margin, VoltRail::Logic, 5_000, false);
/// budget.accumulate(OffsetSource::Margin, VoltRail::Logic, 5_000, false);
///
/// let trimmed = budget.trim(VoltRail::Logic, OffsetRange::symmetric(25_000));
/// assert_eq!(trimmed.total_uv, 10_000);
/// ```
#[derive(Debug, Default)]
pub struct VoltageOffsetBudget {
    cached: [[OffsetUv; VoltRail::COUNT]; OffsetSource::COUNT],
}

impl VoltageOffsetBudget {
    /// An empty budget.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or, with `overwrite`, replaces) `source`'s cached offset
    /// for `rail`.
    pub fn accumulate(
        &mut self,
        source: OffsetSource,
        rail: VoltRail,
        offset_uv: OffsetUv,
        overwrite: bool,
    ) {
        let slot = &mut self.cached[source.index()][rail.index()];
        if overwrite {
            *slot = offset_uv;
        } else {
            *slot = slot.saturating_add(offset_uv);
        }
    }

    /// The cached offset for one source/rail pair.
    #[must_use]
    pub fn cached(&self, source: OffsetSource, rail: VoltRail) -> OffsetUv {
        self.cached[source.index()][rail.index()]
    }

    /// Clamps each source's cached offset for `rail` into the shrinking
    /// headroom of `range`, in [`OffsetSource::TRIM_ORDER`].
    #[must_use]
    pub fn trim(&self, rail: VoltRail, range: OffsetRange) -> TrimmedOffsets {
        let mut positive_left = range.positive_max_uv.max(0);
        let mut negative_left = range.negative_max_uv.min(0);
        let mut trimmed = TrimmedOffsets::default();

        for source in OffsetSource::TRIM_ORDER {
            let raw = self.cached[source.index()][rail.index()];
            let clamped = raw.clamp(negative_left, positive_left);
            if clamped > 0 {
                positive_left -= clamped;
            } else {
                negative_left -= clamped;
            }
            trimmed.per_source[source.index()] = clamped;
            trimmed.total_uv += clamped;
        }

        trimmed
    }

    /// Drains the budget into a request's voltage list: every rail the
    /// request carries gets its trimmed total folded into the target.
    ///
    /// `range_for` supplies the rail policy's legal range per rail.
    pub fn apply(&self, voltages: &mut VoltList, range_for: impl Fn(VoltRail) -> OffsetRange) {
        for rail in voltages.rails().rails() {
            let trimmed = self.trim(rail, range_for(rail));
            voltages.apply_offset(rail, trimmed.total_uv);
        }
    }
}
