/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 5/8/26
******************************************************************************/

//! Wrapping sequence counter and wraparound-safe ordering.
//!
//! Every admitted change request is stamped with a [`SequenceId`] drawn
//! from a small-width modular counter. Because the counter wraps, "has
//! this id completed" cannot be a plain `<=`; [`SequenceId::is_at_or_before`]
//! performs the signed-subtraction comparison instead, which orders any
//! two ids correctly as long as they are less than half the counter
//! range apart.

use serde::{Deserialize, Serialize};

/// Identifier stamped on a change request at admission.
///
/// # Examples
///
/// ```
/// use perfseq_rs::sequencer::SequenceId;
///
/// let early = SequenceId(10);
/// let late = SequenceId(11);
/// assert!(early.is_at_or_before(late));
/// assert!(!late.is_at_or_before(early));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SequenceId(pub u16);

impl SequenceId {
    /// Returns `true` if a completion of `completed` also covers this id.
    ///
    /// Wraparound-safe: the distance is computed with wrapping
    /// subtraction and reinterpreted as signed, so `k` compares as
    /// at-or-before `k + 2^15 - 1` but not `k + 2^15`.
    #[inline]
    #[must_use]
    pub fn is_at_or_before(self, completed: SequenceId) -> bool {
        completed.0.wrapping_sub(self.0) as i16 >= 0
    }
}

impl std::fmt::Display for SequenceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Monotonically incrementing modular counter for [`SequenceId`]s.
///
/// The first id handed out is `1`; `0` never leaves the counter, which
/// keeps a zeroed telemetry record distinguishable from a real one.
#[derive(Debug, Default)]
pub struct SequenceCounter {
    last: u16,
}

impl SequenceCounter {
    /// Creates a counter whose next id is `1`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates the next sequence id.
    pub fn next(&mut self) -> SequenceId {
        self.last = self.last.wrapping_add(1);
        SequenceId(self.last)
    }

    /// The most recently allocated id, or `SequenceId(0)` if none.
    #[must_use]
    pub fn last(&self) -> SequenceId {
        SequenceId(self.last)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_starts_at_one() {
        let mut counter = SequenceCounter::new();
        assert_eq!(counter.next(), SequenceId(1));
        assert_eq!(counter.next(), SequenceId(2));
        assert_eq!(counter.last(), SequenceId(2));
    }

    #[test]
    fn test_counter_wraps() {
        let mut counter = SequenceCounter { last: u16::MAX };
        assert_eq!(counter.next(), SequenceId(0));
        assert_eq!(counter.next(), SequenceId(1));
    }

    #[test]
    fn test_ordering_near_wrap() {
        let k = SequenceId(u16::MAX - 1);
        let next = SequenceId(1); // three increments past k, across the wrap
        assert!(k.is_at_or_before(next));
        assert!(!next.is_at_or_before(k));
    }

    #[test]
    fn test_half_range_boundary() {
        // k + 2^15 - 1 is the furthest id still ordered as completed;
        // k + 2^15 must order as not-yet. Checked across the whole ring.
        for k in [0u16, 1, 7_000, 32_767, 32_768, 65_000, u16::MAX] {
            let id = SequenceId(k);
            let still_covered = SequenceId(k.wrapping_add(i16::MAX as u16));
            let not_covered = SequenceId(k.wrapping_add(i16::MAX as u16 + 1));
            assert!(id.is_at_or_before(still_covered), "k={k}");
            assert!(!id.is_at_or_before(not_covered), "k={k}");
        }
    }

    #[test]
    fn test_reflexive() {
        let id = SequenceId(42);
        assert!(id.is_at_or_before(id));
    }
}
