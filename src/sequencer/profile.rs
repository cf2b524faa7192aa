/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 5/8/26
******************************************************************************/

//! Latency profiling: in-flight samples and a two-tier log2 histogram.
//!
//! Admission records a `{sequence id, start timestamp}` sample into a
//! small fixed table; profiling is best-effort, so a full table drops
//! the sample silently rather than blocking admission. When a request
//! completes, every sample at or before the completed id is folded into
//! the histogram and its slot cleared.
//!
//! Buckets are log2-spaced in two tiers: a fine shift for the first
//! [`SMALL_BUCKETS`] buckets, a coarser shift beyond that, saturating
//! at the last bucket. Resolution near zero is traded for long-tail
//! coverage without a divide.

use std::time::Instant;

use serde::{Deserialize, Serialize};

use super::counter::SequenceId;

/// Number of in-flight sample slots.
pub const PROFILING_SLOTS: usize = 8;

/// Total histogram buckets.
pub const HISTOGRAM_BUCKETS: usize = 16;

/// Buckets using the fine-grained shift.
pub const SMALL_BUCKETS: usize = 8;

/// log2 width of the fine buckets (2^17 ns ≈ 131 µs each).
pub const SMALL_BUCKET_SHIFT: u32 = 17;

/// log2 width of the coarse buckets (2^22 ns ≈ 4.2 ms each).
pub const LARGE_BUCKET_SHIFT: u32 = 22;

#[derive(Debug, Clone, Copy)]
struct ProfilingSample {
    sequence: SequenceId,
    started: Instant,
}

/// Completed-request latency histogram with running min/max.
///
/// # Examples
///
/// ```
/// use perfseq_rs::sequencer::profile::LatencyHistogram;
///
/// let mut histogram = LatencyHistogram::new();
/// histogram.observe(50_000);
/// histogram.observe(2_000_000);
/// assert_eq!(histogram.completed, 2);
/// assert_eq!(histogram.min_ns, 50_000);
/// assert_eq!(histogram.max_ns, 2_000_000);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatencyHistogram {
    /// Shortest observed latency, in nanoseconds.
    pub min_ns: u64,
    /// Longest observed latency, in nanoseconds.
    pub max_ns: u64,
    /// Number of folded observations.
    pub completed: u64,
    /// Per-bucket counters.
    pub buckets: [u64; HISTOGRAM_BUCKETS],
}

impl Default for LatencyHistogram {
    fn default() -> Self {
        LatencyHistogram {
            min_ns: u64::MAX,
            max_ns: 0,
            completed: 0,
            buckets: [0; HISTOGRAM_BUCKETS],
        }
    }
}

impl LatencyHistogram {
    /// An empty histogram.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one latency observation into the histogram.
    pub fn observe(&mut self, elapsed_ns: u64) {
        self.min_ns = self.min_ns.min(elapsed_ns);
        self.max_ns = self.max_ns.max(elapsed_ns);
        self.completed += 1;
        self.buckets[Self::bucket_index(elapsed_ns)] += 1;
    }

    /// Maps a latency to its bucket: fine shift below the tier break,
    /// coarse shift above, saturating at the last bucket.
    #[must_use]
    pub fn bucket_index(elapsed_ns: u64) -> usize {
        let mut index = (elapsed_ns >> SMALL_BUCKET_SHIFT) as usize;
        if index >= SMALL_BUCKETS {
            index = SMALL_BUCKETS + (elapsed_ns >> LARGE_BUCKET_SHIFT) as usize;
        }
        index.min(HISTOGRAM_BUCKETS - 1)
    }
}

/// Fixed table of in-flight profiling samples.
#[derive(Debug, Default)]
pub struct ProfilingSampleTable {
    slots: [Option<ProfilingSample>; PROFILING_SLOTS],
}

impl ProfilingSampleTable {
    /// An empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a sample. Returns `false` (and drops the sample) when
    /// the table is full; profiling never blocks admission.
    pub fn record(&mut self, sequence: SequenceId, started: Instant) -> bool {
        let Some(slot) = self.slots.iter_mut().find(|s| s.is_none()) else {
            tracing::debug!(%sequence, "profiling table full, sample dropped");
            return false;
        };
        *slot = Some(ProfilingSample { sequence, started });
        true
    }

    /// Folds every sample at or before `completed` into `histogram`
    /// and clears its slot.
    pub fn fold_completed(&mut self, completed: SequenceId, histogram: &mut LatencyHistogram) {
        let now = Instant::now();
        for slot in &mut self.slots {
            let Some(sample) = slot.take_if(|s| s.sequence.is_at_or_before(completed)) else {
                continue;
            };
            let elapsed_ns = now.duration_since(sample.started).as_nanos() as u64;
            histogram.observe(elapsed_ns);
        }
    }

    /// Number of occupied sample slots.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }
}
