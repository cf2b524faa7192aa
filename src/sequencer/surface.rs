/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 5/8/26
******************************************************************************/

//! Persisted script-surface layout and access.
//!
//! The sequencer persists three fixed-size regions in an external
//! shared surface, keyed by byte offset: the script being executed
//! ("current"), the last completed script, and a staging copy used to
//! service queries without exposing a half-written region. Each region
//! holds a header (step count, total elapsed time) and a bounded array
//! of step records.
//!
//! [`ScriptSurface`] is the seam; [`InMemorySurface`] is the in-process
//! implementation used on hosts where the surface is not a DMA window.

use serde::{Deserialize, Serialize};

/// Maximum step records a region can hold. Persisted step counts are
/// bounds-checked against this before use.
pub const MAX_SCRIPT_STEPS: usize = 16;

/// The three fixed regions of the surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScriptRegion {
    /// The script currently being executed.
    Current = 0,
    /// The most recently completed script.
    LastCompleted = 1,
    /// Staging copy for query readers.
    QueryStaging = 2,
}

/// Region header: how many steps are valid and the script's total time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ScriptHeader {
    /// Number of valid step records in the region.
    pub step_count: u32,
    /// Total elapsed time of the script, in nanoseconds.
    pub total_elapsed_ns: u64,
}

/// Kind of hardware programming a step performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StepKind {
    /// Voltage-rail programming.
    #[default]
    Voltage,
    /// Clock-frequency programming.
    Frequency,
    /// Memory-timing programming.
    MemoryTiming,
}

/// One executed hardware-programming step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ScriptStep {
    /// What the step programmed.
    pub kind: StepKind,
    /// Time the step took, in nanoseconds.
    pub elapsed_ns: u64,
}

/// Access to the persisted script surface.
///
/// Step indices are bounded by [`MAX_SCRIPT_STEPS`]; implementations
/// reject out-of-range writes rather than growing.
pub trait ScriptSurface {
    /// Reads a region's header.
    fn header(&self, region: ScriptRegion) -> ScriptHeader;

    /// Writes a region's header.
    fn set_header(&mut self, region: ScriptRegion, header: ScriptHeader);

    /// Reads one step record, if `index` is within bounds.
    fn step(&self, region: ScriptRegion, index: usize) -> Option<ScriptStep>;

    /// Writes one step record. Returns `false` if `index` is out of
    /// bounds (the write is dropped).
    fn set_step(&mut self, region: ScriptRegion, index: usize, step: ScriptStep) -> bool;

    /// Copies `src`'s header and valid steps over `dst`.
    fn copy_region(&mut self, src: ScriptRegion, dst: ScriptRegion);
}

#[derive(Debug, Clone, Copy, Default)]
struct RegionBuf {
    header: ScriptHeader,
    steps: [ScriptStep; MAX_SCRIPT_STEPS],
}

/// In-process [`ScriptSurface`].
///
/// Layout mirrors the external surface: regions live back to back at
/// fixed byte offsets ([`InMemorySurface::region_offset`]), each sized
/// for a header plus [`MAX_SCRIPT_STEPS`] step records.
///
/// # Examples
///
/// ```
/// use perfseq_rs::sequencer::surface::{
///     InMemorySurface, ScriptHeader, ScriptRegion, ScriptSurface,
/// };
///
/// let mut surface = InMemorySurface::new();
/// surface.set_header(
///     ScriptRegion::Current,
///     ScriptHeader { step_count: 2, total_elapsed_ns: 10_000 },
/// );
/// surface.copy_region(ScriptRegion::Current, ScriptRegion::LastCompleted);
/// assert_eq!(surface.header(ScriptRegion::LastCompleted).step_count, 2);
/// ```
#[derive(Debug, Default)]
pub struct InMemorySurface {
    regions: [RegionBuf; 3],
}

impl InMemorySurface {
    /// Creates an empty surface.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Byte offset of a region within the surface, as laid out in the
    /// external shared memory this type stands in for.
    #[must_use]
    pub const fn region_offset(region: ScriptRegion) -> usize {
        const REGION_STRIDE: usize =
            size_of::<ScriptHeader>() + MAX_SCRIPT_STEPS * size_of::<ScriptStep>();
        region as usize * REGION_STRIDE
    }
}

impl ScriptSurface for InMemorySurface {
    fn header(&self, region: ScriptRegion) -> ScriptHeader {
        self.regions[region as usize].header
    }

    fn set_header(&mut self, region: ScriptRegion, header: ScriptHeader) {
        self.regions[region as usize].header = header;
    }

    fn step(&self, region: ScriptRegion, index: usize) -> Option<ScriptStep> {
        (index < MAX_SCRIPT_STEPS).then(|| self.regions[region as usize].steps[index])
    }

    fn set_step(&mut self, region: ScriptRegion, index: usize, step: ScriptStep) -> bool {
        if index >= MAX_SCRIPT_STEPS {
            return false;
        }
        self.regions[region as usize].steps[index] = step;
        true
    }

    fn copy_region(&mut self, src: ScriptRegion, dst: ScriptRegion) {
        self.regions[dst as usize] = self.regions[src as usize];
    }
}
