//! Work partitioning across cores
//!
//! Splits a unit count into a *front* group that absorbs the remainder and a
//! *tail* group with the floor share, so no two cores differ by more than one
//! unit. When the active axis is outermost and there are fewer lines than
//! cores, spare cores share a line by splitting its extent the same way.

use std::ops::Range;

use tessel_core::{ceil_div, TilingError, TilingResult};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Front/tail assignment of units to cores.
///
/// Cores `0..front_cores` take `front_units_per_core` consecutive units each,
/// the following `tail_cores` take `tail_units_per_core`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CorePlan {
    pub total_units: u64,
    pub used_cores: u32,
    pub front_cores: u32,
    pub front_units_per_core: u64,
    pub tail_cores: u32,
    pub tail_units_per_core: u64,
}

impl CorePlan {
    /// Units handled by `core`, zero for cores outside the plan.
    pub fn units_for(&self, core: u32) -> u64 {
        if core < self.front_cores {
            self.front_units_per_core
        } else if core < self.used_cores {
            self.tail_units_per_core
        } else {
            0
        }
    }

    /// Contiguous unit range handled by `core`.
    pub fn unit_range(&self, core: u32) -> Range<u64> {
        if core >= self.used_cores {
            return self.total_units..self.total_units;
        }
        let c = core as u64;
        let front = self.front_cores as u64;
        let start = if core < self.front_cores {
            c * self.front_units_per_core
        } else {
            front * self.front_units_per_core + (c - front) * self.tail_units_per_core
        };
        start..start + self.units_for(core)
    }

    /// Sum of the units handed out.
    pub fn assigned_units(&self) -> u64 {
        self.front_cores as u64 * self.front_units_per_core
            + self.tail_cores as u64 * self.tail_units_per_core
    }

    /// Largest per-core share.
    pub fn max_units_per_core(&self) -> u64 {
        self.front_units_per_core.max(self.tail_units_per_core)
    }
}

/// Split `total_units` across at most `core_limit` cores.
///
/// # Examples
///
/// ```
/// use tessel_planner::partition;
///
/// let plan = partition(4097, 64).unwrap();
/// assert_eq!((plan.front_cores, plan.front_units_per_core), (1, 65));
/// assert_eq!((plan.tail_cores, plan.tail_units_per_core), (63, 64));
/// ```
pub fn partition(total_units: u64, core_limit: u32) -> TilingResult<CorePlan> {
    if core_limit == 0 {
        return Err(TilingError::CoreLimitZero);
    }
    if total_units == 0 {
        return Ok(CorePlan::default());
    }

    let limit = core_limit as u64;
    if total_units < limit {
        // one unit is too small to subdivide
        return Ok(CorePlan {
            total_units,
            used_cores: total_units as u32,
            front_cores: total_units as u32,
            front_units_per_core: 1,
            tail_cores: 0,
            tail_units_per_core: 0,
        });
    }

    let per = total_units / limit;
    let remainder = total_units - per * limit;
    let plan = if remainder == 0 {
        CorePlan {
            total_units,
            used_cores: core_limit,
            front_cores: core_limit,
            front_units_per_core: per,
            tail_cores: 0,
            tail_units_per_core: per,
        }
    } else {
        let front_cores = remainder as u32;
        CorePlan {
            total_units,
            used_cores: core_limit,
            front_cores,
            front_units_per_core: per + 1,
            tail_cores: core_limit - front_cores,
            tail_units_per_core: per,
        }
    };
    Ok(plan)
}

/// Where the active axis sits after folding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Regime {
    /// Something precedes the axis; whole lines per core.
    Inner,
    /// The axis is outermost; lines may be split when cores outnumber them.
    Outer,
}

impl Regime {
    pub const ALL: [Regime; 2] = [Regime::Inner, Regime::Outer];

    /// Regime digit of a dispatch key.
    pub const fn key_code(self) -> u64 {
        match self {
            Regime::Inner => 0,
            Regime::Outer => 1,
        }
    }

    pub fn from_key_code(code: u64) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.key_code() == code)
    }
}

/// Which extent of a line is divided when a line is shared by cores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SplitTarget {
    /// Index positions; cores may race on shared destinations.
    Sources,
    /// Destination positions; every destination has a single owner.
    Destinations,
}

/// How lines of work map onto cores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum WorkLayout {
    /// Nothing to do.
    Empty,
    /// Each core owns whole lines.
    Lines(CorePlan),
    /// Every line is shared by `line_plan.used_cores` cores.
    SplitLines {
        lines: u64,
        target: SplitTarget,
        line_plan: CorePlan,
    },
}

/// The part of a line a core processes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineSpan {
    Whole,
    /// A range of index positions.
    Sources(Range<u64>),
    /// All index positions, keeping only destinations in this range.
    Destinations(Range<u64>),
}

/// Work handed to one core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreWork {
    pub lines: Range<u64>,
    pub span: LineSpan,
}

impl WorkLayout {
    pub fn used_cores(&self) -> u32 {
        match self {
            WorkLayout::Empty => 0,
            WorkLayout::Lines(plan) => plan.used_cores,
            WorkLayout::SplitLines {
                lines, line_plan, ..
            } => (*lines as u32).saturating_mul(line_plan.used_cores),
        }
    }

    /// Whether two cores can contribute to the same destination.
    pub fn shares_destinations(&self) -> bool {
        matches!(
            self,
            WorkLayout::SplitLines {
                target: SplitTarget::Sources,
                ..
            }
        )
    }

    /// Work for `core`, `None` for idle cores.
    pub fn assignment(&self, core: u32) -> Option<CoreWork> {
        match self {
            WorkLayout::Empty => None,
            WorkLayout::Lines(plan) => {
                let lines = plan.unit_range(core);
                (!lines.is_empty()).then_some(CoreWork {
                    lines,
                    span: LineSpan::Whole,
                })
            }
            WorkLayout::SplitLines {
                lines,
                target,
                line_plan,
            } => {
                if core >= self.used_cores() || line_plan.used_cores == 0 {
                    return None;
                }
                let line = (core / line_plan.used_cores) as u64;
                if line >= *lines {
                    return None;
                }
                let range = line_plan.unit_range(core % line_plan.used_cores);
                let span = match target {
                    SplitTarget::Sources => LineSpan::Sources(range),
                    SplitTarget::Destinations => LineSpan::Destinations(range),
                };
                Some(CoreWork {
                    lines: line..line + 1,
                    span,
                })
            }
        }
    }

    /// Longest run of index positions one core walks within a line.
    pub fn max_source_span(&self, source_extent: u64) -> u64 {
        match self {
            WorkLayout::SplitLines {
                target: SplitTarget::Sources,
                line_plan,
                ..
            } => line_plan.max_units_per_core(),
            _ => source_extent,
        }
    }
}

/// Choose the work layout for a problem with `lines` independent lines.
///
/// `source_extent` and `dest_extent` are the indices and data extents along
/// the axis; `min_split_elems` is the smallest share worth giving a core when
/// a line is split.
pub fn plan_work(
    regime: Regime,
    lines: u64,
    source_extent: u64,
    dest_extent: u64,
    target: SplitTarget,
    core_limit: u32,
    min_split_elems: u64,
) -> TilingResult<WorkLayout> {
    if core_limit == 0 {
        return Err(TilingError::CoreLimitZero);
    }
    if lines == 0 {
        return Ok(WorkLayout::Empty);
    }

    let limit = core_limit as u64;
    if regime == Regime::Inner || lines >= limit {
        return Ok(WorkLayout::Lines(partition(lines, core_limit)?));
    }

    let extent = match target {
        SplitTarget::Sources => source_extent,
        SplitTarget::Destinations => dest_extent,
    };
    let need = ceil_div(extent, min_split_elems.max(1)).max(1);
    let cores_per_line = (limit / lines).min(need) as u32;
    let line_plan = partition(extent, cores_per_line.max(1))?;

    if line_plan.used_cores <= 1 {
        return Ok(WorkLayout::Lines(partition(lines, core_limit)?));
    }
    Ok(WorkLayout::SplitLines {
        lines,
        target,
        line_plan,
    })
}
