//! Deterministic ordering of colliding contributions
//!
//! Floating-point add and mul are not associative, so racing accumulation
//! makes the result depend on which core reaches a destination first. When
//! reproducibility is requested, every contribution is keyed by its
//! destination and source position, sorted, and each destination group is
//! combined with a fixed pairwise tree.

use log::{debug, warn};
use tessel_core::{DType, IndexDType, Reduction, TilingError, TilingResult};

use crate::tiling::{solve_tile_size, CostModel, TileBudget};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// How contributions reach their destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum OrderingMode {
    /// Applied as encountered; cores may race on shared destinations.
    #[default]
    Encounter,
    /// Grouped by destination, sorted by position and tree-combined.
    Sorted,
}

impl OrderingMode {
    pub const ALL: [OrderingMode; 2] = [OrderingMode::Encounter, OrderingMode::Sorted];

    /// Ordering digit of a dispatch key.
    pub const fn key_code(self) -> u64 {
        match self {
            OrderingMode::Encounter => 0,
            OrderingMode::Sorted => 1,
        }
    }

    pub fn from_key_code(code: u64) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.key_code() == code)
    }
}

/// Decide whether contributions must be sorted.
///
/// Sorting is skipped when determinism was not asked for, when the reduction
/// overwrites, or when the dtype accumulates exactly. The layout plays no
/// part: a single core walking a line in encounter order would combine a
/// destination's contributions differently from the pairwise tree, so the
/// result would change with the core count.
pub fn decide_ordering(deterministic: bool, reduction: Reduction, dtype: DType) -> OrderingMode {
    let mode = if !deterministic || reduction == Reduction::None || dtype.exact_accumulation() {
        OrderingMode::Encounter
    } else {
        OrderingMode::Sorted
    };
    debug!(
        "ordering: deterministic={} reduction={} dtype={} -> {:?}",
        deterministic, reduction, dtype, mode
    );
    mode
}

/// Width the sort keys are narrowed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum IndexCast {
    #[default]
    None,
    U8,
    I16,
    I32,
}

impl IndexCast {
    /// Narrowest key able to hold every position of an axis of `axis_len`.
    pub fn select(axis_len: u64, index: IndexDType, enabled: bool) -> Self {
        if !enabled {
            return IndexCast::None;
        }
        if axis_len < u8::MAX as u64 {
            IndexCast::U8
        } else if axis_len < i16::MAX as u64 {
            IndexCast::I16
        } else if index == IndexDType::I64 && axis_len < i32::MAX as u64 {
            IndexCast::I32
        } else {
            IndexCast::None
        }
    }

    /// Sort key width in bytes.
    pub fn key_bytes(self, index: IndexDType) -> u64 {
        match self {
            IndexCast::None => index.size_bytes(),
            IndexCast::U8 => 1,
            IndexCast::I16 => 2,
            IndexCast::I32 => 4,
        }
    }
}

/// One update aimed at a destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Contribution {
    /// Destination position along the axis
    pub dest: u64,
    /// Source position along the axis
    pub position: u64,
}

/// Contributions sharing one destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupSpan {
    pub dest: u64,
    pub start: usize,
    pub end: usize,
}

impl GroupSpan {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }
}

/// Contributions sorted by destination then position, with group spans.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderedGroups {
    entries: Vec<Contribution>,
    groups: Vec<GroupSpan>,
}

impl OrderedGroups {
    pub fn entries(&self) -> &[Contribution] {
        &self.entries
    }

    pub fn groups(&self) -> &[GroupSpan] {
        &self.groups
    }

    /// Source positions of `group`, ascending.
    pub fn positions(&self, group: &GroupSpan) -> impl Iterator<Item = u64> + '_ {
        self.entries[group.start..group.end].iter().map(|c| c.position)
    }

    /// True when some destination receives more than one contribution.
    pub fn has_collisions(&self) -> bool {
        self.groups.len() < self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Group `contributions` by destination in a stable total order.
///
/// `partition_axis_size` bounds the destinations; when it is small relative
/// to the number of contributions a counting sort is used.
///
/// # Examples
///
/// ```
/// use tessel_planner::{order_for_determinism, Contribution};
///
/// let updates = [
///     Contribution { dest: 2, position: 0 },
///     Contribution { dest: 0, position: 1 },
///     Contribution { dest: 2, position: 2 },
/// ];
/// let ordered = order_for_determinism(&updates, 4);
/// assert_eq!(ordered.groups().len(), 2);
/// assert!(ordered.has_collisions());
/// let group = ordered.groups()[1];
/// assert_eq!(ordered.positions(&group).collect::<Vec<_>>(), vec![0, 2]);
/// ```
pub fn order_for_determinism(
    contributions: &[Contribution],
    partition_axis_size: u64,
) -> OrderedGroups {
    let n = contributions.len();
    let entries = if partition_axis_size > 0
        && partition_axis_size <= (n as u64).saturating_mul(4)
        && contributions.iter().all(|c| c.dest < partition_axis_size)
    {
        counting_sort(contributions, partition_axis_size as usize)
    } else {
        let mut sorted = contributions.to_vec();
        sorted.sort_unstable();
        sorted
    };

    let mut groups: Vec<GroupSpan> = Vec::new();
    for (i, c) in entries.iter().enumerate() {
        match groups.last_mut() {
            Some(g) if g.dest == c.dest => g.end = i + 1,
            _ => groups.push(GroupSpan {
                dest: c.dest,
                start: i,
                end: i + 1,
            }),
        }
    }
    OrderedGroups { entries, groups }
}

fn counting_sort(contributions: &[Contribution], buckets: usize) -> Vec<Contribution> {
    let mut counts = vec![0usize; buckets + 1];
    for c in contributions {
        counts[c.dest as usize + 1] += 1;
    }
    for i in 1..counts.len() {
        counts[i] += counts[i - 1];
    }

    let mut out = vec![Contribution { dest: 0, position: 0 }; contributions.len()];
    for c in contributions {
        let slot = &mut counts[c.dest as usize];
        out[*slot] = *c;
        *slot += 1;
    }
    // stable placement keeps input order inside a bucket; positions may not
    // arrive ascending, so finish each bucket with a sort
    let mut start = 0;
    while start < out.len() {
        let dest = out[start].dest;
        let mut end = start + 1;
        while end < out.len() && out[end].dest == dest {
            end += 1;
        }
        out[start..end].sort_unstable_by_key(|c| c.position);
        start = end;
    }
    out
}

/// Combine `values` with a fixed pairwise tree, in place.
///
/// Level by level, neighbours `(0,1), (2,3), ...` are combined; an odd last
/// value is carried up unchanged. The shape of the tree depends only on the
/// length, so equal inputs always round the same way.
///
/// # Examples
///
/// ```
/// use tessel_planner::tree_reduce;
///
/// let mut values = [1, 2, 3, 4, 5];
/// assert_eq!(tree_reduce(&mut values, |a, b| a + b), Some(15));
/// assert_eq!(tree_reduce::<i32, _>(&mut [], |a, b| a + b), None);
/// ```
pub fn tree_reduce<T, F>(values: &mut [T], combine: F) -> Option<T>
where
    T: Copy,
    F: Fn(T, T) -> T,
{
    let mut width = values.len();
    if width == 0 {
        return None;
    }
    while width > 1 {
        let pairs = width / 2;
        for i in 0..pairs {
            values[i] = combine(values[2 * i], values[2 * i + 1]);
        }
        if width % 2 == 1 {
            values[pairs] = values[width - 1];
            width = pairs + 1;
        } else {
            width = pairs;
        }
    }
    Some(values[0])
}

/// Solve the tile for the sorted path, shrinking it until the sort fits.
///
/// The main search uses the capped sort allocation. If the uncapped sort
/// requirement of the result exceeds the cap, the largest tile whose sort
/// fits is solved for and the main search is repeated below it.
pub fn negotiate_sorted_tile(
    lower_bound: u64,
    upper_bound: u64,
    budget_bytes: u64,
    model: &CostModel,
) -> TilingResult<TileBudget> {
    let minimum = model.cost(lower_bound);
    if minimum > budget_bytes {
        return Err(TilingError::BudgetTooSmall {
            required: minimum,
            budget: budget_bytes,
        });
    }

    let mut tile = solve_tile_size(lower_bound, upper_bound, budget_bytes, |t| model.cost(t));
    if let Some(sort) = model.sort {
        if !sort.fits(tile, model.block) {
            if !sort.fits(lower_bound, model.block) {
                return Err(TilingError::BudgetTooSmall {
                    required: sort.required(lower_bound, model.block),
                    budget: sort.cap,
                });
            }
            let sort_limit = solve_tile_size(lower_bound, tile, sort.cap, |t| {
                sort.required(t, model.block)
            });
            warn!(
                "sort scratch for tile {} needs {} bytes over cap {}; shrinking to {}",
                tile,
                sort.required(tile, model.block),
                sort.cap,
                sort_limit
            );
            tile = solve_tile_size(lower_bound, sort_limit, budget_bytes, |t| model.cost(t));
        }
    }
    Ok(model.budget_for(tile))
}
