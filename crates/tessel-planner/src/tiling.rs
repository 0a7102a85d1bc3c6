//! Tile sizing against a fixed scratch budget
//!
//! A tile is a run of positions along the active axis that one core stages in
//! its fast-memory window at once. The largest tile is found by binary search
//! over a monotone cost function, because the sort scratch of the
//! deterministic path is not a linear function of the tile length.

use smallvec::SmallVec;
use tessel_core::{ceil_align, DType, IndexDType, Reduction};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Padding kept after sort statistics, per statistic buffer.
pub const SORT_STAT_PADDING: u64 = 64;

/// Largest `tile` in `[lower_bound, upper_bound]` with `cost_fn(tile) <= budget_bytes`.
///
/// `cost_fn` must be non-decreasing; otherwise the result is unspecified.
/// When even `lower_bound` does not fit, `lower_bound` is returned and the
/// caller decides whether to fail.
///
/// # Examples
///
/// ```
/// use tessel_planner::solve_tile_size;
///
/// // 12 bytes per element plus 64 bytes of fixed overhead
/// let tile = solve_tile_size(1, 10_000, 1024, |t| 12 * t + 64);
/// assert_eq!(tile, 80);
/// ```
pub fn solve_tile_size<F>(lower_bound: u64, upper_bound: u64, budget_bytes: u64, cost_fn: F) -> u64
where
    F: Fn(u64) -> u64,
{
    if upper_bound <= lower_bound {
        return lower_bound;
    }

    // start always fits (or is the lower bound), end never does
    let mut start = lower_bound;
    let mut end = upper_bound.saturating_add(1);
    while end - start > 1 {
        let mid = start + (end - start) / 2;
        if cost_fn(mid) <= budget_bytes {
            start = mid;
        } else {
            end = mid;
        }
    }
    start
}

/// Chosen tile and the scratch it occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TileBudget {
    /// Index positions staged per chunk, across every line the chunk covers
    pub tile_elems: u64,

    /// Bytes of sort scratch on top of the staging buffers
    pub aux_scratch_bytes: u64,

    /// Total bytes the tile occupies, never above the budget
    pub total_bytes: u64,
}

/// Purpose of one scratch buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferKind {
    Indices,
    Updates,
    Accumulator,
    /// Indices narrowed for the sort.
    IndexCast,
    SortedKeys,
    SortedPositions,
}

/// One scratch buffer: `elem_bytes` per tile element, `copies` instances.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferRole {
    pub kind: BufferKind,
    pub elem_bytes: u64,
    pub copies: u64,
}

impl BufferRole {
    pub fn new(kind: BufferKind, elem_bytes: u64, copies: u64) -> Self {
        Self {
            kind,
            elem_bytes,
            copies,
        }
    }
}

/// Shared workspace of the sort.
///
/// The requirement grows with `tile * key_bytes * 2` on top of a fixed base;
/// the allocation is capped at `cap`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortScratch {
    pub key_bytes: u64,
    pub base: u64,
    pub cap: u64,
}

impl SortScratch {
    /// Bytes the sort needs for `tile` keys.
    pub fn required(&self, tile: u64, block: u64) -> u64 {
        self.base
            .saturating_add(ceil_align(tile.saturating_mul(self.key_bytes).saturating_mul(2), block))
    }

    /// Bytes actually reserved for `tile` keys.
    pub fn allocated(&self, tile: u64, block: u64) -> u64 {
        self.required(tile, block).min(self.cap)
    }

    /// Whether the sort of `tile` keys fits its capped workspace.
    pub fn fits(&self, tile: u64, block: u64) -> bool {
        self.required(tile, block) <= self.cap
    }
}

/// Scratch bytes as a function of the tile length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CostModel {
    pub roles: SmallVec<[BufferRole; 8]>,
    pub block: u64,
    pub fixed_bytes: u64,
    pub sort: Option<SortScratch>,
}

impl CostModel {
    pub fn new(block: u64) -> Self {
        Self {
            roles: SmallVec::new(),
            block,
            fixed_bytes: 0,
            sort: None,
        }
    }

    pub fn with_role(mut self, role: BufferRole) -> Self {
        self.roles.push(role);
        self
    }

    pub fn with_fixed_bytes(mut self, bytes: u64) -> Self {
        self.fixed_bytes = bytes;
        self
    }

    pub fn with_sort(mut self, sort: SortScratch) -> Self {
        self.sort = Some(sort);
        self
    }

    /// Staging model for encounter-order execution.
    ///
    /// Indices and updates are staged, twice when double buffering. Half
    /// precision reductions add an `f32` accumulator.
    pub fn encounter(
        dtype: DType,
        index: IndexDType,
        reduction: Reduction,
        double_buffer: bool,
        block: u64,
    ) -> Self {
        let copies = if double_buffer { 2 } else { 1 };
        let mut model = Self::new(block)
            .with_role(BufferRole::new(BufferKind::Indices, index.size_bytes(), copies))
            .with_role(BufferRole::new(BufferKind::Updates, dtype.size_bytes(), copies));
        if reduction != Reduction::None && dtype.accumulator_bytes() != dtype.size_bytes() {
            model = model.with_role(BufferRole::new(
                BufferKind::Accumulator,
                dtype.accumulator_bytes(),
                1,
            ));
        }
        model
    }

    /// Staging plus sort model for the deterministic path.
    ///
    /// `key_bytes` is the width of the sort key after any narrowing; when it
    /// differs from the index width a cast buffer is staged as well.
    pub fn sorted(
        dtype: DType,
        index: IndexDType,
        key_bytes: u64,
        sort_base: u64,
        sort_cap: u64,
        block: u64,
    ) -> Self {
        let mut model = Self::new(block)
            .with_role(BufferRole::new(BufferKind::Indices, index.size_bytes(), 1))
            .with_role(BufferRole::new(BufferKind::Updates, dtype.size_bytes(), 1))
            .with_role(BufferRole::new(
                BufferKind::Accumulator,
                dtype.accumulator_bytes(),
                1,
            ));
        if key_bytes != index.size_bytes() {
            model = model.with_role(BufferRole::new(BufferKind::IndexCast, key_bytes, 1));
        }
        model
            .with_role(BufferRole::new(BufferKind::SortedKeys, key_bytes, 1))
            .with_role(BufferRole::new(BufferKind::SortedPositions, 4, 2))
            .with_fixed_bytes(SORT_STAT_PADDING * 2)
            .with_sort(SortScratch {
                key_bytes,
                base: sort_base,
                cap: sort_cap,
            })
    }

    /// Bytes of the capped sort workspace for `tile`.
    pub fn aux_bytes(&self, tile: u64) -> u64 {
        self.sort
            .map(|s| s.allocated(tile, self.block))
            .unwrap_or(0)
    }

    /// Total scratch bytes for `tile`, alignment padding included.
    pub fn cost(&self, tile: u64) -> u64 {
        let staged = self.roles.iter().fold(0u64, |acc, role| {
            let bytes = ceil_align(tile.saturating_mul(role.elem_bytes), self.block);
            acc.saturating_add(bytes.saturating_mul(role.copies))
        });
        staged
            .saturating_add(self.fixed_bytes)
            .saturating_add(self.aux_bytes(tile))
    }

    /// Budget record for a chosen tile.
    pub fn budget_for(&self, tile: u64) -> TileBudget {
        TileBudget {
            tile_elems: tile,
            aux_scratch_bytes: self.aux_bytes(tile),
            total_bytes: self.cost(tile),
        }
    }
}
