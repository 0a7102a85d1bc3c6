//! Planning pipeline
//!
//! [`plan_scatter`] runs normalization, partitioning, tile sizing, ordering
//! and key encoding in sequence and returns an immutable [`ScatterPlan`].

use log::debug;
use tessel_core::{
    DType, IndexDType, PlatformInfo, Reduction, TensorShape, TilingError, TilingResult,
};

use crate::axis::{normalize, AxisLayout, Normalized};
use crate::determinism::{decide_ordering, negotiate_sorted_tile, IndexCast, OrderingMode};
use crate::key::{DispatchKey, KeyFields};
use crate::partition::{plan_work, Regime, SplitTarget, WorkLayout};
use crate::tiling::{solve_tile_size, CostModel, TileBudget};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Default fixed part of the sort workspace (1 KB).
pub const DEFAULT_SORT_SHARED_BASE: u64 = 1024;

/// Default cap of the sort workspace (32 KB).
pub const DEFAULT_SORT_SHARED_CAP: u64 = 32 * 1024;

/// Default smallest share of a split line per core, in elements.
pub const DEFAULT_MIN_SPLIT_ELEMS: u64 = 32;

/// Tunables of the planner.
///
/// # Examples
///
/// ```
/// use tessel_planner::TilingConfig;
///
/// let config = TilingConfig::default()
///     .with_sort_shared_cap(64 * 1024)
///     .with_double_buffer(false);
/// assert_eq!(config.sort_shared_cap, 64 * 1024);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TilingConfig {
    /// Fixed bytes of the sort workspace (default: 1 KB)
    pub sort_shared_base: u64,

    /// Upper limit of the sort workspace (default: 32 KB)
    pub sort_shared_cap: u64,

    /// Stage the next chunk while the current one is computed (default: true)
    pub double_buffer: bool,

    /// Narrow sort keys to the smallest width that fits the axis (default: true)
    pub narrow_indices: bool,

    /// Smallest share of a split line per core (default: 32 elements)
    pub min_split_elems: Option<u64>,

    /// Let one encounter-order chunk cover several short lines (default: true)
    pub pack_lines: bool,
}

impl Default for TilingConfig {
    fn default() -> Self {
        Self {
            sort_shared_base: DEFAULT_SORT_SHARED_BASE,
            sort_shared_cap: DEFAULT_SORT_SHARED_CAP,
            double_buffer: true,
            narrow_indices: true,
            min_split_elems: None,
            pack_lines: true,
        }
    }
}

impl TilingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sort_shared_base(mut self, bytes: u64) -> Self {
        self.sort_shared_base = bytes;
        self
    }

    pub fn with_sort_shared_cap(mut self, bytes: u64) -> Self {
        self.sort_shared_cap = bytes;
        self
    }

    pub fn with_double_buffer(mut self, enabled: bool) -> Self {
        self.double_buffer = enabled;
        self
    }

    pub fn with_narrow_indices(mut self, enabled: bool) -> Self {
        self.narrow_indices = enabled;
        self
    }

    pub fn with_min_split_elems(mut self, elems: u64) -> Self {
        self.min_split_elems = Some(elems);
        self
    }

    pub fn with_pack_lines(mut self, enabled: bool) -> Self {
        self.pack_lines = enabled;
        self
    }
}

/// Shapes and attributes of one scatter invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ScatterRequest {
    pub data: TensorShape,
    pub indices: TensorShape,
    pub updates: TensorShape,
    /// Active axis, negative values count from the end
    pub axis: i64,
    pub reduction: Reduction,
    pub dtype: DType,
    pub index_dtype: IndexDType,
    /// Require bit-identical results regardless of worker timing
    pub deterministic: bool,
}

impl ScatterRequest {
    /// Request with axis 0, no reduction, `f32` data and `i64` indices.
    pub fn new(data: TensorShape, indices: TensorShape, updates: TensorShape) -> Self {
        Self {
            data,
            indices,
            updates,
            axis: 0,
            reduction: Reduction::None,
            dtype: DType::F32,
            index_dtype: IndexDType::I64,
            deterministic: false,
        }
    }

    pub fn with_axis(mut self, axis: i64) -> Self {
        self.axis = axis;
        self
    }

    pub fn with_reduction(mut self, reduction: Reduction) -> Self {
        self.reduction = reduction;
        self
    }

    pub fn with_dtype(mut self, dtype: DType) -> Self {
        self.dtype = dtype;
        self
    }

    pub fn with_index_dtype(mut self, index_dtype: IndexDType) -> Self {
        self.index_dtype = index_dtype;
        self
    }

    pub fn with_deterministic(mut self, deterministic: bool) -> Self {
        self.deterministic = deterministic;
        self
    }
}

/// Everything the executor needs, computed once per invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ScatterPlan {
    /// Canonical layout, `None` when there is nothing to scatter
    pub layout: Option<AxisLayout>,
    pub regime: Regime,
    pub work: WorkLayout,
    pub tile: TileBudget,
    /// Whole lines one chunk covers; above 1 only when a line fits a tile
    pub lines_per_chunk: u64,
    pub ordering: OrderingMode,
    pub index_cast: IndexCast,
    pub wide_offsets: bool,
    pub key: DispatchKey,
    pub dtype: DType,
    pub index_dtype: IndexDType,
    pub reduction: Reduction,
    /// Scratch bytes every tile was validated against
    pub budget_bytes: u64,
}

impl ScatterPlan {
    fn noop(request: &ScatterRequest, budget_bytes: u64) -> Self {
        Self {
            layout: None,
            regime: Regime::Inner,
            work: WorkLayout::Empty,
            tile: TileBudget::default(),
            lines_per_chunk: 1,
            ordering: OrderingMode::Encounter,
            index_cast: IndexCast::None,
            wide_offsets: false,
            key: DispatchKey::EMPTY,
            dtype: request.dtype,
            index_dtype: request.index_dtype,
            reduction: request.reduction,
            budget_bytes,
        }
    }

    /// True when execution has nothing to do.
    pub fn is_noop(&self) -> bool {
        self.layout.is_none()
    }

    pub fn used_cores(&self) -> u32 {
        self.work.used_cores()
    }
}

/// Plan a scatter for `platform`.
///
/// # Examples
///
/// ```
/// use tessel_core::{PlatformInfo, Reduction, TensorShape};
/// use tessel_planner::{plan_scatter, ScatterRequest, TilingConfig};
///
/// let data = TensorShape::new(&[64, 1000]).unwrap();
/// let indices = TensorShape::new(&[64, 300]).unwrap();
/// let request = ScatterRequest::new(data, indices.clone(), indices)
///     .with_axis(-1)
///     .with_reduction(Reduction::Add);
///
/// let plan = plan_scatter(&request, &PlatformInfo::default(), &TilingConfig::default()).unwrap();
/// assert_eq!(plan.used_cores(), 48);
/// assert!(plan.tile.total_bytes <= plan.budget_bytes);
/// ```
pub fn plan_scatter(
    request: &ScatterRequest,
    platform: &PlatformInfo,
    config: &TilingConfig,
) -> TilingResult<ScatterPlan> {
    if platform.core_num == 0 {
        return Err(TilingError::CoreLimitZero);
    }
    if !request.reduction.supports(request.dtype) {
        return Err(TilingError::UnsupportedCombination {
            dtype: request.dtype,
            reduction: request.reduction,
        });
    }

    let budget_bytes = platform.budget_bytes();
    let layout = match normalize(
        &request.data,
        &request.indices,
        &request.updates,
        request.axis,
    )? {
        Normalized::ZeroElements => {
            debug!("indices {} are empty; planning a no-op", request.indices);
            return Ok(ScatterPlan::noop(request, budget_bytes));
        }
        Normalized::Layout(layout) => layout,
    };

    let regime = if layout.axis_is_outermost() {
        Regime::Outer
    } else {
        Regime::Inner
    };
    let min_split = config.min_split_elems.unwrap_or(DEFAULT_MIN_SPLIT_ELEMS);
    let lines = layout.lines();
    let source_extent = layout.indices.mid;
    let dest_extent = layout.data.mid;

    let ordering = decide_ordering(request.deterministic, request.reduction, request.dtype);
    let target = match ordering {
        OrderingMode::Encounter => SplitTarget::Sources,
        OrderingMode::Sorted => SplitTarget::Destinations,
    };
    let work = plan_work(
        regime,
        lines,
        source_extent,
        dest_extent,
        target,
        platform.core_num,
        min_split,
    )?;

    let upper = work.max_source_span(source_extent).max(1);
    let (tile, index_cast, lines_per_chunk) = match ordering {
        OrderingMode::Encounter => {
            let model = CostModel::encounter(
                request.dtype,
                request.index_dtype,
                request.reduction,
                config.double_buffer,
                platform.ub_block,
            );
            let minimum = model.cost(1);
            if minimum > budget_bytes {
                return Err(TilingError::BudgetTooSmall {
                    required: minimum,
                    budget: budget_bytes,
                });
            }
            let tile = solve_tile_size(1, upper, budget_bytes, |t| model.cost(t));
            let lines_per_chunk = if config.pack_lines && tile == source_extent {
                pack_lines(&work, source_extent, budget_bytes, &model)
            } else {
                1
            };
            (
                model.budget_for(tile * lines_per_chunk),
                IndexCast::None,
                lines_per_chunk,
            )
        }
        OrderingMode::Sorted => {
            let cast = IndexCast::select(dest_extent, request.index_dtype, config.narrow_indices);
            let model = CostModel::sorted(
                request.dtype,
                request.index_dtype,
                cast.key_bytes(request.index_dtype),
                config.sort_shared_base,
                config.sort_shared_cap,
                platform.ub_block,
            );
            (negotiate_sorted_tile(1, upper, budget_bytes, &model)?, cast, 1)
        }
    };

    let wide_offsets = [&request.data, &request.indices, &request.updates]
        .iter()
        .any(|s| s.numel() > i32::MAX as u64);

    let key = KeyFields {
        dtype: request.dtype,
        reduction: request.reduction,
        index: request.index_dtype,
        wide_offsets,
        regime,
        ordering,
    }
    .encode()?;

    debug!(
        "planned scatter: lines={} regime={:?} cores={} tile={} lines_per_chunk={} ({} bytes of {}) ordering={:?} key={}",
        lines,
        regime,
        work.used_cores(),
        tile.tile_elems,
        lines_per_chunk,
        tile.total_bytes,
        budget_bytes,
        ordering,
        key
    );

    Ok(ScatterPlan {
        layout: Some(layout),
        regime,
        work,
        tile,
        lines_per_chunk,
        ordering,
        index_cast,
        wide_offsets,
        key,
        dtype: request.dtype,
        index_dtype: request.index_dtype,
        reduction: request.reduction,
        budget_bytes,
    })
}

/// Whole lines per encounter chunk once a full line fits the budget.
///
/// Only whole-line layouts pack; a split line already has a partial span.
fn pack_lines(work: &WorkLayout, line_elems: u64, budget_bytes: u64, model: &CostModel) -> u64 {
    let per_core = match work {
        WorkLayout::Lines(plan) => plan.max_units_per_core(),
        _ => return 1,
    };
    if per_core <= 1 || line_elems == 0 {
        return 1;
    }
    solve_tile_size(1, per_core, budget_bytes, |k| {
        model.cost(k.saturating_mul(line_elems))
    })
    .max(1)
}
