//! Axis normalization
//!
//! Collapses a data/indices/updates shape triple into a canonical view around
//! the active axis. Adjacent off-axis dimensions that agree across all three
//! operands are merged and unit dimensions are dropped, so a rank-7 problem
//! usually ends up as two or three nested loops.

use smallvec::SmallVec;
use tessel_core::{Axis, Dims, TensorShape, TilingError, TilingResult};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Products of the extents before, at and after the active axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AxisView {
    pub pre: u64,
    pub mid: u64,
    pub post: u64,
}

impl AxisView {
    /// View of `shape` split at `axis`.
    pub fn of(shape: &TensorShape, axis: Axis) -> Self {
        Self {
            pre: shape.product(0..axis),
            mid: shape.dim(axis).unwrap_or(1),
            post: shape.product(axis + 1..shape.rank()),
        }
    }

    /// `pre * mid * post`.
    pub fn numel(&self) -> u64 {
        self.pre.saturating_mul(self.mid).saturating_mul(self.post)
    }

    /// Number of independent lines along the axis.
    pub fn lines(&self) -> u64 {
        self.pre.saturating_mul(self.post)
    }
}

/// Operand shapes after folding, sharing one active axis.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FoldedShapes {
    pub data: TensorShape,
    pub indices: TensorShape,
    pub updates: TensorShape,
    pub axis: Axis,
}

/// Canonical layout of a non-empty scatter problem.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AxisLayout {
    pub folded: FoldedShapes,
    pub data: AxisView,
    pub indices: AxisView,
    pub updates: AxisView,
}

impl AxisLayout {
    /// Lines of the indices operand, the unit of work distribution.
    pub fn lines(&self) -> u64 {
        self.indices.lines()
    }

    /// True when nothing precedes the axis after folding.
    pub fn axis_is_outermost(&self) -> bool {
        self.indices.pre == 1
    }
}

/// Outcome of normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Normalized {
    /// Indices carry no elements; there is nothing to scatter.
    ZeroElements,
    Layout(AxisLayout),
}

/// Resolve a possibly negative axis against `rank`.
///
/// # Examples
///
/// ```
/// use tessel_planner::normalize_axis;
///
/// assert_eq!(normalize_axis(-1, 3).unwrap(), 2);
/// assert_eq!(normalize_axis(0, 3).unwrap(), 0);
/// assert!(normalize_axis(3, 3).is_err());
/// ```
pub fn normalize_axis(axis: i64, rank: usize) -> TilingResult<Axis> {
    let r = rank as i64;
    let resolved = if axis < 0 { axis + r } else { axis };
    if rank == 0 || resolved < 0 || resolved >= r {
        return Err(TilingError::InvalidAxis { axis, rank });
    }
    Ok(resolved as Axis)
}

/// Check the operand rules for a scatter along `axis`.
///
/// All ranks agree. Off the axis, indices and updates have identical extents
/// that do not exceed data's. On the axis, updates cover at least as many
/// positions as indices.
pub fn validate_shapes(
    data: &TensorShape,
    indices: &TensorShape,
    updates: &TensorShape,
    axis: Axis,
) -> TilingResult<()> {
    if data.rank() != indices.rank() || indices.rank() != updates.rank() {
        return Err(TilingError::ShapeMismatch(format!(
            "ranks differ: data {}, indices {}, updates {}",
            data.rank(),
            indices.rank(),
            updates.rank()
        )));
    }

    for d in 0..data.rank() {
        let (x, i, u) = (data.dims()[d], indices.dims()[d], updates.dims()[d]);
        if d == axis {
            if u < i {
                return Err(TilingError::mismatch_at(
                    d,
                    "updates shorter than indices on the active axis",
                    u,
                    i,
                ));
            }
            continue;
        }
        if i != u {
            return Err(TilingError::mismatch_at(d, "indices and updates differ", i, u));
        }
        if i > x {
            return Err(TilingError::mismatch_at(d, "indices exceed data", i, x));
        }
    }
    Ok(())
}

/// Normalize a scatter problem into its canonical layout.
///
/// Returns [`Normalized::ZeroElements`] when indices are empty. Data with an
/// empty active axis while indices are not is a [`TilingError::ShapeMismatch`].
///
/// # Examples
///
/// ```
/// use tessel_core::TensorShape;
/// use tessel_planner::{normalize, Normalized};
///
/// let data = TensorShape::new(&[4, 8, 16, 16]).unwrap();
/// let indices = TensorShape::new(&[4, 3, 16, 16]).unwrap();
///
/// let Normalized::Layout(layout) = normalize(&data, &indices, &indices, 1).unwrap() else {
///     unreachable!()
/// };
/// assert_eq!((layout.indices.pre, layout.indices.mid, layout.indices.post), (4, 3, 256));
/// assert_eq!(layout.folded.indices.rank(), 3);
/// ```
pub fn normalize(
    data: &TensorShape,
    indices: &TensorShape,
    updates: &TensorShape,
    axis: i64,
) -> TilingResult<Normalized> {
    let axis = normalize_axis(axis, data.rank())?;
    validate_shapes(data, indices, updates, axis)?;

    if indices.is_empty() {
        return Ok(Normalized::ZeroElements);
    }
    if data.dims()[axis] == 0 {
        return Err(TilingError::ShapeMismatch(format!(
            "data axis {axis} is empty but indices {indices} are not"
        )));
    }

    let folded = fold(data, indices, updates, axis)?;
    let layout = AxisLayout {
        data: AxisView::of(&folded.data, folded.axis),
        indices: AxisView::of(&folded.indices, folded.axis),
        updates: AxisView::of(&folded.updates, folded.axis),
        folded,
    };
    Ok(Normalized::Layout(layout))
}

fn fold(
    data: &TensorShape,
    indices: &TensorShape,
    updates: &TensorShape,
    axis: Axis,
) -> TilingResult<FoldedShapes> {
    let mut fd = Dims::new();
    let mut fi = Dims::new();
    let mut fu = Dims::new();
    let mut folded_axis = 0;
    // whether the last pushed dimension agrees across all operands
    let mut last_uniform = false;

    for d in 0..data.rank() {
        let (x, i, u) = (data.dims()[d], indices.dims()[d], updates.dims()[d]);
        if d == axis {
            folded_axis = fd.len();
            fd.push(x);
            fi.push(i);
            fu.push(u);
            last_uniform = false;
            continue;
        }

        let uniform = x == i && i == u;
        if uniform && x == 1 {
            continue;
        }
        if uniform && last_uniform {
            if let (Some(a), Some(b), Some(c)) = (fd.last_mut(), fi.last_mut(), fu.last_mut()) {
                *a = a.saturating_mul(x);
                *b = b.saturating_mul(i);
                *c = c.saturating_mul(u);
            }
            continue;
        }
        fd.push(x);
        fi.push(i);
        fu.push(u);
        last_uniform = uniform;
    }

    Ok(FoldedShapes {
        data: TensorShape::new(&fd)?,
        indices: TensorShape::new(&fi)?,
        updates: TensorShape::new(&fu)?,
        axis: folded_axis,
    })
}

/// Decompose a line number into per-dimension coordinates of `shape`,
/// skipping `axis` (whose coordinate is left at zero).
pub fn line_coords(shape: &TensorShape, axis: Axis, mut line: u64) -> SmallVec<[u64; 7]> {
    let mut coords: SmallVec<[u64; 7]> = SmallVec::from_elem(0, shape.rank());
    for d in (0..shape.rank()).rev() {
        if d == axis {
            continue;
        }
        let extent = shape.dims()[d].max(1);
        coords[d] = line % extent;
        line /= extent;
    }
    coords
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shape(dims: &[u64]) -> TensorShape {
        TensorShape::new(dims).unwrap()
    }

    fn layout(data: &[u64], indices: &[u64], updates: &[u64], axis: i64) -> AxisLayout {
        match normalize(&shape(data), &shape(indices), &shape(updates), axis).unwrap() {
            Normalized::Layout(layout) => layout,
            Normalized::ZeroElements => panic!("unexpected empty problem"),
        }
    }

    #[test]
    fn test_normalize_axis_negative() {
        assert_eq!(normalize_axis(-1, 4).unwrap(), 3);
        assert_eq!(normalize_axis(-4, 4).unwrap(), 0);
        assert!(matches!(
            normalize_axis(-5, 4),
            Err(TilingError::InvalidAxis { axis: -5, rank: 4 })
        ));
        assert!(normalize_axis(0, 0).is_err());
    }

    #[test]
    fn test_scenario_a_shape_mismatch() {
        let err = normalize(
            &shape(&[10, 38, 26]),
            &shape(&[10, 18, 26]),
            &shape(&[10, 28, 96]),
            2,
        )
        .unwrap_err();
        assert_eq!(
            err,
            TilingError::mismatch_at(1, "indices and updates differ", 18, 28)
        );
    }

    #[test]
    fn test_rank_mismatch() {
        let err = normalize(&shape(&[4, 4]), &shape(&[4]), &shape(&[4]), 0).unwrap_err();
        assert!(matches!(err, TilingError::ShapeMismatch(_)));
    }

    #[test]
    fn test_indices_exceed_data() {
        let err = normalize(&shape(&[4, 4]), &shape(&[5, 2]), &shape(&[5, 2]), 1).unwrap_err();
        assert_eq!(err, TilingError::mismatch_at(0, "indices exceed data", 5, 4));
    }

    #[test]
    fn test_updates_shorter_on_axis() {
        let err = normalize(&shape(&[4, 4]), &shape(&[4, 3]), &shape(&[4, 2]), 1).unwrap_err();
        assert!(matches!(err, TilingError::ShapeMismatch(_)));
    }

    #[test]
    fn test_indices_longer_than_data_on_axis_is_allowed() {
        let l = layout(&[4, 2], &[4, 9], &[4, 9], 1);
        assert_eq!(l.indices.mid, 9);
        assert_eq!(l.data.mid, 2);
    }

    #[test]
    fn test_fold_trailing_and_leading() {
        let l = layout(&[2, 3, 10, 4, 5], &[2, 3, 7, 4, 5], &[2, 3, 7, 4, 5], 2);
        assert_eq!(l.folded.indices.dims(), &[6, 7, 20]);
        assert_eq!(l.folded.data.dims(), &[6, 10, 20]);
        assert_eq!(l.folded.axis, 1);
        assert_eq!(l.indices, AxisView { pre: 6, mid: 7, post: 20 });
        assert_eq!(l.data, AxisView { pre: 6, mid: 10, post: 20 });
    }

    #[test]
    fn test_fold_stops_at_divergence() {
        // dim 1 differs between data and indices, so it cannot merge with dim 0 or 2
        let l = layout(&[2, 5, 3, 8], &[2, 4, 3, 6], &[2, 4, 3, 6], 3);
        assert_eq!(l.folded.indices.dims(), &[2, 4, 3, 6]);
        assert_eq!(l.folded.axis, 3);
        assert_eq!(l.indices, AxisView { pre: 24, mid: 6, post: 1 });
        assert_eq!(l.data.pre, 30);
    }

    #[test]
    fn test_unit_dims_dropped() {
        let l = layout(&[1, 1, 8, 1], &[1, 1, 3, 1], &[1, 1, 3, 1], -2);
        assert_eq!(l.folded.indices.dims(), &[3]);
        assert_eq!(l.folded.axis, 0);
        assert_eq!(l.indices, AxisView { pre: 1, mid: 3, post: 1 });
        assert!(l.axis_is_outermost());
    }

    #[test]
    fn test_view_product_matches_numel() {
        let l = layout(&[3, 7, 5, 2], &[3, 4, 5, 2], &[3, 6, 5, 2], 1);
        assert_eq!(l.data.numel(), 3 * 7 * 5 * 2);
        assert_eq!(l.indices.numel(), 3 * 4 * 5 * 2);
        assert_eq!(l.updates.numel(), 3 * 6 * 5 * 2);
        assert_eq!(l.lines(), 30);
        assert!(!l.axis_is_outermost());
    }

    #[test]
    fn test_canonical_view_is_fixed_point() {
        let l = layout(&[6, 10, 20], &[6, 7, 20], &[6, 7, 20], 1);
        assert_eq!(l.indices, AxisView { pre: 6, mid: 7, post: 20 });
        let again = layout(
            l.folded.data.dims(),
            l.folded.indices.dims(),
            l.folded.updates.dims(),
            l.folded.axis as i64,
        );
        assert_eq!(again, l);
    }

    #[test]
    fn test_empty_indices_is_zero_elements() {
        let out = normalize(&shape(&[4, 4]), &shape(&[4, 0]), &shape(&[4, 0]), 1).unwrap();
        assert_eq!(out, Normalized::ZeroElements);

        // empty data off the axis forces empty indices
        let out = normalize(&shape(&[0, 4]), &shape(&[0, 2]), &shape(&[0, 2]), 1).unwrap();
        assert_eq!(out, Normalized::ZeroElements);
    }

    #[test]
    fn test_empty_data_axis_is_error() {
        let err = normalize(&shape(&[4, 0]), &shape(&[4, 2]), &shape(&[4, 2]), 1).unwrap_err();
        assert!(matches!(err, TilingError::ShapeMismatch(_)));
    }

    #[test]
    fn test_line_coords() {
        let s = shape(&[2, 3, 4]);
        assert_eq!(line_coords(&s, 1, 0).as_slice(), &[0, 0, 0]);
        assert_eq!(line_coords(&s, 1, 5).as_slice(), &[1, 0, 1]);
        assert_eq!(line_coords(&s, 1, 7).as_slice(), &[1, 0, 3]);
        assert_eq!(line_coords(&s, 0, 11).as_slice(), &[0, 2, 3]);
    }
}
