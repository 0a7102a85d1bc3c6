//! Shape types shared by the planner and the executor.
//!
//! Shapes are stored as `u64` extents because element counts on large
//! accelerator tensors routinely exceed `u32`, and the overflow flag in the
//! dispatch key is derived from them.

use smallvec::SmallVec;
use std::fmt;

use crate::error::{TilingError, TilingResult};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Highest rank an operand may have.
pub const MAX_RANK: usize = 7;

/// Type alias for tensor axis index.
///
/// Zero-indexed after normalization. Callers may pass negative axes to the
/// planner, which resolves them against the operand rank.
pub type Axis = usize;

/// Inline storage for dimension extents.
pub type Dims = SmallVec<[u64; MAX_RANK]>;

/// Ordered, rank-bounded list of dimension extents.
///
/// Any extent may be zero. A shape whose extents multiply to zero is
/// *empty*; the planner turns empty indices into a no-op plan.
///
/// # Examples
///
/// ```
/// use tessel_core::TensorShape;
///
/// let shape = TensorShape::new(&[4, 0, 3]).unwrap();
/// assert_eq!(shape.rank(), 3);
/// assert!(shape.is_empty());
///
/// assert!(TensorShape::new(&[1; 8]).is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TensorShape {
    dims: Dims,
}

impl TensorShape {
    /// Create a shape, rejecting ranks above [`MAX_RANK`].
    pub fn new(dims: &[u64]) -> TilingResult<Self> {
        if dims.len() > MAX_RANK {
            return Err(TilingError::RankTooLarge {
                rank: dims.len(),
                max: MAX_RANK,
            });
        }
        Ok(Self {
            dims: SmallVec::from_slice(dims),
        })
    }

    /// Rank-0 shape (a scalar).
    pub fn scalar() -> Self {
        Self {
            dims: SmallVec::new(),
        }
    }

    /// Number of dimensions.
    #[inline]
    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// Dimension extents.
    #[inline]
    pub fn dims(&self) -> &[u64] {
        &self.dims
    }

    /// Extent of one dimension, `None` when out of range.
    #[inline]
    pub fn dim(&self, axis: Axis) -> Option<u64> {
        self.dims.get(axis).copied()
    }

    /// Total element count. Saturates instead of wrapping.
    pub fn numel(&self) -> u64 {
        self.dims
            .iter()
            .fold(1u64, |acc, &d| acc.saturating_mul(d))
    }

    /// True when at least one extent is zero.
    pub fn is_empty(&self) -> bool {
        self.dims.iter().any(|&d| d == 0)
    }

    /// Product of the extents in `range`.
    pub fn product(&self, range: std::ops::Range<usize>) -> u64 {
        self.dims[range]
            .iter()
            .fold(1u64, |acc, &d| acc.saturating_mul(d))
    }

    /// Row-major strides in elements.
    pub fn strides(&self) -> Dims {
        let mut strides: Dims = SmallVec::from_elem(1, self.rank());
        for i in (0..self.rank().saturating_sub(1)).rev() {
            strides[i] = strides[i + 1].saturating_mul(self.dims[i + 1]);
        }
        strides
    }
}

impl fmt::Display for TensorShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, d) in self.dims.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", d)?;
        }
        write!(f, "]")
    }
}

impl TryFrom<&[u64]> for TensorShape {
    type Error = TilingError;

    fn try_from(dims: &[u64]) -> TilingResult<Self> {
        Self::new(dims)
    }
}

impl TryFrom<Vec<u64>> for TensorShape {
    type Error = TilingError;

    fn try_from(dims: Vec<u64>) -> TilingResult<Self> {
        Self::new(&dims)
    }
}

/// Round `value` up to a multiple of `align`. `align == 0` returns `value`.
#[inline]
pub fn ceil_align(value: u64, align: u64) -> u64 {
    if align == 0 {
        return value;
    }
    value.div_ceil(align).saturating_mul(align)
}

/// Integer ceiling division. Division by zero yields zero.
#[inline]
pub fn ceil_div(value: u64, divisor: u64) -> u64 {
    if divisor == 0 {
        return 0;
    }
    value.div_ceil(divisor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_basics() {
        let shape = TensorShape::new(&[2, 3, 4]).unwrap();
        assert_eq!(shape.rank(), 3);
        assert_eq!(shape.numel(), 24);
        assert_eq!(shape.dim(1), Some(3));
        assert_eq!(shape.dim(3), None);
        assert!(!shape.is_empty());
        assert_eq!(shape.product(1..3), 12);
        assert_eq!(shape.to_string(), "[2, 3, 4]");
    }

    #[test]
    fn test_shape_rank_limit() {
        assert!(TensorShape::new(&[1; MAX_RANK]).is_ok());
        let err = TensorShape::new(&[1; MAX_RANK + 1]).unwrap_err();
        assert!(matches!(err, TilingError::RankTooLarge { rank: 8, max: 7 }));
    }

    #[test]
    fn test_shape_empty_and_scalar() {
        let empty = TensorShape::new(&[3, 0]).unwrap();
        assert!(empty.is_empty());
        assert_eq!(empty.numel(), 0);

        let scalar = TensorShape::scalar();
        assert_eq!(scalar.rank(), 0);
        assert_eq!(scalar.numel(), 1);
        assert!(!scalar.is_empty());
    }

    #[test]
    fn test_strides() {
        let shape = TensorShape::new(&[2, 3, 4]).unwrap();
        assert_eq!(shape.strides().as_slice(), &[12, 4, 1]);
        assert!(TensorShape::scalar().strides().is_empty());
    }

    #[test]
    fn test_numel_saturates() {
        let shape = TensorShape::new(&[u64::MAX, 2]).unwrap();
        assert_eq!(shape.numel(), u64::MAX);
    }

    #[test]
    fn test_align_helpers() {
        assert_eq!(ceil_align(0, 32), 0);
        assert_eq!(ceil_align(1, 32), 32);
        assert_eq!(ceil_align(64, 32), 64);
        assert_eq!(ceil_align(65, 32), 96);
        assert_eq!(ceil_align(7, 0), 7);
        assert_eq!(ceil_div(10, 3), 4);
        assert_eq!(ceil_div(9, 3), 3);
        assert_eq!(ceil_div(5, 0), 0);
    }

    mod props {
        use crate::types::{ceil_align, TensorShape, MAX_RANK};
        use proptest::prelude::*;

        proptest! {
            /// Row-major strides: the outermost stride times its extent is numel
            #[test]
            fn prop_strides_cover_numel(dims in prop::collection::vec(1u64..16, 1..=MAX_RANK)) {
                let shape = TensorShape::new(&dims).unwrap();
                let strides = shape.strides();
                prop_assert_eq!(strides[shape.rank() - 1], 1);
                prop_assert_eq!(strides[0] * dims[0], shape.numel());
                for d in 0..shape.rank() {
                    prop_assert_eq!(strides[d], shape.product(d + 1..shape.rank()));
                }
            }

            /// Aligned values are the smallest multiple not below the input
            #[test]
            fn prop_ceil_align_minimal(value in 0u64..1_000_000, align in 1u64..512) {
                let aligned = ceil_align(value, align);
                prop_assert_eq!(aligned % align, 0);
                prop_assert!(aligned >= value);
                prop_assert!(aligned - value < align);
            }
        }
    }
}
