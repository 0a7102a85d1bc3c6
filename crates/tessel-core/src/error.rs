//! Error taxonomy for tiling decisions.
//!
//! Every failure is detected from shape and attribute metadata before any
//! data is read, so none of them needs rollback. Callers map these to a
//! single top-level failure.
//!
//! # Examples
//!
//! ```
//! use tessel_core::{TilingError, TilingResult};
//!
//! fn check_cores(core_num: u32) -> TilingResult<()> {
//!     if core_num == 0 {
//!         return Err(TilingError::CoreLimitZero);
//!     }
//!     Ok(())
//! }
//!
//! assert!(check_cores(0).is_err());
//! ```

use thiserror::Error;

use crate::dtype::{DType, Reduction};

/// Result alias used throughout the planner.
pub type TilingResult<T> = Result<T, TilingError>;

/// Failure returned by a tiling step.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TilingError {
    /// Rank or off-axis extent disagreement between data, indices and updates.
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    /// The platform reported zero usable cores.
    #[error("core limit must be at least 1")]
    CoreLimitZero,

    /// The smallest tile still needs more scratch than the window provides.
    #[error("tile budget too small: minimum tile needs {required} bytes, budget is {budget} bytes")]
    BudgetTooSmall { required: u64, budget: u64 },

    /// A key field value does not fit its declared width.
    #[error("dispatch key field `{field}` value {value} exceeds maximum {max}")]
    KeyEncodingOverflow {
        field: &'static str,
        value: u64,
        max: u64,
    },

    #[error("axis {axis} is out of range for rank {rank}")]
    InvalidAxis { axis: i64, rank: usize },

    #[error("rank {rank} exceeds the maximum rank {max}")]
    RankTooLarge { rank: usize, max: usize },

    #[error("unknown reduction `{0}`, expected one of none, add, mul")]
    UnknownReduction(String),

    #[error("reduction `{reduction}` is not supported for {dtype}")]
    UnsupportedCombination { dtype: DType, reduction: Reduction },

    /// A key that no supported variant encodes to.
    #[error("dispatch key {0} does not name a supported variant")]
    UnknownDispatchKey(u64),
}

impl TilingError {
    /// Shape mismatch located at one dimension.
    pub fn mismatch_at(dim: usize, what: &str, left: u64, right: u64) -> Self {
        TilingError::ShapeMismatch(format!("dimension {dim}: {what} ({left} vs {right})"))
    }

    /// True for the errors that signal a programming mistake rather than bad
    /// caller input.
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            TilingError::KeyEncodingOverflow { .. } | TilingError::UnknownDispatchKey(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let err = TilingError::mismatch_at(1, "indices and updates differ", 18, 28);
        assert_eq!(
            err.to_string(),
            "shape mismatch: dimension 1: indices and updates differ (18 vs 28)"
        );

        let err = TilingError::BudgetTooSmall {
            required: 512,
            budget: 256,
        };
        assert!(err.to_string().contains("512"));
        assert!(err.to_string().contains("256"));

        let err = TilingError::UnsupportedCombination {
            dtype: DType::Bool,
            reduction: Reduction::Mul,
        };
        assert_eq!(err.to_string(), "reduction `mul` is not supported for bool");
    }

    #[test]
    fn test_internal_classification() {
        assert!(TilingError::KeyEncodingOverflow {
            field: "dtype",
            value: 100,
            max: 99
        }
        .is_internal());
        assert!(TilingError::UnknownDispatchKey(7).is_internal());
        assert!(!TilingError::CoreLimitZero.is_internal());
        assert!(!TilingError::ShapeMismatch(String::new()).is_internal());
    }
}
