//! Error types for plan execution

use std::time::Duration;

use tessel_core::{DType, IndexDType, Reduction, TilingError};
use thiserror::Error;

/// Result alias for the executor.
pub type ExecResult<T> = Result<T, ExecError>;

/// Failure while executing a plan.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExecError {
    /// The plan or its key was rejected
    #[error("tiling error: {0}")]
    Tiling(#[from] TilingError),

    #[error("plan expects {expected} elements, got {actual}")]
    ElementMismatch { expected: DType, actual: DType },

    #[error("plan expects {expected} indices, got {actual}")]
    IndexMismatch {
        expected: IndexDType,
        actual: IndexDType,
    },

    #[error("{operand} holds {actual} elements but its shape needs {expected}")]
    LengthMismatch {
        operand: &'static str,
        expected: u64,
        actual: usize,
    },

    #[error("offset {value} does not fit {bits}-bit addressing")]
    OffsetOverflow { value: u64, bits: u32 },

    #[error("invalid schedule: {0}")]
    InvalidSchedule(String),

    #[error("barrier timed out after {waited:?} with {arrived} of {parties} workers")]
    BarrierTimeout {
        arrived: usize,
        parties: usize,
        waited: Duration,
    },

    #[error("barrier slot {slot} is invalid or already published ({parties} parties)")]
    BarrierSlot { slot: usize, parties: usize },

    #[error("worker {core} panicked")]
    WorkerPanicked { core: u32 },

    #[error("failed to start worker threads: {0}")]
    ThreadPool(String),

    #[error("normalizing by the valid count needs a float add, got {reduction} on {dtype}")]
    UnsupportedNormalization { dtype: DType, reduction: Reduction },
}
