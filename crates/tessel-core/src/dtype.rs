//! Element types, index types and reduction modes.

use std::fmt;
use std::str::FromStr;

use crate::error::TilingError;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Element type of the data and updates operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum DType {
    F32,
    F16,
    BF16,
    F64,
    I8,
    U8,
    I16,
    I32,
    I64,
    Bool,
}

impl DType {
    /// Every supported element type, in key-code order.
    pub const ALL: [DType; 10] = [
        DType::F32,
        DType::F16,
        DType::BF16,
        DType::F64,
        DType::I8,
        DType::U8,
        DType::I16,
        DType::I32,
        DType::I64,
        DType::Bool,
    ];

    /// Size of one element in bytes.
    pub const fn size_bytes(self) -> u64 {
        match self {
            DType::I8 | DType::U8 | DType::Bool => 1,
            DType::F16 | DType::BF16 | DType::I16 => 2,
            DType::F32 | DType::I32 => 4,
            DType::F64 | DType::I64 => 8,
        }
    }

    pub const fn is_float(self) -> bool {
        matches!(self, DType::F32 | DType::F16 | DType::BF16 | DType::F64)
    }

    /// True when add/mul give the same bits regardless of combine order.
    ///
    /// Integers use wrapping arithmetic and `bool` uses or/and, both of
    /// which are associative and commutative.
    pub const fn exact_accumulation(self) -> bool {
        !self.is_float()
    }

    /// Bytes of the accumulator used while reducing. Half-precision types
    /// accumulate in `f32`.
    pub const fn accumulator_bytes(self) -> u64 {
        match self {
            DType::F16 | DType::BF16 => 4,
            other => other.size_bytes(),
        }
    }

    /// Stable code stored in the two low digits of a dispatch key.
    ///
    /// Codes start at 1 so that key `0` stays free for the no-op plan.
    pub const fn key_code(self) -> u64 {
        match self {
            DType::F32 => 1,
            DType::F16 => 2,
            DType::BF16 => 3,
            DType::F64 => 4,
            DType::I8 => 5,
            DType::U8 => 6,
            DType::I16 => 7,
            DType::I32 => 8,
            DType::I64 => 9,
            DType::Bool => 10,
        }
    }

    /// Inverse of [`DType::key_code`].
    pub fn from_key_code(code: u64) -> Option<Self> {
        Self::ALL.into_iter().find(|d| d.key_code() == code)
    }

    pub const fn name(self) -> &'static str {
        match self {
            DType::F32 => "float32",
            DType::F16 => "float16",
            DType::BF16 => "bfloat16",
            DType::F64 => "float64",
            DType::I8 => "int8",
            DType::U8 => "uint8",
            DType::I16 => "int16",
            DType::I32 => "int32",
            DType::I64 => "int64",
            DType::Bool => "bool",
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Element type of the indices operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum IndexDType {
    I32,
    I64,
}

impl IndexDType {
    pub const ALL: [IndexDType; 2] = [IndexDType::I32, IndexDType::I64];

    pub const fn size_bytes(self) -> u64 {
        match self {
            IndexDType::I32 => 4,
            IndexDType::I64 => 8,
        }
    }

    /// Index-width digit of a dispatch key.
    pub const fn key_code(self) -> u64 {
        match self {
            IndexDType::I32 => 0,
            IndexDType::I64 => 1,
        }
    }

    pub fn from_key_code(code: u64) -> Option<Self> {
        Self::ALL.into_iter().find(|d| d.key_code() == code)
    }
}

impl fmt::Display for IndexDType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexDType::I32 => f.write_str("int32"),
            IndexDType::I64 => f.write_str("int64"),
        }
    }
}

/// How an update combines with the value already at its destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Reduction {
    /// Overwrite the destination.
    #[default]
    None,
    Add,
    Mul,
}

impl Reduction {
    pub const ALL: [Reduction; 3] = [Reduction::None, Reduction::Add, Reduction::Mul];

    /// Reduction digit of a dispatch key.
    pub const fn key_code(self) -> u64 {
        match self {
            Reduction::None => 0,
            Reduction::Add => 1,
            Reduction::Mul => 2,
        }
    }

    pub fn from_key_code(code: u64) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.key_code() == code)
    }

    /// Whether this reduction is defined for `dtype`. Multiplying booleans is
    /// not supported.
    pub const fn supports(self, dtype: DType) -> bool {
        !matches!((self, dtype), (Reduction::Mul, DType::Bool))
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Reduction::None => "none",
            Reduction::Add => "add",
            Reduction::Mul => "mul",
        }
    }
}

impl fmt::Display for Reduction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Reduction {
    type Err = TilingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Reduction::None),
            "add" => Ok(Reduction::Add),
            "mul" => Ok(Reduction::Mul),
            other => Err(TilingError::UnknownReduction(other.to_string())),
        }
    }
}
