//! Element, index and offset traits used to monomorphize kernels.

use std::fmt::Debug;
use std::ops::{Add, Mul};

use half::{bf16, f16};
use tessel_core::{DType, IndexDType, Reduction};

/// Value type of the data and updates operands.
pub trait Element: Copy + Send + Sync + Debug + PartialEq + 'static {
    const DTYPE: DType;

    fn add(self, other: Self) -> Self;

    fn mul(self, other: Self) -> Self;

    /// `self / count`, `None` for types without a meaningful division.
    fn div_count(self, count: u64) -> Option<Self>;

    /// Combine `update` into the destination value `self`.
    #[inline]
    fn reduce(self, update: Self, reduction: Reduction) -> Self {
        match reduction {
            Reduction::None => update,
            Reduction::Add => self.add(update),
            Reduction::Mul => self.mul(update),
        }
    }
}

macro_rules! impl_float_element {
    ($t:ty, $dtype:expr) => {
        impl Element for $t {
            const DTYPE: DType = $dtype;

            #[inline]
            fn add(self, other: Self) -> Self {
                self + other
            }

            #[inline]
            fn mul(self, other: Self) -> Self {
                self * other
            }

            #[inline]
            fn div_count(self, count: u64) -> Option<Self> {
                Some(self / count as $t)
            }
        }
    };
}

impl_float_element!(f32, DType::F32);
impl_float_element!(f64, DType::F64);

// half precision computes in f32 and rounds once per combine
macro_rules! impl_half_element {
    ($t:ty, $dtype:expr) => {
        impl Element for $t {
            const DTYPE: DType = $dtype;

            #[inline]
            fn add(self, other: Self) -> Self {
                <$t>::from_f32(self.to_f32() + other.to_f32())
            }

            #[inline]
            fn mul(self, other: Self) -> Self {
                <$t>::from_f32(self.to_f32() * other.to_f32())
            }

            #[inline]
            fn div_count(self, count: u64) -> Option<Self> {
                Some(<$t>::from_f32(self.to_f32() / count as f32))
            }
        }
    };
}

impl_half_element!(f16, DType::F16);
impl_half_element!(bf16, DType::BF16);

macro_rules! impl_int_element {
    ($($t:ty => $dtype:expr),* $(,)?) => {
        $(
            impl Element for $t {
                const DTYPE: DType = $dtype;

                #[inline]
                fn add(self, other: Self) -> Self {
                    self.wrapping_add(other)
                }

                #[inline]
                fn mul(self, other: Self) -> Self {
                    self.wrapping_mul(other)
                }

                #[inline]
                fn div_count(self, _count: u64) -> Option<Self> {
                    None
                }
            }
        )*
    };
}

impl_int_element!(
    i8 => DType::I8,
    u8 => DType::U8,
    i16 => DType::I16,
    i32 => DType::I32,
    i64 => DType::I64,
);

impl Element for bool {
    const DTYPE: DType = DType::Bool;

    #[inline]
    fn add(self, other: Self) -> Self {
        self | other
    }

    #[inline]
    fn mul(self, other: Self) -> Self {
        self & other
    }

    #[inline]
    fn div_count(self, _count: u64) -> Option<Self> {
        None
    }
}

/// Value type of the indices operand.
pub trait IndexElement: Copy + Send + Sync + Debug + 'static {
    const DTYPE: IndexDType;

    fn to_i64(self) -> i64;
}

impl IndexElement for i32 {
    const DTYPE: IndexDType = IndexDType::I32;

    #[inline]
    fn to_i64(self) -> i64 {
        self as i64
    }
}

impl IndexElement for i64 {
    const DTYPE: IndexDType = IndexDType::I64;

    #[inline]
    fn to_i64(self) -> i64 {
        self
    }
}

/// Integer type used for element offsets inside one kernel variant.
pub trait Offset: Copy + Send + Sync + Debug + Add<Output = Self> + Mul<Output = Self> + 'static {
    const BITS: u32;
    const ZERO: Self;

    fn from_u64(value: u64) -> Option<Self>;

    fn to_usize(self) -> usize;
}

impl Offset for u32 {
    const BITS: u32 = 32;
    const ZERO: Self = 0;

    #[inline]
    fn from_u64(value: u64) -> Option<Self> {
        u32::try_from(value).ok()
    }

    #[inline]
    fn to_usize(self) -> usize {
        self as usize
    }
}

impl Offset for u64 {
    const BITS: u32 = 64;
    const ZERO: Self = 0;

    #[inline]
    fn from_u64(value: u64) -> Option<Self> {
        Some(value)
    }

    #[inline]
    fn to_usize(self) -> usize {
        self as usize
    }
}

/// Resolve `index` against an axis of `len` positions.
///
/// Negative values count from the end once; anything outside `-len..len`
/// is masked.
#[inline]
pub fn resolve_index(index: i64, len: u64) -> Option<u64> {
    let len = i64::try_from(len).ok()?;
    if index >= len || index < -len {
        return None;
    }
    let resolved = if index < 0 { index + len } else { index };
    Some(resolved as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_float_reduce() {
        assert_eq!(2.0f32.reduce(3.0, Reduction::Add), 5.0);
        assert_eq!(2.0f32.reduce(3.0, Reduction::Mul), 6.0);
        assert_eq!(2.0f32.reduce(3.0, Reduction::None), 3.0);
        assert_eq!(9.0f64.div_count(3), Some(3.0));
    }

    #[test]
    fn test_half_reduce() {
        let a = f16::from_f32(1.5);
        let b = f16::from_f32(2.0);
        assert_eq!(a.reduce(b, Reduction::Add), f16::from_f32(3.5));
        assert_eq!(bf16::from_f32(3.0).reduce(bf16::from_f32(2.0), Reduction::Mul), bf16::from_f32(6.0));
        assert_eq!(f16::from_f32(4.0).div_count(2), Some(f16::from_f32(2.0)));
    }

    #[test]
    fn test_int_wrapping() {
        assert_eq!(i8::MAX.reduce(1, Reduction::Add), i8::MIN);
        assert_eq!(200u8.reduce(2, Reduction::Mul), 144);
        assert_eq!(7i32.div_count(2), None);
    }

    #[test]
    fn test_bool_reduce() {
        assert!(false.reduce(true, Reduction::Add));
        assert!(!true.reduce(false, Reduction::Mul));
        assert!(!true.reduce(false, Reduction::None));
    }

    #[test]
    fn test_dtype_constants() {
        assert_eq!(<f32 as Element>::DTYPE, DType::F32);
        assert_eq!(<bf16 as Element>::DTYPE, DType::BF16);
        assert_eq!(<bool as Element>::DTYPE, DType::Bool);
        assert_eq!(<i32 as IndexElement>::DTYPE, IndexDType::I32);
    }

    #[test]
    fn test_offsets() {
        assert_eq!(u32::from_u64(u32::MAX as u64), Some(u32::MAX));
        assert_eq!(u32::from_u64(u32::MAX as u64 + 1), None);
        assert_eq!(u64::from_u64(1 << 40), Some(1 << 40));
    }

    #[test]
    fn test_resolve_index() {
        assert_eq!(resolve_index(0, 4), Some(0));
        assert_eq!(resolve_index(3, 4), Some(3));
        assert_eq!(resolve_index(-1, 4), Some(3));
        assert_eq!(resolve_index(-4, 4), Some(0));
        assert_eq!(resolve_index(4, 4), None);
        assert_eq!(resolve_index(-5, 4), None);
        assert_eq!(resolve_index(0, 0), None);
    }
}
