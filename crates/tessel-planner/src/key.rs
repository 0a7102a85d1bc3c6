//! Dispatch key encoding
//!
//! A dispatch key packs every dimension of variation that selects a
//! specialized execution path into one decimal integer. Each field owns a
//! fixed run of decimal digits:
//!
//! | field     | digits | values                              |
//! |-----------|--------|-------------------------------------|
//! | dtype     | 10^0..10^1 | [`DType::key_code`], 1..=99     |
//! | reduction | 10^2   | none 0, add 1, mul 2                |
//! | index     | 10^3   | int32 0, int64 1                    |
//! | overflow  | 10^4   | 32-bit offsets 0, 64-bit offsets 1  |
//! | regime    | 10^5   | inner 0, outer 1                    |
//! | ordering  | 10^6   | encounter 0, sorted 1               |
//!
//! New fields are only ever appended above the highest digit in use, so a
//! key computed before the extension decodes to the same variant after it.
//! Key `0` is reserved for the no-op plan.

use std::fmt;

use tessel_core::{DType, IndexDType, Reduction, TilingError, TilingResult};

use crate::determinism::OrderingMode;
use crate::partition::Regime;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// One decimal field of a dispatch key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyField {
    DType,
    Reduction,
    IndexWidth,
    Overflow,
    Regime,
    Ordering,
}

impl KeyField {
    /// Fields from least to most significant.
    pub const ALL: [KeyField; 6] = [
        KeyField::DType,
        KeyField::Reduction,
        KeyField::IndexWidth,
        KeyField::Overflow,
        KeyField::Regime,
        KeyField::Ordering,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            KeyField::DType => "dtype",
            KeyField::Reduction => "reduction",
            KeyField::IndexWidth => "index_width",
            KeyField::Overflow => "overflow",
            KeyField::Regime => "regime",
            KeyField::Ordering => "ordering",
        }
    }

    /// Number of decimal digits the field occupies.
    pub const fn digits(self) -> u32 {
        match self {
            KeyField::DType => 2,
            _ => 1,
        }
    }

    /// Multiplier of the field's lowest digit.
    pub const fn scale(self) -> u64 {
        match self {
            KeyField::DType => 1,
            KeyField::Reduction => 100,
            KeyField::IndexWidth => 1_000,
            KeyField::Overflow => 10_000,
            KeyField::Regime => 100_000,
            KeyField::Ordering => 1_000_000,
        }
    }

    /// Largest value the field can hold.
    pub const fn max_value(self) -> u64 {
        10u64.pow(self.digits()) - 1
    }

    /// Place `value` into the field, rejecting values wider than the field.
    pub fn place(self, value: u64) -> TilingResult<u64> {
        if value > self.max_value() {
            return Err(TilingError::KeyEncodingOverflow {
                field: self.name(),
                value,
                max: self.max_value(),
            });
        }
        Ok(value * self.scale())
    }

    /// Read the field back out of `key`.
    pub fn extract(self, key: u64) -> u64 {
        (key / self.scale()) % 10u64.pow(self.digits())
    }
}

/// Opaque dispatch key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DispatchKey(pub u64);

impl DispatchKey {
    /// Key of a plan with nothing to execute.
    pub const EMPTY: DispatchKey = DispatchKey(0);

    pub const fn value(self) -> u64 {
        self.0
    }

    pub fn is_empty(self) -> bool {
        self == Self::EMPTY
    }

    /// Decode back into the fields that produced it.
    pub fn decode(self) -> TilingResult<KeyFields> {
        let key = self.0;
        let highest = KeyField::Ordering;
        if key / (highest.scale() * 10u64.pow(highest.digits())) != 0 {
            return Err(TilingError::UnknownDispatchKey(key));
        }
        let unknown = || TilingError::UnknownDispatchKey(key);
        Ok(KeyFields {
            dtype: DType::from_key_code(KeyField::DType.extract(key)).ok_or_else(unknown)?,
            reduction: Reduction::from_key_code(KeyField::Reduction.extract(key))
                .ok_or_else(unknown)?,
            index: IndexDType::from_key_code(KeyField::IndexWidth.extract(key))
                .ok_or_else(unknown)?,
            wide_offsets: match KeyField::Overflow.extract(key) {
                0 => false,
                1 => true,
                _ => return Err(unknown()),
            },
            regime: Regime::from_key_code(KeyField::Regime.extract(key)).ok_or_else(unknown)?,
            ordering: OrderingMode::from_key_code(KeyField::Ordering.extract(key))
                .ok_or_else(unknown)?,
        })
    }
}

impl fmt::Display for DispatchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Dimensions of variation selecting an execution path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct KeyFields {
    pub dtype: DType,
    pub reduction: Reduction,
    pub index: IndexDType,
    pub wide_offsets: bool,
    pub regime: Regime,
    pub ordering: OrderingMode,
}

impl KeyFields {
    /// Pack into a key.
    pub fn encode(&self) -> TilingResult<DispatchKey> {
        let parts = [
            (KeyField::DType, self.dtype.key_code()),
            (KeyField::Reduction, self.reduction.key_code()),
            (KeyField::IndexWidth, self.index.key_code()),
            (KeyField::Overflow, self.wide_offsets as u64),
            (KeyField::Regime, self.regime.key_code()),
            (KeyField::Ordering, self.ordering.key_code()),
        ];
        let mut key = 0u64;
        for (field, value) in parts {
            key += field.place(value)?;
        }
        Ok(DispatchKey(key))
    }

    /// Whether the executor provides a path for this combination.
    pub fn is_supported(&self) -> bool {
        self.reduction.supports(self.dtype)
            && (self.ordering == OrderingMode::Encounter
                || (self.reduction != Reduction::None && !self.dtype.exact_accumulation()))
    }
}

/// Encode a key with encounter ordering.
///
/// # Examples
///
/// ```
/// use tessel_core::{DType, IndexDType, Reduction};
/// use tessel_planner::{encode_key, Regime};
///
/// let key = encode_key(DType::I64, Reduction::Mul, IndexDType::I64, false, Regime::Outer).unwrap();
/// assert_eq!(key.value(), 101_209);
/// ```
pub fn encode_key(
    dtype: DType,
    reduction: Reduction,
    index: IndexDType,
    wide_offsets: bool,
    regime: Regime,
) -> TilingResult<DispatchKey> {
    KeyFields {
        dtype,
        reduction,
        index,
        wide_offsets,
        regime,
        ordering: OrderingMode::Encounter,
    }
    .encode()
}

/// Every combination the executor can dispatch.
pub fn supported_variants() -> impl Iterator<Item = KeyFields> {
    DType::ALL.into_iter().flat_map(|dtype| {
        Reduction::ALL.into_iter().flat_map(move |reduction| {
            IndexDType::ALL.into_iter().flat_map(move |index| {
                [false, true].into_iter().flat_map(move |wide_offsets| {
                    Regime::ALL.into_iter().flat_map(move |regime| {
                        OrderingMode::ALL.into_iter().filter_map(move |ordering| {
                            let fields = KeyFields {
                                dtype,
                                reduction,
                                index,
                                wide_offsets,
                                regime,
                                ordering,
                            };
                            fields.is_supported().then_some(fields)
                        })
                    })
                })
            })
        })
    })
}
