//! Dispatch table from keys to kernel variants
//!
//! The table is built once from every supported combination and looked up
//! once per invocation; workers receive the resolved variant.

use std::collections::HashMap;
use std::sync::OnceLock;

use tessel_core::TilingError;
use tessel_planner::{supported_variants, DispatchKey, KeyFields};

use crate::error::{ExecError, ExecResult};

/// A specialized execution path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelVariant {
    pub key: DispatchKey,
    pub fields: KeyFields,
}

/// Lookup table over all supported keys.
#[derive(Debug, Clone)]
pub struct DispatchTable {
    variants: HashMap<DispatchKey, KernelVariant>,
}

impl DispatchTable {
    /// Build the table from the supported variant set.
    pub fn new() -> ExecResult<Self> {
        let mut variants = HashMap::new();
        for fields in supported_variants() {
            let key = fields.encode()?;
            variants.insert(key, KernelVariant { key, fields });
        }
        Ok(Self { variants })
    }

    /// Process-wide table, built on first use.
    pub fn global() -> ExecResult<&'static DispatchTable> {
        static TABLE: OnceLock<Result<DispatchTable, ExecError>> = OnceLock::new();
        TABLE
            .get_or_init(DispatchTable::new)
            .as_ref()
            .map_err(Clone::clone)
    }

    /// Variant registered for `key`.
    pub fn lookup(&self, key: DispatchKey) -> ExecResult<&KernelVariant> {
        self.variants
            .get(&key)
            .ok_or(ExecError::Tiling(TilingError::UnknownDispatchKey(key.value())))
    }

    pub fn len(&self) -> usize {
        self.variants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variants.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessel_core::{DType, IndexDType, Reduction};
    use tessel_planner::{encode_key, OrderingMode, Regime};

    #[test]
    fn test_table_covers_supported_set() {
        let table = DispatchTable::new().unwrap();
        assert_eq!(table.len(), supported_variants().count());
        assert!(!table.is_empty());
    }

    #[test]
    fn test_lookup() {
        let table = DispatchTable::global().unwrap();
        let key = encode_key(DType::F16, Reduction::Add, IndexDType::I64, false, Regime::Outer)
            .unwrap();
        let variant = table.lookup(key).unwrap();
        assert_eq!(variant.fields.dtype, DType::F16);
        assert_eq!(variant.fields.ordering, OrderingMode::Encounter);

        assert!(table.lookup(DispatchKey::EMPTY).is_err());
        assert!(table.lookup(DispatchKey(999_999_999)).is_err());
    }
}
