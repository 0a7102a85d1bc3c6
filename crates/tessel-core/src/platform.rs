//! Platform capabilities threaded through every planning call.
//!
//! There is no process-wide state: the core count and the fast-memory window
//! travel with each request in a [`PlatformInfo`].

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Default scratch window per core (192 KB).
pub const DEFAULT_UB_SIZE: u64 = 192 * 1024;

/// Default transfer block alignment in bytes.
pub const DEFAULT_UB_BLOCK: u64 = 32;

/// Bytes of the window kept back for the vector pipeline (8 KB).
pub const DEFAULT_RESERVED_BYTES: u64 = 8 * 1024;

/// Default number of compute cores.
pub const DEFAULT_CORE_NUM: u32 = 48;

/// Core count and fast-memory layout of the target.
///
/// # Examples
///
/// ```
/// use tessel_core::PlatformInfo;
///
/// let platform = PlatformInfo::default()
///     .with_core_num(64)
///     .with_ub_size(256 * 1024);
/// assert_eq!(platform.core_num, 64);
/// assert_eq!(platform.budget_bytes(), 256 * 1024 - 8 * 1024);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PlatformInfo {
    /// Usable compute cores (default: 48)
    pub core_num: u32,

    /// Fast-memory window per core in bytes (default: 192 KB)
    pub ub_size: u64,

    /// Alignment of every scratch buffer in bytes (default: 32)
    pub ub_block: u64,

    /// Bytes of the window unavailable to tiles (default: 8 KB)
    pub reserved_bytes: u64,
}

impl Default for PlatformInfo {
    fn default() -> Self {
        Self {
            core_num: DEFAULT_CORE_NUM,
            ub_size: DEFAULT_UB_SIZE,
            ub_block: DEFAULT_UB_BLOCK,
            reserved_bytes: DEFAULT_RESERVED_BYTES,
        }
    }
}

impl PlatformInfo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by `TESSEL_CORE_NUM`, `TESSEL_UB_SIZE`,
    /// `TESSEL_UB_BLOCK` and `TESSEL_RESERVED_BYTES`. Unparsable values are
    /// ignored.
    pub fn from_env() -> Self {
        fn read<T: std::str::FromStr>(name: &str) -> Option<T> {
            std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
        }

        let mut info = Self::default();
        if let Some(v) = read("TESSEL_CORE_NUM") {
            info.core_num = v;
        }
        if let Some(v) = read("TESSEL_UB_SIZE") {
            info.ub_size = v;
        }
        if let Some(v) = read("TESSEL_UB_BLOCK") {
            info.ub_block = v;
        }
        if let Some(v) = read("TESSEL_RESERVED_BYTES") {
            info.reserved_bytes = v;
        }
        info
    }

    pub fn with_core_num(mut self, core_num: u32) -> Self {
        self.core_num = core_num;
        self
    }

    pub fn with_ub_size(mut self, ub_size: u64) -> Self {
        self.ub_size = ub_size;
        self
    }

    pub fn with_ub_block(mut self, ub_block: u64) -> Self {
        self.ub_block = ub_block;
        self
    }

    pub fn with_reserved_bytes(mut self, reserved_bytes: u64) -> Self {
        self.reserved_bytes = reserved_bytes;
        self
    }

    /// Bytes available to one tile's scratch buffers.
    pub fn budget_bytes(&self) -> u64 {
        self.ub_size.saturating_sub(self.reserved_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let info = PlatformInfo::default();
        assert_eq!(info.core_num, 48);
        assert_eq!(info.ub_size, 196_608);
        assert_eq!(info.ub_block, 32);
        assert_eq!(info.budget_bytes(), 196_608 - 8192);
    }

    #[test]
    fn test_builders() {
        let info = PlatformInfo::new()
            .with_core_num(8)
            .with_ub_size(4096)
            .with_ub_block(64)
            .with_reserved_bytes(1024);
        assert_eq!(info.core_num, 8);
        assert_eq!(info.budget_bytes(), 3072);
        assert_eq!(info.ub_block, 64);
    }

    #[test]
    fn test_budget_saturates() {
        let info = PlatformInfo::default()
            .with_ub_size(100)
            .with_reserved_bytes(200);
        assert_eq!(info.budget_bytes(), 0);
    }
}
