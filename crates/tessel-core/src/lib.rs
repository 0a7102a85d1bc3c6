//! # tessel-core
//!
//! Core metadata types for the tessel tiling engine.
//!
//! Every decision tessel makes is derived from metadata alone: operand shapes,
//! element types, the reduction mode and the capabilities of the target
//! platform. This crate defines those inputs and the error taxonomy shared by
//! the planner and the executor.
//!
//! - [`TensorShape`]: rank-bounded extents with `SmallVec` storage
//! - [`DType`], [`IndexDType`], [`Reduction`]: operand and mode descriptors
//! - [`PlatformInfo`]: core count and fast-memory window, passed explicitly
//! - [`TilingError`]: tagged failures returned by every planning step
//!
//! ## Quick Start
//!
//! ```
//! use tessel_core::{DType, PlatformInfo, Reduction, TensorShape};
//!
//! let data = TensorShape::new(&[10, 38, 26]).unwrap();
//! assert_eq!(data.numel(), 10 * 38 * 26);
//!
//! let reduction: Reduction = "add".parse().unwrap();
//! assert!(reduction.supports(DType::F32));
//!
//! let platform = PlatformInfo::default().with_core_num(64);
//! assert!(platform.budget_bytes() > 0);
//! ```

#![deny(warnings)]

pub mod dtype;
pub mod error;
pub mod platform;
pub mod types;

pub use dtype::*;
pub use error::*;
pub use platform::*;
pub use types::*;
