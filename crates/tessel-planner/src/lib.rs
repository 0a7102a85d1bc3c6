//! # tessel-planner
//!
//! Host-side tiling decisions for scatter-style operators.
//!
//! Given operand shapes, a core count and a per-core scratch budget, the
//! planner decides how much work each core gets, how large a tile it stages at
//! once, whether colliding contributions must be ordered for reproducibility,
//! and which specialized execution path handles the result.
//!
//! ## Pipeline
//!
//! 1. [`normalize`]: fold the shape triple into a `(pre, mid, post)` view
//! 2. [`plan_work`] / [`partition`]: front/tail split of lines over cores
//! 3. [`solve_tile_size`]: binary search against a [`CostModel`]
//! 4. [`decide_ordering`] / [`order_for_determinism`]: deterministic grouping
//! 5. [`KeyFields::encode`]: pack the variant into a [`DispatchKey`]
//!
//! [`plan_scatter`] runs all of them.
//!
//! ## Quick Start
//!
//! ```
//! use tessel_core::{PlatformInfo, Reduction, TensorShape};
//! use tessel_planner::{plan_scatter, ScatterRequest, TilingConfig};
//!
//! let data = TensorShape::new(&[8, 512, 64]).unwrap();
//! let indices = TensorShape::new(&[8, 100, 64]).unwrap();
//! let request = ScatterRequest::new(data, indices.clone(), indices)
//!     .with_axis(1)
//!     .with_reduction(Reduction::Add)
//!     .with_deterministic(true);
//!
//! let plan = plan_scatter(&request, &PlatformInfo::default(), &TilingConfig::default()).unwrap();
//! println!("cores: {}", plan.used_cores());
//! println!("tile: {} elements, {} bytes", plan.tile.tile_elems, plan.tile.total_bytes);
//! println!("key: {}", plan.key);
//! ```
//!
//! ## Errors
//!
//! Every step returns [`TilingResult`]; failures are detected from metadata
//! before any data is touched.

#![deny(warnings)]

pub mod api;
pub mod axis;
pub mod determinism;
pub mod key;
pub mod partition;
pub mod tiling;

#[cfg(test)]
mod property_tests;

pub use api::*;
pub use axis::*;
pub use determinism::*;
pub use key::*;
pub use partition::*;
pub use tiling::*;

pub use tessel_core::{TilingError, TilingResult};
