//! # tessel - tiling and partition engine for scatter-style operators
//!
//! Given the shapes of a `data`, `indices` and `updates` triple, tessel
//! decides how the work is split across cores, how large a tile each core
//! stages in its scratch buffer, whether colliding float contributions must
//! be ordered for reproducibility, and which specialized path runs the plan.
//! The executor then carries the plan out on the host.
//!
//! This is the **meta crate** that re-exports all tessel components.
//!
//! ## Quick Start
//!
//! ```
//! use tessel::prelude::*;
//!
//! // embedding-gradient style: rows of `updates` accumulate into `data`
//! let mut table = vec![0.0f32; 5 * 2];
//! let grads = [1.0f32, 1.0, 2.0, 2.0, 3.0, 3.0];
//!
//! let report = scatter_ex(&[5, 2], &[3, 2])
//!     .axis(0)
//!     .reduction(Reduction::Add)
//!     .deterministic(true)
//!     .run(&mut table, &[4i64, 4, 0, 0, 4, 4], &grads)?;
//! assert_eq!(&table[8..], &[4.0, 4.0]);
//! assert_eq!(&table[..2], &[2.0, 2.0]);
//! assert_eq!(report.masked, 0);
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
//! ## Components
//!
//! ### Core Types ([`core`])
//!
//! Shapes, element and index types, reductions, platform description and
//! the planning error type.
//!
//! ### Planning ([`planner`])
//!
//! Axis normalization, front/tail core partition, tile-size search against
//! a scratch cost model, deterministic ordering and dispatch key encoding.
//!
//! ```
//! use tessel::planner::{plan_scatter, ScatterRequest, TilingConfig};
//! use tessel::core::{PlatformInfo, TensorShape};
//!
//! let data = TensorShape::new(&[4, 28, 3]).unwrap();
//! let indices = TensorShape::new(&[4, 18, 3]).unwrap();
//! let request = ScatterRequest::new(data, indices.clone(), indices).with_axis(1);
//! let plan = plan_scatter(&request, &PlatformInfo::default(), &TilingConfig::default()).unwrap();
//! assert_eq!(plan.used_cores(), 12);
//! ```
//!
//! ### Execution ([`exec`])
//!
//! Dispatch table, per-core workers with double buffering, the two-phase
//! scalar barrier and execution reports.
//!
//! ## Features
//!
//! - `tracing`: install a `tracing-subscriber` through [`tracing_support::init_tracing`]
//! - `serde`: serialize shapes, platform descriptions and plans

#![deny(warnings)]

pub use tessel_core as core;
pub use tessel_exec as exec;
pub use tessel_planner as planner;

pub mod scatter;
pub mod tracing_support;

pub use scatter::{scatter_ex, ScatterBuilder};

pub mod prelude {
    //! Prelude module for convenient imports
    //!
    //! # Example
    //!
    //! ```
    //! use tessel::prelude::*;
    //!
    //! let platform = PlatformInfo::default().with_core_num(8);
    //! assert_eq!(platform.core_num, 8);
    //! ```

    // Core types
    pub use crate::core::{DType, IndexDType, PlatformInfo, Reduction, TensorShape};

    // Planner
    pub use crate::planner::{plan_scatter, ScatterPlan, ScatterRequest, TilingConfig};

    // Execution
    pub use crate::exec::{ExecHints, ExecReport, ParallelExecutor, Schedule};

    // One-call API
    pub use crate::scatter::{scatter_ex, ScatterBuilder};
}
