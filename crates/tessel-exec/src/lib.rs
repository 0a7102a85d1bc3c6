//! # tessel-exec
//!
//! Parallel executor for tessel scatter plans.
//!
//! This crate provides:
//! - [`ParallelExecutor`] - runs a [`tessel_planner::ScatterPlan`] on one worker per core
//! - [`DispatchTable`] - maps dispatch keys to monomorphized kernel variants
//! - [`ScalarBarrier`] - two-phase aggregation of one scalar per worker
//! - [`ExecHints`] - scheduling, double buffering and state tracing controls
//!
//! Workers follow a fixed lifecycle (see [`WorkerState`]): load a chunk of
//! indices and updates, compute the contributions, store them into the
//! shared output. With double buffering the next chunk is loaded while the
//! current one is computed.

#![deny(warnings)]

pub mod barrier;
pub mod dispatch;
pub mod element;
pub mod error;
pub mod executor;
pub mod hints;


pub use barrier::*;
pub use dispatch::*;
pub use element::*;
pub use error::*;
pub use executor::*;
pub use hints::*;
