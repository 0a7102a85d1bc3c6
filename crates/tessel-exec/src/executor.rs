//! Parallel execution of scatter plans
//!
//! [`ParallelExecutor`] resolves the plan's dispatch key once, validates the
//! operand buffers against the plan and then drives one worker per core.
//! Workers share the output through a lock held only while storing a chunk.
//! Threaded runs use a dedicated rayon pool with one thread per worker, so
//! every worker can reach the normalization barrier at the same time.

mod geometry;
mod worker;

use std::panic::{self, AssertUnwindSafe};

use parking_lot::Mutex;
use tessel_core::Reduction;
use tessel_planner::{AxisLayout, ScatterPlan};
use tracing::{debug, debug_span, trace_span, Span};

use crate::barrier::ScalarBarrier;
use crate::dispatch::{DispatchTable, KernelVariant};
use crate::element::{Element, IndexElement, Offset};
use crate::error::{ExecError, ExecResult};
use crate::hints::{ExecHints, Schedule};
use geometry::Geometry;
use worker::{Worker, WorkerContext};

pub use worker::{WorkerOutcome, WorkerState};

/// Summary of one execution.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExecReport {
    pub used_cores: u32,
    pub chunks: u64,
    /// Contributions that reached the output
    pub applied: u64,
    /// Indices outside the data axis, skipped
    pub masked: u64,
    /// Global valid count agreed at the barrier, when normalizing
    pub valid_total: Option<u64>,
    /// Per-worker outcomes in core order
    pub workers: Vec<WorkerOutcome>,
}

/// Executes a [`ScatterPlan`] across the cores it was planned for.
///
/// # Examples
///
/// ```
/// use tessel_core::{PlatformInfo, Reduction, TensorShape};
/// use tessel_exec::{ExecHints, ParallelExecutor};
/// use tessel_planner::{plan_scatter, ScatterRequest, TilingConfig};
///
/// let data_shape = TensorShape::new(&[2, 4]).unwrap();
/// let index_shape = TensorShape::new(&[2, 3]).unwrap();
/// let request = ScatterRequest::new(data_shape, index_shape.clone(), index_shape)
///     .with_axis(1)
///     .with_reduction(Reduction::Add);
/// let plan = plan_scatter(&request, &PlatformInfo::default(), &TilingConfig::default()).unwrap();
///
/// let mut data = vec![0.0f32; 8];
/// let indices = vec![0i64, 0, 3, 1, 2, -1];
/// let updates = vec![1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0];
///
/// let executor = ParallelExecutor::new(plan, ExecHints::default()).unwrap();
/// let report = executor.run(&mut data, &indices, &updates).unwrap();
/// assert_eq!(data, vec![3.0, 0.0, 0.0, 3.0, 0.0, 4.0, 5.0, 6.0]);
/// assert_eq!(report.applied, 6);
/// ```
#[derive(Debug, Clone)]
pub struct ParallelExecutor {
    plan: ScatterPlan,
    hints: ExecHints,
    variant: Option<KernelVariant>,
}

impl ParallelExecutor {
    /// Resolve the plan's key and check the hints against it.
    pub fn new(plan: ScatterPlan, hints: ExecHints) -> ExecResult<Self> {
        let variant = if plan.is_noop() {
            None
        } else {
            Some(*DispatchTable::global()?.lookup(plan.key)?)
        };

        if hints.normalize_by_valid_count
            && !(plan.dtype.is_float() && plan.reduction == Reduction::Add)
        {
            return Err(ExecError::UnsupportedNormalization {
                dtype: plan.dtype,
                reduction: plan.reduction,
            });
        }

        Ok(Self {
            plan,
            hints,
            variant,
        })
    }

    pub fn plan(&self) -> &ScatterPlan {
        &self.plan
    }

    pub fn hints(&self) -> &ExecHints {
        &self.hints
    }

    /// The resolved path, `None` for a no-op plan.
    pub fn variant(&self) -> Option<&KernelVariant> {
        self.variant.as_ref()
    }

    /// Scatter `updates` into `data` at `indices`.
    pub fn run<T, I>(&self, data: &mut [T], indices: &[I], updates: &[T]) -> ExecResult<ExecReport>
    where
        T: Element,
        I: IndexElement,
    {
        if T::DTYPE != self.plan.dtype {
            return Err(ExecError::ElementMismatch {
                expected: self.plan.dtype,
                actual: T::DTYPE,
            });
        }
        if I::DTYPE != self.plan.index_dtype {
            return Err(ExecError::IndexMismatch {
                expected: self.plan.index_dtype,
                actual: I::DTYPE,
            });
        }

        let (Some(layout), Some(variant)) = (self.plan.layout.as_ref(), self.variant.as_ref())
        else {
            debug!("no-op plan, nothing to scatter");
            return Ok(ExecReport::default());
        };

        check_len("data", layout.folded.data.numel(), data.len())?;
        check_len("indices", layout.folded.indices.numel(), indices.len())?;
        check_len("updates", layout.folded.updates.numel(), updates.len())?;

        if variant.fields.wide_offsets {
            self.execute::<T, I, u64>(layout, variant, data, indices, updates)
        } else {
            self.execute::<T, I, u32>(layout, variant, data, indices, updates)
        }
    }

    fn execute<T, I, O>(
        &self,
        layout: &AxisLayout,
        variant: &KernelVariant,
        data: &mut [T],
        indices: &[I],
        updates: &[T],
    ) -> ExecResult<ExecReport>
    where
        T: Element,
        I: IndexElement,
        O: Offset,
    {
        let geometry = Geometry::<O>::new(layout)?;
        let ctx = WorkerContext {
            geometry: &geometry,
            indices,
            updates,
            tile: self.plan.tile.tile_elems,
            lines_per_chunk: self.plan.lines_per_chunk,
            reduction: variant.fields.reduction,
            ordering: variant.fields.ordering,
            double_buffer: self.hints.double_buffer,
            trace_states: self.hints.trace_states,
        };

        let workers: Vec<Worker<'_, T, I, O>> = (0..self.plan.used_cores())
            .filter_map(|core| self.plan.work.assignment(core).map(|work| (core, work)))
            .enumerate()
            .map(|(slot, (core, work))| Worker::new(core, slot, work, &ctx))
            .collect();

        let span = debug_span!(
            "scatter",
            key = %variant.key,
            cores = workers.len(),
            tile = self.plan.tile.tile_elems,
            lines_per_chunk = self.plan.lines_per_chunk
        );
        let _enter = span.enter();

        let barrier = self
            .hints
            .normalize_by_valid_count
            .then(|| ScalarBarrier::<u64>::new(workers.len(), self.hints.barrier_timeout));
        let output = Mutex::new(data);

        let mut outcomes = match &self.hints.schedule {
            Schedule::Threaded => run_threaded(&workers, barrier.as_ref(), &output, &span)?,
            Schedule::Sequential => {
                let order: Vec<usize> = (0..workers.len()).collect();
                run_in_order(&workers, &order, barrier.as_ref(), &output, &span)?
            }
            Schedule::Ordered(cores) => {
                let order = ordered_slots(&workers, cores)?;
                run_in_order(&workers, &order, barrier.as_ref(), &output, &span)?
            }
        };
        outcomes.sort_by_key(|o| o.core);

        let valid_total = match &barrier {
            Some(b) => Some(b.wait()?),
            None => None,
        };
        let report = ExecReport {
            used_cores: workers.len() as u32,
            chunks: outcomes.iter().map(|o| o.chunks).sum(),
            applied: outcomes.iter().map(|o| o.applied).sum(),
            masked: outcomes.iter().map(|o| o.masked).sum(),
            valid_total,
            workers: outcomes,
        };
        debug!(
            applied = report.applied,
            masked = report.masked,
            chunks = report.chunks,
            "scatter finished"
        );
        Ok(report)
    }
}

fn check_len(operand: &'static str, expected: u64, actual: usize) -> ExecResult<()> {
    if expected != actual as u64 {
        return Err(ExecError::LengthMismatch {
            operand,
            expected,
            actual,
        });
    }
    Ok(())
}

/// Map a core order onto worker slots; it must name every worker once.
fn ordered_slots<T, I, O>(workers: &[Worker<'_, T, I, O>], cores: &[u32]) -> ExecResult<Vec<usize>> {
    if cores.len() != workers.len() {
        return Err(ExecError::InvalidSchedule(format!(
            "order names {} cores but the plan uses {}",
            cores.len(),
            workers.len()
        )));
    }
    let mut seen = vec![false; workers.len()];
    cores
        .iter()
        .map(|&core| {
            let slot = workers
                .iter()
                .position(|w| w.core == core)
                .ok_or_else(|| ExecError::InvalidSchedule(format!("core {core} has no work")))?;
            if std::mem::replace(&mut seen[slot], true) {
                return Err(ExecError::InvalidSchedule(format!(
                    "core {core} appears twice"
                )));
            }
            Ok(slot)
        })
        .collect()
}

/// Scale for one worker, agreed at the barrier.
fn agreed_scale(barrier: Option<&ScalarBarrier<u64>>) -> ExecResult<Option<u64>> {
    match barrier {
        Some(b) => {
            let total = b.wait()?;
            debug!(total, "barrier released");
            Ok(Some(total).filter(|&total| total > 0))
        }
        None => Ok(None),
    }
}

fn run_threaded<T, I, O>(
    workers: &[Worker<'_, T, I, O>],
    barrier: Option<&ScalarBarrier<u64>>,
    output: &Mutex<&mut [T]>,
    parent: &Span,
) -> ExecResult<Vec<WorkerOutcome>>
where
    T: Element,
    I: IndexElement,
    O: Offset,
{
    if workers.is_empty() {
        return Ok(Vec::new());
    }
    // fewer threads than workers would deadlock at the barrier
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers.len())
        .thread_name(|idx| format!("tessel-worker-{idx}"))
        .build()
        .map_err(|e| ExecError::ThreadPool(e.to_string()))?;

    let mut slots: Vec<Option<ExecResult<WorkerOutcome>>> = workers.iter().map(|_| None).collect();
    pool.in_place_scope(|s| {
        for (worker, slot) in workers.iter().zip(slots.iter_mut()) {
            s.spawn(move |_| {
                let job = || -> ExecResult<WorkerOutcome> {
                    let _enter = trace_span!(parent: parent, "worker", core = worker.core).entered();
                    if let Some(b) = barrier {
                        b.publish(worker.slot, worker.count_valid()?)?;
                    }
                    worker.run(agreed_scale(barrier)?, output)
                };
                *slot = Some(panic::catch_unwind(AssertUnwindSafe(job)).unwrap_or_else(|_| {
                    Err(ExecError::WorkerPanicked { core: worker.core })
                }));
            });
        }
    });
    let results = slots.into_iter().zip(workers).map(|(slot, worker)| {
        slot.unwrap_or(Err(ExecError::WorkerPanicked { core: worker.core }))
    });

    // a failed worker leaves its peers waiting at the barrier; report the cause
    let is_timeout = |err: &ExecError| matches!(err, ExecError::BarrierTimeout { .. });
    let mut outcomes = Vec::with_capacity(workers.len());
    let mut first_error: Option<ExecError> = None;
    for result in results {
        match result {
            Ok(outcome) => outcomes.push(outcome),
            Err(err) => {
                let replace = first_error
                    .as_ref()
                    .map_or(true, |first| is_timeout(first) && !is_timeout(&err));
                if replace {
                    first_error = Some(err);
                }
            }
        }
    }
    match first_error {
        Some(err) => Err(err),
        None => Ok(outcomes),
    }
}

fn run_in_order<T, I, O>(
    workers: &[Worker<'_, T, I, O>],
    order: &[usize],
    barrier: Option<&ScalarBarrier<u64>>,
    output: &Mutex<&mut [T]>,
    parent: &Span,
) -> ExecResult<Vec<WorkerOutcome>>
where
    T: Element,
    I: IndexElement,
    O: Offset,
{
    if let Some(b) = barrier {
        for &slot in order {
            let worker = &workers[slot];
            b.publish(worker.slot, worker.count_valid()?)?;
        }
    }
    order
        .iter()
        .map(|&slot| {
            let worker = &workers[slot];
            let _enter = trace_span!(parent: parent, "worker", core = worker.core).entered();
            worker.run(agreed_scale(barrier)?, output)
        })
        .collect()
}

