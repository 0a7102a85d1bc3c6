//! One-call scatter: plan, dispatch and execute
//!
//! [`scatter_ex`] returns a builder that collects the operand shapes and
//! options, plans for the element and index types of the buffers passed to
//! [`ScatterBuilder::run`], and executes the plan.

use anyhow::{Context, Result};
use tessel_core::{PlatformInfo, Reduction, TensorShape};
use tessel_exec::{Element, ExecHints, ExecReport, IndexElement, ParallelExecutor};
use tessel_planner::{plan_scatter, ScatterPlan, ScatterRequest, TilingConfig};

/// Start a scatter of `index_shape` updates into a `data_shape` tensor.
///
/// # Example
/// ```
/// use tessel::scatter_ex;
/// use tessel::core::Reduction;
///
/// let mut data = vec![0.0f32; 6];
/// let report = scatter_ex(&[2, 3], &[2, 2])
///     .axis(1)
///     .reduction(Reduction::Add)
///     .run(&mut data, &[0i64, 0, 2, -1], &[1.0f32, 2.0, 3.0, 4.0])?;
/// assert_eq!(data, vec![3.0, 0.0, 0.0, 0.0, 0.0, 7.0]);
/// assert_eq!(report.applied, 4);
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn scatter_ex<'a>(data_shape: &'a [u64], index_shape: &'a [u64]) -> ScatterBuilder<'a> {
    ScatterBuilder::new(data_shape, index_shape)
}

/// Builder for scatter operations
#[derive(Debug, Clone)]
pub struct ScatterBuilder<'a> {
    data_shape: &'a [u64],
    index_shape: &'a [u64],
    update_shape: Option<&'a [u64]>,
    axis: i64,
    reduction: Reduction,
    deterministic: bool,
    platform: PlatformInfo,
    config: TilingConfig,
    hints: ExecHints,
}

impl<'a> ScatterBuilder<'a> {
    /// Create a new builder; updates share the index shape unless set.
    pub fn new(data_shape: &'a [u64], index_shape: &'a [u64]) -> Self {
        Self {
            data_shape,
            index_shape,
            update_shape: None,
            axis: 0,
            reduction: Reduction::None,
            deterministic: false,
            platform: PlatformInfo::default(),
            config: TilingConfig::default(),
            hints: ExecHints::default(),
        }
    }

    pub fn updates_shape(mut self, shape: &'a [u64]) -> Self {
        self.update_shape = Some(shape);
        self
    }

    /// Scatter axis; negative values count from the end.
    pub fn axis(mut self, axis: i64) -> Self {
        self.axis = axis;
        self
    }

    pub fn reduction(mut self, reduction: Reduction) -> Self {
        self.reduction = reduction;
        self
    }

    /// Make colliding float reductions reproducible across runs.
    pub fn deterministic(mut self, deterministic: bool) -> Self {
        self.deterministic = deterministic;
        self
    }

    pub fn platform(mut self, platform: PlatformInfo) -> Self {
        self.platform = platform;
        self
    }

    pub fn config(mut self, config: TilingConfig) -> Self {
        self.config = config;
        self
    }

    pub fn hints(mut self, hints: ExecHints) -> Self {
        self.hints = hints;
        self
    }

    /// Plan for element type `T` and index type `I` without executing.
    pub fn plan<T: Element, I: IndexElement>(&self) -> Result<ScatterPlan> {
        let data = TensorShape::new(self.data_shape).context("invalid data shape")?;
        let indices = TensorShape::new(self.index_shape).context("invalid indices shape")?;
        let updates = match self.update_shape {
            Some(shape) => TensorShape::new(shape).context("invalid updates shape")?,
            None => indices.clone(),
        };
        let request = ScatterRequest::new(data, indices, updates)
            .with_axis(self.axis)
            .with_reduction(self.reduction)
            .with_dtype(T::DTYPE)
            .with_index_dtype(I::DTYPE)
            .with_deterministic(self.deterministic);

        plan_scatter(&request, &self.platform, &self.config).with_context(|| {
            format!(
                "failed to plan {} scatter of {:?} into {:?} along axis {}",
                self.reduction, self.index_shape, self.data_shape, self.axis
            )
        })
    }

    /// Plan and execute.
    pub fn run<T: Element, I: IndexElement>(
        &self,
        data: &mut [T],
        indices: &[I],
        updates: &[T],
    ) -> Result<ExecReport> {
        let plan = self.plan::<T, I>()?;
        let key = plan.key;
        let executor = ParallelExecutor::new(plan, self.hints.clone())
            .with_context(|| format!("no execution path for dispatch key {key}"))?;
        executor
            .run(data, indices, updates)
            .with_context(|| format!("scatter with dispatch key {key} failed"))
    }
}
