//! Execution hints and configuration

use std::time::Duration;

/// Default bound on the scalar barrier wait.
pub const DEFAULT_BARRIER_TIMEOUT: Duration = Duration::from_secs(5);

/// Order in which workers run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Schedule {
    /// One OS thread per worker, running concurrently
    #[default]
    Threaded,
    /// Workers run one after another on the calling thread, ascending
    Sequential,
    /// Workers run one after another in the given core order
    Ordered(Vec<u32>),
}

/// Execution hints for controlling plan execution
#[derive(Clone, Debug)]
pub struct ExecHints {
    /// How workers are scheduled
    pub schedule: Schedule,
    /// Prefetch the next chunk while computing the current one
    pub double_buffer: bool,
    /// Record every worker state transition in the report
    pub trace_states: bool,
    /// Scale every contribution by one over the global count of valid indices
    pub normalize_by_valid_count: bool,
    /// Bound on the wait at the scalar barrier
    pub barrier_timeout: Duration,
}

impl Default for ExecHints {
    fn default() -> Self {
        Self {
            schedule: Schedule::Threaded,
            double_buffer: true,
            trace_states: false,
            normalize_by_valid_count: false,
            barrier_timeout: DEFAULT_BARRIER_TIMEOUT,
        }
    }
}

impl ExecHints {
    /// Create new execution hints with defaults
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_schedule(mut self, schedule: Schedule) -> Self {
        self.schedule = schedule;
        self
    }

    pub fn with_double_buffer(mut self, enabled: bool) -> Self {
        self.double_buffer = enabled;
        self
    }

    pub fn with_trace_states(mut self, enabled: bool) -> Self {
        self.trace_states = enabled;
        self
    }

    pub fn with_normalize_by_valid_count(mut self, enabled: bool) -> Self {
        self.normalize_by_valid_count = enabled;
        self
    }

    pub fn with_barrier_timeout(mut self, timeout: Duration) -> Self {
        self.barrier_timeout = timeout;
        self
    }
}
