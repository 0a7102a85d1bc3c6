//! Per-core worker loop
//!
//! A worker walks its chunks in ascending order. Each chunk is loaded
//! (indices resolved, out-of-range entries masked), computed (contributions
//! kept in encounter order or grouped and tree-combined) and stored into the
//! shared output. A chunk is part of one line, or several whole lines when
//! the plan packs short lines together.

use parking_lot::Mutex;
use smallvec::SmallVec;
use std::ops::Range;
use tessel_core::Reduction;
use tessel_planner::{
    order_for_determinism, tree_reduce, Contribution, CoreWork, LineSpan, OrderingMode,
};
use tracing::trace;

use super::geometry::Geometry;
use crate::element::{resolve_index, Element, IndexElement, Offset};
use crate::error::ExecResult;

/// Lifecycle of one worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Loading { chunk: usize },
    /// Computing `chunk` while `prefetch` is loaded into the other buffer
    Computing {
        chunk: usize,
        prefetch: Option<usize>,
    },
    Storing { chunk: usize },
    Done,
}

/// What one worker did.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WorkerOutcome {
    pub core: u32,
    pub chunks: u64,
    /// Contributions that reached the output
    pub applied: u64,
    /// Indices outside the data axis
    pub masked: u64,
    /// Recorded transitions, empty unless tracing was requested
    pub states: Vec<WorkerState>,
}

/// Read-only inputs shared by every worker.
pub(crate) struct WorkerContext<'a, T, I, O> {
    pub geometry: &'a Geometry<O>,
    pub indices: &'a [I],
    pub updates: &'a [T],
    pub tile: u64,
    pub lines_per_chunk: u64,
    pub reduction: Reduction,
    pub ordering: OrderingMode,
    pub double_buffer: bool,
    pub trace_states: bool,
}

/// Positions `start..end` of every line in `lines`.
#[derive(Debug, Clone)]
struct Chunk {
    lines: Range<u64>,
    start: u64,
    end: u64,
}

#[derive(Debug, Clone, Copy)]
struct Entry<T> {
    dest: u64,
    /// Flat data offset of `dest` in the entry's line
    offset: usize,
    value: T,
}

fn in_encounter_order<T: Copy>(entries: &[Entry<T>]) -> Vec<(usize, T)> {
    entries.iter().map(|e| (e.offset, e.value)).collect()
}

/// One chunk resident in a scratch buffer.
struct Staged<T> {
    entries: Vec<Entry<T>>,
    masked: u64,
}

pub(crate) struct Worker<'a, T, I, O> {
    pub core: u32,
    pub slot: usize,
    work: CoreWork,
    ctx: &'a WorkerContext<'a, T, I, O>,
}

impl<'a, T, I, O> Worker<'a, T, I, O>
where
    T: Element,
    I: IndexElement,
    O: Offset,
{
    pub fn new(core: u32, slot: usize, work: CoreWork, ctx: &'a WorkerContext<'a, T, I, O>) -> Self {
        Self {
            core,
            slot,
            work,
            ctx,
        }
    }

    /// Whole lines per chunk; packing only applies to whole-line encounter work.
    fn packed_lines(&self) -> u64 {
        match (&self.work.span, self.ctx.ordering) {
            (LineSpan::Whole, OrderingMode::Encounter) => self.ctx.lines_per_chunk.max(1),
            _ => 1,
        }
    }

    fn chunks(&self) -> Vec<Chunk> {
        let lines = self.work.lines.clone();
        let source_len = self.ctx.geometry.source_len();
        let packed = self.packed_lines();
        if packed > 1 {
            let mut chunks = Vec::new();
            let mut first = lines.start;
            while first < lines.end {
                let last = (first + packed).min(lines.end);
                chunks.push(Chunk {
                    lines: first..last,
                    start: 0,
                    end: source_len,
                });
                first = last;
            }
            return chunks;
        }

        let tile = self.ctx.tile.max(1);
        let positions = match &self.work.span {
            LineSpan::Sources(range) => range.clone(),
            LineSpan::Whole | LineSpan::Destinations(_) => 0..source_len,
        };
        let mut chunks = Vec::new();
        for line in lines {
            let mut start = positions.start;
            while start < positions.end {
                let end = (start + tile).min(positions.end);
                chunks.push(Chunk {
                    lines: line..line + 1,
                    start,
                    end,
                });
                start = end;
            }
        }
        chunks
    }

    /// Owners of a destination range all scan the same indices; only the
    /// first owner of a line reports masked ones.
    fn reports_masked(&self) -> bool {
        match &self.work.span {
            LineSpan::Destinations(range) => range.start == 0,
            _ => true,
        }
    }

    fn owns(&self, dest: u64) -> bool {
        match &self.work.span {
            LineSpan::Destinations(range) => range.contains(&dest),
            _ => true,
        }
    }

    fn load(&self, chunk: &Chunk, scale: Option<u64>) -> ExecResult<Staged<T>> {
        let geometry = self.ctx.geometry;
        let dest_len = geometry.dest_len();
        let per_line = chunk.end - chunk.start;
        let lines = chunk.lines.end - chunk.lines.start;
        let mut entries = Vec::with_capacity((per_line * lines) as usize);
        let mut masked = 0;

        for line in chunk.lines.clone() {
            let bases = geometry.line_bases(line)?;
            for position in chunk.start..chunk.end {
                let raw = self.ctx.indices[geometry.index_offset(&bases, position)?].to_i64();
                let Some(dest) = resolve_index(raw, dest_len) else {
                    masked += 1;
                    continue;
                };
                if !self.owns(dest) {
                    continue;
                }
                let mut value = self.ctx.updates[geometry.update_offset(&bases, position)?];
                if let Some(count) = scale {
                    value = value.div_count(count).unwrap_or(value);
                }
                entries.push(Entry {
                    dest,
                    offset: geometry.data_offset(&bases, dest)?,
                    value,
                });
            }
        }

        if !self.reports_masked() {
            masked = 0;
        }
        Ok(Staged { entries, masked })
    }

    /// Writes for one chunk as `(data offset, value)` pairs.
    fn compute(&self, staged: &Staged<T>) -> Vec<(usize, T)> {
        let reduction = self.ctx.reduction;
        match self.ctx.ordering {
            OrderingMode::Encounter => in_encounter_order(&staged.entries),
            OrderingMode::Sorted => {
                // slots are loaded in position order, so they sort like positions
                let contributions: Vec<Contribution> = staged
                    .entries
                    .iter()
                    .enumerate()
                    .map(|(slot, e)| Contribution {
                        dest: e.dest,
                        position: slot as u64,
                    })
                    .collect();
                let ordered = order_for_determinism(&contributions, self.ctx.geometry.dest_len());
                if !ordered.has_collisions() {
                    // one contribution per destination, nothing to combine
                    return in_encounter_order(&staged.entries);
                }

                let mut writes = Vec::with_capacity(ordered.groups().len());
                let mut values: SmallVec<[T; 16]> = SmallVec::new();
                for group in ordered.groups() {
                    values.clear();
                    let mut offset = None;
                    for slot in ordered.positions(group) {
                        let entry = &staged.entries[slot as usize];
                        if offset.is_none() {
                            offset = Some(entry.offset);
                        }
                        values.push(entry.value);
                    }
                    let combined = tree_reduce(&mut values, |a, b| a.reduce(b, reduction));
                    if let (Some(offset), Some(combined)) = (offset, combined) {
                        writes.push((offset, combined));
                    }
                }
                writes
            }
        }
    }

    fn store(&self, writes: &[(usize, T)], output: &Mutex<&mut [T]>) {
        let reduction = self.ctx.reduction;
        let mut out = output.lock();
        for &(offset, value) in writes {
            out[offset] = out[offset].reduce(value, reduction);
        }
    }

    fn record(&self, states: &mut Vec<WorkerState>, state: WorkerState) {
        trace!(core = self.core, ?state, "worker state");
        if self.ctx.trace_states {
            states.push(state);
        }
    }

    /// Valid contributions this worker will apply.
    pub fn count_valid(&self) -> ExecResult<u64> {
        let geometry = self.ctx.geometry;
        let dest_len = geometry.dest_len();
        let mut count = 0;
        for chunk in self.chunks() {
            for line in chunk.lines.clone() {
                let bases = geometry.line_bases(line)?;
                for position in chunk.start..chunk.end {
                    let raw = self.ctx.indices[geometry.index_offset(&bases, position)?].to_i64();
                    if resolve_index(raw, dest_len).is_some_and(|dest| self.owns(dest)) {
                        count += 1;
                    }
                }
            }
        }
        Ok(count)
    }

    /// Process every chunk; `scale` divides each contribution when set.
    pub fn run(&self, scale: Option<u64>, output: &Mutex<&mut [T]>) -> ExecResult<WorkerOutcome> {
        let chunks = self.chunks();
        let mut outcome = WorkerOutcome {
            core: self.core,
            chunks: chunks.len() as u64,
            ..Default::default()
        };
        let mut states = Vec::new();
        self.record(&mut states, WorkerState::Idle);

        if !chunks.is_empty() {
            self.record(&mut states, WorkerState::Loading { chunk: 0 });
            let mut staged = self.load(&chunks[0], scale)?;

            for i in 0..chunks.len() {
                let has_next = i + 1 < chunks.len();
                let prefetch = (self.ctx.double_buffer && has_next).then_some(i + 1);
                self.record(&mut states, WorkerState::Computing { chunk: i, prefetch });

                let next = match prefetch {
                    Some(n) => Some(self.load(&chunks[n], scale)?),
                    None => None,
                };
                let writes = self.compute(&staged);

                self.record(&mut states, WorkerState::Storing { chunk: i });
                self.store(&writes, output);
                outcome.applied += staged.entries.len() as u64;
                outcome.masked += staged.masked;

                if has_next {
                    staged = match next {
                        Some(buffer) => buffer,
                        None => {
                            self.record(&mut states, WorkerState::Loading { chunk: i + 1 });
                            self.load(&chunks[i + 1], scale)?
                        }
                    };
                }
            }
        }

        self.record(&mut states, WorkerState::Done);
        outcome.states = states;
        Ok(outcome)
    }
}
