//! Offset arithmetic over folded operand shapes

use smallvec::SmallVec;
use tessel_core::Axis;
use tessel_planner::{line_coords, AxisLayout};

use crate::element::Offset;
use crate::error::{ExecError, ExecResult};

type Strides<O> = SmallVec<[O; 7]>;

#[inline]
fn narrow<O: Offset>(value: u64) -> ExecResult<O> {
    O::from_u64(value).ok_or(ExecError::OffsetOverflow {
        value,
        bits: O::BITS,
    })
}

/// Offsets of one line's first element in every operand.
#[derive(Debug, Clone, Copy)]
pub(crate) struct LineBases<O> {
    pub indices: O,
    pub updates: O,
    pub data: O,
}

/// Strides of the folded operands in a fixed offset width.
#[derive(Debug, Clone)]
pub(crate) struct Geometry<O> {
    layout: AxisLayout,
    axis: Axis,
    indices: Strides<O>,
    updates: Strides<O>,
    data: Strides<O>,
}

impl<O: Offset> Geometry<O> {
    pub fn new(layout: &AxisLayout) -> ExecResult<Self> {
        let folded = &layout.folded;
        let strides = |shape: &tessel_core::TensorShape| -> ExecResult<Strides<O>> {
            narrow::<O>(shape.numel())?;
            shape.strides().iter().map(|&s| narrow(s)).collect()
        };
        Ok(Self {
            layout: layout.clone(),
            axis: folded.axis,
            indices: strides(&folded.indices)?,
            updates: strides(&folded.updates)?,
            data: strides(&folded.data)?,
        })
    }

    /// Positions along the axis in indices.
    pub fn source_len(&self) -> u64 {
        self.layout.indices.mid
    }

    /// Positions along the axis in data.
    pub fn dest_len(&self) -> u64 {
        self.layout.data.mid
    }

    pub fn line_bases(&self, line: u64) -> ExecResult<LineBases<O>> {
        let coords = line_coords(&self.layout.folded.indices, self.axis, line);
        let mut bases = LineBases {
            indices: O::ZERO,
            updates: O::ZERO,
            data: O::ZERO,
        };
        for (d, &c) in coords.iter().enumerate() {
            if d == self.axis || c == 0 {
                continue;
            }
            let c = narrow::<O>(c)?;
            bases.indices = bases.indices + c * self.indices[d];
            bases.updates = bases.updates + c * self.updates[d];
            bases.data = bases.data + c * self.data[d];
        }
        Ok(bases)
    }

    #[inline]
    pub fn index_offset(&self, bases: &LineBases<O>, position: u64) -> ExecResult<usize> {
        Ok((bases.indices + narrow::<O>(position)? * self.indices[self.axis]).to_usize())
    }

    #[inline]
    pub fn update_offset(&self, bases: &LineBases<O>, position: u64) -> ExecResult<usize> {
        Ok((bases.updates + narrow::<O>(position)? * self.updates[self.axis]).to_usize())
    }

    #[inline]
    pub fn data_offset(&self, bases: &LineBases<O>, dest: u64) -> ExecResult<usize> {
        Ok((bases.data + narrow::<O>(dest)? * self.data[self.axis]).to_usize())
    }
}
