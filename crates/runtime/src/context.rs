// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! What a kernel sees while it runs.
//!
//! An [`OpContext`] is built by the dispatch loop for one operator. It
//! resolves the operator's tensor ids against the executor's private
//! tensor table and hands out byte views into the bound memory blocks.
//! Output and temporary views are mutable; the context refuses to hand
//! out views when a mutable tensor overlaps any other tensor of the same
//! operator.

use crate::dma::DmaChannel;
use crate::memory::{Location, Storage};
use crate::tensor::{store_shape, trusted_info, TensorInfo};
use crate::{OpState, RuntimeError};
use model_ir::{round_dim, OpRecord, TensorRecord};
use std::any::Any;
use std::ops::Range;
use tensor_core::{elements, elements_mut, Shape, TensorError};

/// Per-operator dispatch context.
pub struct OpContext<'a, 'r> {
    index: usize,
    record: OpRecord<'a>,
    tensors: &'a mut [TensorRecord],
    declared: &'a [TensorRecord],
    registers: &'a [f64],
    storage: &'a mut Storage<'r>,
    dma: &'a mut DmaChannel,
    state: &'a mut OpState,
}

impl<'a, 'r> OpContext<'a, 'r> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        index: usize,
        record: OpRecord<'a>,
        tensors: &'a mut [TensorRecord],
        declared: &'a [TensorRecord],
        registers: &'a [f64],
        storage: &'a mut Storage<'r>,
        dma: &'a mut DmaChannel,
        state: &'a mut OpState,
    ) -> Self {
        Self {
            index,
            record,
            tensors,
            declared,
            registers,
            storage,
            dma,
            state,
        }
    }

    /// Position of the operator in the stream.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn record(&self) -> &OpRecord<'a> {
        &self.record
    }

    /// Decodes the attribute block as `T`.
    pub fn attrs<T: bytemuck::Pod>(&self) -> Result<T, RuntimeError> {
        self.record.attrs_as::<T>().ok_or_else(|| {
            RuntimeError::InvalidData(format!(
                "operator {}: attribute block of {} bytes, need {}",
                self.index,
                self.record.attrs().len(),
                std::mem::size_of::<T>()
            ))
        })
    }

    pub fn num_inputs(&self) -> usize {
        self.record.num_inputs()
    }

    pub fn num_outputs(&self) -> usize {
        self.record.num_outputs()
    }

    pub fn input_id(&self, i: usize) -> Result<u32, RuntimeError> {
        self.record.input(i).ok_or(RuntimeError::IndexOutOfBounds {
            what: "operator input",
            index: i,
            len: self.record.num_inputs(),
        })
    }

    pub fn output_id(&self, i: usize) -> Result<u32, RuntimeError> {
        self.record.output(i).ok_or(RuntimeError::IndexOutOfBounds {
            what: "operator output",
            index: i,
            len: self.record.num_outputs(),
        })
    }

    /// Current descriptor of input `i`.
    pub fn input_info(&self, i: usize) -> Result<TensorInfo, RuntimeError> {
        let id = self.input_id(i)?;
        Ok(trusted_info(id, &self.tensors[id as usize]))
    }

    pub fn output_info(&self, i: usize) -> Result<TensorInfo, RuntimeError> {
        let id = self.output_id(i)?;
        Ok(trusted_info(id, &self.tensors[id as usize]))
    }

    /// Declared (maximum) shape of output `i`.
    pub fn output_max_shape(&self, i: usize) -> Result<Shape, RuntimeError> {
        let id = self.output_id(i)?;
        Ok(trusted_info(id, &self.declared[id as usize]).shape)
    }

    /// Value of the operator's `i`-th scalar register.
    pub fn scalar(&self, i: usize) -> Result<f64, RuntimeError> {
        let reg = self
            .record
            .scalar_id(i)
            .ok_or(RuntimeError::IndexOutOfBounds {
                what: "operator scalar",
                index: i,
                len: self.record.num_scalars(),
            })?;
        Ok(self.registers[reg as usize])
    }

    /// Every scalar register of the operator, rounded to dimensions.
    pub fn scalar_dims(&self) -> Result<Vec<usize>, RuntimeError> {
        (0..self.record.num_scalars())
            .map(|i| self.scalar(i).map(round_dim))
            .collect()
    }

    /// Sets the current shape of output `i`.
    ///
    /// # Errors
    /// [`RuntimeError::InvalidData`] if `shape` does not fit the declared
    /// maximum shape.
    pub fn set_output_shape(&mut self, i: usize, shape: Shape) -> Result<(), RuntimeError> {
        let max = self.output_max_shape(i)?;
        if !shape.fits_within(&max) {
            return Err(RuntimeError::InvalidData(format!(
                "operator {}: output shape {shape} exceeds declared {max}",
                self.index
            )));
        }
        let id = self.output_id(i)?;
        store_shape(&mut self.tensors[id as usize], &shape);
        Ok(())
    }

    /// Kernel state created by `init`.
    pub fn state<T: Any>(&mut self) -> Option<&mut T> {
        self.state.as_mut().and_then(|s| s.downcast_mut::<T>())
    }

    /// Issues the next weight transfer if the DMA slot is free.
    ///
    /// Kernels that stream weights call this before computing, so the next
    /// operator's weights move while this one runs.
    pub fn prefetch_next(&mut self) -> Option<usize> {
        self.dma.issue_next()
    }

    /// Resolves every tensor of the operator to a byte view sized by its
    /// current shape.
    ///
    /// # Errors
    /// - [`RuntimeError::InvalidParameter`] if an output or temporary lives
    ///   in read-only shared memory.
    /// - [`RuntimeError::InvalidData`] if a tensor leaves its memory block
    ///   or a mutable tensor overlaps another tensor of this operator.
    pub fn views(&mut self) -> Result<OpViews<'_>, RuntimeError> {
        let inputs = self.record.num_inputs();
        let outputs = self.record.num_outputs();

        let mut slots = Vec::with_capacity(self.record.num_tensors());
        for k in 0..self.record.num_tensors() {
            let id = self.record.tensor_id(k);
            let rec = &self.tensors[id as usize];
            let info = trusted_info(id, rec);
            let location = self.storage.locate(rec, info.byte_len())?;
            let mutable = k >= inputs;
            if mutable && matches!(location, Location::Shared { .. }) {
                return Err(RuntimeError::InvalidParameter(format!(
                    "operator {}: tensor {id} is written but lives in shared memory",
                    self.index
                )));
            }
            slots.push(Slot {
                id,
                info,
                location,
                mutable,
            });
        }
        check_disjoint(self.index, &slots)?;

        let (shared, runtime) = self.storage.split_mut();
        let bases: Vec<*mut u8> = runtime
            .iter_mut()
            .map(|region| region.as_mut_slice().as_mut_ptr())
            .collect();

        let mut views = OpViews {
            inputs: Vec::with_capacity(inputs),
            outputs: Vec::with_capacity(outputs),
            temps: Vec::with_capacity(slots.len() - inputs - outputs),
        };
        for (k, slot) in slots.into_iter().enumerate() {
            match slot.location {
                Location::Shared { param, range } => views.inputs.push(TensorView {
                    id: slot.id,
                    info: slot.info,
                    data: shared.get(param, range),
                }),
                Location::Runtime { slot: block, range } if !slot.mutable => {
                    // SAFETY: `range` was bounds-checked against the block by
                    // `locate`; no mutable view overlaps it (check_disjoint),
                    // and the views borrow `self` mutably, so the storage is
                    // not touched while they live.
                    let data = unsafe {
                        std::slice::from_raw_parts(bases[block].add(range.start), range.len())
                    };
                    views.inputs.push(TensorView {
                        id: slot.id,
                        info: slot.info,
                        data,
                    });
                }
                Location::Runtime { slot: block, range } => {
                    // SAFETY: as above; this range is disjoint from every
                    // other view handed out for this operator.
                    let data = unsafe {
                        std::slice::from_raw_parts_mut(bases[block].add(range.start), range.len())
                    };
                    let view = TensorViewMut {
                        id: slot.id,
                        info: slot.info,
                        data,
                    };
                    if k < inputs + outputs {
                        views.outputs.push(view);
                    } else {
                        views.temps.push(view);
                    }
                }
            }
        }
        Ok(views)
    }
}

struct Slot {
    id: u32,
    info: TensorInfo,
    location: Location,
    mutable: bool,
}

fn overlaps(a: &Range<usize>, b: &Range<usize>) -> bool {
    a.start < b.end && b.start < a.end
}

fn check_disjoint(index: usize, slots: &[Slot]) -> Result<(), RuntimeError> {
    for (i, a) in slots.iter().enumerate() {
        for b in &slots[i + 1..] {
            if !(a.mutable || b.mutable) {
                continue;
            }
            if let (
                Location::Runtime { slot: sa, range: ra },
                Location::Runtime { slot: sb, range: rb },
            ) = (&a.location, &b.location)
            {
                if sa == sb && overlaps(ra, rb) {
                    return Err(RuntimeError::InvalidData(format!(
                        "operator {index}: tensors {} and {} overlap",
                        a.id, b.id
                    )));
                }
            }
        }
    }
    Ok(())
}

/// Resolved tensors of one operator, in slot order.
pub struct OpViews<'b> {
    pub inputs: Vec<TensorView<'b>>,
    pub outputs: Vec<TensorViewMut<'b>>,
    pub temps: Vec<TensorViewMut<'b>>,
}

/// Read-only tensor view.
pub struct TensorView<'b> {
    pub id: u32,
    pub info: TensorInfo,
    pub data: &'b [u8],
}

impl<'b> TensorView<'b> {
    pub fn elements<T: bytemuck::Pod>(&self) -> Result<&'b [T], TensorError> {
        elements(self.data, self.info.dtype)
    }
}

/// Mutable tensor view.
pub struct TensorViewMut<'b> {
    pub id: u32,
    pub info: TensorInfo,
    pub data: &'b mut [u8],
}

impl TensorViewMut<'_> {
    pub fn elements_mut<T: bytemuck::Pod>(&mut self) -> Result<&mut [T], TensorError> {
        elements_mut(self.data, self.info.dtype)
    }
}
