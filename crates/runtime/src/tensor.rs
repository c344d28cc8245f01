// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Typed views of on-resource tensor records.

use crate::RuntimeError;
use memory_manager::{DeviceType, MemoryClass};
use model_ir::{ResourceError, TensorRecord};
use tensor_core::{elements, DType, QuantParams, Shape, TensorError};

/// Decoded tensor descriptor.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct TensorInfo {
    pub dtype: DType,
    pub shape: Shape,
    pub quant: QuantParams,
    pub class: MemoryClass,
    pub device: DeviceType,
    pub memory_id: u32,
    /// Byte offset inside the memory block.
    pub offset: u64,
}

impl TensorInfo {
    /// Decodes and validates a record.
    pub fn from_record(id: u32, rec: &TensorRecord) -> Result<Self, ResourceError> {
        let dtype = DType::from_code(rec.dtype).ok_or_else(|| ResourceError::InvalidDatatype {
            tensor: id,
            detail: format!("unknown dtype code {}", rec.dtype),
        })?;
        if rec.byte_width as usize != dtype.size_bytes() {
            return Err(ResourceError::InvalidDatatype {
                tensor: id,
                detail: format!("{dtype} declared with byte width {}", rec.byte_width),
            });
        }
        let rank = rec.rank as usize;
        if rank > rec.dims.len() {
            return Err(TensorError::RankTooLarge {
                rank,
                max: rec.dims.len(),
            }
            .into());
        }
        Ok(Self {
            dtype,
            shape: Shape::from_u32(&rec.dims[..rank])?,
            quant: QuantParams::new(rec.scale, rec.zero_point),
            class: MemoryClass::from_code(u32::from(rec.mem_class))?,
            device: DeviceType::from_code(u32::from(rec.device))?,
            memory_id: rec.mem_id,
            offset: rec.offset,
        })
    }

    /// Bytes covered by the current shape.
    pub fn byte_len(&self) -> usize {
        self.shape.size_bytes(self.dtype)
    }
}

/// Decodes a record that already passed load-time validation.
pub(crate) fn trusted_info(id: u32, rec: &TensorRecord) -> TensorInfo {
    match TensorInfo::from_record(id, rec) {
        Ok(info) => info,
        Err(e) => panic!("tensor {id} escaped load validation: {e}"),
    }
}

/// Writes a shape back into a record.
pub(crate) fn store_shape(rec: &mut TensorRecord, shape: &Shape) {
    rec.rank = shape.rank() as u32;
    rec.dims = [0; 7];
    for (slot, &d) in rec.dims.iter_mut().zip(shape.dims()) {
        *slot = d as u32;
    }
}

/// Read-only view of a tensor table, handed to operator `init` hooks.
#[derive(Clone, Copy)]
pub struct TensorTable<'a> {
    records: &'a [TensorRecord],
}

impl<'a> TensorTable<'a> {
    pub(crate) fn new(records: &'a [TensorRecord]) -> Self {
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn record(&self, id: u32) -> Result<&'a TensorRecord, RuntimeError> {
        self.records
            .get(id as usize)
            .ok_or(RuntimeError::IndexOutOfBounds {
                what: "tensor",
                index: id as usize,
                len: self.records.len(),
            })
    }

    pub fn info(&self, id: u32) -> Result<TensorInfo, RuntimeError> {
        Ok(TensorInfo::from_record(id, self.record(id)?)?)
    }
}

/// Tensor contents exchanged through `set_input` / `get_output`.
#[derive(Debug, Clone, Copy)]
pub struct TensorData<'a> {
    pub dtype: DType,
    pub shape: Shape,
    /// Quantization to store with the tensor; `None` keeps the declared one.
    pub quant: Option<QuantParams>,
    pub data: &'a [u8],
}

impl<'a> TensorData<'a> {
    pub fn new(dtype: DType, shape: Shape, data: &'a [u8]) -> Self {
        Self {
            dtype,
            shape,
            quant: None,
            data,
        }
    }

    /// Wraps a typed slice.
    pub fn from_slice<T: bytemuck::Pod>(dtype: DType, shape: Shape, data: &'a [T]) -> Self {
        Self::new(dtype, shape, bytemuck::cast_slice(data))
    }

    pub fn with_quant(mut self, quant: QuantParams) -> Self {
        self.quant = Some(quant);
        self
    }

    /// Reinterprets the bytes as elements of `T`.
    pub fn as_slice<T: bytemuck::Pod>(&self) -> Result<&'a [T], TensorError> {
        elements(self.data, self.dtype)
    }
}
