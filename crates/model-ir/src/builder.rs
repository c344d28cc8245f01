// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Resource serializer.
//!
//! [`ResourceBuilder`] writes the binary format from a handful of
//! declarative calls. Tests, benchmarks and the CLI `demo` command use it
//! to produce fixtures, so no binary files need to be checked in.
//!
//! # Example
//! ```
//! use memory_manager::DeviceType;
//! use model_ir::{Resource, ResourceBuilder};
//! use tensor_core::DType;
//!
//! let mut b = ResourceBuilder::new();
//! let act = b.runtime_memory(1024, DeviceType::Sram);
//! let x = b.tensor(DType::F32, &[1, 16], act, 0);
//! let y = b.quantized_tensor(DType::I8, &[1, 16], act, 64, 0.1, 0);
//! b.operator("Quantize", &[x], &[y], &[], &[], &[]);
//! b.input("x", x);
//! b.output("y", y);
//! let bytes = b.build();
//!
//! let res = Resource::parse(&bytes).unwrap();
//! assert_eq!(res.io_ids().unwrap(), vec![x, y]);
//! ```

use crate::crc::crc32;
use crate::format::{
    encode_fixed_name, AxisBinding, DebugSectionHeader, DimPair, DmaRecord, DmaSectionHeader,
    IoSectionHeader, MemoryRecord, MemorySectionHeader, OperatorSectionHeader,
    ParameterSectionHeader, ResourceHeader, ScalarSectionHeader, ShapeInferHeader, TensorRecord,
    TensorSectionHeader, PLATFORM_ANY, RESOURCE_LABEL, RESOURCE_VERSION,
};
use crate::op_record::encode_record;
use crate::scalar_graph::{GraphEncoder, Opcode};
use bytemuck::Pod;
use memory_manager::{DeviceType, MemoryClass};
use std::mem::size_of;
use tensor_core::{DType, MAX_RANK};

/// Default width of IO, type and debug name fields.
pub const DEFAULT_NAME_LEN: u32 = 32;

/// A memory block declared through the builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryRef {
    /// Index among shared-parameter blocks.
    Shared(u32),
    /// Index among runtime blocks.
    Runtime(u32),
}

#[derive(Debug, Clone)]
struct TensorDef {
    dtype: DType,
    dims: Vec<u32>,
    memory: MemoryRef,
    offset: u64,
    scale: f32,
    zero_point: i32,
}

#[derive(Debug, Clone)]
struct OpDef {
    type_id: u32,
    record: Vec<u8>,
    debug_name: String,
}

/// Builds a resource byte buffer.
#[derive(Debug, Clone)]
pub struct ResourceBuilder {
    shared: Vec<(u64, u64, DeviceType)>,
    runtime: Vec<(u64, DeviceType)>,
    parameters: Vec<u8>,
    tensors: Vec<TensorDef>,
    registers: Vec<f64>,
    graph: GraphEncoder,
    pairs: Vec<DimPair>,
    axes: Vec<AxisBinding>,
    type_names: Vec<String>,
    ops: Vec<OpDef>,
    inputs: Vec<(String, u32)>,
    outputs: Vec<(String, u32)>,
    states: Vec<(String, u32)>,
    dma: Vec<(u32, u32, u64)>,
    platform: u32,
    crc: bool,
    io_name_len: u32,
}

impl Default for ResourceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceBuilder {
    pub fn new() -> Self {
        Self {
            shared: Vec::new(),
            runtime: Vec::new(),
            parameters: Vec::new(),
            tensors: Vec::new(),
            registers: Vec::new(),
            graph: GraphEncoder {
                name_len: DEFAULT_NAME_LEN,
                ..Default::default()
            },
            pairs: Vec::new(),
            axes: Vec::new(),
            type_names: Vec::new(),
            ops: Vec::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            states: Vec::new(),
            dma: Vec::new(),
            platform: PLATFORM_ANY,
            crc: true,
            io_name_len: DEFAULT_NAME_LEN,
        }
    }

    // ── Memory ────────────────────────────────────────────────────

    /// Declares a shared-parameter block holding `data`.
    pub fn shared_memory(&mut self, data: &[u8], device: DeviceType) -> MemoryRef {
        let offset = self.parameters.len().div_ceil(16) * 16;
        self.parameters.resize(offset, 0);
        self.parameters.extend_from_slice(data);
        self.shared.push((data.len() as u64, offset as u64, device));
        MemoryRef::Shared(self.shared.len() as u32 - 1)
    }

    /// Declares a runtime (scratch) block of `size` bytes.
    pub fn runtime_memory(&mut self, size: u64, device: DeviceType) -> MemoryRef {
        self.runtime.push((size, device));
        MemoryRef::Runtime(self.runtime.len() as u32 - 1)
    }

    fn mem_id(&self, memory: MemoryRef) -> u32 {
        match memory {
            MemoryRef::Shared(i) => i,
            MemoryRef::Runtime(i) => self.shared.len() as u32 + i,
        }
    }

    fn device_of(&self, memory: MemoryRef) -> DeviceType {
        match memory {
            MemoryRef::Shared(i) => self.shared[i as usize].2,
            MemoryRef::Runtime(i) => self.runtime[i as usize].1,
        }
    }

    // ── Tensors ───────────────────────────────────────────────────

    /// Declares a tensor with maximum shape `dims`, at `offset` in `memory`.
    pub fn tensor(&mut self, dtype: DType, dims: &[u32], memory: MemoryRef, offset: u64) -> u32 {
        self.quantized_tensor(dtype, dims, memory, offset, 1.0, 0)
    }

    /// Declares a tensor carrying quantization parameters.
    pub fn quantized_tensor(
        &mut self,
        dtype: DType,
        dims: &[u32],
        memory: MemoryRef,
        offset: u64,
        scale: f32,
        zero_point: i32,
    ) -> u32 {
        assert!(dims.len() <= MAX_RANK, "rank {} exceeds {MAX_RANK}", dims.len());
        self.tensors.push(TensorDef {
            dtype,
            dims: dims.to_vec(),
            memory,
            offset,
            scale,
            zero_point,
        });
        self.tensors.len() as u32 - 1
    }

    // ── Operators ─────────────────────────────────────────────────

    /// Appends an operator record; returns its index in the stream.
    pub fn operator(
        &mut self,
        type_name: &str,
        inputs: &[u32],
        outputs: &[u32],
        temps: &[u32],
        scalars: &[u32],
        attrs: &[u8],
    ) -> u32 {
        let type_id = match self.type_names.iter().position(|n| n == type_name) {
            Some(i) => i as u32,
            None => {
                self.type_names.push(type_name.to_string());
                self.type_names.len() as u32 - 1
            }
        };
        let index = self.ops.len() as u32;
        self.ops.push(OpDef {
            type_id,
            record: encode_record(type_id, attrs, inputs, outputs, temps, scalars),
            debug_name: format!("{}_{index}", type_name.to_lowercase()),
        });
        index
    }

    /// Overrides an operator's debug name.
    pub fn debug_name(&mut self, op: u32, name: &str) -> &mut Self {
        self.ops[op as usize].debug_name = name.to_string();
        self
    }

    // ── IO ────────────────────────────────────────────────────────

    pub fn input(&mut self, name: &str, tensor: u32) -> &mut Self {
        self.inputs.push((name.to_string(), tensor));
        self
    }

    pub fn output(&mut self, name: &str, tensor: u32) -> &mut Self {
        self.outputs.push((name.to_string(), tensor));
        self
    }

    pub fn state(&mut self, name: &str, tensor: u32) -> &mut Self {
        self.states.push((name.to_string(), tensor));
        self
    }

    /// Width of the IO name fields.
    pub fn io_name_len(&mut self, len: u32) -> &mut Self {
        self.io_name_len = len;
        self
    }

    // ── Scalars and shape inference ───────────────────────────────

    /// Allocates a scalar register with an initial value.
    pub fn scalar(&mut self, initial: f64) -> u32 {
        self.registers.push(initial);
        self.graph.num_scalars = self.registers.len() as u32;
        self.registers.len() as u32 - 1
    }

    /// Allocates a named shape-graph input register.
    pub fn shape_input(&mut self, name: &str) -> u32 {
        let reg = self.scalar(0.0);
        self.graph.inputs.push((reg, name.to_string()));
        reg
    }

    /// Appends a shape-graph node; returns its fresh output register.
    pub fn shape_node(&mut self, op: Opcode, operands: &[u32]) -> u32 {
        let reg = self.scalar(0.0);
        self.graph.nodes.push((op, operands.to_vec(), reg));
        reg
    }

    /// Writes `round(register)` into `tensor.dims[dim]` after evaluation.
    pub fn shape_output(&mut self, register: u32, tensor: u32, dim: u32) -> &mut Self {
        if !self.graph.outputs.contains(&register) {
            self.graph.outputs.push(register);
        }
        self.pairs.push(DimPair {
            scalar: register,
            tensor_id: tensor,
            dim_id: dim,
        });
        self
    }

    /// Seeds `register` from `tensor.dims[dim]` when no names are given.
    pub fn shape_axis(&mut self, tensor: u32, dim: u32, register: u32) -> &mut Self {
        self.axes.push(AxisBinding {
            tensor_id: tensor,
            dim_id: dim,
            scalar: register,
        });
        self
    }

    // ── DMA ───────────────────────────────────────────────────────

    /// Declares a weight transfer of `size` bytes from `src` to `dst`.
    pub fn dma(&mut self, src: u32, dst: u32, size: u64) -> &mut Self {
        self.dma.push((src, dst, size));
        self
    }

    // ── Header options ────────────────────────────────────────────

    pub fn platform(&mut self, id: u32) -> &mut Self {
        self.platform = id;
        self
    }

    /// Leaves the CRC field zero.
    pub fn without_crc(&mut self) -> &mut Self {
        self.crc = false;
        self
    }

    // ── Serialization ─────────────────────────────────────────────

    /// Serializes the resource.
    pub fn build(&self) -> Vec<u8> {
        let mut w = Writer::default();
        let mut header: ResourceHeader = bytemuck::Zeroable::zeroed();
        w.put(&header);

        header.memory_offset = self.write_memory(&mut w);
        header.tensor_offset = self.write_tensors(&mut w);
        if !self.registers.is_empty() {
            header.scalar_offset = self.write_scalars(&mut w);
        }
        header.operator_offset = self.write_operators(&mut w);
        header.io_offset = self.write_io(&mut w);
        if !self.ops.is_empty() {
            header.debug_offset = self.write_debug(&mut w);
        }
        if !self.graph.is_empty() || !self.pairs.is_empty() || !self.axes.is_empty() {
            header.shape_infer_offset = self.write_shape(&mut w);
        }
        if !self.parameters.is_empty() {
            header.parameter_offset = self.write_parameters(&mut w);
        }
        if !self.dma.is_empty() {
            header.dma_offset = self.write_dma(&mut w);
        }
        w.align();

        let header_len = size_of::<ResourceHeader>();
        header.label = RESOURCE_LABEL;
        header.version = RESOURCE_VERSION;
        header.platform = self.platform;
        header.header_size = header_len as u32;
        header.total_size = w.buf.len() as u64;
        header.crc = if self.crc {
            crc32(&w.buf[header_len..])
        } else {
            0
        };
        w.patch(0, &header);
        w.buf
    }

    fn write_memory(&self, w: &mut Writer) -> u64 {
        let at = w.align();
        let total = self.shared.len() + self.runtime.len();
        w.put(&MemorySectionHeader {
            shared_count: self.shared.len() as u32,
            total_count: total as u32,
            elem_size: size_of::<MemoryRecord>() as u32,
            header_size: size_of::<MemorySectionHeader>() as u32,
            body_offset: (at + size_of::<MemorySectionHeader>()) as u64,
        });
        for &(size, offset, device) in &self.shared {
            w.put(&MemoryRecord {
                size,
                offset,
                device: device.code(),
                class: MemoryClass::SharedParameter.code(),
            });
        }
        for &(size, device) in &self.runtime {
            w.put(&MemoryRecord {
                size,
                offset: 0,
                device: device.code(),
                class: MemoryClass::RuntimeScratch.code(),
            });
        }
        at as u64
    }

    fn write_tensors(&self, w: &mut Writer) -> u64 {
        let at = w.align();
        w.put(&TensorSectionHeader {
            count: self.tensors.len() as u32,
            elem_size: size_of::<TensorRecord>() as u32,
            body_offset: (at + size_of::<TensorSectionHeader>()) as u64,
        });
        for t in &self.tensors {
            let mut dims = [0u32; MAX_RANK];
            dims[..t.dims.len()].copy_from_slice(&t.dims);
            let class = match t.memory {
                MemoryRef::Shared(_) => MemoryClass::SharedParameter,
                MemoryRef::Runtime(_) => MemoryClass::RuntimeScratch,
            };
            w.put(&TensorRecord {
                mem_class: class.code() as u8,
                device: self.device_of(t.memory).code() as u8,
                dtype: t.dtype.code(),
                byte_width: t.dtype.size_bytes() as u8,
                mem_id: self.mem_id(t.memory),
                scale: t.scale,
                zero_point: t.zero_point,
                rank: t.dims.len() as u32,
                dims,
                offset: t.offset,
                layout: 0,
                flags: 0,
            });
        }
        at as u64
    }

    fn write_scalars(&self, w: &mut Writer) -> u64 {
        let at = w.align();
        w.put(&ScalarSectionHeader {
            count: self.registers.len() as u32,
            elem_size: size_of::<f64>() as u32,
            body_offset: (at + size_of::<ScalarSectionHeader>()) as u64,
        });
        for v in &self.registers {
            w.put(v);
        }
        at as u64
    }

    fn write_operators(&self, w: &mut Writer) -> u64 {
        let at = w.align();
        let longest = self.type_names.iter().map(String::len).max().unwrap_or(0) as u32;
        let name_len = DEFAULT_NAME_LEN.max(longest.div_ceil(4) * 4);
        let names_at = at + size_of::<OperatorSectionHeader>();
        let stream_at = names_at + self.type_names.len() * name_len as usize;
        let stream_size: usize = self.ops.iter().map(|o| o.record.len()).sum();
        w.put(&OperatorSectionHeader {
            op_count: self.ops.len() as u32,
            type_count: self.type_names.len() as u32,
            type_name_len: name_len,
            _reserved: 0,
            type_names_offset: names_at as u64,
            stream_offset: stream_at as u64,
            stream_size: stream_size as u64,
        });
        for name in &self.type_names {
            w.put_bytes(&encode_fixed_name(name, name_len as usize));
        }
        for op in &self.ops {
            debug_assert!(op.type_id < self.type_names.len() as u32);
            w.put_bytes(&op.record);
        }
        at as u64
    }

    fn write_io(&self, w: &mut Writer) -> u64 {
        let at = w.align();
        let slots: Vec<&(String, u32)> = self
            .inputs
            .iter()
            .chain(&self.outputs)
            .chain(&self.states)
            .collect();
        let ids_at = at + size_of::<IoSectionHeader>();
        let names_at = ids_at + slots.len() * 4;
        w.put(&IoSectionHeader {
            input_count: self.inputs.len() as u32,
            output_count: self.outputs.len() as u32,
            state_count: self.states.len() as u32,
            name_len: self.io_name_len,
            ids_offset: ids_at as u64,
            names_offset: names_at as u64,
        });
        for (_, id) in &slots {
            w.put(id);
        }
        for (name, _) in &slots {
            w.put_bytes(&encode_fixed_name(name, self.io_name_len as usize));
        }
        at as u64
    }

    fn write_debug(&self, w: &mut Writer) -> u64 {
        let at = w.align();
        w.put(&DebugSectionHeader {
            count: self.ops.len() as u32,
            name_len: DEFAULT_NAME_LEN,
            body_offset: (at + size_of::<DebugSectionHeader>()) as u64,
        });
        for op in &self.ops {
            w.put_bytes(&encode_fixed_name(&op.debug_name, DEFAULT_NAME_LEN as usize));
        }
        at as u64
    }

    fn write_shape(&self, w: &mut Writer) -> u64 {
        let at = w.align();
        let graph = if self.graph.is_empty() {
            Vec::new()
        } else {
            self.graph.encode()
        };
        let graph_rel = size_of::<ShapeInferHeader>().div_ceil(16) * 16;
        let pairs_rel = (graph_rel + graph.len()).div_ceil(16) * 16;
        let axes_rel = pairs_rel + self.pairs.len() * size_of::<DimPair>();
        w.put(&ShapeInferHeader {
            graph_size: graph.len() as u64,
            pairs_offset: pairs_rel as u64,
            axes_offset: axes_rel as u64,
            graph_offset: graph_rel as u64,
            pair_count: self.pairs.len() as u32,
            axis_count: self.axes.len() as u32,
        });
        w.pad_to(at + graph_rel);
        w.put_bytes(&graph);
        w.pad_to(at + pairs_rel);
        for p in &self.pairs {
            w.put(p);
        }
        for a in &self.axes {
            w.put(a);
        }
        at as u64
    }

    fn write_parameters(&self, w: &mut Writer) -> u64 {
        let at = w.align();
        let body_at = at + 16;
        w.put(&ParameterSectionHeader {
            size: self.parameters.len() as u64,
            body_offset: body_at as u64,
        });
        w.pad_to(body_at);
        w.put_bytes(&self.parameters);
        at as u64
    }

    fn write_dma(&self, w: &mut Writer) -> u64 {
        let at = w.align();
        w.put(&DmaSectionHeader {
            count: self.dma.len() as u32,
            elem_size: size_of::<DmaRecord>() as u32,
            header_size: size_of::<DmaSectionHeader>() as u32,
            _reserved: 0,
            body_offset: (at + size_of::<DmaSectionHeader>()) as u64,
        });
        for &(src, dst, size) in &self.dma {
            let src_dev = self.device_of(self.tensors[src as usize].memory);
            let dst_dev = self.device_of(self.tensors[dst as usize].memory);
            w.put(&DmaRecord {
                src_device: src_dev.code(),
                dst_device: dst_dev.code(),
                src_tensor: src,
                dst_tensor: dst,
                size,
            });
        }
        at as u64
    }
}

#[derive(Default)]
struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    /// Pads to 16 bytes and returns the new position.
    fn align(&mut self) -> usize {
        let at = self.buf.len().div_ceil(16) * 16;
        self.pad_to(at);
        at
    }

    fn pad_to(&mut self, at: usize) {
        debug_assert!(at >= self.buf.len());
        self.buf.resize(at, 0);
    }

    fn put<T: Pod>(&mut self, value: &T) {
        self.buf.extend_from_slice(bytemuck::bytes_of(value));
    }

    fn put_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    fn patch<T: Pod>(&mut self, at: usize, value: &T) {
        let raw = bytemuck::bytes_of(value);
        self.buf[at..at + raw.len()].copy_from_slice(raw);
    }
}
