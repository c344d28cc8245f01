// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Model loader.
//!
//! Loading copies every table the executors need out of the resource and
//! into the caller's model-static and shape-workspace regions, at the spans
//! the memory plan laid out, and validates them on the way:
//!
//! 1. header (size, CRC, version, platform)
//! 2. memory table and tensor table
//! 3. IO ids and fixed-width names
//! 4. operator types, resolved once through the registry
//! 5. operator stream and its per-record index
//! 6. debug names and DMA records
//! 7. shape-inference graph, dimension pairs and axis bindings
//! 8. the caller's parameter store, if any, against the shared blocks
//!
//! A failure at any step drops the regions; no handle is ever created for
//! a partially loaded model.

use crate::memory::{check_parameters, expect_fits};
use crate::tensor::{trusted_info, TensorInfo};
use crate::{DmaDescriptor, ModelMemory, Operator, OperatorRegistry, RuntimeConfig, RuntimeError};
use bytemuck::cast_slice;
use memory_manager::{MemoryClass, MemoryRegion, Span};
use memory_planner::MemoryPlan;
use model_ir::format::IoSectionHeader;
use model_ir::{
    fixed_name, index_stream, AxisBinding, DimPair, DmaRecord, MemoryRecord, OpRecord, Resource,
    ResourceError, ScalarGraph, TensorRecord,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tracing::{error, info};

/// Value of the liveness tag while an instance may be used.
pub(crate) const LIVE_TAG: u32 = 0x4e50_5521;

/// Which IO table an index refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoKind {
    Input,
    Output,
    State,
}

impl IoKind {
    fn as_str(self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Output => "output",
            Self::State => "state",
        }
    }
}

/// A loaded, read-only model shared by its executors.
pub struct Model<'r> {
    tag: AtomicU32,
    resource: Resource<'r>,
    plan: MemoryPlan,
    registry: Arc<OperatorRegistry>,
    region: MemoryRegion,
    shape_region: MemoryRegion,
    parameters: Arc<[MemoryRegion]>,
    io: IoSectionHeader,
    op_count: usize,
    debug_name_len: usize,
    register_count: usize,
}

impl<'r> Model<'r> {
    /// Validates `bytes` and loads it into `memory`.
    ///
    /// # Errors
    /// Resource integrity errors, [`RuntimeError::UnsupportedOperator`] for a
    /// type name missing from `registry`, and [`RuntimeError::InvalidData`]
    /// for inconsistent tables. [`RuntimeError::InvalidParameter`] if a
    /// parameter store is given and does not match the shared blocks.
    ///
    /// # Panics
    /// Panics if a region in `memory` is smaller than the plan requires or
    /// has the wrong class or device.
    pub fn load(
        bytes: &'r [u8],
        memory: ModelMemory,
        registry: Arc<OperatorRegistry>,
        config: &RuntimeConfig,
    ) -> Result<Self, RuntimeError> {
        let resource = Resource::parse_with(bytes, config.validation())?;
        resource.check_platform(config.platform_id)?;
        let plan = MemoryPlan::from_resource(&resource)?;

        let ModelMemory {
            model_static: mut region,
            shape_workspace: mut shape_region,
            parameters,
        } = memory;
        expect_fits(&region, plan.model_static());
        expect_fits(&shape_region, plan.shape_workspace());
        region.clear();
        shape_region.clear();

        let layout = &plan.model;
        let register_count = resource.register_count()? as usize;

        // Memory and tensor tables.
        copy_into(&mut region, layout.memory, resource.memory_records_bytes()?)?;
        copy_into(&mut region, layout.tensors, resource.tensor_records_bytes()?)?;
        validate_tensors(
            cast_slice(&region.as_slice()[layout.memory.range()]),
            cast_slice(&region.as_slice()[layout.tensors.range()]),
        )?;
        let tensor_count = layout.tensors.len / std::mem::size_of::<TensorRecord>();

        // IO.
        let io = resource.io_section()?;
        copy_into(&mut region, layout.io_ids, resource.io_ids_bytes()?)?;
        copy_into(&mut region, layout.io_names, resource.io_names_bytes()?)?;
        validate_io(
            &io,
            cast_slice(&region.as_slice()[layout.io_ids.range()]),
            &region.as_slice()[layout.io_names.range()],
            cast_slice(&region.as_slice()[layout.tensors.range()]),
        )?;

        // Operator types, resolved once.
        let ops = resource.operator_section()?;
        let mut type_ids = Vec::with_capacity(ops.type_count as usize);
        for type_id in 0..ops.type_count {
            let name = resource.type_name(type_id)?;
            match registry.lookup(name) {
                Some(index) => type_ids.push(index),
                None => {
                    error!(name, known = registry.len(), "unsupported operator type");
                    return Err(RuntimeError::UnsupportedOperator {
                        name: name.to_string(),
                        known: registry.len(),
                    });
                }
            }
        }
        copy_into(&mut region, layout.op_types, cast_slice(&type_ids))?;

        // Operator stream and index.
        let op_count = ops.op_count as usize;
        copy_into(&mut region, layout.op_stream, resource.op_stream()?)?;
        let offsets = index_stream(&region.as_slice()[layout.op_stream.range()], op_count)?;
        copy_into(&mut region, layout.op_index, cast_slice(&offsets))?;
        let stream = &region.as_slice()[layout.op_stream.range()];
        for (index, &offset) in offsets.iter().enumerate() {
            let record = OpRecord::parse(&stream[offset as usize..])?;
            validate_op(index, &record, ops.type_count, tensor_count, register_count)?;
        }

        // Debug names.
        let debug_name_len = match resource.debug_section()? {
            Some(h) => {
                if h.count as usize != op_count {
                    return Err(ResourceError::InvalidData(format!(
                        "{} debug names for {op_count} operators",
                        h.count
                    ))
                    .into());
                }
                h.name_len as usize
            }
            None => 0,
        };
        copy_into(&mut region, layout.debug_names, resource.debug_names_bytes()?)?;
        check_names("debug", &region.as_slice()[layout.debug_names.range()], debug_name_len)?;

        // DMA.
        let dma = resource.dma_records()?;
        copy_into(&mut region, layout.dma, cast_slice(&dma))?;
        validate_dma(&dma, cast_slice(&region.as_slice()[layout.tensors.range()]))?;
        let stream = &region.as_slice()[layout.op_stream.range()];
        let ops_in_order = offsets
            .iter()
            .map(|&offset| OpRecord::parse(&stream[offset as usize..]))
            .collect::<Result<Vec<_>, _>>()?;
        check_dma_consumed(&dma, &ops_in_order)?;

        // Shape inference.
        let shape_layout = &plan.shape;
        copy_into(&mut shape_region, shape_layout.graph, resource.shape_graph_bytes()?)?;
        copy_into(&mut shape_region, shape_layout.pairs, resource.shape_pairs_bytes()?)?;
        copy_into(&mut shape_region, shape_layout.axes, resource.shape_axes_bytes()?)?;
        let graph = ScalarGraph::parse(&shape_region.as_slice()[shape_layout.graph.range()])?;
        if graph.num_scalars() > register_count {
            return Err(invalid(format!(
                "shape graph uses {} registers of {register_count}",
                graph.num_scalars()
            )));
        }
        let tensors: &[TensorRecord] = cast_slice(&region.as_slice()[layout.tensors.range()]);
        let shape_ws = shape_region.as_slice();
        for pair in cast_slice::<u8, DimPair>(&shape_ws[shape_layout.pairs.range()]) {
            check_binding(tensors, pair.tensor_id, pair.dim_id, pair.scalar, register_count)?;
        }
        for axis in cast_slice::<u8, AxisBinding>(&shape_ws[shape_layout.axes.range()]) {
            check_binding(tensors, axis.tensor_id, axis.dim_id, axis.scalar, register_count)?;
        }

        check_parameters(&plan, &parameters)?;

        info!(
            ops = op_count,
            tensors = tensor_count,
            inputs = io.input_count,
            outputs = io.output_count,
            states = io.state_count,
            transfers = dma.len(),
            model_bytes = region.len(),
            parameter_store = !parameters.is_empty(),
            "model loaded"
        );

        Ok(Self {
            tag: AtomicU32::new(LIVE_TAG),
            resource,
            plan,
            registry,
            region,
            shape_region,
            parameters: Arc::from(parameters),
            io,
            op_count,
            debug_name_len,
            register_count,
        })
    }

    pub(crate) fn is_live(&self) -> bool {
        self.tag.load(Ordering::Acquire) == LIVE_TAG
    }

    /// Clears the liveness tag; executors of this model stop validating.
    pub(crate) fn retire(&self) {
        self.tag.store(0, Ordering::Release);
    }

    pub fn plan(&self) -> &MemoryPlan {
        &self.plan
    }

    pub fn resource(&self) -> &Resource<'r> {
        &self.resource
    }

    pub fn registry(&self) -> &Arc<OperatorRegistry> {
        &self.registry
    }

    /// Caller parameter regions; empty when shared blocks are read from
    /// the resource.
    pub(crate) fn parameters(&self) -> &Arc<[MemoryRegion]> {
        &self.parameters
    }

    pub fn has_parameter_store(&self) -> bool {
        !self.parameters.is_empty()
    }

    fn table(&self, span: Span) -> &[u8] {
        &self.region.as_slice()[span.range()]
    }

    // ── Tables ────────────────────────────────────────────────────

    pub fn memory_records(&self) -> &[MemoryRecord] {
        cast_slice(self.table(self.plan.model.memory))
    }

    /// Declared tensor table; shapes are maximum shapes.
    pub fn tensor_records(&self) -> &[TensorRecord] {
        cast_slice(self.table(self.plan.model.tensors))
    }

    pub fn tensor_count(&self) -> usize {
        self.tensor_records().len()
    }

    /// Declared descriptor of tensor `id`.
    pub fn tensor_info(&self, id: u32) -> Result<TensorInfo, RuntimeError> {
        let rec = self
            .tensor_records()
            .get(id as usize)
            .ok_or(RuntimeError::IndexOutOfBounds {
                what: "tensor",
                index: id as usize,
                len: self.tensor_count(),
            })?;
        Ok(trusted_info(id, rec))
    }

    pub fn dma_records(&self) -> &[DmaRecord] {
        cast_slice(self.table(self.plan.model.dma))
    }

    pub fn register_count(&self) -> usize {
        self.register_count
    }

    /// Initial register file: the scalar section, zero-extended.
    pub fn initial_registers(&self) -> Result<Vec<f64>, RuntimeError> {
        let mut registers = self.resource.scalar_values()?;
        registers.resize(self.register_count, 0.0);
        Ok(registers)
    }

    // ── IO ────────────────────────────────────────────────────────

    pub fn num_inputs(&self) -> usize {
        self.io.input_count as usize
    }

    pub fn num_outputs(&self) -> usize {
        self.io.output_count as usize
    }

    pub fn num_states(&self) -> usize {
        self.io.state_count as usize
    }

    fn io_range(&self, kind: IoKind) -> (usize, usize) {
        let (inputs, outputs) = (self.num_inputs(), self.num_outputs());
        match kind {
            IoKind::Input => (0, inputs),
            IoKind::Output => (inputs, outputs),
            IoKind::State => (inputs + outputs, self.num_states()),
        }
    }

    fn io_slot(&self, kind: IoKind, index: usize) -> Result<usize, RuntimeError> {
        let (base, len) = self.io_range(kind);
        if index >= len {
            return Err(RuntimeError::IndexOutOfBounds {
                what: kind.as_str(),
                index,
                len,
            });
        }
        Ok(base + index)
    }

    /// Tensor id bound to an IO slot.
    pub fn io_tensor(&self, kind: IoKind, index: usize) -> Result<u32, RuntimeError> {
        let slot = self.io_slot(kind, index)?;
        let ids: &[u32] = cast_slice(self.table(self.plan.model.io_ids));
        Ok(ids[slot])
    }

    /// Name of an IO slot, without the fixed-width padding.
    pub fn io_name(&self, kind: IoKind, index: usize) -> Result<&str, RuntimeError> {
        let slot = self.io_slot(kind, index)?;
        Ok(self.slot_name(slot))
    }

    fn slot_name(&self, slot: usize) -> &str {
        let width = self.io.name_len as usize;
        let names = self.table(self.plan.model.io_names);
        fixed_name(&names[slot * width..(slot + 1) * width]).unwrap_or_default()
    }

    /// Finds an IO slot by exact name; linear scan.
    pub fn find_io(&self, kind: IoKind, name: &str) -> Result<usize, RuntimeError> {
        let (base, len) = self.io_range(kind);
        (0..len)
            .find(|&i| self.slot_name(base + i) == name)
            .ok_or_else(|| {
                RuntimeError::InvalidParameter(format!("no {} named '{name}'", kind.as_str()))
            })
    }

    // ── Operators ─────────────────────────────────────────────────

    pub fn op_count(&self) -> usize {
        self.op_count
    }

    /// Operator record `index`.
    ///
    /// # Panics
    /// Panics if `index >= op_count()`.
    pub fn op(&self, index: usize) -> OpRecord<'_> {
        let offsets: &[u32] = cast_slice(self.table(self.plan.model.op_index));
        let stream = self.table(self.plan.model.op_stream);
        match OpRecord::parse(&stream[offsets[index] as usize..]) {
            Ok(record) => record,
            Err(e) => panic!("operator {index} escaped load validation: {e}"),
        }
    }

    /// Kernel for operator `index`, through the cached type index.
    pub fn operator(&self, index: usize) -> &dyn Operator {
        let types: &[u32] = cast_slice(self.table(self.plan.model.op_types));
        self.registry.get(types[self.op(index).type_id() as usize])
    }

    /// Debug name of operator `index`, falling back to `<type>_<index>`.
    pub fn op_name(&self, index: usize) -> String {
        if self.debug_name_len > 0 {
            let names = self.table(self.plan.model.debug_names);
            let width = self.debug_name_len;
            if let Some(name) = fixed_name(&names[index * width..(index + 1) * width]) {
                if !name.is_empty() {
                    return name.to_string();
                }
            }
        }
        format!("{}_{index}", self.operator(index).name())
    }

    // ── Shape inference ───────────────────────────────────────────

    pub fn shape_graph(&self) -> ScalarGraph<'_> {
        let bytes = &self.shape_region.as_slice()[self.plan.shape.graph.range()];
        match ScalarGraph::parse(bytes) {
            Ok(graph) => graph,
            Err(e) => panic!("shape graph escaped load validation: {e}"),
        }
    }

    pub fn shape_pairs(&self) -> &[DimPair] {
        cast_slice(&self.shape_region.as_slice()[self.plan.shape.pairs.range()])
    }

    pub fn shape_axes(&self) -> &[AxisBinding] {
        cast_slice(&self.shape_region.as_slice()[self.plan.shape.axes.range()])
    }
}

impl std::fmt::Debug for Model<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Model")
            .field("ops", &self.op_count)
            .field("tensors", &self.tensor_count())
            .field("inputs", &self.num_inputs())
            .field("outputs", &self.num_outputs())
            .field("live", &self.is_live())
            .finish()
    }
}

// ── Load-time validation ──────────────────────────────────────────

fn copy_into(region: &mut MemoryRegion, span: Span, bytes: &[u8]) -> Result<(), RuntimeError> {
    let dst = region.span_mut(span)?;
    if dst.len() != bytes.len() {
        return Err(ResourceError::InvalidData(format!(
            "section of {} bytes planned as {}",
            bytes.len(),
            dst.len()
        ))
        .into());
    }
    dst.copy_from_slice(bytes);
    Ok(())
}

fn invalid(msg: String) -> RuntimeError {
    ResourceError::InvalidData(msg).into()
}

fn validate_tensors(memory: &[MemoryRecord], tensors: &[TensorRecord]) -> Result<(), RuntimeError> {
    for (id, rec) in tensors.iter().enumerate() {
        let id = id as u32;
        let info = TensorInfo::from_record(id, rec)?;
        let block = memory.get(rec.mem_id as usize).ok_or_else(|| {
            invalid(format!("tensor {id} names memory block {} of {}", rec.mem_id, memory.len()))
        })?;
        let block_class = MemoryClass::from_code(block.class)?;
        if info.class != block_class {
            return Err(invalid(format!(
                "tensor {id} is {} but memory block {} is {block_class}",
                info.class, rec.mem_id
            )));
        }
        let end = rec.offset.saturating_add(info.byte_len() as u64);
        if end > block.size {
            return Err(invalid(format!(
                "tensor {id} [{}, {end}) exceeds memory block {} of {} bytes",
                rec.offset, rec.mem_id, block.size
            )));
        }
    }
    Ok(())
}

fn check_names(what: &str, table: &[u8], width: usize) -> Result<(), RuntimeError> {
    if width == 0 {
        return Ok(());
    }
    for (slot, field) in table.chunks_exact(width).enumerate() {
        if fixed_name(field).is_none() {
            return Err(invalid(format!("{what} name {slot} is not UTF-8")));
        }
    }
    Ok(())
}

fn validate_io(
    io: &IoSectionHeader,
    ids: &[u32],
    names: &[u8],
    tensors: &[TensorRecord],
) -> Result<(), RuntimeError> {
    check_names("io", names, io.name_len as usize)?;
    let writable = io.input_count as usize;
    let states = io.input_count as usize + io.output_count as usize;
    for (slot, &id) in ids.iter().enumerate() {
        let rec = tensors.get(id as usize).ok_or_else(|| {
            invalid(format!("io slot {slot} names tensor {id} of {}", tensors.len()))
        })?;
        let written = slot < writable || slot >= states;
        if written && u32::from(rec.mem_class) != MemoryClass::RuntimeScratch.code() {
            return Err(invalid(format!(
                "io slot {slot} is written but tensor {id} is not in runtime memory"
            )));
        }
    }
    Ok(())
}

fn validate_op(
    index: usize,
    record: &OpRecord<'_>,
    type_count: u32,
    tensor_count: usize,
    register_count: usize,
) -> Result<(), RuntimeError> {
    if record.type_id() >= type_count {
        return Err(invalid(format!(
            "operator {index} has type {} of {type_count}",
            record.type_id()
        )));
    }
    if let Some(id) = record.tensor_ids().find(|&id| id as usize >= tensor_count) {
        return Err(invalid(format!(
            "operator {index} names tensor {id} of {tensor_count}"
        )));
    }
    for i in 0..record.num_scalars() {
        if let Some(reg) = record.scalar_id(i).filter(|&r| r as usize >= register_count) {
            return Err(invalid(format!(
                "operator {index} names register {reg} of {register_count}"
            )));
        }
    }
    Ok(())
}

fn validate_dma(records: &[DmaRecord], tensors: &[TensorRecord]) -> Result<(), RuntimeError> {
    for (i, rec) in records.iter().enumerate() {
        let desc = DmaDescriptor::from_record(rec)?;
        for (what, id) in [("source", desc.src_tensor), ("destination", desc.dst_tensor)] {
            let t = tensors.get(id as usize).ok_or_else(|| {
                invalid(format!("transfer {i} {what} tensor {id} of {}", tensors.len()))
            })?;
            let capacity = trusted_info(id, t).byte_len();
            if desc.bytes > capacity {
                return Err(invalid(format!(
                    "transfer {i} moves {} bytes, {what} tensor {id} holds {capacity}",
                    desc.bytes
                )));
            }
        }
        let dst = &tensors[desc.dst_tensor as usize];
        if u32::from(dst.mem_class) != MemoryClass::RuntimeScratch.code() {
            return Err(invalid(format!(
                "transfer {i} writes tensor {} outside runtime memory",
                desc.dst_tensor
            )));
        }
    }
    Ok(())
}

/// Every transfer must be consumed, in queue order, by an operator that
/// names its destination.
fn check_dma_consumed(records: &[DmaRecord], ops: &[OpRecord<'_>]) -> Result<(), RuntimeError> {
    let mut next = 0;
    for op in ops {
        while next < records.len() && op.tensor_ids().any(|id| id == records[next].dst_tensor) {
            next += 1;
        }
    }
    match records.get(next) {
        None => Ok(()),
        Some(rec) => Err(invalid(format!(
            "transfer {next} writes tensor {}, which no operator reads in stream order",
            rec.dst_tensor
        ))),
    }
}

fn check_binding(
    tensors: &[TensorRecord],
    tensor: u32,
    dim: u32,
    scalar: u32,
    register_count: usize,
) -> Result<(), RuntimeError> {
    let rec = tensors
        .get(tensor as usize)
        .ok_or_else(|| invalid(format!("shape binding names tensor {tensor}")))?;
    if dim >= rec.rank {
        return Err(invalid(format!(
            "shape binding names axis {dim} of rank-{} tensor {tensor}",
            rec.rank
        )));
    }
    if scalar as usize >= register_count {
        return Err(invalid(format!(
            "shape binding names register {scalar} of {register_count}"
        )));
    }
    Ok(())
}
