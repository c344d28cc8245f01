// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Arena layouts for the model, executor and shape-workspace regions.
//!
//! The planner sizes each region from these layouts and the loader and
//! executor builder place their tables at the same spans, so sizing and
//! placement can never drift apart.
//!
//! ```text
//! model-static      │ memory │ tensors │ io ids │ io names │ op types │ op stream │ op index │ debug │ dma │
//! executor-static   │ tensors │ memory │ registers │ dma │
//! shape-workspace   │ graph │ pairs │ axes │
//! ```
//!
//! Every span starts on a 16-byte boundary.

use memory_manager::{ArenaLayout, Span};
use model_ir::{
    AxisBinding, DimPair, DmaRecord, MemoryRecord, Resource, ResourceError, TensorRecord,
};

/// Model-static region layout.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ModelLayout {
    pub memory: Span,
    pub tensors: Span,
    pub io_ids: Span,
    pub io_names: Span,
    /// One registry index (`u32`) per operator type.
    pub op_types: Span,
    pub op_stream: Span,
    /// One stream offset (`u32`) per operator.
    pub op_index: Span,
    pub debug_names: Span,
    pub dma: Span,
    arena: ArenaLayout,
}

impl ModelLayout {
    /// Computes the layout from section headers.
    pub fn for_resource(res: &Resource<'_>) -> Result<Self, ResourceError> {
        let mem = res.memory_section()?;
        let tensors = res.tensor_section()?;
        let ops = res.operator_section()?;
        // Sized from the bounded views so hostile counts cannot wrap.
        let io_slots = res.io_ids_bytes()?.len() / 4;
        let io_name_bytes = res.io_names_bytes()?.len();

        let mut arena = ArenaLayout::new();
        let memory = arena.push_array::<MemoryRecord>("memory", mem.total_count as usize);
        let tensors = arena.push_array::<TensorRecord>("tensors", tensors.count as usize);
        let io_ids = arena.push_array::<u32>("io_ids", io_slots);
        let io_names = arena.push("io_names", io_name_bytes);
        let op_types = arena.push_array::<u32>("op_types", ops.type_count as usize);
        let op_stream = arena.push("op_stream", ops.stream_size as usize);
        let op_index = arena.push_array::<u32>("op_index", ops.op_count as usize);
        let debug_names = arena.push("debug_names", res.debug_names_bytes()?.len());
        let dma = arena.push_array::<DmaRecord>("dma", res.dma_count()? as usize);
        Ok(Self {
            memory,
            tensors,
            io_ids,
            io_names,
            op_types,
            op_stream,
            op_index,
            debug_names,
            dma,
            arena,
        })
    }

    pub fn total_bytes(&self) -> usize {
        self.arena.total_bytes()
    }

    pub fn arena(&self) -> &ArenaLayout {
        &self.arena
    }
}

/// Executor-static region layout.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ExecutorLayout {
    /// Private tensor table (current shapes and quantization).
    pub tensors: Span,
    pub memory: Span,
    /// Scalar register file (`f64`).
    pub registers: Span,
    pub dma: Span,
    arena: ArenaLayout,
}

impl ExecutorLayout {
    pub fn for_resource(res: &Resource<'_>) -> Result<Self, ResourceError> {
        let mut arena = ArenaLayout::new();
        let tensors =
            arena.push_array::<TensorRecord>("tensors", res.tensor_section()?.count as usize);
        let memory =
            arena.push_array::<MemoryRecord>("memory", res.memory_section()?.total_count as usize);
        let registers = arena.push_array::<f64>("registers", res.register_count()? as usize);
        let dma = arena.push_array::<DmaRecord>("dma", res.dma_count()? as usize);
        Ok(Self {
            tensors,
            memory,
            registers,
            dma,
            arena,
        })
    }

    pub fn total_bytes(&self) -> usize {
        self.arena.total_bytes()
    }

    pub fn arena(&self) -> &ArenaLayout {
        &self.arena
    }
}

/// Shape-workspace region layout.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ShapeLayout {
    pub graph: Span,
    pub pairs: Span,
    pub axes: Span,
    arena: ArenaLayout,
}

impl ShapeLayout {
    pub fn for_resource(res: &Resource<'_>) -> Result<Self, ResourceError> {
        let (graph_size, pair_count, axis_count) = match res.shape_section()? {
            Some(h) => (h.graph_size as usize, h.pair_count as usize, h.axis_count as usize),
            None => (0, 0, 0),
        };
        let mut arena = ArenaLayout::new();
        let graph = arena.push("graph", graph_size);
        let pairs = arena.push_array::<DimPair>("pairs", pair_count);
        let axes = arena.push_array::<AxisBinding>("axes", axis_count);
        Ok(Self {
            graph,
            pairs,
            axes,
            arena,
        })
    }

    pub fn total_bytes(&self) -> usize {
        self.arena.total_bytes()
    }

    pub fn arena(&self) -> &ArenaLayout {
        &self.arena
    }
}
