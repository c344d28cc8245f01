// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Executors: per-instance state over a shared model.
//!
//! An executor owns a private copy of the tensor table (current shapes and
//! quantization), the scalar register file, its DMA channel and the
//! runtime memory blocks. Several executors of one model run independently;
//! they share only the model's read-only tables and the resource.

use crate::dma::DmaChannel;
use crate::memory::{expect_fits, Storage};
use crate::model::{IoKind, Model, LIVE_TAG};
use crate::tensor::{store_shape, trusted_info, TensorInfo};
use crate::{
    DTypePolicy, DmaDescriptor, DmaStats, ExecutorMemory, ForwardMetrics, OpState, RuntimeConfig,
    RuntimeError, TensorData, TensorTable,
};
use bytemuck::{cast_slice, cast_slice_mut};
use memory_manager::MemoryRegion;
use memory_planner::ExecutorLayout;
use model_ir::{round_dim, TensorRecord};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Cooperative cancellation flag.
///
/// Clones share the flag, so a token can be handed to another thread (or a
/// signal handler task) and used to stop a running forward pass. The flag
/// is checked at operator boundaries.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests that the next operator boundary ends the pass.
    pub fn stop(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Clears a pending stop request.
    pub fn start(&self) {
        self.0.store(false, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Mutable tables inside the executor-static region.
pub(crate) struct Tables<'a> {
    pub tensors: &'a mut [TensorRecord],
    pub registers: &'a mut [f64],
}

pub(crate) fn tables<'a>(region: &'a mut MemoryRegion, layout: &ExecutorLayout) -> Tables<'a> {
    let (lo, hi) = region.as_mut_slice().split_at_mut(layout.registers.offset);
    Tables {
        tensors: cast_slice_mut(&mut lo[layout.tensors.range()]),
        registers: cast_slice_mut(&mut hi[..layout.registers.len]),
    }
}

/// A runnable instance of a [`Model`].
pub struct Executor<'r> {
    pub(crate) tag: u32,
    pub(crate) model: Arc<Model<'r>>,
    pub(crate) region: MemoryRegion,
    pub(crate) storage: Storage<'r>,
    pub(crate) states: Vec<OpState>,
    pub(crate) dma: DmaChannel,
    pub(crate) cancel: CancelToken,
    pub(crate) profiling: bool,
    pub(crate) metrics: Option<ForwardMetrics>,
    dtype_policy: DTypePolicy,
}

impl<'r> Executor<'r> {
    /// Builds an executor in `memory` and runs every operator's `init`.
    ///
    /// # Errors
    /// [`RuntimeError::InvalidInstance`] if the model has been released,
    /// [`RuntimeError::OperatorFailed`] if an `init` hook rejects its
    /// operator. States created before the failure are finalised.
    ///
    /// # Panics
    /// Panics if `memory` does not match the model's plan.
    pub fn build(
        model: Arc<Model<'r>>,
        memory: ExecutorMemory,
        config: &RuntimeConfig,
    ) -> Result<Self, RuntimeError> {
        if !model.is_live() {
            return Err(RuntimeError::InvalidInstance("model"));
        }
        let plan = model.plan();
        let ExecutorMemory {
            executor_static: mut region,
            runtime,
        } = memory;
        expect_fits(&region, plan.executor_static());
        assert_eq!(
            runtime.len(),
            plan.runtime().len(),
            "caller memory has {} runtime regions, plan has {}",
            runtime.len(),
            plan.runtime().len()
        );
        for (r, desc) in runtime.iter().zip(plan.runtime()) {
            expect_fits(r, desc);
        }

        region.clear();
        let layout = &plan.executor;
        region
            .span_mut(layout.tensors)?
            .copy_from_slice(cast_slice(model.tensor_records()));
        region
            .span_mut(layout.memory)?
            .copy_from_slice(cast_slice(model.memory_records()));
        region
            .span_mut(layout.registers)?
            .copy_from_slice(cast_slice(&model.initial_registers()?));
        region
            .span_mut(layout.dma)?
            .copy_from_slice(cast_slice(model.dma_records()));

        let parameters = Arc::clone(model.parameters());
        let mut storage = Storage::bind(model.resource().as_bytes(), plan, parameters, runtime);
        storage.clear();
        for (id, rec) in model.tensor_records().iter().enumerate() {
            storage.locate(rec, trusted_info(id as u32, rec).byte_len())?;
        }

        let descriptors = model
            .dma_records()
            .iter()
            .map(DmaDescriptor::from_record)
            .collect::<Result<Vec<_>, _>>()?;

        let states = init_states(&model)?;

        info!(
            ops = model.op_count(),
            transfers = descriptors.len(),
            runtime_blocks = plan.runtime().len(),
            "executor created"
        );
        Ok(Self {
            tag: LIVE_TAG,
            model,
            region,
            storage,
            states,
            dma: DmaChannel::new(descriptors),
            cancel: CancelToken::new(),
            profiling: config.enable_profiling,
            metrics: None,
            dtype_policy: config.dtype_policy,
        })
    }

    pub(crate) fn ensure_live(&self) -> Result<(), RuntimeError> {
        if self.tag != LIVE_TAG || !self.model.is_live() {
            return Err(RuntimeError::InvalidInstance("executor"));
        }
        Ok(())
    }

    pub fn model(&self) -> &Arc<Model<'r>> {
        &self.model
    }

    fn tensor_records(&self) -> &[TensorRecord] {
        let span = self.model.plan().executor.tensors;
        cast_slice(&self.region.as_slice()[span.range()])
    }

    /// Current descriptor of tensor `id`.
    pub fn tensor_info(&self, id: u32) -> Result<TensorInfo, RuntimeError> {
        let rec = self
            .tensor_records()
            .get(id as usize)
            .ok_or(RuntimeError::IndexOutOfBounds {
                what: "tensor",
                index: id as usize,
                len: self.model.tensor_count(),
            })?;
        Ok(trusted_info(id, rec))
    }

    /// Current register file.
    pub fn registers(&self) -> &[f64] {
        let span = self.model.plan().executor.registers;
        cast_slice(&self.region.as_slice()[span.range()])
    }

    // ── IO ────────────────────────────────────────────────────────

    /// Copies `data` into input `index` and records its shape.
    ///
    /// # Errors
    /// - [`RuntimeError::InvalidDatatype`] if the dtype policy rejects
    ///   `data.dtype`.
    /// - [`RuntimeError::InvalidData`] if the shape exceeds the declared
    ///   maximum.
    /// - [`RuntimeError::InvalidParameter`] if the byte length does not
    ///   match the shape.
    pub fn set_input(&mut self, index: usize, data: TensorData<'_>) -> Result<(), RuntimeError> {
        self.ensure_live()?;
        let id = self.model.io_tensor(IoKind::Input, index)?;
        self.write_tensor(id, &data)
    }

    pub fn set_input_by_name(&mut self, name: &str, data: TensorData<'_>) -> Result<(), RuntimeError> {
        self.ensure_live()?;
        let index = self.model.find_io(IoKind::Input, name)?;
        self.set_input(index, data)
    }

    fn write_tensor(&mut self, id: u32, data: &TensorData<'_>) -> Result<(), RuntimeError> {
        let declared = self.model.tensor_info(id)?;
        if !self.dtype_policy.accepts(declared.dtype, data.dtype) {
            warn!(tensor = id, expected = %declared.dtype, actual = %data.dtype, "input dtype rejected");
            return Err(RuntimeError::InvalidDatatype {
                tensor: id,
                expected: declared.dtype,
                actual: data.dtype,
            });
        }
        if !data.shape.fits_within(&declared.shape) {
            return Err(RuntimeError::InvalidData(format!(
                "tensor {id}: shape {} exceeds declared {}",
                data.shape, declared.shape
            )));
        }
        let len = data.shape.size_bytes(declared.dtype);
        if data.data.len() != len {
            return Err(RuntimeError::InvalidParameter(format!(
                "tensor {id}: {} bytes for shape {} of {}",
                data.data.len(),
                data.shape,
                declared.dtype
            )));
        }

        let model = Arc::clone(&self.model);
        let Tables { tensors, .. } = tables(&mut self.region, &model.plan().executor);
        let mut rec = tensors[id as usize];
        store_shape(&mut rec, &data.shape);
        if let Some(quant) = data.quant {
            if declared.dtype.is_quantized() {
                quant.validate("set_input")?;
            }
            rec.scale = quant.scale;
            rec.zero_point = quant.zero_point;
        }

        let dst = self.storage.bytes_mut(&rec, len)?;
        if len > 0 && dst.as_ptr() != data.data.as_ptr() {
            dst.copy_from_slice(data.data);
        }
        tensors[id as usize] = rec;
        debug!(tensor = id, shape = %data.shape, bytes = len, "input set");
        Ok(())
    }

    /// Borrowed view of output `index` at its current shape.
    pub fn get_output(&self, index: usize) -> Result<TensorData<'_>, RuntimeError> {
        self.ensure_live()?;
        let id = self.model.io_tensor(IoKind::Output, index)?;
        self.read_tensor(id)
    }

    pub fn get_output_by_name(&self, name: &str) -> Result<TensorData<'_>, RuntimeError> {
        self.ensure_live()?;
        let index = self.model.find_io(IoKind::Output, name)?;
        self.get_output(index)
    }

    fn read_tensor(&self, id: u32) -> Result<TensorData<'_>, RuntimeError> {
        let rec = &self.tensor_records()[id as usize];
        let info = trusted_info(id, rec);
        Ok(TensorData {
            dtype: info.dtype,
            shape: info.shape,
            quant: Some(info.quant),
            data: self.storage.bytes(rec, info.byte_len())?,
        })
    }

    /// Zeroes every state tensor over its declared extent.
    pub fn reset_states(&mut self) -> Result<(), RuntimeError> {
        self.ensure_live()?;
        let model = Arc::clone(&self.model);
        for i in 0..model.num_states() {
            let id = model.io_tensor(IoKind::State, i)?;
            let rec = &model.tensor_records()[id as usize];
            let len = trusted_info(id, rec).byte_len();
            self.storage.bytes_mut(rec, len)?.fill(0);
        }
        debug!(states = model.num_states(), "states reset");
        Ok(())
    }

    // ── Shape inference ───────────────────────────────────────────

    /// Re-derives tensor dimensions from the shape graph.
    ///
    /// With `names`/`sizes`, the named graph inputs are seeded directly.
    /// With both empty, inputs are seeded from the current dimensions of
    /// the bound axes; two axes bound to one register must agree.
    ///
    /// # Errors
    /// [`RuntimeError::Shape`] for unknown names or inconsistent axes,
    /// [`RuntimeError::InvalidData`] if a derived dimension exceeds its
    /// declared maximum. Registers and dimensions are left as they were.
    pub fn update_shape(&mut self, names: &[&str], sizes: &[usize]) -> Result<(), RuntimeError> {
        self.ensure_live()?;
        let model = Arc::clone(&self.model);
        let Tables { tensors, registers } = tables(&mut self.region, &model.plan().executor);

        let snapshot = registers.to_vec();
        if let Err(e) = infer_dims(&model, tensors, registers, names, sizes) {
            registers.copy_from_slice(&snapshot);
            return Err(e);
        }
        for pair in model.shape_pairs() {
            let dim = round_dim(registers[pair.scalar as usize]);
            tensors[pair.tensor_id as usize].dims[pair.dim_id as usize] = dim as u32;
        }
        debug!(pairs = model.shape_pairs().len(), "shapes updated");
        Ok(())
    }

    // ── Control ───────────────────────────────────────────────────

    /// A clone of the executor's cancel flag.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn start(&self) {
        self.cancel.start();
    }

    pub fn stop(&self) {
        self.cancel.stop();
    }

    /// Cumulative DMA counters over every pass.
    pub fn dma_stats(&self) -> DmaStats {
        self.dma.stats()
    }

    /// Metrics of the last profiled forward pass.
    pub fn last_metrics(&self) -> Option<&ForwardMetrics> {
        self.metrics.as_ref()
    }

    /// Finalises every operator and returns the caller's memory.
    pub fn release(mut self) -> ExecutorMemory {
        self.fini_states();
        self.tag = 0;
        let placeholder = MemoryRegion::new(0, self.region.class(), self.region.device());
        ExecutorMemory {
            executor_static: std::mem::replace(&mut self.region, placeholder),
            runtime: self.storage.take_runtime(),
        }
    }

    fn fini_states(&mut self) {
        let model = Arc::clone(&self.model);
        for (index, state) in self.states.drain(..).enumerate().rev() {
            model.operator(index).fini(state);
        }
    }
}

/// Seeds and evaluates the shape graph, then checks every inferred
/// dimension against its declared maximum. Tensor records are not touched.
fn infer_dims(
    model: &Model<'_>,
    tensors: &[TensorRecord],
    registers: &mut [f64],
    names: &[&str],
    sizes: &[usize],
) -> Result<(), RuntimeError> {
    let graph = model.shape_graph();
    if names.is_empty() && sizes.is_empty() {
        let observed = model.shape_axes().iter().map(|axis| {
            let dim = tensors[axis.tensor_id as usize].dims[axis.dim_id as usize];
            (axis.scalar, f64::from(dim))
        });
        graph.seed_observed(registers, observed)?;
    } else {
        graph.seed_by_name(registers, names, sizes)?;
    }
    graph.evaluate(registers);

    let declared = model.tensor_records();
    for pair in model.shape_pairs() {
        let dim = round_dim(registers[pair.scalar as usize]);
        let max = declared[pair.tensor_id as usize].dims[pair.dim_id as usize] as usize;
        if dim > max {
            return Err(RuntimeError::InvalidData(format!(
                "tensor {} axis {} inferred as {dim}, declared maximum {max}",
                pair.tensor_id, pair.dim_id
            )));
        }
    }
    Ok(())
}

impl Drop for Executor<'_> {
    fn drop(&mut self) {
        self.fini_states();
    }
}

impl std::fmt::Debug for Executor<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("live", &(self.tag == LIVE_TAG))
            .field("ops", &self.states.len())
            .field("dma", &self.dma.stats())
            .field("stopped", &self.cancel.is_stopped())
            .finish()
    }
}

/// Runs `init` for every operator in stream order.
fn init_states(model: &Model<'_>) -> Result<Vec<OpState>, RuntimeError> {
    let table = TensorTable::new(model.tensor_records());
    let mut states: Vec<OpState> = Vec::with_capacity(model.op_count());
    for index in 0..model.op_count() {
        match model.operator(index).init(&model.op(index), &table) {
            Ok(state) => states.push(state),
            Err(source) => {
                for (i, state) in states.drain(..).enumerate().rev() {
                    model.operator(i).fini(state);
                }
                let name = model.op_name(index);
                warn!(index, name = %name, error = %source, "operator init failed");
                return Err(RuntimeError::OperatorFailed {
                    index,
                    name,
                    source: Box::new(source),
                });
            }
        }
    }
    Ok(states)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_token_is_shared() {
        let token = CancelToken::new();
        let remote = token.clone();
        assert!(!token.is_stopped());
        remote.stop();
        assert!(token.is_stopped());
        token.start();
        assert!(!remote.is_stopped());
    }
}
