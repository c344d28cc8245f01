// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The forward dispatch loop.
//!
//! Operators run strictly in stream order. Before an operator runs, every
//! weight transfer at the head of the DMA pipeline that writes one of its
//! tensors is completed; kernels that stream weights issue the next
//! transfer themselves, so it overlaps their compute. The cancel flag is
//! checked between operators. However the pass ends, the in-flight
//! transfer is drained before `forward` returns.

use crate::dma::DmaBackend;
use crate::executor::{tables, Tables};
use crate::memory::Storage;
use crate::{
    Completion, DmaDescriptor, Executor, ForwardMetrics, OpContext, RuntimeError,
};
use model_ir::TensorRecord;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Host copy engine: moves transfer bytes between bound memory blocks.
struct HostDma<'s, 'r> {
    storage: &'s mut Storage<'r>,
    /// Declared tensor table; transfer extents never depend on current shapes.
    tensors: &'s [TensorRecord],
}

impl DmaBackend for HostDma<'_, '_> {
    fn transfer(&mut self, desc: &DmaDescriptor) -> Result<(), RuntimeError> {
        let src = &self.tensors[desc.src_tensor as usize];
        let dst = &self.tensors[desc.dst_tensor as usize];
        self.storage.copy(src, dst, desc.bytes)
    }
}

impl Executor<'_> {
    /// Runs one forward pass.
    ///
    /// Returns [`Completion::Stopped`] if the cancel flag was observed
    /// before the last operator; outputs are then unspecified.
    ///
    /// # Errors
    /// [`RuntimeError::InvalidInstance`] for a released executor or model,
    /// and [`RuntimeError::OperatorFailed`] wrapping the first kernel or
    /// transfer failure.
    pub fn forward(&mut self) -> Result<Completion, RuntimeError> {
        self.ensure_live()?;
        let model = Arc::clone(&self.model);
        let declared = model.tensor_records();
        let started = Instant::now();
        let dma_before = self.dma.stats();
        let mut metrics = self.profiling.then(|| ForwardMetrics::new(model.op_count()));

        self.dma.rewind();
        self.dma.issue_next();

        let Tables { tensors, registers } = tables(&mut self.region, &model.plan().executor);
        let mut outcome = Ok(Completion::Finished);
        for index in 0..model.op_count() {
            if self.cancel.is_stopped() {
                info!(index, "forward stopped");
                outcome = Ok(Completion::Stopped);
                break;
            }

            let record = model.op(index);
            let ids: Vec<u32> = record.tensor_ids().collect();
            let waited = Instant::now();
            let mut backend = HostDma {
                storage: &mut self.storage,
                tensors: declared,
            };
            if let Err(source) = self.dma.complete_for(&ids, &mut backend) {
                outcome = Err(failed(&model, index, source));
                break;
            }
            let dma_wait = waited.elapsed();

            let computed = Instant::now();
            let mut ctx = OpContext::new(
                index,
                record,
                &mut *tensors,
                declared,
                &*registers,
                &mut self.storage,
                &mut self.dma,
                &mut self.states[index],
            );
            if let Err(source) = model.operator(index).forward(&mut ctx) {
                outcome = Err(failed(&model, index, source));
                break;
            }
            let compute = computed.elapsed();
            debug!(index, ?compute, ?dma_wait, "operator done");
            if let Some(m) = metrics.as_mut() {
                m.record_op(index, model.op_name(index), dma_wait, compute);
            }
        }

        let mut backend = HostDma {
            storage: &mut self.storage,
            tensors: declared,
        };
        if let Err(e) = self.dma.drain(&mut backend) {
            if outcome.is_ok() {
                outcome = Err(e);
            } else {
                warn!(error = %e, "drain after failed pass");
            }
        }

        if let (Some(mut m), Ok(completion)) = (metrics.take(), &outcome) {
            m.finalise(started.elapsed(), self.dma.stats().since(dma_before), *completion);
            info!("{}", m.summary());
            self.metrics = Some(m);
        }
        outcome
    }
}

fn failed(model: &crate::Model<'_>, index: usize, source: RuntimeError) -> RuntimeError {
    let name = model.op_name(index);
    error!(index, name = %name, error = %source, "operator failed");
    RuntimeError::OperatorFailed {
        index,
        name,
        source: Box::new(source),
    }
}
