// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Handle-based runtime facade.
//!
//! [`Runtime`] owns every loaded model and executor and hands out
//! generational handles to them. A released handle, or an executor whose
//! model has been released, is reported as
//! [`RuntimeError::InvalidInstance`] rather than dereferenced.

use crate::handle::{ExecutorHandle, HandleRegistry, ModelHandle};
use crate::model::IoKind;
use crate::registry::global_registry;
use crate::{
    CancelToken, Completion, DmaStats, Executor, ExecutorMemory, ForwardMetrics, Model,
    ModelMemory, OperatorRegistry, RuntimeConfig, RuntimeError, TensorData, TensorInfo,
};
use memory_planner::MemoryPlan;
use std::sync::Arc;
use tracing::info;

/// Owner of models and executors over resources borrowed for `'r`.
pub struct Runtime<'r> {
    config: RuntimeConfig,
    registry: Arc<OperatorRegistry>,
    models: HandleRegistry<Arc<Model<'r>>>,
    executors: HandleRegistry<Executor<'r>>,
}

impl<'r> Runtime<'r> {
    /// Creates a runtime over the process-wide operator registry.
    ///
    /// # Errors
    /// [`RuntimeError::Uninitialized`] unless
    /// [`initialize`](crate::initialize) has been called.
    pub fn new(config: RuntimeConfig) -> Result<Self, RuntimeError> {
        let registry = global_registry().ok_or(RuntimeError::Uninitialized)?;
        Ok(Self::with_registry(config, registry))
    }

    /// Creates a runtime over a caller-built registry.
    pub fn with_registry(config: RuntimeConfig, registry: Arc<OperatorRegistry>) -> Self {
        Self {
            config,
            registry,
            models: HandleRegistry::new(),
            executors: HandleRegistry::new(),
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<OperatorRegistry> {
        &self.registry
    }

    /// Sizes the memory a resource needs, without loading it.
    pub fn plan_memory(&self, bytes: &[u8]) -> Result<MemoryPlan, RuntimeError> {
        Ok(MemoryPlan::query_with(bytes, self.config.validation())?)
    }

    // ── Models ────────────────────────────────────────────────────

    /// Loads a resource into caller memory.
    ///
    /// # Panics
    /// Panics if `memory` does not match the resource's plan.
    pub fn model_init(
        &mut self,
        bytes: &'r [u8],
        memory: ModelMemory,
    ) -> Result<ModelHandle, RuntimeError> {
        let model = Model::load(bytes, memory, Arc::clone(&self.registry), &self.config)?;
        let handle = ModelHandle(self.models.insert(Arc::new(model)));
        info!(%handle, "model registered");
        Ok(handle)
    }

    /// Releases a model.
    ///
    /// Executors of the model stay registered but report
    /// [`RuntimeError::InvalidInstance`] until they are released; the
    /// model's memory is returned once the last of them is gone.
    pub fn model_fini(&mut self, handle: ModelHandle) -> Result<(), RuntimeError> {
        let model = self
            .models
            .remove(handle.0)
            .ok_or(RuntimeError::InvalidInstance("model"))?;
        model.retire();
        info!(%handle, "model released");
        Ok(())
    }

    pub fn model(&self, handle: ModelHandle) -> Result<&Arc<Model<'r>>, RuntimeError> {
        self.models
            .get(handle.0)
            .ok_or(RuntimeError::InvalidInstance("model"))
    }

    pub fn num_inputs(&self, handle: ModelHandle) -> Result<usize, RuntimeError> {
        Ok(self.model(handle)?.num_inputs())
    }

    pub fn num_outputs(&self, handle: ModelHandle) -> Result<usize, RuntimeError> {
        Ok(self.model(handle)?.num_outputs())
    }

    pub fn input_name(&self, handle: ModelHandle, index: usize) -> Result<&str, RuntimeError> {
        self.model(handle)?.io_name(IoKind::Input, index)
    }

    pub fn output_name(&self, handle: ModelHandle, index: usize) -> Result<&str, RuntimeError> {
        self.model(handle)?.io_name(IoKind::Output, index)
    }

    /// Declared descriptor of input `index`.
    pub fn input_info(&self, handle: ModelHandle, index: usize) -> Result<TensorInfo, RuntimeError> {
        let model = self.model(handle)?;
        model.tensor_info(model.io_tensor(IoKind::Input, index)?)
    }

    pub fn output_info(&self, handle: ModelHandle, index: usize) -> Result<TensorInfo, RuntimeError> {
        let model = self.model(handle)?;
        model.tensor_info(model.io_tensor(IoKind::Output, index)?)
    }

    // ── Executors ─────────────────────────────────────────────────

    /// Creates an executor of `model` in caller memory.
    ///
    /// # Panics
    /// Panics if `memory` does not match the model's plan.
    pub fn executor_create(
        &mut self,
        model: ModelHandle,
        memory: ExecutorMemory,
    ) -> Result<ExecutorHandle, RuntimeError> {
        let model = Arc::clone(self.model(model)?);
        let executor = Executor::build(model, memory, &self.config)?;
        let handle = ExecutorHandle(self.executors.insert(executor));
        info!(%handle, "executor registered");
        Ok(handle)
    }

    /// Releases an executor and returns its memory.
    ///
    /// Works for executors whose model has already been released.
    pub fn executor_release(&mut self, handle: ExecutorHandle) -> Result<ExecutorMemory, RuntimeError> {
        let executor = self
            .executors
            .remove(handle.0)
            .ok_or(RuntimeError::InvalidInstance("executor"))?;
        info!(%handle, "executor released");
        Ok(executor.release())
    }

    pub fn executor(&self, handle: ExecutorHandle) -> Result<&Executor<'r>, RuntimeError> {
        self.executors
            .get(handle.0)
            .ok_or(RuntimeError::InvalidInstance("executor"))
    }

    pub fn executor_mut(&mut self, handle: ExecutorHandle) -> Result<&mut Executor<'r>, RuntimeError> {
        self.executors
            .get_mut(handle.0)
            .ok_or(RuntimeError::InvalidInstance("executor"))
    }

    pub fn set_input(
        &mut self,
        handle: ExecutorHandle,
        index: usize,
        data: TensorData<'_>,
    ) -> Result<(), RuntimeError> {
        self.executor_mut(handle)?.set_input(index, data)
    }

    pub fn set_input_by_name(
        &mut self,
        handle: ExecutorHandle,
        name: &str,
        data: TensorData<'_>,
    ) -> Result<(), RuntimeError> {
        self.executor_mut(handle)?.set_input_by_name(name, data)
    }

    pub fn get_output(&self, handle: ExecutorHandle, index: usize) -> Result<TensorData<'_>, RuntimeError> {
        self.executor(handle)?.get_output(index)
    }

    pub fn get_output_by_name(
        &self,
        handle: ExecutorHandle,
        name: &str,
    ) -> Result<TensorData<'_>, RuntimeError> {
        self.executor(handle)?.get_output_by_name(name)
    }

    pub fn forward(&mut self, handle: ExecutorHandle) -> Result<Completion, RuntimeError> {
        self.executor_mut(handle)?.forward()
    }

    pub fn update_shape(
        &mut self,
        handle: ExecutorHandle,
        names: &[&str],
        sizes: &[usize],
    ) -> Result<(), RuntimeError> {
        self.executor_mut(handle)?.update_shape(names, sizes)
    }

    pub fn executor_start(&self, handle: ExecutorHandle) -> Result<(), RuntimeError> {
        let executor = self.executor(handle)?;
        executor.ensure_live()?;
        executor.start();
        Ok(())
    }

    pub fn executor_stop(&self, handle: ExecutorHandle) -> Result<(), RuntimeError> {
        let executor = self.executor(handle)?;
        executor.ensure_live()?;
        executor.stop();
        Ok(())
    }

    /// A token that stops `handle` from another thread.
    pub fn cancel_token(&self, handle: ExecutorHandle) -> Result<CancelToken, RuntimeError> {
        Ok(self.executor(handle)?.cancel_token())
    }

    pub fn reset_states(&mut self, handle: ExecutorHandle) -> Result<(), RuntimeError> {
        self.executor_mut(handle)?.reset_states()
    }

    pub fn forward_metrics(&self, handle: ExecutorHandle) -> Result<Option<&ForwardMetrics>, RuntimeError> {
        Ok(self.executor(handle)?.last_metrics())
    }

    pub fn dma_stats(&self, handle: ExecutorHandle) -> Result<DmaStats, RuntimeError> {
        Ok(self.executor(handle)?.dma_stats())
    }
}

impl std::fmt::Debug for Runtime<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("models", &self.models.len())
            .field("executors", &self.executors.len())
            .field("operators", &self.registry.len())
            .finish()
    }
}
