// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # runtime
//!
//! Loads compiled NPU resources and executes them on the host.
//!
//! The runtime takes:
//! - A resource byte buffer in the `model-ir` format.
//! - Caller-supplied memory regions sized by a `memory-planner` plan.
//! - An [`OperatorRegistry`] resolving operator type names to kernels.
//!
//! And runs the operator stream in order, streaming weights through a
//! one-slot DMA channel and honouring cooperative cancellation between
//! operators.
//!
//! # Lifecycle
//! ```text
//! initialize() → Runtime::new → plan_memory → model_init → executor_create
//!              → set_input → [update_shape] → forward → get_output
//!              → executor_release → model_fini → uninitialize()
//! ```
//!
//! # Example
//! ```
//! use memory_manager::DeviceType;
//! use model_ir::ResourceBuilder;
//! use runtime::{Completion, ExecutorMemory, ModelMemory, Runtime, RuntimeConfig, TensorData};
//! use tensor_core::{DType, Shape};
//!
//! let mut b = ResourceBuilder::new();
//! let act = b.runtime_memory(64, DeviceType::Sram);
//! let x = b.tensor(DType::F32, &[4], act, 0);
//! let y = b.tensor(DType::F32, &[4], act, 16);
//! b.operator("Relu", &[x], &[y], &[], &[], &[]);
//! b.input("x", x).output("y", y);
//! let bytes = b.build();
//!
//! runtime::initialize();
//! let mut rt = Runtime::new(RuntimeConfig::default()).unwrap();
//! let plan = rt.plan_memory(&bytes).unwrap();
//! let model = rt.model_init(&bytes, ModelMemory::standalone(&plan)).unwrap();
//! let exec = rt.executor_create(model, ExecutorMemory::standalone(&plan)).unwrap();
//!
//! let input = [-1.0f32, 2.0, -3.0, 4.0];
//! let shape = Shape::vector(4);
//! rt.set_input(exec, 0, TensorData::from_slice(DType::F32, shape, &input)).unwrap();
//! assert_eq!(rt.forward(exec).unwrap(), Completion::Finished);
//! let out = rt.get_output(exec, 0).unwrap();
//! assert_eq!(out.as_slice::<f32>().unwrap(), &[0.0, 2.0, 0.0, 4.0]);
//! ```

mod api;
mod config;
mod context;
mod dispatch;
mod dma;
mod error;
mod executor;
mod handle;
mod memory;
mod metrics;
mod model;
pub mod ops;
mod registry;
mod tensor;

pub use api::Runtime;
pub use config::{DTypePolicy, RuntimeConfig};
pub use context::{OpContext, OpViews, TensorView, TensorViewMut};
pub use dma::{DmaBackend, DmaChannel, DmaDescriptor, DmaStats};
pub use error::{Completion, RuntimeError, StatusCode};
pub use executor::{CancelToken, Executor};
pub use handle::{ExecutorHandle, HandleRegistry, ModelHandle, RawHandle};
pub use memory::{ExecutorMemory, ModelMemory};
pub use metrics::{ForwardMetrics, OpMetrics};
pub use model::{IoKind, Model};
pub use registry::{
    global_registry, initialize, is_initialized, uninitialize, version, OpGroup, OpState, Operator,
    OperatorRegistry,
};
pub use tensor::{TensorData, TensorInfo, TensorTable};
