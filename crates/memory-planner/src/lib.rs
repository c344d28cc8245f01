// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # memory-planner
//!
//! Computes, from a resource's headers alone, every memory region the
//! loader and executor builder will need.
//!
//! The runtime never allocates on its own. [`MemoryPlan::query`] returns
//! [`MemoryDescriptor`](memory_manager::MemoryDescriptor)s in a fixed
//! order; the caller allocates the unassigned ones (for example with a
//! [`MemoryPool`](memory_manager::MemoryPool)) and passes them back.
//!
//! ```text
//!  resource ──► MemoryPlan::query ──► [model-static, shared…, runtime…,
//!                                      executor-static, shape-workspace]
//!                                             │
//!                      caller allocates ◄─────┘
//! ```
//!
//! # Example
//! ```
//! use memory_manager::DeviceType;
//! use memory_planner::MemoryPlan;
//! use model_ir::ResourceBuilder;
//! use tensor_core::DType;
//!
//! let mut b = ResourceBuilder::new();
//! let act = b.runtime_memory(4096, DeviceType::Sram);
//! let x = b.tensor(DType::F32, &[1, 256], act, 0);
//! b.input("x", x);
//! let bytes = b.build();
//!
//! let plan = MemoryPlan::query(&bytes).unwrap();
//! assert_eq!(plan.runtime()[0].size, 4096);
//! println!("{}", plan.summary());
//! ```

mod error;
mod layout;
mod plan;

pub use error::PlannerError;
pub use layout::{ExecutorLayout, ModelLayout, ShapeLayout};
pub use plan::MemoryPlan;
