// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # model-ir
//!
//! The pointer-free binary resource format the runtime loads.
//!
//! A resource is a single relocatable byte buffer: every cross-reference is
//! a byte offset, never an address. This crate defines:
//!
//! - [`format`]: `#[repr(C)]` plain-data headers and records.
//! - [`Resource`]: a validated, zero-copy view with bounds-checked section
//!   accessors (label, version, declared size, CRC).
//! - [`OpRecord`]: a view of one operator record.
//! - [`ScalarGraph`]: the shape-inference interpreter over `f64` registers.
//! - [`ResourceBuilder`]: a serializer for fixtures and demos.
//!
//! # Example
//! ```
//! use memory_manager::DeviceType;
//! use model_ir::{Resource, ResourceBuilder};
//! use tensor_core::DType;
//!
//! let mut b = ResourceBuilder::new();
//! let act = b.runtime_memory(256, DeviceType::Sram);
//! let x = b.tensor(DType::I8, &[4, 8], act, 0);
//! b.input("x", x);
//! let bytes = b.build();
//!
//! let res = Resource::parse(&bytes).unwrap();
//! let t = res.tensor_record(x).unwrap();
//! assert_eq!(&t.dims[..2], &[4, 8]);
//! ```

mod builder;
mod crc;
mod error;
pub mod format;
mod op_record;
mod resource;
pub mod scalar_graph;

pub use builder::{MemoryRef, ResourceBuilder, DEFAULT_NAME_LEN};
pub use crc::crc32;
pub use error::{ResourceError, ShapeError};
pub use format::{
    fixed_name, AxisBinding, DimPair, DmaRecord, MemoryRecord, OpRecordHeader, ResourceHeader,
    TensorRecord, PLATFORM_ANY,
};
pub use op_record::{index_stream, OpRecord};
pub use resource::{Resource, Validation};
pub use scalar_graph::{round_dim, Opcode, ScalarGraph};
