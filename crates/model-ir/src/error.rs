// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for resource parsing and shape inference.

/// Errors raised while validating or reading a resource.
#[derive(Debug, thiserror::Error)]
pub enum ResourceError {
    /// The buffer is empty or does not start with the resource label.
    #[error("resource missing: {0}")]
    Missing(&'static str),

    /// The header declares more bytes than the caller supplied.
    #[error("resource incomplete: header declares {declared} bytes, buffer holds {actual}")]
    Incomplete { declared: u64, actual: usize },

    /// The stored CRC does not match the body.
    #[error("resource CRC mismatch: stored {stored:#010x}, computed {computed:#010x}")]
    CrcMismatch { stored: u32, computed: u32 },

    /// The resource was built for another platform.
    #[error("resource built for platform {resource}, runtime is platform {runtime}")]
    InvalidPlatform { resource: u32, runtime: u32 },

    /// The resource format version is not understood.
    #[error("unsupported resource version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    /// A mandatory section has a zero offset.
    #[error("resource has no {0} section")]
    MissingSection(&'static str),

    /// A section or record points outside the resource.
    #[error("{what} at offset {offset} with length {len} exceeds resource of {total} bytes")]
    OutOfBounds {
        what: &'static str,
        offset: u64,
        len: u64,
        total: u64,
    },

    /// A record is internally inconsistent.
    #[error("invalid resource data: {0}")]
    InvalidData(String),

    /// A tensor record's dtype code or byte width is wrong.
    #[error("tensor {tensor}: {detail}")]
    InvalidDatatype { tensor: u32, detail: String },

    #[error(transparent)]
    Memory(#[from] memory_manager::MemoryError),

    #[error(transparent)]
    Tensor(#[from] tensor_core::TensorError),
}

/// Errors raised while seeding or evaluating the shape graph.
#[derive(Debug, PartialEq, thiserror::Error)]
pub enum ShapeError {
    /// A caller-supplied axis name has no matching graph input.
    #[error("unknown axis name '{0}'")]
    UnknownAxis(String),

    /// Two observations of the same symbolic axis disagree.
    #[error("scalar {scalar} observed as both {first} and {second}")]
    InconsistentAxis { scalar: u32, first: f64, second: f64 },

    /// Axis names and sizes have different lengths.
    #[error("{names} axis names but {sizes} axis sizes")]
    ArityMismatch { names: usize, sizes: usize },

    /// A register index is outside the register file.
    #[error("register {index} outside register file of {len}")]
    RegisterOutOfRange { index: u32, len: usize },
}
