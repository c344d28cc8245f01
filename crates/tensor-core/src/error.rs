// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for tensor operations.

use crate::{DType, Shape};

/// Errors that can occur during tensor operations.
#[derive(Debug, thiserror::Error)]
pub enum TensorError {
    /// The provided buffer size does not match the expected size for the given shape and dtype.
    #[error("buffer size mismatch: expected {expected} bytes, got {actual}")]
    BufferSizeMismatch { expected: usize, actual: usize },

    /// Two tensors have incompatible shapes for the requested operation.
    #[error("incompatible shapes for {op}: {lhs} vs {rhs}")]
    ShapeMismatch {
        op: &'static str,
        lhs: Shape,
        rhs: Shape,
    },

    /// The requested data type is not supported for this operation.
    #[error("unsupported dtype {dtype} for operation {op}")]
    UnsupportedDType { op: &'static str, dtype: DType },

    /// A shape was built with more dimensions than the accelerator supports.
    #[error("rank {rank} exceeds the maximum of {max}")]
    RankTooLarge { rank: usize, max: usize },

    /// A byte buffer is not aligned for the element type it is read as.
    #[error("buffer is not aligned for {dtype} elements")]
    Misaligned { dtype: DType },

    /// A numeric computation failed (e.g., a zero quantization scale).
    #[error("numeric error in {op}: {detail}")]
    Numeric { op: &'static str, detail: String },
}
