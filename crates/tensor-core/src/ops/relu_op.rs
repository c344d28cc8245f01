// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Rectified linear unit on quantized and float data.

use crate::{Quantized, TensorError};

/// Quantized ReLU with shared input/output parameters: `max(q, zero_point)`.
pub fn relu<Q: Quantized>(input: &[Q], output: &mut [Q], zero_point: i32) -> Result<(), TensorError> {
    if input.len() != output.len() {
        return Err(TensorError::BufferSizeMismatch {
            expected: std::mem::size_of_val(input),
            actual: std::mem::size_of_val(output),
        });
    }
    let floor = Q::saturate(zero_point);
    for (o, &q) in output.iter_mut().zip(input) {
        *o = if q < floor { floor } else { q };
    }
    Ok(())
}

/// Float ReLU.
pub fn relu_f32(input: &[f32], output: &mut [f32]) -> Result<(), TensorError> {
    if input.len() != output.len() {
        return Err(TensorError::BufferSizeMismatch {
            expected: input.len() * 4,
            actual: output.len() * 4,
        });
    }
    for (o, &x) in output.iter_mut().zip(input) {
        *o = x.max(0.0);
    }
    Ok(())
}
