// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Quantized fully-connected (dense) layer.

use crate::{Quantized, TensorError};

/// Problem size of a fully-connected layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FcDims {
    /// Number of input rows.
    pub batch: usize,
    /// Inner (reduction) dimension.
    pub in_features: usize,
    /// Number of output columns (rows of the weight matrix).
    pub out_features: usize,
}

/// Zero points and the combined requantization multiplier
/// `input_scale * weight_scale / output_scale`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FcQuant {
    pub input_zero_point: i32,
    pub weight_zero_point: i32,
    pub output_zero_point: i32,
    pub multiplier: f32,
}

/// Computes `output = requantize(input · weightsᵀ + bias)`.
///
/// `input` is `[batch, in_features]`, `weights` is
/// `[out_features, in_features]` (row-major, one row per output channel),
/// `bias` is `[out_features]` in the 32-bit accumulator domain, and
/// `output` is `[batch, out_features]`.
///
/// # Errors
/// Returns [`TensorError::BufferSizeMismatch`] if any buffer does not match
/// `dims`, or [`TensorError::Numeric`] for a non-positive multiplier.
pub fn fully_connected<Q: Quantized>(
    input: &[Q],
    weights: &[i8],
    bias: Option<&[i32]>,
    output: &mut [Q],
    dims: FcDims,
    quant: FcQuant,
) -> Result<(), TensorError> {
    let FcDims {
        batch,
        in_features: k,
        out_features: n,
    } = dims;

    check_len("input", input.len(), batch * k)?;
    check_len("weights", weights.len(), n * k)?;
    check_len("output", output.len(), batch * n)?;
    if let Some(b) = bias {
        check_len("bias", b.len(), n)?;
    }
    if !(quant.multiplier.is_finite() && quant.multiplier > 0.0) {
        return Err(TensorError::Numeric {
            op: "fully_connected",
            detail: format!("invalid requantization multiplier {}", quant.multiplier),
        });
    }

    // Row-by-row dot products: both operands are contiguous along k.
    for i in 0..batch {
        let x_row = &input[i * k..(i + 1) * k];
        let out_row = &mut output[i * n..(i + 1) * n];
        for (j, o) in out_row.iter_mut().enumerate() {
            let w_row = &weights[j * k..(j + 1) * k];
            let mut acc: i32 = bias.map_or(0, |b| b[j]);
            for (&x, &w) in x_row.iter().zip(w_row) {
                acc += (x.widen() - quant.input_zero_point) * (w as i32 - quant.weight_zero_point);
            }
            let scaled = (acc as f32 * quant.multiplier).round() as i32;
            *o = Q::saturate(scaled.saturating_add(quant.output_zero_point));
        }
    }

    Ok(())
}

fn check_len(what: &'static str, actual: usize, expected: usize) -> Result<(), TensorError> {
    if actual != expected {
        return Err(TensorError::Numeric {
            op: "fully_connected",
            detail: format!("{what} has {actual} elements, expected {expected}"),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_quant() -> FcQuant {
        FcQuant {
            input_zero_point: 0,
            weight_zero_point: 0,
            output_zero_point: 0,
            multiplier: 1.0,
        }
    }

    #[test]
    fn test_identity_weights() {
        let dims = FcDims {
            batch: 2,
            in_features: 3,
            out_features: 3,
        };
        let w = [1i8, 0, 0, 0, 1, 0, 0, 0, 1];
        let x = [1i8, 2, 3, 4, 5, 6];
        let mut out = [0i8; 6];
        fully_connected(&x, &w, None, &mut out, dims, unit_quant()).unwrap();
        assert_eq!(out, x);
    }

    #[test]
    fn test_bias_and_requantize() {
        let dims = FcDims {
            batch: 1,
            in_features: 2,
            out_features: 2,
        };
        // Row 0: 1*3 + 2*4 = 11, +1 bias = 12, *0.5 = 6.
        // Row 1: 1*-1 + 2*-1 = -3, +0 bias = -3, *0.5 = -1.5 → -2.
        let w = [3i8, 4, -1, -1];
        let mut out = [0i8; 2];
        let quant = FcQuant {
            multiplier: 0.5,
            ..unit_quant()
        };
        fully_connected(&[1i8, 2], &w, Some(&[1, 0]), &mut out, dims, quant).unwrap();
        assert_eq!(out, [6, -2]);
    }

    #[test]
    fn test_zero_points() {
        let dims = FcDims {
            batch: 1,
            in_features: 1,
            out_features: 1,
        };
        let quant = FcQuant {
            input_zero_point: 10,
            weight_zero_point: 2,
            output_zero_point: -5,
            multiplier: 1.0,
        };
        let mut out = [0i8; 1];
        // (13-10)*(6-2) = 12, -5 → 7.
        fully_connected(&[13i8], &[6], None, &mut out, dims, quant).unwrap();
        assert_eq!(out, [7]);
    }

    #[test]
    fn test_shape_mismatch() {
        let dims = FcDims {
            batch: 1,
            in_features: 4,
            out_features: 2,
        };
        let mut out = [0i8; 2];
        let err = fully_connected(&[1i8; 3], &[0; 8], None, &mut out, dims, unit_quant());
        assert!(err.is_err());
    }
}
