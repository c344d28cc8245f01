// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Quantized element-wise addition.

use crate::{QuantParams, Quantized, TensorError};

/// Adds two quantized tensors with independent quantization parameters:
///
/// `out = quantize((a - za)·sa + (b - zb)·sb, so, zo)`
///
/// `rhs` may be shorter than `lhs` as long as its length divides the
/// length of `lhs`; it is then repeated along the leading elements
/// (row broadcast, as used for per-channel offsets).
///
/// # Errors
/// [`TensorError::BufferSizeMismatch`] for incompatible lengths and
/// [`TensorError::Numeric`] for an invalid scale.
pub fn quantized_add<Q: Quantized>(
    lhs: &[Q],
    lhs_params: QuantParams,
    rhs: &[Q],
    rhs_params: QuantParams,
    output: &mut [Q],
    out_params: QuantParams,
) -> Result<(), TensorError> {
    lhs_params.validate("add")?;
    rhs_params.validate("add")?;
    out_params.validate("add")?;

    if output.len() != lhs.len() {
        return Err(TensorError::BufferSizeMismatch {
            expected: std::mem::size_of_val(lhs),
            actual: std::mem::size_of_val(output),
        });
    }
    if rhs.is_empty() || lhs.len() % rhs.len() != 0 {
        return Err(TensorError::BufferSizeMismatch {
            expected: std::mem::size_of_val(lhs),
            actual: std::mem::size_of_val(rhs),
        });
    }

    let inv_out = 1.0 / out_params.scale;
    for (i, (o, &a)) in output.iter_mut().zip(lhs).enumerate() {
        let b = rhs[i % rhs.len()];
        let real = (a.widen() - lhs_params.zero_point) as f32 * lhs_params.scale
            + (b.widen() - rhs_params.zero_point) as f32 * rhs_params.scale;
        let steps = (real * inv_out).round() as i32;
        *o = Q::saturate(steps.saturating_add(out_params.zero_point));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_params() {
        let p = QuantParams::new(0.1, 0);
        let mut out = [0i8; 3];
        quantized_add(&[10, 20, 120], p, &[5, -20, 100], p, &mut out, p).unwrap();
        assert_eq!(out, [15, 0, 127]);
    }

    #[test]
    fn test_mixed_params() {
        let a = QuantParams::new(0.5, 10);
        let b = QuantParams::new(0.25, -4);
        let o = QuantParams::new(1.0, 0);
        let mut out = [0i8; 1];
        // (12-10)*0.5 + (0+4)*0.25 = 1 + 1 = 2
        quantized_add(&[12], a, &[0], b, &mut out, o).unwrap();
        assert_eq!(out, [2]);
    }

    #[test]
    fn test_row_broadcast() {
        let p = QuantParams::new(1.0, 0);
        let mut out = [0i8; 4];
        quantized_add(&[1, 2, 3, 4], p, &[10, 20], p, &mut out, p).unwrap();
        assert_eq!(out, [11, 22, 13, 24]);
    }

    #[test]
    fn test_bad_broadcast() {
        let p = QuantParams::default();
        let mut out = [0i8; 4];
        assert!(quantized_add(&[1, 2, 3, 4], p, &[1, 2, 3], p, &mut out, p).is_err());
    }
}
