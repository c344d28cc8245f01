// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Float ↔ integer affine quantization.

use crate::{QuantParams, Quantized, TensorError};

/// Quantizes `input` into `output` element-wise:
///
/// `q = clamp(round(x / scale) + zero_point, Q::MIN, Q::MAX)`
///
/// Rounding is half away from zero. NaN inputs map to `zero_point`.
///
/// # Errors
/// [`TensorError::BufferSizeMismatch`] if the element counts differ,
/// [`TensorError::Numeric`] if the scale is not a positive finite number.
pub fn quantize<Q: Quantized>(
    input: &[f32],
    output: &mut [Q],
    params: QuantParams,
) -> Result<(), TensorError> {
    params.validate("quantize")?;
    if input.len() != output.len() {
        return Err(TensorError::BufferSizeMismatch {
            expected: input.len() * std::mem::size_of::<Q>(),
            actual: std::mem::size_of_val(output),
        });
    }

    let inv_scale = 1.0 / params.scale;
    for (q, &x) in output.iter_mut().zip(input) {
        *q = quantize_scalar::<Q>(x, inv_scale, params.zero_point);
    }
    Ok(())
}

/// Dequantizes `input` into `output`: `x = (q - zero_point) * scale`.
///
/// # Errors
/// Same conditions as [`quantize`].
pub fn dequantize<Q: Quantized>(
    input: &[Q],
    output: &mut [f32],
    params: QuantParams,
) -> Result<(), TensorError> {
    params.validate("dequantize")?;
    if input.len() != output.len() {
        return Err(TensorError::BufferSizeMismatch {
            expected: input.len() * 4,
            actual: output.len() * 4,
        });
    }

    for (x, &q) in output.iter_mut().zip(input) {
        *x = (q.widen() - params.zero_point) as f32 * params.scale;
    }
    Ok(())
}

#[inline(always)]
fn quantize_scalar<Q: Quantized>(x: f32, inv_scale: f32, zero_point: i32) -> Q {
    // `as i32` saturates and maps NaN to 0.
    let steps = (x * inv_scale).round() as i32;
    Q::saturate(steps.saturating_add(zero_point))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quantize_i8_known_values() {
        let input = [0.0f32, 0.5, -0.5, 1.0, 0.24, 100.0, -100.0, f32::NAN];
        let mut out = [0i8; 8];
        quantize(&input, &mut out, QuantParams::new(0.5, 3)).unwrap();
        // 0.5 / 0.5 = 1 → 4; -0.5 → 2; 0.24/0.5 = 0.48 → 0 → 3.
        assert_eq!(out, [3, 4, 2, 5, 3, 127, -128, 3]);
    }

    #[test]
    fn test_quantize_u8_saturates_at_zero() {
        let mut out = [0u8; 2];
        quantize(&[-1.0, 1.0], &mut out, QuantParams::new(0.01, 0)).unwrap();
        assert_eq!(out, [0, 100]);
    }

    #[test]
    fn test_round_half_away_from_zero() {
        let mut out = [0i8; 2];
        quantize(&[1.5, -1.5], &mut out, QuantParams::new(1.0, 0)).unwrap();
        assert_eq!(out, [2, -2]);
    }

    #[test]
    fn test_dequantize() {
        let mut out = [0f32; 3];
        dequantize(&[3i8, 5, -1], &mut out, QuantParams::new(0.25, 1)).unwrap();
        assert_eq!(out, [0.5, 1.0, -0.5]);
    }

    #[test]
    fn test_length_mismatch() {
        let mut out = [0i8; 2];
        let err = quantize(&[1.0, 2.0, 3.0], &mut out, QuantParams::default());
        assert!(matches!(err, Err(TensorError::BufferSizeMismatch { .. })));
    }

    #[test]
    fn test_zero_scale_rejected() {
        let mut out = [0i8; 1];
        assert!(quantize(&[1.0], &mut out, QuantParams::new(0.0, 0)).is_err());
    }
}
