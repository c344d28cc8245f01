// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Affine quantization parameters and the integer element trait.
//!
//! A quantized value `q` represents the real number
//! `(q - zero_point) * scale`.

use crate::{DType, TensorError};

/// Scale and zero point of an affine-quantized tensor.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct QuantParams {
    /// Real value of one quantization step.
    pub scale: f32,
    /// Integer value that represents real zero.
    pub zero_point: i32,
}

impl QuantParams {
    /// Creates quantization parameters.
    pub fn new(scale: f32, zero_point: i32) -> Self {
        Self { scale, zero_point }
    }

    /// Rejects non-finite or non-positive scales.
    pub fn validate(&self, op: &'static str) -> Result<(), TensorError> {
        if !(self.scale.is_finite() && self.scale > 0.0) {
            return Err(TensorError::Numeric {
                op,
                detail: format!("invalid quantization scale {}", self.scale),
            });
        }
        Ok(())
    }
}

impl Default for QuantParams {
    fn default() -> Self {
        Self {
            scale: 1.0,
            zero_point: 0,
        }
    }
}

/// Integer element types that can hold quantized values.
pub trait Quantized: bytemuck::Pod + Copy + PartialOrd {
    /// Matching tensor data type.
    const DTYPE: DType;
    /// Smallest representable value, widened.
    const MIN: i32;
    /// Largest representable value, widened.
    const MAX: i32;

    /// Narrows a value that is already clamped to `[MIN, MAX]`.
    fn from_clamped(v: i32) -> Self;

    /// Widens to `i32`.
    fn widen(self) -> i32;

    /// Clamps and narrows.
    #[inline(always)]
    fn saturate(v: i32) -> Self {
        Self::from_clamped(v.clamp(Self::MIN, Self::MAX))
    }
}

impl Quantized for i8 {
    const DTYPE: DType = DType::I8;
    const MIN: i32 = i8::MIN as i32;
    const MAX: i32 = i8::MAX as i32;

    #[inline(always)]
    fn from_clamped(v: i32) -> Self {
        v as i8
    }

    #[inline(always)]
    fn widen(self) -> i32 {
        self as i32
    }
}

impl Quantized for u8 {
    const DTYPE: DType = DType::U8;
    const MIN: i32 = u8::MIN as i32;
    const MAX: i32 = u8::MAX as i32;

    #[inline(always)]
    fn from_clamped(v: i32) -> Self {
        v as u8
    }

    #[inline(always)]
    fn widen(self) -> i32 {
        self as i32
    }
}

impl Quantized for i16 {
    const DTYPE: DType = DType::I16;
    const MIN: i32 = i16::MIN as i32;
    const MAX: i32 = i16::MAX as i32;

    #[inline(always)]
    fn from_clamped(v: i32) -> Self {
        v as i16
    }

    #[inline(always)]
    fn widen(self) -> i32 {
        self as i32
    }
}

/// Reinterprets a byte buffer as elements of `T`.
///
/// # Errors
/// [`TensorError::Misaligned`] if the buffer start is not aligned for `T`,
/// [`TensorError::BufferSizeMismatch`] if the length is not a multiple of
/// the element size.
pub fn elements<T: bytemuck::Pod>(bytes: &[u8], dtype: DType) -> Result<&[T], TensorError> {
    bytemuck::try_cast_slice(bytes).map_err(|e| cast_error(e, bytes.len(), dtype))
}

/// Mutable variant of [`elements`].
pub fn elements_mut<T: bytemuck::Pod>(
    bytes: &mut [u8],
    dtype: DType,
) -> Result<&mut [T], TensorError> {
    let len = bytes.len();
    bytemuck::try_cast_slice_mut(bytes).map_err(|e| cast_error(e, len, dtype))
}

fn cast_error(e: bytemuck::PodCastError, len: usize, dtype: DType) -> TensorError {
    match e {
        bytemuck::PodCastError::OutputSliceWouldHaveSlop => TensorError::BufferSizeMismatch {
            expected: len - len % dtype.size_bytes(),
            actual: len,
        },
        _ => TensorError::Misaligned { dtype },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_saturate() {
        assert_eq!(i8::saturate(300), 127);
        assert_eq!(i8::saturate(-300), -128);
        assert_eq!(u8::saturate(-1), 0);
        assert_eq!(i16::saturate(40_000), i16::MAX);
    }

    #[test]
    fn test_scale_validation() {
        assert!(QuantParams::new(0.5, 0).validate("t").is_ok());
        assert!(QuantParams::new(0.0, 0).validate("t").is_err());
        assert!(QuantParams::new(f32::NAN, 0).validate("t").is_err());
    }

    #[test]
    fn test_elements_slop() {
        let bytes = [0u8; 6];
        let err = elements::<u32>(&bytes[..], DType::I32);
        // Either misaligned or slop depending on the stack address; both are errors.
        assert!(err.is_err());
        let ok = elements::<i8>(&bytes[..], DType::I8).unwrap();
        assert_eq!(ok.len(), 6);
    }
}
