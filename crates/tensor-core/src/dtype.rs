// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Supported tensor element data types.

/// Enumerates the numeric types a tensor can hold on the accelerator.
///
/// The numeric code ([`DType::code`]) is the value stored in the binary
/// resource; the byte width is stored alongside it and must agree with
/// [`DType::size_bytes`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    /// 32-bit IEEE 754 floating point.
    F32,
    /// 16-bit IEEE 754 floating point.
    F16,
    /// 16-bit brain floating point.
    BF16,
    /// 8-bit signed integer (symmetric or asymmetric quantization).
    I8,
    /// 8-bit unsigned integer (asymmetric quantization).
    U8,
    /// 16-bit signed integer (high-precision activations).
    I16,
    /// 32-bit signed integer (accumulators and biases).
    I32,
}

impl DType {
    /// Every data type, in code order.
    pub const ALL: [DType; 7] = [
        DType::F32,
        DType::F16,
        DType::BF16,
        DType::I8,
        DType::U8,
        DType::I16,
        DType::I32,
    ];

    /// Returns the size of a single element in bytes.
    pub fn size_bytes(self) -> usize {
        match self {
            DType::F32 | DType::I32 => 4,
            DType::F16 | DType::BF16 | DType::I16 => 2,
            DType::I8 | DType::U8 => 1,
        }
    }

    /// Returns the on-resource code of this data type.
    pub fn code(self) -> u8 {
        match self {
            DType::F32 => 0,
            DType::F16 => 1,
            DType::BF16 => 2,
            DType::I8 => 3,
            DType::U8 => 4,
            DType::I16 => 5,
            DType::I32 => 6,
        }
    }

    /// Decodes an on-resource data type code.
    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.get(code as usize).copied()
    }

    /// Returns `true` for integer types that carry a scale and zero point.
    pub fn is_quantized(self) -> bool {
        matches!(self, DType::I8 | DType::U8 | DType::I16)
    }

    /// Returns `true` for floating-point types.
    pub fn is_float(self) -> bool {
        matches!(self, DType::F32 | DType::F16 | DType::BF16)
    }

    /// Returns a human-readable label for this data type.
    pub fn as_str(self) -> &'static str {
        match self {
            DType::F32 => "f32",
            DType::F16 => "f16",
            DType::BF16 => "bf16",
            DType::I8 => "i8",
            DType::U8 => "u8",
            DType::I16 => "i16",
            DType::I32 => "i32",
        }
    }

    /// Parses a label produced by [`DType::as_str`] (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|d| d.as_str() == s)
    }
}

impl std::fmt::Display for DType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_dense() {
        for (i, d) in DType::ALL.iter().enumerate() {
            assert_eq!(d.code() as usize, i);
            assert_eq!(DType::from_code(d.code()), Some(*d));
        }
        assert_eq!(DType::from_code(7), None);
    }

    #[test]
    fn test_sizes() {
        assert_eq!(DType::F32.size_bytes(), 4);
        assert_eq!(DType::BF16.size_bytes(), 2);
        assert_eq!(DType::I8.size_bytes(), 1);
        assert_eq!(DType::I32.size_bytes(), 4);
    }

    #[test]
    fn test_parse() {
        assert_eq!(DType::parse("I8"), Some(DType::I8));
        assert_eq!(DType::parse(" f32 "), Some(DType::F32));
        assert_eq!(DType::parse("q4"), None);
    }

    #[test]
    fn test_quantized_classification() {
        assert!(DType::I8.is_quantized());
        assert!(!DType::I32.is_quantized());
        assert!(DType::F16.is_float());
    }

    #[test]
    fn test_serde_names() {
        assert_eq!(serde_json::to_string(&DType::BF16).unwrap(), "\"bf16\"");
        let d: DType = serde_json::from_str("\"i16\"").unwrap();
        assert_eq!(d, DType::I16);
    }
}
