// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Memory classes and device types.
//!
//! Every region the runtime touches belongs to exactly one
//! [`MemoryClass`] (who owns it and how long it lives) and one
//! [`DeviceType`] (which physical memory backs it).

use crate::MemoryError;
use std::fmt;

/// Ownership/lifetime class of a memory region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MemoryClass {
    /// Holds the loaded model's tables; one per model.
    ModelStatic,
    /// Holds an executor's private tables and register file; one per executor.
    ExecutorStatic,
    /// Read-only weights referenced directly inside the resource; never copied.
    SharedParameter,
    /// Activation buffers; one set per concurrent executor.
    RuntimeScratch,
    /// Shape-inference program storage; one per model.
    ShapeWorkspace,
}

impl MemoryClass {
    /// Every class, in code order.
    pub const ALL: [MemoryClass; 5] = [
        Self::ModelStatic,
        Self::ExecutorStatic,
        Self::SharedParameter,
        Self::RuntimeScratch,
        Self::ShapeWorkspace,
    ];

    /// On-resource code.
    pub fn code(self) -> u32 {
        match self {
            Self::ModelStatic => 0,
            Self::ExecutorStatic => 1,
            Self::SharedParameter => 2,
            Self::RuntimeScratch => 3,
            Self::ShapeWorkspace => 4,
        }
    }

    /// Decodes an on-resource code.
    pub fn from_code(code: u32) -> Result<Self, MemoryError> {
        match code {
            0 => Ok(Self::ModelStatic),
            1 => Ok(Self::ExecutorStatic),
            2 => Ok(Self::SharedParameter),
            3 => Ok(Self::RuntimeScratch),
            4 => Ok(Self::ShapeWorkspace),
            _ => Err(MemoryError::UnknownCode {
                kind: "memory class",
                code,
            }),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ModelStatic => "model-static",
            Self::ExecutorStatic => "executor-static",
            Self::SharedParameter => "shared-parameter",
            Self::RuntimeScratch => "runtime-scratch",
            Self::ShapeWorkspace => "shape-workspace",
        }
    }
}

impl fmt::Display for MemoryClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Physical memory backing a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    /// Slow bulk memory (off-chip DRAM). Weights live here.
    Ddr,
    /// Fast on-chip shared memory. Streamed weights and activations land here.
    Sram,
    /// Host-visible memory used by the CPU side of the runtime.
    Host,
}

impl DeviceType {
    /// On-resource code.
    pub fn code(self) -> u32 {
        match self {
            Self::Ddr => 0,
            Self::Sram => 1,
            Self::Host => 2,
        }
    }

    /// Decodes an on-resource code.
    pub fn from_code(code: u32) -> Result<Self, MemoryError> {
        match code {
            0 => Ok(Self::Ddr),
            1 => Ok(Self::Sram),
            2 => Ok(Self::Host),
            _ => Err(MemoryError::UnknownCode {
                kind: "device type",
                code,
            }),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ddr => "ddr",
            Self::Sram => "sram",
            Self::Host => "host",
        }
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_codes() {
        for (code, class) in MemoryClass::ALL.iter().enumerate() {
            assert_eq!(MemoryClass::from_code(code as u32).unwrap(), *class);
            assert_eq!(class.code(), code as u32);
        }
        assert!(MemoryClass::from_code(5).is_err());
    }

    #[test]
    fn test_device_codes() {
        assert_eq!(DeviceType::from_code(1).unwrap(), DeviceType::Sram);
        assert!(matches!(
            DeviceType::from_code(9),
            Err(MemoryError::UnknownCode { code: 9, .. })
        ));
    }

    #[test]
    fn test_display() {
        assert_eq!(MemoryClass::SharedParameter.to_string(), "shared-parameter");
        assert_eq!(DeviceType::Ddr.to_string(), "ddr");
    }
}
