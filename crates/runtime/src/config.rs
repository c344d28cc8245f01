// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Runtime configuration loaded from TOML files or constructed programmatically.
//!
//! # TOML Format
//! ```toml
//! memory_budget = "64M"
//! platform_id = 0
//! verify_crc = true
//! enable_profiling = false
//! dtype_policy = "strict"
//! ```

use memory_manager::MemoryBudget;
use model_ir::{Validation, PLATFORM_ANY};
use std::path::Path;
use tensor_core::DType;

/// How `set_input` compares the caller's dtype with the declared one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DTypePolicy {
    /// Types must be identical.
    #[default]
    Strict,
    /// Any type with the declared element width is accepted and
    /// reinterpreted (e.g. `u8` bytes into an `i8` tensor).
    SameWidth,
}

impl DTypePolicy {
    pub fn accepts(self, declared: DType, supplied: DType) -> bool {
        match self {
            Self::Strict => declared == supplied,
            Self::SameWidth => declared.size_bytes() == supplied.size_bytes(),
        }
    }
}

/// Configuration for the inference runtime.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RuntimeConfig {
    /// Memory budget for plan checks and pool sizing (human-readable, e.g., `"64M"`).
    pub memory_budget: String,
    /// Platform id this runtime serves; resources built for another
    /// platform are rejected. `0` accepts any resource.
    #[serde(default)]
    pub platform_id: u32,
    /// Whether a non-zero resource CRC is checked at load.
    #[serde(default = "default_true")]
    pub verify_crc: bool,
    /// Whether forward passes record per-operator timings.
    #[serde(default)]
    pub enable_profiling: bool,
    #[serde(default)]
    pub dtype_policy: DTypePolicy,
}

fn default_true() -> bool {
    true
}

impl RuntimeConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, super::RuntimeError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            super::RuntimeError::ConfigError(format!(
                "cannot read config '{}': {e}",
                path.display()
            ))
        })?;
        Self::from_toml(&content)
    }

    /// Parses configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, super::RuntimeError> {
        toml::from_str(toml_str).map_err(|e| {
            super::RuntimeError::ConfigError(format!("TOML parse error: {e}"))
        })
    }

    /// Serialises configuration to TOML.
    pub fn to_toml(&self) -> Result<String, super::RuntimeError> {
        toml::to_string_pretty(self).map_err(|e| {
            super::RuntimeError::ConfigError(format!("TOML serialise error: {e}"))
        })
    }

    /// Parses the memory budget string into a [`MemoryBudget`].
    pub fn parse_budget(&self) -> Result<MemoryBudget, super::RuntimeError> {
        MemoryBudget::parse(&self.memory_budget)
            .map_err(|e| super::RuntimeError::ConfigError(format!("invalid budget: {e}")))
    }

    /// Resource validation derived from this config.
    pub fn validation(&self) -> Validation {
        Validation {
            verify_crc: self.verify_crc,
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            memory_budget: "64M".to_string(),
            platform_id: PLATFORM_ANY,
            verify_crc: true,
            enable_profiling: false,
            dtype_policy: DTypePolicy::Strict,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default() {
        let c = RuntimeConfig::default();
        assert_eq!(c.memory_budget, "64M");
        assert_eq!(c.platform_id, PLATFORM_ANY);
        assert!(c.verify_crc);
        assert!(!c.enable_profiling);
        assert_eq!(c.dtype_policy, DTypePolicy::Strict);
    }

    #[test]
    fn test_parse_budget() {
        let c = RuntimeConfig {
            memory_budget: "256M".into(),
            ..Default::default()
        };
        let b = c.parse_budget().unwrap();
        assert_eq!(b, MemoryBudget::from_mb(256));
    }

    #[test]
    fn test_invalid_budget() {
        let c = RuntimeConfig {
            memory_budget: "lots".into(),
            ..Default::default()
        };
        assert!(c.parse_budget().is_err());
    }

    #[test]
    fn test_from_toml() {
        let toml = r#"
memory_budget = "1G"
platform_id = 7
verify_crc = false
enable_profiling = true
dtype_policy = "same-width"
"#;
        let c = RuntimeConfig::from_toml(toml).unwrap();
        assert_eq!(c.memory_budget, "1G");
        assert_eq!(c.platform_id, 7);
        assert!(!c.validation().verify_crc);
        assert!(c.enable_profiling);
        assert_eq!(c.dtype_policy, DTypePolicy::SameWidth);
    }

    #[test]
    fn test_from_toml_defaults() {
        let c = RuntimeConfig::from_toml("memory_budget = \"8M\"").unwrap();
        assert!(c.verify_crc);
        assert_eq!(c.dtype_policy, DTypePolicy::Strict);
    }

    #[test]
    fn test_to_toml_roundtrip() {
        let c = RuntimeConfig::default();
        let toml = c.to_toml().unwrap();
        let back = RuntimeConfig::from_toml(&toml).unwrap();
        assert_eq!(back.memory_budget, c.memory_budget);
        assert_eq!(back.dtype_policy, c.dtype_policy);
    }

    #[test]
    fn test_dtype_policy() {
        assert!(DTypePolicy::Strict.accepts(DType::I8, DType::I8));
        assert!(!DTypePolicy::Strict.accepts(DType::I8, DType::U8));
        assert!(DTypePolicy::SameWidth.accepts(DType::I8, DType::U8));
        assert!(!DTypePolicy::SameWidth.accepts(DType::I8, DType::I16));
    }
}
