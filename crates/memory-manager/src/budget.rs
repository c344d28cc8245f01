// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Memory budgets checked against per-class plan totals.
//!
//! A plan's regions fall into five [`MemoryClass`]es. [`ClassUsage`] sums
//! them; [`MemoryBudget::check`] compares everything the caller has to
//! allocate against the ceiling. Shared-parameter bytes live inside the
//! resource and are reported but never charged.

use crate::{MemoryClass, MemoryDescriptor, MemoryError};
use std::fmt;

const UNITS: [(char, usize); 3] = [('G', 1 << 30), ('M', 1 << 20), ('K', 1 << 10)];

/// Ceiling on pool-allocated bytes.
///
/// ```
/// use memory_manager::MemoryBudget;
///
/// assert_eq!(MemoryBudget::parse("64K").unwrap().as_bytes(), 64 * 1024);
/// assert_eq!(MemoryBudget::parse("2mb").unwrap(), MemoryBudget::from_mb(2));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct MemoryBudget {
    bytes: usize,
}

impl MemoryBudget {
    pub fn from_bytes(bytes: usize) -> Self {
        Self { bytes }
    }

    pub fn from_kb(kb: usize) -> Self {
        Self { bytes: kb << 10 }
    }

    pub fn from_mb(mb: usize) -> Self {
        Self { bytes: mb << 20 }
    }

    pub fn as_bytes(&self) -> usize {
        self.bytes
    }

    /// Parses `"<n>[K|M|G][B]"`, case-insensitive. A bare number is bytes.
    pub fn parse(s: &str) -> Result<Self, MemoryError> {
        let invalid = || MemoryError::InvalidBudget(s.to_string());
        let upper = s.trim().to_ascii_uppercase();
        let body = upper.strip_suffix('B').unwrap_or(&upper);

        let (digits, scale) = match body.chars().last() {
            Some(c) if c.is_ascii_alphabetic() => {
                let (_, scale) = UNITS.iter().find(|(u, _)| *u == c).ok_or_else(invalid)?;
                (&body[..body.len() - 1], *scale)
            }
            _ => (body, 1),
        };

        let value: usize = digits.trim().parse().map_err(|_| invalid())?;
        match value.checked_mul(scale) {
            Some(bytes) if bytes > 0 => Ok(Self { bytes }),
            _ => Err(invalid()),
        }
    }

    /// Fails if the allocatable classes in `usage` exceed the ceiling.
    /// The error names the class contributing the most bytes.
    pub fn check(&self, usage: &ClassUsage) -> Result<(), MemoryError> {
        let required_bytes = usage.allocated();
        if required_bytes <= self.bytes {
            return Ok(());
        }
        let (largest, largest_bytes) = usage
            .iter()
            .filter(|(class, _)| *class != MemoryClass::SharedParameter)
            .max_by_key(|(_, bytes)| *bytes)
            .unwrap_or((MemoryClass::ModelStatic, 0));
        Err(MemoryError::OverBudget {
            required_bytes,
            budget_bytes: self.bytes,
            largest,
            largest_bytes,
        })
    }
}

impl fmt::Display for MemoryBudget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let unit = UNITS
            .iter()
            .find(|(_, scale)| self.bytes >= *scale && self.bytes % scale == 0);
        match unit {
            Some((unit, scale)) => write!(f, "{}{unit}", self.bytes / scale),
            None => write!(f, "{}B", self.bytes),
        }
    }
}

/// Byte totals per memory class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct ClassUsage {
    bytes: [usize; MemoryClass::ALL.len()],
}

impl ClassUsage {
    /// Sums `descs` by class.
    pub fn of(descs: &[MemoryDescriptor]) -> Self {
        let mut usage = Self::default();
        for d in descs {
            usage.add(d.class, d.size);
        }
        usage
    }

    pub fn add(&mut self, class: MemoryClass, bytes: usize) {
        self.bytes[class.code() as usize] += bytes;
    }

    pub fn get(&self, class: MemoryClass) -> usize {
        self.bytes[class.code() as usize]
    }

    /// Bytes the caller allocates; shared parameters excluded.
    pub fn allocated(&self) -> usize {
        self.iter()
            .filter(|(class, _)| *class != MemoryClass::SharedParameter)
            .map(|(_, bytes)| bytes)
            .sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (MemoryClass, usize)> + '_ {
        MemoryClass::ALL.iter().map(|&c| (c, self.get(c)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DeviceType;

    #[test]
    fn test_parse_units() {
        assert_eq!(MemoryBudget::parse("512").unwrap().as_bytes(), 512);
        assert_eq!(MemoryBudget::parse("512B").unwrap().as_bytes(), 512);
        assert_eq!(MemoryBudget::parse("3k").unwrap().as_bytes(), 3 * 1024);
        assert_eq!(MemoryBudget::parse(" 64M ").unwrap(), MemoryBudget::from_mb(64));
        assert_eq!(MemoryBudget::parse("1GB").unwrap().as_bytes(), 1 << 30);
    }

    #[test]
    fn test_parse_invalid() {
        for s in ["", "M", "lots", "12T", "0K", "-4M", "99999999999999999999G"] {
            assert!(
                matches!(MemoryBudget::parse(s), Err(MemoryError::InvalidBudget(_))),
                "{s:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(MemoryBudget::from_mb(64).to_string(), "64M");
        assert_eq!(MemoryBudget::from_kb(1536).to_string(), "1536K");
        assert_eq!(MemoryBudget::from_bytes(100).to_string(), "100B");
        let b = MemoryBudget::from_kb(48);
        assert_eq!(MemoryBudget::parse(&b.to_string()).unwrap(), b);
    }

    #[test]
    fn test_usage_excludes_shared() {
        let descs = [
            MemoryDescriptor::unassigned(100, DeviceType::Host, MemoryClass::ModelStatic),
            MemoryDescriptor::in_resource(4000, DeviceType::Ddr, 0),
            MemoryDescriptor::unassigned(300, DeviceType::Sram, MemoryClass::RuntimeScratch),
            MemoryDescriptor::unassigned(200, DeviceType::Sram, MemoryClass::RuntimeScratch),
        ];
        let usage = ClassUsage::of(&descs);
        assert_eq!(usage.get(MemoryClass::RuntimeScratch), 500);
        assert_eq!(usage.get(MemoryClass::SharedParameter), 4000);
        assert_eq!(usage.allocated(), 600);
        assert!(MemoryBudget::from_bytes(600).check(&usage).is_ok());
    }

    #[test]
    fn test_check_names_largest_class() {
        let mut usage = ClassUsage::default();
        usage.add(MemoryClass::ModelStatic, 64);
        usage.add(MemoryClass::RuntimeScratch, 4096);
        usage.add(MemoryClass::SharedParameter, 1 << 20);
        let err = MemoryBudget::from_kb(2).check(&usage).unwrap_err();
        assert!(matches!(
            err,
            MemoryError::OverBudget {
                required_bytes: 4160,
                budget_bytes: 2048,
                largest: MemoryClass::RuntimeScratch,
                largest_bytes: 4096,
            }
        ));
    }

    #[test]
    fn test_serde_is_plain_bytes() {
        let b = MemoryBudget::from_kb(4);
        assert_eq!(serde_json::to_string(&b).unwrap(), "4096");
        let back: MemoryBudget = serde_json::from_str("4096").unwrap();
        assert_eq!(back, b);
    }
}
