// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Memory descriptors: what the planner asks the caller to provide.

use crate::{DeviceType, MemoryClass};
use std::fmt;

/// Where a descriptor's bytes come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum MemoryAddress {
    /// The caller must allocate a region for this descriptor.
    Unassigned,
    /// The bytes already live inside the resource at this byte offset.
    /// Nothing is allocated; the resource buffer must outlive every user.
    Resource { offset: u64 },
}

/// One memory region required by a model or an executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct MemoryDescriptor {
    /// Size in bytes.
    pub size: usize,
    /// Physical memory the region must live in.
    pub device: DeviceType,
    /// Ownership/lifetime class.
    pub class: MemoryClass,
    /// Backing address, if already known.
    pub address: MemoryAddress,
}

impl MemoryDescriptor {
    /// A descriptor the caller has to allocate.
    pub fn unassigned(size: usize, device: DeviceType, class: MemoryClass) -> Self {
        Self {
            size,
            device,
            class,
            address: MemoryAddress::Unassigned,
        }
    }

    /// A descriptor bound to bytes inside the resource.
    pub fn in_resource(size: usize, device: DeviceType, offset: u64) -> Self {
        Self {
            size,
            device,
            class: MemoryClass::SharedParameter,
            address: MemoryAddress::Resource { offset },
        }
    }

    /// Returns `true` if the caller must allocate this region.
    pub fn needs_allocation(&self) -> bool {
        matches!(self.address, MemoryAddress::Unassigned)
    }
}

impl fmt::Display for MemoryDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:<16} {:<5} {:>10} B", self.class, self.device, self.size)?;
        if let MemoryAddress::Resource { offset } = self.address {
            write!(f, " @resource+{offset:#x}")?;
        }
        Ok(())
    }
}
