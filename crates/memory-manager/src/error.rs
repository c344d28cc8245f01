// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for memory management.

use crate::{DeviceType, MemoryClass};

/// Errors that can occur while allocating or addressing memory regions.
#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    /// The requested allocation would exceed the memory budget.
    #[error("out of memory: requested {requested_bytes} bytes, but only {available_bytes} available (budget: {budget_bytes})")]
    OutOfMemory {
        requested_bytes: usize,
        available_bytes: usize,
        budget_bytes: usize,
    },

    /// A budget string could not be parsed.
    #[error("invalid budget string '{0}': expected a number followed by an optional suffix (K, M, G)")]
    InvalidBudget(String),

    /// A plan needs more allocatable bytes than the budget allows.
    #[error("budget {budget_bytes} bytes is too small: plan allocates {required_bytes} bytes, {largest_bytes} of them {largest}")]
    OverBudget {
        required_bytes: usize,
        budget_bytes: usize,
        largest: MemoryClass,
        largest_bytes: usize,
    },

    /// A descriptor of this class is served from the resource and is never allocated.
    #[error("{0} memory is bound to the resource and cannot be allocated")]
    NotAllocatable(MemoryClass),

    /// An unknown memory class or device code was read.
    #[error("unknown {kind} code {code}")]
    UnknownCode { kind: &'static str, code: u32 },

    /// A caller-provided region does not satisfy its descriptor.
    #[error("region mismatch: descriptor wants {expected_bytes} bytes of {expected_class} on {expected_device}, got {actual_bytes} bytes of {actual_class} on {actual_device}")]
    RegionMismatch {
        expected_class: MemoryClass,
        expected_device: DeviceType,
        expected_bytes: usize,
        actual_class: MemoryClass,
        actual_device: DeviceType,
        actual_bytes: usize,
    },

    /// An offset/length pair does not lie inside its region.
    #[error("span [{offset}, {offset}+{len}) exceeds region of {region_bytes} bytes")]
    OutOfBounds {
        offset: usize,
        len: usize,
        region_bytes: usize,
    },
}
