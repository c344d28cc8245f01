// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # memory-manager
//!
//! Memory bookkeeping for the NPU runtime. The runtime never allocates
//! behind the caller's back: a memory plan lists [`MemoryDescriptor`]s and
//! the caller supplies one [`MemoryRegion`] per descriptor. This crate
//! provides the vocabulary for that exchange plus a pool that can serve it.
//!
//! # Key Components
//!
//! - [`MemoryClass`] / [`DeviceType`]: who owns a region and where it lives.
//! - [`MemoryDescriptor`]: one plan entry (size, device, class, address).
//! - [`MemoryRegion`]: a zeroed, 16-byte aligned buffer for one descriptor.
//! - [`ArenaLayout`] / [`Span`]: carving a region into aligned sub-regions.
//! - [`MemoryPool`]: budget-enforced allocator with a size-class free list.
//! - [`MemoryBudget`] / [`ClassUsage`]: a ceiling checked against per-class totals.
//! - [`AllocationStats`]: live regions and peaks per memory class.
//!
//! # Ownership Model
//!
//! ```text
//! MemoryPool::allocate(&descriptor)
//!       │
//!       ▼
//!   MemoryRegion  ◄─── owns aligned blocks, holds Arc<PoolInner>
//!       │
//!       │  drop()
//!       ▼
//!   PoolInner::return_blocks()  ──► free list
//! ```

pub mod arena;
pub mod budget;
pub mod class;
pub mod descriptor;
pub mod error;
pub mod pool;
pub mod region;
pub mod stats;

pub use arena::{align_up, ArenaLayout, Span, ARENA_ALIGN};
pub use budget::{ClassUsage, MemoryBudget};
pub use class::{DeviceType, MemoryClass};
pub use descriptor::{MemoryAddress, MemoryDescriptor};
pub use error::MemoryError;
pub use pool::MemoryPool;
pub use region::MemoryRegion;
pub use stats::{AllocationStats, ClassStats};
