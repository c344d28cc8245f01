// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Budget-enforced pool that serves memory plans.
//!
//! The [`MemoryPool`] turns [`MemoryDescriptor`]s into [`MemoryRegion`]s. It:
//!
//! 1. Enforces a hard memory ceiling; allocations that would exceed the
//!    budget return `Err(OutOfMemory)`.
//! 2. Keeps a free list of returned buffers, binned by size class, so that
//!    creating and releasing executors repeatedly does not hit the heap.
//! 3. Refuses shared-parameter descriptors, which are served from the
//!    resource itself.
//! 4. Tracks live regions and peaks per memory class.
//!
//! # Size Classes
//! Returned buffers are binned by size rounded up to the next power of two
//! (minimum 4 KB). A request is served from the bin of its own size class.

use crate::region::{blocks_for, Block};
use crate::{
    AllocationStats, MemoryBudget, MemoryClass, MemoryDescriptor, MemoryError, MemoryRegion,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Minimum size class: 4 KB. Anything smaller is rounded up.
const MIN_SIZE_CLASS: usize = 4096;

/// Pool state shared between the pool and its regions.
pub struct PoolInner {
    budget: MemoryBudget,
    /// Live bytes, not yet returned.
    allocated_bytes: AtomicUsize,
    /// size_class → available buffers.
    free_blocks: Mutex<HashMap<usize, Vec<Vec<Block>>>>,
    free_list_bytes: AtomicUsize,
    stats: Mutex<AllocationStats>,
}

impl PoolInner {
    /// Called by `MemoryRegion::drop`.
    pub(crate) fn return_blocks(
        &self,
        blocks: Vec<Block>,
        size_bytes: usize,
        class: MemoryClass,
    ) {
        self.allocated_bytes.fetch_sub(size_bytes, Ordering::Release);

        if let Ok(mut stats) = self.stats.lock() {
            stats.record_return(class, size_bytes);
        }

        if blocks.is_empty() {
            return;
        }
        let size_class = size_class_for(size_bytes);
        self.free_list_bytes
            .fetch_add(blocks.len() * std::mem::size_of::<Block>(), Ordering::Release);
        if let Ok(mut free) = self.free_blocks.lock() {
            free.entry(size_class).or_default().push(blocks);
        }
    }
}

/// Allocator for plan regions.
///
/// # Example
/// ```
/// use memory_manager::{DeviceType, MemoryBudget, MemoryClass, MemoryDescriptor, MemoryPool};
///
/// let pool = MemoryPool::new(MemoryBudget::from_mb(64));
/// let desc = MemoryDescriptor::unassigned(1024, DeviceType::Sram, MemoryClass::RuntimeScratch);
///
/// let region = pool.allocate(&desc).unwrap();
/// assert_eq!(pool.allocated_bytes(), 1024);
///
/// drop(region);
/// assert_eq!(pool.allocated_bytes(), 0);
/// ```
pub struct MemoryPool {
    inner: Arc<PoolInner>,
}

impl MemoryPool {
    pub fn new(budget: MemoryBudget) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                budget,
                allocated_bytes: AtomicUsize::new(0),
                free_blocks: Mutex::new(HashMap::new()),
                free_list_bytes: AtomicUsize::new(0),
                stats: Mutex::new(AllocationStats::default()),
            }),
        }
    }

    /// Allocates a zeroed region for `desc`.
    ///
    /// # Errors
    /// - [`MemoryError::NotAllocatable`] if the descriptor is already bound
    ///   to resource bytes.
    /// - [`MemoryError::OutOfMemory`] if the budget would be exceeded.
    pub fn allocate(&self, desc: &MemoryDescriptor) -> Result<MemoryRegion, MemoryError> {
        if !desc.needs_allocation() {
            return Err(MemoryError::NotAllocatable(desc.class));
        }
        let size_bytes = desc.size;

        let current = self.inner.allocated_bytes.load(Ordering::Acquire);
        let budget = self.inner.budget.as_bytes();
        if current + size_bytes > budget {
            if let Ok(mut stats) = self.inner.stats.lock() {
                stats.record_refusal();
            }
            return Err(MemoryError::OutOfMemory {
                requested_bytes: size_bytes,
                available_bytes: budget.saturating_sub(current),
                budget_bytes: budget,
            });
        }

        let needed = blocks_for(size_bytes);
        let mut reused = None;
        if needed > 0 {
            let size_class = size_class_for(size_bytes);
            if let Ok(mut free) = self.inner.free_blocks.lock() {
                if let Some(mut blocks) = free.get_mut(&size_class).and_then(Vec::pop) {
                    self.inner.free_list_bytes.fetch_sub(
                        blocks.len() * std::mem::size_of::<Block>(),
                        Ordering::Release,
                    );
                    blocks.clear();
                    blocks.resize(needed, Block::ZERO);
                    reused = Some(blocks);
                }
            }
        }

        let is_hit = reused.is_some();
        let blocks = reused.unwrap_or_else(|| vec![Block::ZERO; needed]);

        self.inner
            .allocated_bytes
            .fetch_add(size_bytes, Ordering::Release);

        if let Ok(mut stats) = self.inner.stats.lock() {
            stats.record_allocation(
                desc.class,
                size_bytes,
                is_hit,
                self.inner.allocated_bytes.load(Ordering::Acquire),
            );
        }

        debug!(
            class = %desc.class,
            device = %desc.device,
            size_bytes,
            cache_hit = is_hit,
            "allocated region"
        );

        Ok(MemoryRegion::from_pool(
            blocks,
            size_bytes,
            desc.class,
            desc.device,
            Arc::clone(&self.inner),
        ))
    }

    /// Allocates one region per descriptor that needs one, in order.
    ///
    /// Descriptors bound to resource bytes are skipped. On failure every
    /// region allocated so far is returned to the pool.
    pub fn allocate_all(
        &self,
        descs: &[MemoryDescriptor],
    ) -> Result<Vec<MemoryRegion>, MemoryError> {
        descs
            .iter()
            .filter(|d| d.needs_allocation())
            .map(|d| self.allocate(d))
            .collect()
    }

    /// Bytes currently allocated (live, not yet returned).
    pub fn allocated_bytes(&self) -> usize {
        self.inner.allocated_bytes.load(Ordering::Acquire)
    }

    /// Bytes remaining before hitting the budget.
    pub fn available_bytes(&self) -> usize {
        self.inner
            .budget
            .as_bytes()
            .saturating_sub(self.allocated_bytes())
    }

    pub fn budget(&self) -> MemoryBudget {
        self.inner.budget
    }

    /// Snapshot of allocation statistics.
    pub fn stats(&self) -> AllocationStats {
        self.inner
            .stats
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    /// Drops every cached free buffer. Live regions are unaffected.
    pub fn shrink(&self) {
        if let Ok(mut free) = self.inner.free_blocks.lock() {
            free.clear();
            self.inner.free_list_bytes.store(0, Ordering::Release);
        }
    }

    /// Approximate bytes held in the free list.
    pub fn free_list_bytes(&self) -> usize {
        self.inner.free_list_bytes.load(Ordering::Acquire)
    }
}

/// Smallest power of two that is >= `size` and >= `MIN_SIZE_CLASS`.
fn size_class_for(size: usize) -> usize {
    size.max(MIN_SIZE_CLASS).next_power_of_two()
}

impl std::fmt::Debug for MemoryPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryPool")
            .field("budget", &self.inner.budget)
            .field("allocated_bytes", &self.allocated_bytes())
            .field("available_bytes", &self.available_bytes())
            .finish()
    }
}
