// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Aligned memory regions with RAII return to the pool.
//!
//! A [`MemoryRegion`] is the caller-side half of a memory plan entry: a
//! zeroed, [`ARENA_ALIGN`]-aligned byte buffer tagged with the class and
//! device it was allocated for. Regions handed out by a
//! [`MemoryPool`](crate::MemoryPool) go back to its free list on drop;
//! standalone regions are simply freed.

use crate::arena::{Span, ARENA_ALIGN};
use crate::pool::PoolInner;
use crate::{DeviceType, MemoryClass, MemoryDescriptor, MemoryError};
use bytemuck::{Pod, Zeroable};
use std::sync::Arc;

/// Storage unit that gives the buffer its alignment.
#[derive(Clone, Copy, Pod, Zeroable)]
#[repr(C, align(16))]
pub(crate) struct Block([u8; ARENA_ALIGN]);

impl Block {
    pub(crate) const ZERO: Block = Block([0; ARENA_ALIGN]);
}

pub(crate) fn blocks_for(size_bytes: usize) -> usize {
    size_bytes.div_ceil(ARENA_ALIGN)
}

/// A zeroed, 16-byte aligned buffer for one memory descriptor.
pub struct MemoryRegion {
    blocks: Vec<Block>,
    size_bytes: usize,
    class: MemoryClass,
    device: DeviceType,
    pool: Option<Arc<PoolInner>>,
}

impl MemoryRegion {
    /// Allocates a standalone region outside any pool.
    pub fn new(size_bytes: usize, class: MemoryClass, device: DeviceType) -> Self {
        Self {
            blocks: vec![Block::ZERO; blocks_for(size_bytes)],
            size_bytes,
            class,
            device,
            pool: None,
        }
    }

    /// Allocates a standalone region sized for `desc`.
    pub fn for_descriptor(desc: &MemoryDescriptor) -> Self {
        Self::new(desc.size, desc.class, desc.device)
    }

    pub(crate) fn from_pool(
        blocks: Vec<Block>,
        size_bytes: usize,
        class: MemoryClass,
        device: DeviceType,
        pool: Arc<PoolInner>,
    ) -> Self {
        Self {
            blocks,
            size_bytes,
            class,
            device,
            pool: Some(pool),
        }
    }

    /// Size in bytes.
    pub fn len(&self) -> usize {
        self.size_bytes
    }

    pub fn is_empty(&self) -> bool {
        self.size_bytes == 0
    }

    pub fn class(&self) -> MemoryClass {
        self.class
    }

    pub fn device(&self) -> DeviceType {
        self.device
    }

    /// Checks that this region can back `desc`: same class and device,
    /// and at least `desc.size` bytes.
    pub fn check(&self, desc: &MemoryDescriptor) -> Result<(), MemoryError> {
        if self.class != desc.class || self.device != desc.device || self.size_bytes < desc.size {
            return Err(MemoryError::RegionMismatch {
                expected_class: desc.class,
                expected_device: desc.device,
                expected_bytes: desc.size,
                actual_class: self.class,
                actual_device: self.device,
                actual_bytes: self.size_bytes,
            });
        }
        Ok(())
    }

    /// Immutable view of the whole region.
    pub fn as_slice(&self) -> &[u8] {
        &bytemuck::cast_slice::<Block, u8>(&self.blocks)[..self.size_bytes]
    }

    /// Mutable view of the whole region.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut bytemuck::cast_slice_mut::<Block, u8>(&mut self.blocks)[..self.size_bytes]
    }

    /// Immutable view of a sub-range.
    pub fn span(&self, span: Span) -> Result<&[u8], MemoryError> {
        span.check(self.size_bytes)?;
        Ok(&self.as_slice()[span.offset..span.end()])
    }

    /// Mutable view of a sub-range.
    pub fn span_mut(&mut self, span: Span) -> Result<&mut [u8], MemoryError> {
        span.check(self.size_bytes)?;
        Ok(&mut self.as_mut_slice()[span.offset..span.end()])
    }

    /// Zeroes the region in place.
    pub fn clear(&mut self) {
        self.blocks.fill(Block::ZERO);
    }
}

impl Drop for MemoryRegion {
    fn drop(&mut self) {
        if let Some(pool) = self.pool.take() {
            let blocks = std::mem::take(&mut self.blocks);
            pool.return_blocks(blocks, self.size_bytes, self.class);
        }
    }
}

impl std::fmt::Debug for MemoryRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryRegion")
            .field("size_bytes", &self.size_bytes)
            .field("class", &self.class)
            .field("device", &self.device)
            .field("pooled", &self.pool.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standalone_region_is_zeroed_and_aligned() {
        let r = MemoryRegion::new(40, MemoryClass::RuntimeScratch, DeviceType::Sram);
        assert_eq!(r.len(), 40);
        assert!(r.as_slice().iter().all(|&b| b == 0));
        assert_eq!(r.as_slice().as_ptr() as usize % ARENA_ALIGN, 0);
    }

    #[test]
    fn test_span_access() {
        let mut r = MemoryRegion::new(32, MemoryClass::ModelStatic, DeviceType::Host);
        r.span_mut(Span { offset: 16, len: 4 })
            .unwrap()
            .copy_from_slice(&[1, 2, 3, 4]);
        assert_eq!(r.as_slice()[16..20], [1, 2, 3, 4]);
        assert!(r.span(Span { offset: 30, len: 4 }).is_err());
        r.clear();
        assert!(r.as_slice().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_check_against_descriptor() {
        let r = MemoryRegion::new(64, MemoryClass::RuntimeScratch, DeviceType::Sram);
        let ok = MemoryDescriptor::unassigned(48, DeviceType::Sram, MemoryClass::RuntimeScratch);
        assert!(r.check(&ok).is_ok());
        let too_big = MemoryDescriptor::unassigned(65, DeviceType::Sram, MemoryClass::RuntimeScratch);
        assert!(r.check(&too_big).is_err());
        let wrong_class =
            MemoryDescriptor::unassigned(8, DeviceType::Sram, MemoryClass::ExecutorStatic);
        assert!(matches!(
            r.check(&wrong_class),
            Err(MemoryError::RegionMismatch { .. })
        ));
    }

    #[test]
    fn test_views_cover_exact_length() {
        let mut r = MemoryRegion::new(21, MemoryClass::RuntimeScratch, DeviceType::Sram);
        assert_eq!(r.as_mut_slice().len(), 21);
        r.as_mut_slice()[20] = 9;
        assert_eq!(r.as_slice().len(), 21);
        assert_eq!(r.as_slice()[20], 9);
    }

    #[test]
    fn test_empty_region() {
        let r = MemoryRegion::new(0, MemoryClass::RuntimeScratch, DeviceType::Sram);
        assert!(r.is_empty());
        assert!(r.as_slice().is_empty());
    }
}
