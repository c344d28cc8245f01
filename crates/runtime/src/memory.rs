// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Caller-supplied memory and tensor storage binding.
//!
//! The runtime never allocates tensor or table memory itself. Callers
//! size regions from a [`MemoryPlan`] and hand them over as a
//! [`ModelMemory`] or [`ExecutorMemory`]; the `allocate` helpers do this
//! from a [`MemoryPool`]. Shared parameter blocks are read in place from
//! the resource unless the caller supplies a filled parameter store.

use crate::RuntimeError;
use memory_manager::{MemoryAddress, MemoryDescriptor, MemoryError, MemoryPool, MemoryRegion};
use memory_planner::MemoryPlan;
use model_ir::TensorRecord;
use std::ops::Range;
use std::sync::Arc;

/// Regions backing one loaded model.
pub struct ModelMemory {
    pub model_static: MemoryRegion,
    pub shape_workspace: MemoryRegion,
    /// Caller-filled copies of the shared blocks, one per
    /// [`MemoryPlan::shared`] entry in order. Empty means the blocks are
    /// read from the resource.
    pub parameters: Vec<MemoryRegion>,
}

impl ModelMemory {
    /// Allocates both regions from `pool`.
    pub fn allocate(plan: &MemoryPlan, pool: &MemoryPool) -> Result<Self, MemoryError> {
        Ok(Self {
            model_static: pool.allocate(plan.model_static())?,
            shape_workspace: pool.allocate(plan.shape_workspace())?,
            parameters: Vec::new(),
        })
    }

    /// Allocates both regions on the heap, outside any pool.
    pub fn standalone(plan: &MemoryPlan) -> Self {
        Self {
            model_static: MemoryRegion::for_descriptor(plan.model_static()),
            shape_workspace: MemoryRegion::for_descriptor(plan.shape_workspace()),
            parameters: Vec::new(),
        }
    }

    /// Serves shared blocks from `parameters` instead of the resource.
    ///
    /// The loader rejects the store unless region `i` has exactly the size
    /// and device of `plan.shared()[i]`.
    pub fn with_parameters(mut self, parameters: Vec<MemoryRegion>) -> Self {
        self.parameters = parameters;
        self
    }
}

/// Checks a caller parameter store against the plan's shared blocks.
pub(crate) fn check_parameters(
    plan: &MemoryPlan,
    parameters: &[MemoryRegion],
) -> Result<(), RuntimeError> {
    if parameters.is_empty() {
        return Ok(());
    }
    let shared = plan.shared();
    if parameters.len() != shared.len() {
        return Err(RuntimeError::InvalidParameter(format!(
            "{} parameter regions for {} shared blocks",
            parameters.len(),
            shared.len()
        )));
    }
    for (i, (region, desc)) in parameters.iter().zip(shared).enumerate() {
        if region.len() != desc.size || region.device() != desc.device {
            return Err(RuntimeError::InvalidParameter(format!(
                "parameter region {i} is {} bytes on {}, shared block wants {} bytes on {}",
                region.len(),
                region.device(),
                desc.size,
                desc.device
            )));
        }
    }
    Ok(())
}

/// Regions backing one executor.
#[derive(Debug)]
pub struct ExecutorMemory {
    pub executor_static: MemoryRegion,
    /// One region per runtime-class memory block, in resource order.
    pub runtime: Vec<MemoryRegion>,
}

impl ExecutorMemory {
    /// Allocates every executor region from `pool`.
    pub fn allocate(plan: &MemoryPlan, pool: &MemoryPool) -> Result<Self, MemoryError> {
        Ok(Self {
            executor_static: pool.allocate(plan.executor_static())?,
            runtime: pool.allocate_all(plan.runtime())?,
        })
    }

    pub fn standalone(plan: &MemoryPlan) -> Self {
        Self {
            executor_static: MemoryRegion::for_descriptor(plan.executor_static()),
            runtime: plan.runtime().iter().map(MemoryRegion::for_descriptor).collect(),
        }
    }

    pub fn total_bytes(&self) -> usize {
        self.executor_static.len() + self.runtime.iter().map(MemoryRegion::len).sum::<usize>()
    }
}

/// Checks a caller region against its plan descriptor.
///
/// # Panics
/// Panics if the region is too small or has the wrong class or device.
pub(crate) fn expect_fits(region: &MemoryRegion, desc: &MemoryDescriptor) {
    if let Err(e) = region.check(desc) {
        panic!("caller memory does not match the plan: {e}");
    }
}

// ── Storage binding ───────────────────────────────────────────────

/// Where one memory block lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Binding {
    /// Read-only block: at `offset` in the resource, or at the start of
    /// parameter region `param`.
    Shared {
        param: Option<usize>,
        offset: usize,
        len: usize,
    },
    /// Index into the executor's runtime regions.
    Runtime { slot: usize, len: usize },
}

/// A tensor's resolved byte range.
#[derive(Debug, Clone)]
pub(crate) enum Location {
    Shared {
        param: Option<usize>,
        range: Range<usize>,
    },
    Runtime {
        slot: usize,
        range: Range<usize>,
    },
}

/// Read-only bytes behind shared blocks.
#[derive(Clone, Copy)]
pub(crate) struct SharedBytes<'a> {
    resource: &'a [u8],
    parameters: &'a [MemoryRegion],
}

impl<'a> SharedBytes<'a> {
    pub(crate) fn get(&self, param: Option<usize>, range: Range<usize>) -> &'a [u8] {
        match param {
            None => &self.resource[range],
            Some(slot) => &self.parameters[slot].as_slice()[range],
        }
    }
}

/// Memory blocks of one executor, indexed by memory id.
pub(crate) struct Storage<'r> {
    resource: &'r [u8],
    parameters: Arc<[MemoryRegion]>,
    bindings: Vec<Binding>,
    runtime: Vec<MemoryRegion>,
}

impl<'r> Storage<'r> {
    /// Binds shared blocks to `parameters` (or the resource when the store
    /// is empty) and runtime blocks to `runtime`, in plan order.
    pub(crate) fn bind(
        resource: &'r [u8],
        plan: &MemoryPlan,
        parameters: Arc<[MemoryRegion]>,
        runtime: Vec<MemoryRegion>,
    ) -> Self {
        let mut bindings = Vec::with_capacity(plan.shared().len() + plan.runtime().len());
        for (i, desc) in plan.shared().iter().enumerate() {
            let (param, offset) = match desc.address {
                _ if !parameters.is_empty() => (Some(i), 0),
                MemoryAddress::Resource { offset } => (None, offset as usize),
                MemoryAddress::Unassigned => unreachable!("shared block without a resource offset"),
            };
            bindings.push(Binding::Shared {
                param,
                offset,
                len: desc.size,
            });
        }
        for (slot, desc) in plan.runtime().iter().enumerate() {
            bindings.push(Binding::Runtime {
                slot,
                len: desc.size,
            });
        }
        Self {
            resource,
            parameters,
            bindings,
            runtime,
        }
    }

    pub(crate) fn binding(&self, memory_id: u32) -> Result<Binding, RuntimeError> {
        self.bindings
            .get(memory_id as usize)
            .copied()
            .ok_or(RuntimeError::IndexOutOfBounds {
                what: "memory block",
                index: memory_id as usize,
                len: self.bindings.len(),
            })
    }

    /// Resolves `len` bytes of a tensor.
    pub(crate) fn locate(&self, rec: &TensorRecord, len: usize) -> Result<Location, RuntimeError> {
        let binding = self.binding(rec.mem_id)?;
        let block_len = match binding {
            Binding::Shared { len, .. } | Binding::Runtime { len, .. } => len,
        };
        let start = usize::try_from(rec.offset).unwrap_or(usize::MAX);
        if start.checked_add(len).map_or(true, |end| end > block_len) {
            return Err(RuntimeError::InvalidData(format!(
                "tensor [{start}, +{len}) exceeds memory block {} of {block_len} bytes",
                rec.mem_id
            )));
        }
        Ok(match binding {
            Binding::Shared { param, offset, .. } => Location::Shared {
                param,
                range: offset + start..offset + start + len,
            },
            Binding::Runtime { slot, .. } => Location::Runtime {
                slot,
                range: start..start + len,
            },
        })
    }

    pub(crate) fn bytes(&self, rec: &TensorRecord, len: usize) -> Result<&[u8], RuntimeError> {
        Ok(match self.locate(rec, len)? {
            Location::Shared { param, range } => self.shared().get(param, range),
            Location::Runtime { slot, range } => &self.runtime[slot].as_slice()[range],
        })
    }

    /// Mutable bytes of a runtime tensor.
    ///
    /// # Errors
    /// [`RuntimeError::InvalidParameter`] for tensors in shared memory.
    pub(crate) fn bytes_mut(
        &mut self,
        rec: &TensorRecord,
        len: usize,
    ) -> Result<&mut [u8], RuntimeError> {
        match self.locate(rec, len)? {
            Location::Shared { .. } => Err(read_only(rec)),
            Location::Runtime { slot, range } => Ok(&mut self.runtime[slot].as_mut_slice()[range]),
        }
    }

    /// Copies `len` bytes from `src` to `dst`.
    pub(crate) fn copy(
        &mut self,
        src: &TensorRecord,
        dst: &TensorRecord,
        len: usize,
    ) -> Result<(), RuntimeError> {
        let from = self.locate(src, len)?;
        let (dst_slot, dst_range) = match self.locate(dst, len)? {
            Location::Shared { .. } => return Err(read_only(dst)),
            Location::Runtime { slot, range } => (slot, range),
        };
        match from {
            Location::Shared { param, range } => {
                let (shared, runtime) = self.split_mut();
                runtime[dst_slot].as_mut_slice()[dst_range]
                    .copy_from_slice(shared.get(param, range));
            }
            Location::Runtime { slot, range } if slot == dst_slot => {
                self.runtime[slot]
                    .as_mut_slice()
                    .copy_within(range, dst_range.start);
            }
            Location::Runtime { slot, range } => {
                let (src_region, dst_region) = pair_mut(&mut self.runtime, slot, dst_slot);
                dst_region.as_mut_slice()[dst_range].copy_from_slice(&src_region.as_slice()[range]);
            }
        }
        Ok(())
    }

    pub(crate) fn shared(&self) -> SharedBytes<'_> {
        SharedBytes {
            resource: self.resource,
            parameters: &self.parameters,
        }
    }

    /// Shared bytes alongside the mutable runtime regions.
    pub(crate) fn split_mut(&mut self) -> (SharedBytes<'_>, &mut [MemoryRegion]) {
        let shared = SharedBytes {
            resource: self.resource,
            parameters: &self.parameters,
        };
        (shared, &mut self.runtime)
    }

    /// Zeroes every runtime block.
    pub(crate) fn clear(&mut self) {
        for region in &mut self.runtime {
            region.clear();
        }
    }

    /// Hands the runtime regions back, leaving the storage unbound.
    pub(crate) fn take_runtime(&mut self) -> Vec<MemoryRegion> {
        self.bindings.clear();
        std::mem::take(&mut self.runtime)
    }
}

fn read_only(rec: &TensorRecord) -> RuntimeError {
    RuntimeError::InvalidParameter(format!(
        "memory block {} is shared and read-only",
        rec.mem_id
    ))
}

/// Two distinct mutable elements; `a != b`.
fn pair_mut<T>(items: &mut [T], a: usize, b: usize) -> (&mut T, &mut T) {
    debug_assert_ne!(a, b);
    if a < b {
        let (lo, hi) = items.split_at_mut(b);
        (&mut lo[a], &mut hi[0])
    } else {
        let (lo, hi) = items.split_at_mut(a);
        (&mut hi[0], &mut lo[b])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytemuck::Zeroable;
    use memory_manager::{DeviceType, MemoryBudget, MemoryClass};
    use model_ir::ResourceBuilder;
    use tensor_core::DType;

    fn plan_and_bytes() -> (Vec<u8>, MemoryPlan) {
        let mut b = ResourceBuilder::new();
        let w = b.shared_memory(&[7; 32], DeviceType::Ddr);
        let act = b.runtime_memory(64, DeviceType::Sram);
        let weights = b.tensor(DType::I8, &[32], w, 0);
        let x = b.tensor(DType::I8, &[32], act, 0);
        b.operator("Relu", &[weights], &[x], &[], &[], &[]);
        b.input("w", weights).output("x", x);
        let bytes = b.build();
        let plan = MemoryPlan::query(&bytes).unwrap();
        (bytes, plan)
    }

    fn rec(mem_id: u32, offset: u64) -> TensorRecord {
        let mut r = TensorRecord::zeroed();
        r.mem_id = mem_id;
        r.offset = offset;
        r
    }

    #[test]
    fn test_pool_allocation_matches_plan() {
        let (_, plan) = plan_and_bytes();
        let pool = MemoryPool::new(MemoryBudget::from_mb(1));
        let model = ModelMemory::allocate(&plan, &pool).unwrap();
        let exec = ExecutorMemory::allocate(&plan, &pool).unwrap();
        assert!(model.model_static.check(plan.model_static()).is_ok());
        assert_eq!(exec.runtime.len(), plan.runtime().len());
        assert_eq!(pool.allocated_bytes(), plan.allocated_bytes());
    }

    #[test]
    fn test_shared_and_runtime_binding() {
        let (bytes, plan) = plan_and_bytes();
        let exec = ExecutorMemory::standalone(&plan);
        let mut storage = Storage::bind(&bytes, &plan, Arc::from(Vec::new()), exec.runtime);

        assert!(matches!(storage.binding(0).unwrap(), Binding::Shared { len: 32, .. }));
        assert_eq!(storage.bytes(&rec(0, 0), 32).unwrap(), &[7; 32]);
        assert!(storage.bytes_mut(&rec(0, 0), 4).is_err());

        storage.copy(&rec(0, 0), &rec(1, 16), 32).unwrap();
        assert_eq!(&storage.bytes(&rec(1, 0), 48).unwrap()[16..], &[7; 32]);
    }

    #[test]
    fn test_parameter_store_binding() {
        let (bytes, plan) = plan_and_bytes();
        let mut param = MemoryRegion::new(32, MemoryClass::SharedParameter, DeviceType::Ddr);
        param.as_mut_slice().fill(3);
        let exec = ExecutorMemory::standalone(&plan);
        let mut storage = Storage::bind(&bytes, &plan, Arc::from(vec![param]), exec.runtime);

        assert!(matches!(
            storage.binding(0).unwrap(),
            Binding::Shared {
                param: Some(0),
                offset: 0,
                len: 32
            }
        ));
        assert_eq!(storage.bytes(&rec(0, 0), 32).unwrap(), &[3; 32]);
        assert!(storage.bytes_mut(&rec(0, 0), 4).is_err());
        storage.copy(&rec(0, 8), &rec(1, 0), 16).unwrap();
        assert_eq!(storage.bytes(&rec(1, 0), 16).unwrap(), &[3; 16]);
    }

    #[test]
    fn test_parameter_store_must_match_plan() {
        let (_, plan) = plan_and_bytes();
        let shared = |size, device| MemoryRegion::new(size, MemoryClass::SharedParameter, device);

        assert!(check_parameters(&plan, &[]).is_ok());
        assert!(check_parameters(&plan, &[shared(32, DeviceType::Ddr)]).is_ok());
        for bad in [
            vec![shared(48, DeviceType::Ddr)],
            vec![shared(32, DeviceType::Sram)],
            vec![shared(32, DeviceType::Ddr), shared(32, DeviceType::Ddr)],
        ] {
            assert!(matches!(
                check_parameters(&plan, &bad),
                Err(RuntimeError::InvalidParameter(_))
            ));
        }
    }

    #[test]
    fn test_out_of_block_range() {
        let (bytes, plan) = plan_and_bytes();
        let runtime = ExecutorMemory::standalone(&plan).runtime;
        let storage = Storage::bind(&bytes, &plan, Arc::from(Vec::new()), runtime);
        assert!(storage.bytes(&rec(1, 40), 32).is_err());
        assert!(storage.bytes(&rec(9, 0), 1).is_err());
    }

    #[test]
    fn test_pair_mut() {
        let mut v = [1, 2, 3];
        let (a, b) = pair_mut(&mut v, 2, 0);
        std::mem::swap(a, b);
        assert_eq!(v, [3, 2, 1]);
    }
}
