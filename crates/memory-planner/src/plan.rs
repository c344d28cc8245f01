// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The memory plan: every region a resource needs, in a fixed order.
//!
//! The plan is the contract between the planner and the caller. The
//! caller allocates one region per unassigned descriptor and hands them
//! back to the loader and executor builder; shared-parameter descriptors
//! arrive already bound to the resource's own bytes.

use crate::{ExecutorLayout, ModelLayout, PlannerError, ShapeLayout};
use memory_manager::{ClassUsage, DeviceType, MemoryBudget, MemoryClass, MemoryDescriptor};
use model_ir::{Resource, ResourceError, Validation};
use tracing::info;

/// Descriptors for one resource, in order:
/// model-static, shared…, runtime…, executor-static, shape-workspace.
#[derive(Debug, Clone, serde::Serialize)]
pub struct MemoryPlan {
    descriptors: Vec<MemoryDescriptor>,
    shared_count: usize,
    runtime_count: usize,
    pub model: ModelLayout,
    pub executor: ExecutorLayout,
    pub shape: ShapeLayout,
}

impl MemoryPlan {
    /// Plans memory for the resource in `bytes` with default validation.
    ///
    /// # Errors
    /// - `Resource(Incomplete)` if the header declares more bytes than given.
    /// - `Resource(CrcMismatch)` if a non-zero CRC does not match the body.
    pub fn query(bytes: &[u8]) -> Result<Self, PlannerError> {
        Self::query_with(bytes, Validation::default())
    }

    pub fn query_with(bytes: &[u8], validation: Validation) -> Result<Self, PlannerError> {
        let res = Resource::parse_with(bytes, validation)?;
        Self::from_resource(&res)
    }

    /// Plans memory for an already validated resource.
    pub fn from_resource(res: &Resource<'_>) -> Result<Self, PlannerError> {
        let model = ModelLayout::for_resource(res)?;
        let executor = ExecutorLayout::for_resource(res)?;
        let shape = ShapeLayout::for_resource(res)?;

        let section = res.memory_section()?;
        let records = res.memory_records()?;
        let param_base = res.parameter_base()?;
        let param_len = res.parameters()?.len() as u64;

        let mut descriptors = Vec::with_capacity(records.len() + 3);
        descriptors.push(MemoryDescriptor::unassigned(
            model.total_bytes(),
            DeviceType::Host,
            MemoryClass::ModelStatic,
        ));

        let shared_count = section.shared_count as usize;
        for (i, rec) in records.iter().enumerate() {
            let class = MemoryClass::from_code(rec.class)?;
            let device = DeviceType::from_code(rec.device)?;
            let expected = if i < shared_count {
                MemoryClass::SharedParameter
            } else {
                MemoryClass::RuntimeScratch
            };
            if class != expected {
                return Err(ResourceError::InvalidData(format!(
                    "memory block {i} is {class}, expected {expected}"
                ))
                .into());
            }
            if class == MemoryClass::SharedParameter {
                if rec.offset.saturating_add(rec.size) > param_len {
                    return Err(ResourceError::InvalidData(format!(
                        "shared block {i} [{}, +{}) exceeds {param_len} parameter bytes",
                        rec.offset, rec.size
                    ))
                    .into());
                }
                descriptors.push(MemoryDescriptor::in_resource(
                    rec.size as usize,
                    device,
                    param_base + rec.offset,
                ));
            } else {
                descriptors.push(MemoryDescriptor::unassigned(rec.size as usize, device, class));
            }
        }

        descriptors.push(MemoryDescriptor::unassigned(
            executor.total_bytes(),
            DeviceType::Host,
            MemoryClass::ExecutorStatic,
        ));
        descriptors.push(MemoryDescriptor::unassigned(
            shape.total_bytes(),
            DeviceType::Host,
            MemoryClass::ShapeWorkspace,
        ));

        let plan = Self {
            descriptors,
            shared_count,
            runtime_count: records.len() - shared_count,
            model,
            executor,
            shape,
        };
        info!(
            descriptors = plan.descriptors.len(),
            allocated_bytes = plan.allocated_bytes(),
            shared_bytes = plan.shared_bytes(),
            "memory plan computed"
        );
        Ok(plan)
    }

    /// All descriptors, in plan order.
    pub fn descriptors(&self) -> &[MemoryDescriptor] {
        &self.descriptors
    }

    pub fn model_static(&self) -> &MemoryDescriptor {
        &self.descriptors[0]
    }

    /// Shared-parameter descriptors, in resource order.
    pub fn shared(&self) -> &[MemoryDescriptor] {
        &self.descriptors[1..1 + self.shared_count]
    }

    /// Runtime-scratch descriptors, in resource order.
    pub fn runtime(&self) -> &[MemoryDescriptor] {
        let start = 1 + self.shared_count;
        &self.descriptors[start..start + self.runtime_count]
    }

    pub fn executor_static(&self) -> &MemoryDescriptor {
        &self.descriptors[self.descriptors.len() - 2]
    }

    pub fn shape_workspace(&self) -> &MemoryDescriptor {
        &self.descriptors[self.descriptors.len() - 1]
    }

    /// Bytes the caller must allocate for one model plus one executor.
    pub fn allocated_bytes(&self) -> usize {
        self.descriptors
            .iter()
            .filter(|d| d.needs_allocation())
            .map(|d| d.size)
            .sum()
    }

    /// Bytes served directly from the resource.
    pub fn shared_bytes(&self) -> usize {
        self.shared().iter().map(|d| d.size).sum()
    }

    /// Bytes each additional executor needs.
    pub fn per_executor_bytes(&self) -> usize {
        self.executor_static().size + self.runtime().iter().map(|d| d.size).sum::<usize>()
    }

    /// Byte totals per memory class for one model plus one executor.
    pub fn usage(&self) -> ClassUsage {
        ClassUsage::of(&self.descriptors)
    }

    /// Fails if one model plus one executor does not fit `budget`.
    pub fn check_budget(&self, budget: MemoryBudget) -> Result<(), PlannerError> {
        budget.check(&self.usage())?;
        Ok(())
    }

    /// One-line summary.
    pub fn summary(&self) -> String {
        let kb = |b: usize| b as f64 / 1024.0;
        format!(
            "Plan: {} regions ({} shared, {} runtime), model {:.1} KB, executor {:.1} KB \
             + {:.1} KB scratch, shape {:.1} KB, {:.1} KB allocated, {:.1} KB shared",
            self.descriptors.len(),
            self.shared_count,
            self.runtime_count,
            kb(self.model_static().size),
            kb(self.executor_static().size),
            kb(self.runtime().iter().map(|d| d.size).sum()),
            kb(self.shape_workspace().size),
            kb(self.allocated_bytes()),
            kb(self.shared_bytes()),
        )
    }
}
