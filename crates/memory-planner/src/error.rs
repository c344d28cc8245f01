// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types for memory planning.

/// Errors that can occur while planning memory for a resource.
#[derive(Debug, thiserror::Error)]
pub enum PlannerError {
    /// The resource header or a section header is invalid.
    #[error(transparent)]
    Resource(#[from] model_ir::ResourceError),

    /// A declared memory class or device code is invalid, or the plan
    /// exceeds a budget.
    #[error(transparent)]
    Memory(#[from] memory_manager::MemoryError),
}
