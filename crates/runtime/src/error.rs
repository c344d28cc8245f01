// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Error types and status codes for the runtime.
//!
//! Every fallible entry point returns [`RuntimeError`]; callers that need
//! the flat numeric status of the device ABI use [`RuntimeError::status`]
//! or [`StatusCode::of`].

use memory_manager::MemoryError;
use memory_planner::PlannerError;
use model_ir::{ResourceError, ShapeError};
use tensor_core::{DType, TensorError};

/// Numeric status returned across the device ABI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[repr(i32)]
pub enum StatusCode {
    Success = 0,
    ResMissing = 1,
    ResIncomplete = 2,
    ResCrcCheck = 3,
    InvalidPlatform = 4,
    InvalidInstance = 5,
    IndexOutOfBounds = 6,
    InvalidParameter = 7,
    InvalidData = 8,
    InvalidDatatype = 9,
    NoSupportOp = 10,
    NoImplOp = 11,
    Failure = 12,
    /// Cooperative cancellation; distinct from ordinary failure.
    ForceStop = 13,
}

impl StatusCode {
    /// Flattens a forward result into a status.
    pub fn of(result: &Result<Completion, RuntimeError>) -> Self {
        match result {
            Ok(Completion::Finished) => Self::Success,
            Ok(Completion::Stopped) => Self::ForceStop,
            Err(e) => e.status(),
        }
    }

    pub fn as_i32(self) -> i32 {
        self as i32
    }
}

/// How a forward pass ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum Completion {
    /// Every operator ran.
    Finished,
    /// The cancel flag was observed at an operator boundary.
    Stopped,
}

/// Errors returned by the runtime.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// The resource failed validation.
    #[error("resource error: {0}")]
    Resource(#[from] ResourceError),

    /// Memory planning failed.
    #[error("planner error: {0}")]
    Planner(#[from] PlannerError),

    /// A memory region could not be allocated or bound.
    #[error("memory error: {0}")]
    Memory(#[from] MemoryError),

    /// A kernel rejected its buffers.
    #[error("tensor error: {0}")]
    Tensor(#[from] TensorError),

    /// Shape inference could not be seeded consistently.
    #[error("shape inference error: {0}")]
    Shape(#[from] ShapeError),

    /// `initialize()` has not been called.
    #[error("runtime is not initialized")]
    Uninitialized,

    /// A handle is stale or its instance is no longer live.
    #[error("invalid {0} handle")]
    InvalidInstance(&'static str),

    #[error("{what} index {index} out of bounds ({len} available)")]
    IndexOutOfBounds {
        what: &'static str,
        index: usize,
        len: usize,
    },

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("tensor {tensor} expects {expected}, got {actual}")]
    InvalidDatatype {
        tensor: u32,
        expected: DType,
        actual: DType,
    },

    /// The resource names an operator type nobody registered.
    #[error("operator '{name}' is not supported ({known} operators registered)")]
    UnsupportedOperator { name: String, known: usize },

    /// The operator is registered but has no host kernel for this case.
    #[error("{op} has no implementation for {detail}")]
    NotImplemented { op: &'static str, detail: String },

    /// A kernel failed during forward.
    #[error("operator {index} ('{name}') failed: {source}")]
    OperatorFailed {
        index: usize,
        name: String,
        #[source]
        source: Box<RuntimeError>,
    },

    /// Configuration error.
    #[error("configuration error: {0}")]
    ConfigError(String),
}

impl RuntimeError {
    /// Maps the error onto the device status enumeration.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Resource(e) => resource_status(e),
            Self::Planner(PlannerError::Resource(e)) => resource_status(e),
            Self::Planner(PlannerError::Memory(e)) | Self::Memory(e) => memory_status(e),
            Self::Tensor(TensorError::UnsupportedDType { .. }) => StatusCode::InvalidDatatype,
            Self::Tensor(_) | Self::Shape(_) => StatusCode::InvalidData,
            Self::Uninitialized => StatusCode::Failure,
            Self::InvalidInstance(_) => StatusCode::InvalidInstance,
            Self::IndexOutOfBounds { .. } => StatusCode::IndexOutOfBounds,
            Self::InvalidParameter(_) | Self::ConfigError(_) => StatusCode::InvalidParameter,
            Self::InvalidData(_) => StatusCode::InvalidData,
            Self::InvalidDatatype { .. } => StatusCode::InvalidDatatype,
            Self::UnsupportedOperator { .. } => StatusCode::NoSupportOp,
            Self::NotImplemented { .. } => StatusCode::NoImplOp,
            Self::OperatorFailed { source, .. } => source.status(),
        }
    }
}

fn resource_status(e: &ResourceError) -> StatusCode {
    match e {
        ResourceError::Missing(_) | ResourceError::MissingSection(_) => StatusCode::ResMissing,
        ResourceError::Incomplete { .. } => StatusCode::ResIncomplete,
        ResourceError::CrcMismatch { .. } => StatusCode::ResCrcCheck,
        ResourceError::InvalidPlatform { .. } | ResourceError::UnsupportedVersion { .. } => {
            StatusCode::InvalidPlatform
        }
        ResourceError::InvalidDatatype { .. } => StatusCode::InvalidDatatype,
        ResourceError::Memory(m) => memory_status(m),
        ResourceError::OutOfBounds { .. }
        | ResourceError::InvalidData(_)
        | ResourceError::Tensor(_) => StatusCode::InvalidData,
    }
}

fn memory_status(e: &MemoryError) -> StatusCode {
    match e {
        MemoryError::OutOfMemory { .. } => StatusCode::Failure,
        MemoryError::InvalidBudget(_)
        | MemoryError::OverBudget { .. }
        | MemoryError::NotAllocatable(_) => StatusCode::InvalidParameter,
        _ => StatusCode::InvalidData,
    }
}
