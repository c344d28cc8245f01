// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Built-in host kernels.
//!
//! Each operator validates its record in `init` so that type errors
//! surface when the executor is built rather than mid-pass.

mod add;
mod dequantize;
mod fully_connected;
mod quantize;
mod relu;
mod reshape;

pub use add::Add;
pub use dequantize::Dequantize;
pub use fully_connected::{FcActivation, FcAttrs, FullyConnected};
pub use quantize::Quantize;
pub use relu::Relu;
pub use reshape::Reshape;

use crate::{Operator, RuntimeError};
use model_ir::OpRecord;
use std::ops::RangeInclusive;
use tensor_core::DType;

/// All built-in operators, in registration order.
pub(crate) fn builtin() -> Vec<Box<dyn Operator>> {
    vec![
        Box::new(Quantize),
        Box::new(Dequantize),
        Box::new(Add),
        Box::new(Relu),
        Box::new(FullyConnected),
        Box::new(Reshape),
    ]
}

/// Checks input and output counts.
fn check_arity(
    op: &'static str,
    record: &OpRecord<'_>,
    inputs: RangeInclusive<usize>,
    outputs: usize,
) -> Result<(), RuntimeError> {
    if !inputs.contains(&record.num_inputs()) || record.num_outputs() != outputs {
        return Err(RuntimeError::InvalidData(format!(
            "{op} takes {}..={} inputs and {outputs} outputs, record has {} and {}",
            inputs.start(),
            inputs.end(),
            record.num_inputs(),
            record.num_outputs()
        )));
    }
    Ok(())
}

fn expect_dtype(tensor: u32, expected: DType, actual: DType) -> Result<(), RuntimeError> {
    if expected != actual {
        return Err(RuntimeError::InvalidDatatype {
            tensor,
            expected,
            actual,
        });
    }
    Ok(())
}

fn no_kernel(op: &'static str, dtype: DType) -> RuntimeError {
    RuntimeError::NotImplemented {
        op,
        detail: format!("{dtype} tensors"),
    }
}
