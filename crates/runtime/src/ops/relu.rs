// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

use super::{check_arity, expect_dtype, no_kernel};
use crate::{OpContext, OpGroup, OpState, Operator, RuntimeError, TensorTable};
use model_ir::OpRecord;
use tensor_core::{relu, relu_f32, DType};

/// ReLU on `f32` or quantized tensors; quantized inputs clamp at the
/// output zero point.
pub struct Relu;

impl Operator for Relu {
    fn name(&self) -> &'static str {
        "Relu"
    }

    fn group(&self) -> OpGroup {
        OpGroup::Elementwise
    }

    fn init(&self, record: &OpRecord<'_>, tensors: &TensorTable<'_>) -> Result<OpState, RuntimeError> {
        check_arity(self.name(), record, 1..=1, 1)?;
        let x = tensors.info(record.tensor_id(0))?;
        let y_id = record.tensor_id(1);
        expect_dtype(y_id, x.dtype, tensors.info(y_id)?.dtype)?;
        match x.dtype {
            DType::F32 | DType::I8 | DType::U8 | DType::I16 => Ok(None),
            other => Err(no_kernel(self.name(), other)),
        }
    }

    fn forward(&self, ctx: &mut OpContext<'_, '_>) -> Result<(), RuntimeError> {
        let shape = ctx.input_info(0)?.shape;
        ctx.set_output_shape(0, shape)?;
        let mut views = ctx.views()?;
        let x = &views.inputs[0];
        let y = &mut views.outputs[0];
        let zp = y.info.quant.zero_point;
        match x.info.dtype {
            DType::F32 => relu_f32(x.elements()?, y.elements_mut()?)?,
            DType::I8 => relu::<i8>(x.elements()?, y.elements_mut()?, zp)?,
            DType::U8 => relu::<u8>(x.elements()?, y.elements_mut()?, zp)?,
            DType::I16 => relu::<i16>(x.elements()?, y.elements_mut()?, zp)?,
            other => return Err(no_kernel(self.name(), other)),
        }
        Ok(())
    }
}
