// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

use super::{check_arity, expect_dtype, no_kernel};
use crate::context::{TensorView, TensorViewMut};
use crate::{OpContext, OpGroup, OpState, Operator, RuntimeError, TensorTable};
use model_ir::OpRecord;
use tensor_core::{dequantize, DType, Quantized};

/// Quantized integers back to `f32` with the input tensor's parameters.
pub struct Dequantize;

impl Operator for Dequantize {
    fn name(&self) -> &'static str {
        "Dequantize"
    }

    fn group(&self) -> OpGroup {
        OpGroup::Quantization
    }

    fn init(&self, record: &OpRecord<'_>, tensors: &TensorTable<'_>) -> Result<OpState, RuntimeError> {
        check_arity(self.name(), record, 1..=1, 1)?;
        let (x_id, y_id) = (record.tensor_id(0), record.tensor_id(1));
        let x = tensors.info(x_id)?;
        match x.dtype {
            DType::I8 | DType::U8 | DType::I16 => {}
            other => return Err(no_kernel(self.name(), other)),
        }
        expect_dtype(y_id, DType::F32, tensors.info(y_id)?.dtype)?;
        Ok(None)
    }

    fn forward(&self, ctx: &mut OpContext<'_, '_>) -> Result<(), RuntimeError> {
        let shape = ctx.input_info(0)?.shape;
        ctx.set_output_shape(0, shape)?;
        let mut views = ctx.views()?;
        let x = &views.inputs[0];
        let y = &mut views.outputs[0];
        match x.info.dtype {
            DType::I8 => run::<i8>(x, y),
            DType::U8 => run::<u8>(x, y),
            DType::I16 => run::<i16>(x, y),
            other => Err(no_kernel(self.name(), other)),
        }
    }
}

fn run<Q: Quantized>(x: &TensorView<'_>, y: &mut TensorViewMut<'_>) -> Result<(), RuntimeError> {
    dequantize::<Q>(x.elements()?, y.elements_mut()?, x.info.quant)?;
    Ok(())
}
