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
use tensor_core::{quantize, DType, Quantized};

/// `f32` to `i8`/`u8`/`i16` with the output tensor's scale and zero point.
pub struct Quantize;

impl Operator for Quantize {
    fn name(&self) -> &'static str {
        "Quantize"
    }

    fn group(&self) -> OpGroup {
        OpGroup::Quantization
    }

    fn init(&self, record: &OpRecord<'_>, tensors: &TensorTable<'_>) -> Result<OpState, RuntimeError> {
        check_arity(self.name(), record, 1..=1, 1)?;
        let (x_id, y_id) = (record.tensor_id(0), record.tensor_id(1));
        expect_dtype(x_id, DType::F32, tensors.info(x_id)?.dtype)?;
        let y = tensors.info(y_id)?;
        match y.dtype {
            DType::I8 | DType::U8 | DType::I16 => {}
            other => return Err(no_kernel(self.name(), other)),
        }
        y.quant.validate("quantize")?;
        Ok(None)
    }

    fn forward(&self, ctx: &mut OpContext<'_, '_>) -> Result<(), RuntimeError> {
        let shape = ctx.input_info(0)?.shape;
        ctx.set_output_shape(0, shape)?;
        let mut views = ctx.views()?;
        let x = &views.inputs[0];
        let y = &mut views.outputs[0];
        match y.info.dtype {
            DType::I8 => run::<i8>(x, y),
            DType::U8 => run::<u8>(x, y),
            DType::I16 => run::<i16>(x, y),
            other => Err(no_kernel(self.name(), other)),
        }
    }
}

fn run<Q: Quantized>(x: &TensorView<'_>, y: &mut TensorViewMut<'_>) -> Result<(), RuntimeError> {
    let params = y.info.quant;
    quantize::<Q>(x.elements()?, y.elements_mut()?, params)?;
    Ok(())
}
