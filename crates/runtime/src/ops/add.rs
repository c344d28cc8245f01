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
use tensor_core::{quantized_add, DType, Quantized};

/// Quantized elementwise add. The second operand may be a row that is
/// broadcast over the first.
pub struct Add;

impl Operator for Add {
    fn name(&self) -> &'static str {
        "Add"
    }

    fn group(&self) -> OpGroup {
        OpGroup::Elementwise
    }

    fn init(&self, record: &OpRecord<'_>, tensors: &TensorTable<'_>) -> Result<OpState, RuntimeError> {
        check_arity(self.name(), record, 2..=2, 1)?;
        let lhs = tensors.info(record.tensor_id(0))?;
        if !lhs.dtype.is_quantized() {
            return Err(no_kernel(self.name(), lhs.dtype));
        }
        for k in 1..3 {
            let id = record.tensor_id(k);
            expect_dtype(id, lhs.dtype, tensors.info(id)?.dtype)?;
        }
        Ok(None)
    }

    fn forward(&self, ctx: &mut OpContext<'_, '_>) -> Result<(), RuntimeError> {
        let shape = ctx.input_info(0)?.shape;
        ctx.set_output_shape(0, shape)?;
        let mut views = ctx.views()?;
        let (a, b) = (&views.inputs[0], &views.inputs[1]);
        let y = &mut views.outputs[0];
        match y.info.dtype {
            DType::I8 => run::<i8>(a, b, y),
            DType::U8 => run::<u8>(a, b, y),
            DType::I16 => run::<i16>(a, b, y),
            other => Err(no_kernel(self.name(), other)),
        }
    }
}

fn run<Q: Quantized>(
    a: &TensorView<'_>,
    b: &TensorView<'_>,
    y: &mut TensorViewMut<'_>,
) -> Result<(), RuntimeError> {
    let out_params = y.info.quant;
    quantized_add::<Q>(
        a.elements()?,
        a.info.quant,
        b.elements()?,
        b.info.quant,
        y.elements_mut()?,
        out_params,
    )?;
    Ok(())
}
