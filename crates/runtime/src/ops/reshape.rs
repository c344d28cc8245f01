// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

use super::{check_arity, expect_dtype};
use crate::{OpContext, OpGroup, OpState, Operator, RuntimeError, TensorTable};
use model_ir::OpRecord;
use tensor_core::Shape;

/// Copies the input into an output of a different shape.
///
/// When the record carries scalar registers they give the output
/// dimensions, one register per axis. Otherwise the output keeps its
/// current shape. Element counts must match.
pub struct Reshape;

impl Operator for Reshape {
    fn name(&self) -> &'static str {
        "Reshape"
    }

    fn group(&self) -> OpGroup {
        OpGroup::Layout
    }

    fn init(&self, record: &OpRecord<'_>, tensors: &TensorTable<'_>) -> Result<OpState, RuntimeError> {
        check_arity(self.name(), record, 1..=1, 1)?;
        let x = tensors.info(record.tensor_id(0))?;
        let y_id = record.tensor_id(1);
        let y = tensors.info(y_id)?;
        expect_dtype(y_id, x.dtype, y.dtype)?;
        if record.num_scalars() > 0 && record.num_scalars() != y.shape.rank() {
            return Err(RuntimeError::InvalidData(format!(
                "Reshape: {} scalar dims for a rank-{} output",
                record.num_scalars(),
                y.shape.rank()
            )));
        }
        Ok(None)
    }

    fn forward(&self, ctx: &mut OpContext<'_, '_>) -> Result<(), RuntimeError> {
        let x = ctx.input_info(0)?;
        let shape = if ctx.record().num_scalars() > 0 {
            Shape::new(&ctx.scalar_dims()?)?
        } else {
            ctx.output_info(0)?.shape
        };
        if shape.num_elements() != x.shape.num_elements() {
            return Err(RuntimeError::InvalidData(format!(
                "Reshape: cannot view {} as {shape}",
                x.shape
            )));
        }
        ctx.set_output_shape(0, shape)?;
        let mut views = ctx.views()?;
        views.outputs[0].data.copy_from_slice(views.inputs[0].data);
        Ok(())
    }
}
