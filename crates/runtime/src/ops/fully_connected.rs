// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Quantized fully-connected layer.
//!
//! Inputs: activations `[.., in]`, weights `[out, in]` (`i8`), and an
//! optional `i32` bias `[out]`. The output keeps the activation shape with
//! the last axis replaced by `out`. Weights may arrive through the DMA
//! channel; the kernel issues the next pending transfer before it computes
//! so that the next layer's weights stream in behind it.

use super::{check_arity, expect_dtype, no_kernel};
use crate::context::{TensorView, TensorViewMut};
use crate::{OpContext, OpGroup, OpState, Operator, RuntimeError, TensorTable};
use bytemuck::{Pod, Zeroable};
use model_ir::OpRecord;
use tensor_core::{fully_connected, DType, FcDims, FcQuant, Quantized};

/// Attribute block.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct FcAttrs {
    /// [`FcActivation`] code.
    pub activation: u32,
    pub _reserved: u32,
}

/// Activation fused into the requantization step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FcActivation {
    None,
    Relu,
}

impl FcActivation {
    pub fn code(self) -> u32 {
        match self {
            Self::None => 0,
            Self::Relu => 1,
        }
    }

    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(Self::None),
            1 => Some(Self::Relu),
            _ => None,
        }
    }
}

struct FcState {
    in_features: usize,
    out_features: usize,
    activation: FcActivation,
}

pub struct FullyConnected;

impl Operator for FullyConnected {
    fn name(&self) -> &'static str {
        "FullyConnected"
    }

    fn group(&self) -> OpGroup {
        OpGroup::Linear
    }

    fn init(&self, record: &OpRecord<'_>, tensors: &TensorTable<'_>) -> Result<OpState, RuntimeError> {
        check_arity(self.name(), record, 2..=3, 1)?;
        let x = tensors.info(record.tensor_id(0))?;
        let w_id = record.tensor_id(1);
        let w = tensors.info(w_id)?;
        let y_id = record.tensor_id(record.num_inputs());
        let y = tensors.info(y_id)?;

        if !matches!(x.dtype, DType::I8 | DType::U8) {
            return Err(no_kernel(self.name(), x.dtype));
        }
        expect_dtype(y_id, x.dtype, y.dtype)?;
        expect_dtype(w_id, DType::I8, w.dtype)?;
        if record.num_inputs() == 3 {
            let b_id = record.tensor_id(2);
            expect_dtype(b_id, DType::I32, tensors.info(b_id)?.dtype)?;
        }

        let (out_features, in_features) = match w.shape.dims() {
            &[out, inner] => (out, inner),
            _ => {
                return Err(RuntimeError::InvalidData(format!(
                    "FullyConnected weights must be [out, in], got {}",
                    w.shape
                )))
            }
        };
        if in_features == 0 || out_features == 0 {
            return Err(RuntimeError::InvalidParameter(format!(
                "FullyConnected weights {} have an empty axis",
                w.shape
            )));
        }
        if x.shape.last_dim() != in_features || y.shape.last_dim() != out_features {
            return Err(RuntimeError::InvalidData(format!(
                "FullyConnected {} x {} -> {} does not line up",
                x.shape, w.shape, y.shape
            )));
        }

        let activation = if record.attrs().is_empty() {
            FcActivation::None
        } else {
            let attrs = record.attrs_as::<FcAttrs>().ok_or_else(|| {
                RuntimeError::InvalidData("FullyConnected attribute block too short".into())
            })?;
            FcActivation::from_code(attrs.activation).ok_or_else(|| RuntimeError::NotImplemented {
                op: "FullyConnected",
                detail: format!("activation code {}", attrs.activation),
            })?
        };

        Ok(Some(Box::new(FcState {
            in_features,
            out_features,
            activation,
        })))
    }

    fn forward(&self, ctx: &mut OpContext<'_, '_>) -> Result<(), RuntimeError> {
        ctx.prefetch_next();

        let (in_features, out_features, activation) = {
            let state = ctx.state::<FcState>().ok_or_else(|| {
                RuntimeError::InvalidParameter("FullyConnected forward without init".into())
            })?;
            (state.in_features, state.out_features, state.activation)
        };

        let x = ctx.input_info(0)?;
        if x.shape.rank() == 0 || x.shape.last_dim() != in_features {
            return Err(RuntimeError::InvalidData(format!(
                "FullyConnected input {} does not end in {in_features}",
                x.shape
            )));
        }
        let mut shape = x.shape;
        shape.set_dim(shape.rank() - 1, out_features);
        ctx.set_output_shape(0, shape)?;

        let dims = FcDims {
            batch: x.shape.num_elements() / in_features,
            in_features,
            out_features,
        };
        let mut views = ctx.views()?;
        let (inputs, y) = (&views.inputs, &mut views.outputs[0]);
        match y.info.dtype {
            DType::I8 => run::<i8>(inputs, y, dims, activation),
            DType::U8 => run::<u8>(inputs, y, dims, activation),
            other => Err(no_kernel(self.name(), other)),
        }
    }
}

fn run<Q: Quantized>(
    inputs: &[TensorView<'_>],
    y: &mut TensorViewMut<'_>,
    dims: FcDims,
    activation: FcActivation,
) -> Result<(), RuntimeError> {
    let (x, w) = (&inputs[0], &inputs[1]);
    let bias = match inputs.get(2) {
        Some(b) => Some(b.elements::<i32>()?),
        None => None,
    };
    let quant = FcQuant {
        input_zero_point: x.info.quant.zero_point,
        weight_zero_point: w.info.quant.zero_point,
        output_zero_point: y.info.quant.zero_point,
        multiplier: x.info.quant.scale * w.info.quant.scale / y.info.quant.scale,
    };
    let out = y.elements_mut::<Q>()?;
    fully_connected::<Q>(x.elements()?, w.elements()?, bias, &mut *out, dims, quant)?;
    if activation == FcActivation::Relu {
        let floor = Q::saturate(quant.output_zero_point);
        for v in out.iter_mut() {
            if *v < floor {
                *v = floor;
            }
        }
    }
    Ok(())
}
