// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # tensor-core
//!
//! Element types, shapes and host reference kernels for the quantized
//! operators the NPU runtime dispatches.
//!
//! This crate provides:
//! - [`DType`]: float and quantized integer element types with their
//!   on-resource codes.
//! - [`Shape`]: a fixed-capacity (rank ≤ [`MAX_RANK`]) shape that the
//!   shape-inference engine can patch in place.
//! - [`QuantParams`] / [`Quantized`]: affine quantization.
//! - Kernels: [`quantize`], [`dequantize`], [`quantized_add`], [`relu`],
//!   [`fully_connected`].
//!
//! # Design Goals
//! - Kernels take slices, never owned buffers, so they run in place on
//!   arena-backed tensor memory.
//! - Byte buffers are reinterpreted with `bytemuck`, which checks alignment
//!   and length instead of trusting raw pointer casts.

mod dtype;
mod error;
mod ops;
mod quant;
mod shape;

pub use dtype::DType;
pub use error::TensorError;
pub use ops::{
    dequantize, fully_connected, quantize, quantized_add, relu, relu_f32, FcDims, FcQuant,
};
pub use quant::{elements, elements_mut, QuantParams, Quantized};
pub use shape::{Shape, MAX_RANK};
