// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Host reference kernels.
//!
//! Each kernel works on caller-provided slices so the runtime can point it
//! directly at tensor memory; nothing here allocates.

mod add_op;
mod fully_connected_op;
mod quantize_op;
mod relu_op;

pub use add_op::quantized_add;
pub use fully_connected_op::{fully_connected, FcDims, FcQuant};
pub use quantize_op::{dequantize, quantize};
pub use relu_op::{relu, relu_f32};
