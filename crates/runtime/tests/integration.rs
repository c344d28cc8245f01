// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Integration tests: end-to-end inference pipeline.
//!
//! These tests exercise the complete flow from resource construction →
//! planning → memory allocation → model load → executor build → forward,
//! proving that the format, planner, memory and runtime crates compose.

use memory_manager::{DeviceType, MemoryBudget, MemoryClass, MemoryPool, MemoryRegion};
use model_ir::{Opcode, Resource, ResourceBuilder};
use runtime::ops::{FcActivation, FcAttrs};
use runtime::{
    CancelToken, Completion, DTypePolicy, ExecutorHandle, ExecutorMemory, ModelHandle,
    ModelMemory, OpContext, OpGroup, Operator, OperatorRegistry, Runtime, RuntimeConfig,
    RuntimeError, StatusCode, TensorData,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use tensor_core::{DType, QuantParams, Shape};

// ── Helpers ────────────────────────────────────────────────────

fn builtin_runtime<'r>() -> Runtime<'r> {
    Runtime::with_registry(RuntimeConfig::default(), Arc::new(OperatorRegistry::builtin()))
}

/// Loads `bytes` and creates one executor, both in standalone memory.
fn load<'r>(rt: &mut Runtime<'r>, bytes: &'r [u8]) -> (ModelHandle, ExecutorHandle) {
    let plan = rt.plan_memory(bytes).unwrap();
    let model = rt.model_init(bytes, ModelMemory::standalone(&plan)).unwrap();
    let exec = rt
        .executor_create(model, ExecutorMemory::standalone(&plan))
        .unwrap();
    (model, exec)
}

fn status<T: std::fmt::Debug>(result: Result<T, RuntimeError>) -> StatusCode {
    result.unwrap_err().status()
}

const QUANT_DIMS: [u32; 4] = [1, 8, 64, 128];
const QUANT_SCALE: f32 = 0.0625;
const QUANT_ZP: i32 = 3;

/// One `Quantize` operator, f32 `x` → i8 `y`, in two SRAM blocks.
fn quantize_model() -> Vec<u8> {
    let elems: u64 = QUANT_DIMS.iter().map(|&d| u64::from(d)).product();
    let mut b = ResourceBuilder::new();
    let xs = b.runtime_memory(elems * 4, DeviceType::Sram);
    let ys = b.runtime_memory(elems, DeviceType::Sram);
    let x = b.tensor(DType::F32, &QUANT_DIMS, xs, 0);
    let y = b.quantized_tensor(DType::I8, &QUANT_DIMS, ys, 0, QUANT_SCALE, QUANT_ZP);
    let op = b.operator("Quantize", &[x], &[y], &[], &[], &[]);
    b.debug_name(op, "input_quant");
    b.input("x", x).output("y", y);
    b.build()
}

/// Samples on exact half-steps of the scale, wide enough to saturate.
fn quant_input(len: usize) -> Vec<f32> {
    (0..len)
        .map(|i| ((i % 509) as f32 - 254.0) * 0.03125)
        .collect()
}

/// Captured output of the full [1, 8, 64, 128] pass over `quant_input`.
const QUANT_OUTPUT_CRC: u32 = 0x490F_1563;
const QUANT_OUTPUT_HEAD: [i8; 16] = [
    -124, -124, -123, -123, -122, -122, -121, -121, -120, -120, -119, -119, -118, -118, -117, -117,
];
/// Elements 250..262: ties at ±0.5 step round away from zero.
const QUANT_OUTPUT_MID: [i8; 12] = [1, 1, 2, 2, 3, 4, 4, 5, 5, 6, 6, 7];
const QUANT_OUTPUT_SUM: i64 = 183_041;

fn usize_dims(dims: &[u32]) -> Vec<usize> {
    dims.iter().map(|&d| d as usize).collect()
}

// ── End-to-end ─────────────────────────────────────────────────

#[test]
fn test_quantize_end_to_end() {
    let bytes = quantize_model();
    let mut rt = builtin_runtime();
    let (_, exec) = load(&mut rt, &bytes);

    let shape = Shape::new(&usize_dims(&QUANT_DIMS)).unwrap();
    let input = quant_input(shape.num_elements());
    rt.set_input(exec, 0, TensorData::from_slice(DType::F32, shape, &input))
        .unwrap();
    assert_eq!(rt.forward(exec).unwrap(), Completion::Finished);

    let out = rt.get_output(exec, 0).unwrap();
    assert_eq!(out.dtype, DType::I8);
    assert_eq!(out.shape, shape);
    assert_eq!(out.quant, Some(QuantParams::new(QUANT_SCALE, QUANT_ZP)));
    let got = out.as_slice::<i8>().unwrap();
    assert_eq!(got.len(), input.len());
    assert_eq!(&got[..16], &QUANT_OUTPUT_HEAD);
    assert_eq!(&got[250..262], &QUANT_OUTPUT_MID);
    assert_eq!(got.iter().map(|&q| i64::from(q)).sum::<i64>(), QUANT_OUTPUT_SUM);
    assert_eq!(got.iter().filter(|&&q| q == 127).count(), 1024);
    assert_eq!(model_ir::crc32(out.data), QUANT_OUTPUT_CRC);
}

#[test]
fn test_smaller_input_shape_propagates() {
    let bytes = quantize_model();
    let mut rt = builtin_runtime();
    let (_, exec) = load(&mut rt, &bytes);

    let shape = Shape::new(&[1, 4, 64, 128]).unwrap();
    let input = quant_input(shape.num_elements());
    rt.set_input(exec, 0, TensorData::from_slice(DType::F32, shape, &input))
        .unwrap();
    rt.forward(exec).unwrap();

    let out = rt.get_output(exec, 0).unwrap();
    assert_eq!(out.shape, shape);
    assert_eq!(out.data.len(), shape.num_elements());
}

#[test]
fn test_lookup_by_name() {
    let bytes = quantize_model();
    let mut rt = builtin_runtime();
    let (model, exec) = load(&mut rt, &bytes);

    assert_eq!(rt.num_inputs(model).unwrap(), 1);
    assert_eq!(rt.num_outputs(model).unwrap(), 1);
    assert_eq!(rt.input_name(model, 0).unwrap(), "x");
    assert_eq!(rt.output_name(model, 0).unwrap(), "y");
    assert_eq!(status(rt.input_name(model, 1)), StatusCode::IndexOutOfBounds);

    let info = rt.output_info(model, 0).unwrap();
    assert_eq!(info.dtype, DType::I8);
    assert_eq!(info.shape.dims(), usize_dims(&QUANT_DIMS).as_slice());
    assert_eq!(rt.model(model).unwrap().op_name(0), "input_quant");

    let shape = Shape::new(&[1, 1, 1, 4]).unwrap();
    let input = [0.5f32, -0.5, 1.0, 8.0];
    rt.set_input_by_name(exec, "x", TensorData::from_slice(DType::F32, shape, &input))
        .unwrap();
    rt.forward(exec).unwrap();
    let out = rt.get_output_by_name(exec, "y").unwrap();
    assert_eq!(out.as_slice::<i8>().unwrap(), &[11i8, -5, 19, 127]);

    let data = TensorData::from_slice(DType::F32, shape, &input);
    assert_eq!(status(rt.set_input_by_name(exec, "z", data)), StatusCode::InvalidParameter);
    assert_eq!(status(rt.get_output_by_name(exec, "x")), StatusCode::InvalidParameter);
}

#[test]
fn test_input_validation() {
    let bytes = quantize_model();
    let mut rt = builtin_runtime();
    let (_, exec) = load(&mut rt, &bytes);

    // Larger than the declared maximum shape.
    let big = Shape::new(&[1, 8, 65, 128]).unwrap();
    let data = vec![0f32; big.num_elements()];
    let r = rt.set_input(exec, 0, TensorData::from_slice(DType::F32, big, &data));
    assert_eq!(status(r), StatusCode::InvalidData);

    // Wrong dtype under the strict policy.
    let shape = Shape::vector(4);
    let ints = [0i32; 4];
    let r = rt.set_input(exec, 0, TensorData::from_slice(DType::I32, shape, &ints));
    assert!(matches!(r, Err(RuntimeError::InvalidDatatype { expected: DType::F32, .. })));

    // Byte length that does not match the shape.
    let shape = Shape::new(&[1, 1, 1, 4]).unwrap();
    let floats = [0f32; 3];
    let r = rt.set_input(exec, 0, TensorData::from_slice(DType::F32, shape, &floats));
    assert_eq!(status(r), StatusCode::InvalidParameter);

    assert_eq!(
        status(rt.set_input(exec, 1, TensorData::from_slice(DType::F32, shape, &[0f32; 4]))),
        StatusCode::IndexOutOfBounds
    );
}

#[test]
fn test_same_width_policy() {
    let mut b = ResourceBuilder::new();
    let act = b.runtime_memory(32, DeviceType::Sram);
    let x = b.tensor(DType::I8, &[8], act, 0);
    let y = b.tensor(DType::I8, &[8], act, 16);
    b.operator("Relu", &[x], &[y], &[], &[], &[]);
    b.input("x", x).output("y", y);
    let bytes = b.build();

    let config = RuntimeConfig {
        dtype_policy: DTypePolicy::SameWidth,
        ..RuntimeConfig::default()
    };
    let mut rt = Runtime::with_registry(config, Arc::new(OperatorRegistry::builtin()));
    let (_, exec) = load(&mut rt, &bytes);

    let raw = [0u8, 1, 2, 0x7f, 0x80, 0xff, 5, 6];
    rt.set_input(exec, 0, TensorData::new(DType::U8, Shape::vector(8), &raw))
        .unwrap();
    rt.forward(exec).unwrap();
    let out = rt.get_output(exec, 0).unwrap();
    assert_eq!(out.dtype, DType::I8);
    assert_eq!(out.as_slice::<i8>().unwrap(), &[0, 1, 2, 127, 0, 0, 5, 6]);
}

// ── Shape inference ────────────────────────────────────────────

/// `x: [2, seq]`, `mask: [seq]`, `y: [2, 2 * seq]`, with `seq <= 16`.
fn shape_model() -> (Vec<u8>, u32, u32, u32) {
    let mut b = ResourceBuilder::new();
    let act = b.runtime_memory(1024, DeviceType::Sram);
    let x = b.tensor(DType::F32, &[2, 16], act, 0);
    let mask = b.tensor(DType::F32, &[16], act, 128);
    let y = b.tensor(DType::F32, &[2, 32], act, 256);
    let m = b.tensor(DType::F32, &[16], act, 512);
    b.operator("Relu", &[mask], &[m], &[], &[], &[]);
    b.input("x", x).input("mask", mask).output("y", y).output("m", m);

    let seq = b.shape_input("seq");
    let two = b.scalar(2.0);
    let doubled = b.shape_node(Opcode::Mul, &[seq, two]);
    b.shape_output(seq, x, 1)
        .shape_output(doubled, y, 1)
        .shape_axis(x, 1, seq)
        .shape_axis(mask, 0, seq);
    (b.build(), x, mask, y)
}

#[test]
fn test_update_shape_by_name() {
    let (bytes, x, _, y) = shape_model();
    let mut rt = builtin_runtime();
    let (_, exec) = load(&mut rt, &bytes);

    rt.update_shape(exec, &["seq"], &[8]).unwrap();
    let e = rt.executor(exec).unwrap();
    assert_eq!(e.tensor_info(x).unwrap().shape.dims(), &[2, 8]);
    assert_eq!(e.tensor_info(y).unwrap().shape.dims(), &[2, 16]);

    // 2 * 20 exceeds y's maximum; nothing is written.
    assert_eq!(status(rt.update_shape(exec, &["seq"], &[20])), StatusCode::InvalidData);
    let e = rt.executor(exec).unwrap();
    assert_eq!(e.tensor_info(y).unwrap().shape.dims(), &[2, 16]);

    assert!(matches!(
        rt.update_shape(exec, &["batch"], &[1]),
        Err(RuntimeError::Shape(_))
    ));
    assert!(rt.update_shape(exec, &["seq"], &[]).is_err());
}

#[test]
fn test_rejected_shape_restores_registers() {
    let (bytes, x, _, y) = shape_model();
    let mut rt = builtin_runtime();
    let (_, exec) = load(&mut rt, &bytes);

    rt.update_shape(exec, &["seq"], &[8]).unwrap();
    let before = rt.executor(exec).unwrap().registers().to_vec();
    assert!(before.contains(&8.0) && before.contains(&16.0));

    assert!(rt.update_shape(exec, &["seq"], &[20]).is_err());
    let e = rt.executor(exec).unwrap();
    assert_eq!(e.registers(), &before[..]);
    assert_eq!(e.tensor_info(x).unwrap().shape.dims(), &[2, 8]);
    assert_eq!(e.tensor_info(y).unwrap().shape.dims(), &[2, 16]);
}

#[test]
fn test_update_shape_from_observed_axes() {
    let (bytes, _, _, y) = shape_model();
    let mut rt = builtin_runtime();
    let (_, exec) = load(&mut rt, &bytes);

    let x_data = [1f32; 12];
    let mask_data = [1f32; 6];
    rt.set_input_by_name(exec, "x", TensorData::from_slice(DType::F32, Shape::matrix(2, 6), &x_data))
        .unwrap();
    rt.set_input_by_name(exec, "mask", TensorData::from_slice(DType::F32, Shape::vector(6), &mask_data))
        .unwrap();
    rt.update_shape(exec, &[], &[]).unwrap();
    assert_eq!(
        rt.executor(exec).unwrap().tensor_info(y).unwrap().shape.dims(),
        &[2, 12]
    );

    // The mask disagrees with x about `seq`.
    rt.set_input_by_name(exec, "mask", TensorData::from_slice(DType::F32, Shape::vector(4), &mask_data[..4]))
        .unwrap();
    let r = rt.update_shape(exec, &[], &[]);
    assert!(matches!(r, Err(RuntimeError::Shape(_))));
    assert_eq!(StatusCode::of(&r.map(|_| Completion::Finished)), StatusCode::InvalidData);
    assert_eq!(
        rt.executor(exec).unwrap().tensor_info(y).unwrap().shape.dims(),
        &[2, 12]
    );
}

// ── DMA and cancellation ───────────────────────────────────────

/// Weights stream from DDR into SRAM and feed a quantized ReLU.
fn dma_model(weights: &[u8]) -> Vec<u8> {
    let mut b = ResourceBuilder::new();
    let ddr = b.shared_memory(weights, DeviceType::Ddr);
    let sram = b.runtime_memory(128, DeviceType::Sram);
    let n = weights.len() as u32;
    let src = b.tensor(DType::I8, &[n], ddr, 0);
    let w = b.tensor(DType::I8, &[n], sram, 0);
    let y = b.tensor(DType::I8, &[n], sram, 64);
    b.operator("Relu", &[w], &[y], &[], &[], &[]);
    b.dma(src, w, u64::from(n));
    b.output("y", y).output("w", w);
    b.build()
}

fn signed_pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i as i8).wrapping_mul(37) as u8).collect()
}

#[test]
fn test_stop_before_forward_drains_dma() {
    let weights = signed_pattern(64);
    let bytes = dma_model(&weights);
    let mut rt = builtin_runtime();
    let (_, exec) = load(&mut rt, &bytes);

    rt.executor_stop(exec).unwrap();
    let r = rt.forward(exec);
    assert_eq!(r.as_ref().unwrap(), &Completion::Stopped);
    assert_eq!(StatusCode::of(&r), StatusCode::ForceStop);

    let stats = rt.dma_stats(exec).unwrap();
    assert_eq!(stats.issued, 1);
    assert_eq!(stats.completed, stats.issued);
    assert_eq!(rt.get_output_by_name(exec, "w").unwrap().data, weights.as_slice());

    rt.executor_start(exec).unwrap();
    assert_eq!(rt.forward(exec).unwrap(), Completion::Finished);
    let y = rt.get_output_by_name(exec, "y").unwrap();
    let expected: Vec<i8> = weights.iter().map(|&b| (b as i8).max(0)).collect();
    assert_eq!(y.as_slice::<i8>().unwrap(), expected.as_slice());
    assert_eq!(rt.dma_stats(exec).unwrap().completed, 2);
}

/// Stops its executor on first run.
struct Tripwire(Arc<OnceLock<CancelToken>>);

impl Operator for Tripwire {
    fn name(&self) -> &'static str {
        "Tripwire"
    }

    fn group(&self) -> OpGroup {
        OpGroup::Custom
    }

    fn forward(&self, _ctx: &mut OpContext<'_, '_>) -> Result<(), RuntimeError> {
        if let Some(token) = self.0.get() {
            token.stop();
        }
        Ok(())
    }
}

struct Counter(Arc<AtomicUsize>);

impl Operator for Counter {
    fn name(&self) -> &'static str {
        "Counter"
    }

    fn group(&self) -> OpGroup {
        OpGroup::Custom
    }

    fn forward(&self, _ctx: &mut OpContext<'_, '_>) -> Result<(), RuntimeError> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[test]
fn test_stop_mid_forward() {
    let token = Arc::new(OnceLock::new());
    let count = Arc::new(AtomicUsize::new(0));
    let mut registry = OperatorRegistry::builtin();
    registry.register(Box::new(Tripwire(Arc::clone(&token)))).unwrap();
    registry.register(Box::new(Counter(Arc::clone(&count)))).unwrap();

    let mut b = ResourceBuilder::new();
    b.operator("Counter", &[], &[], &[], &[], &[]);
    b.operator("Tripwire", &[], &[], &[], &[], &[]);
    b.operator("Counter", &[], &[], &[], &[], &[]);
    b.operator("Counter", &[], &[], &[], &[], &[]);
    let bytes = b.build();

    let mut rt = Runtime::with_registry(RuntimeConfig::default(), Arc::new(registry));
    let (_, exec) = load(&mut rt, &bytes);

    // Without a token the tripwire is inert.
    assert_eq!(rt.forward(exec).unwrap(), Completion::Finished);
    assert_eq!(count.load(Ordering::SeqCst), 3);

    token.set(rt.cancel_token(exec).unwrap()).unwrap();
    assert_eq!(rt.forward(exec).unwrap(), Completion::Stopped);
    assert_eq!(count.load(Ordering::SeqCst), 4);

    // The flag is sticky until the executor is restarted.
    assert_eq!(rt.forward(exec).unwrap(), Completion::Stopped);
    assert_eq!(count.load(Ordering::SeqCst), 4);
}

#[test]
fn test_fully_connected_with_streamed_weights() {
    // y = relu(x · wᵀ) with x: [2, 4], w: [3, 4].
    let w: [i8; 12] = [1, -2, 3, 0, 2, 2, -1, 1, -3, 0, 1, 4];
    let mut b = ResourceBuilder::new();
    let ddr = b.shared_memory(bytemuck::cast_slice(&w), DeviceType::Ddr);
    let sram = b.runtime_memory(64, DeviceType::Sram);
    let x = b.quantized_tensor(DType::I8, &[2, 4], sram, 0, 0.5, 1);
    let w_src = b.quantized_tensor(DType::I8, &[3, 4], ddr, 0, 0.25, 0);
    let w_dst = b.quantized_tensor(DType::I8, &[3, 4], sram, 16, 0.25, 0);
    let y = b.quantized_tensor(DType::I8, &[2, 3], sram, 32, 1.0, -2);
    let attrs = FcAttrs {
        activation: FcActivation::Relu.code(),
        _reserved: 0,
    };
    b.operator("FullyConnected", &[x, w_dst], &[y], &[], &[], bytemuck::bytes_of(&attrs));
    b.dma(w_src, w_dst, 12);
    b.input("x", x).output("y", y);
    let bytes = b.build();

    let mut rt = builtin_runtime();
    let (_, exec) = load(&mut rt, &bytes);

    let xs: [i8; 8] = [3, -1, 5, 1, -7, 9, 2, 1];
    let data = TensorData::from_slice(DType::I8, Shape::matrix(2, 4), &xs);
    rt.set_input(exec, 0, data).unwrap();

    let multiplier = 0.5f32 * 0.25 / 1.0;
    let mut expected = Vec::new();
    for row in xs.chunks(4) {
        for col in w.chunks(4) {
            let acc: i32 = row
                .iter()
                .zip(col)
                .map(|(&a, &b)| (i32::from(a) - 1) * i32::from(b))
                .sum();
            let q = ((acc as f32 * multiplier).round() as i32 - 2).clamp(-2, 127);
            expected.push(q as i8);
        }
    }

    for pass in 1..=2 {
        assert_eq!(rt.forward(exec).unwrap(), Completion::Finished);
        let out = rt.get_output(exec, 0).unwrap();
        assert_eq!(out.shape.dims(), &[2, 3]);
        assert_eq!(out.as_slice::<i8>().unwrap(), expected.as_slice(), "pass {pass}");
        assert_eq!(rt.dma_stats(exec).unwrap().completed, pass);
    }
}

// ── Handles and lifecycle ──────────────────────────────────────

#[test]
fn test_fully_connected_rejects_empty_weights() {
    let mut b = ResourceBuilder::new();
    let sram = b.runtime_memory(64, DeviceType::Sram);
    let x = b.quantized_tensor(DType::I8, &[2, 0], sram, 0, 0.5, 0);
    let w = b.quantized_tensor(DType::I8, &[4, 0], sram, 16, 0.25, 0);
    let y = b.quantized_tensor(DType::I8, &[2, 4], sram, 32, 1.0, 0);
    b.operator("FullyConnected", &[x, w], &[y], &[], &[], &[]);
    b.input("x", x).output("y", y);
    let bytes = b.build();

    let mut rt = builtin_runtime();
    let plan = rt.plan_memory(&bytes).unwrap();
    let model = rt.model_init(&bytes, ModelMemory::standalone(&plan)).unwrap();
    let r = rt.executor_create(model, ExecutorMemory::standalone(&plan));
    assert!(matches!(&r, Err(RuntimeError::OperatorFailed { index: 0, .. })));
    assert_eq!(status(r), StatusCode::InvalidParameter);
}

#[test]
fn test_handle_invalidation() {
    let bytes = quantize_model();
    let mut rt = builtin_runtime();
    let (model, exec) = load(&mut rt, &bytes);

    let bits = exec.to_bits();
    assert_eq!(ExecutorHandle::from_bits(bits), Some(exec));
    assert_eq!(ExecutorHandle::from_bits(0), None);
    assert_eq!(ModelHandle::from_bits(model.to_bits()), Some(model));

    rt.model_fini(model).unwrap();
    assert_eq!(status(rt.num_inputs(model)), StatusCode::InvalidInstance);
    assert_eq!(status(rt.model_fini(model)), StatusCode::InvalidInstance);
    assert_eq!(status(rt.forward(exec)), StatusCode::InvalidInstance);
    assert_eq!(status(rt.get_output(exec, 0)), StatusCode::InvalidInstance);
    assert_eq!(status(rt.executor_stop(exec)), StatusCode::InvalidInstance);

    let memory = rt.executor_release(exec).unwrap();
    assert!(memory.total_bytes() > 0);
    assert_eq!(status(rt.executor_release(exec)), StatusCode::InvalidInstance);
    assert_eq!(status(rt.forward(exec)), StatusCode::InvalidInstance);
}

#[test]
fn test_released_slot_is_not_aliased() {
    let bytes = quantize_model();
    let mut rt = builtin_runtime();
    let (model, first) = load(&mut rt, &bytes);
    let plan = rt.plan_memory(&bytes).unwrap();

    let memory = rt.executor_release(first).unwrap();
    let second = rt.executor_create(model, memory).unwrap();
    assert_ne!(first, second);
    assert_eq!(status(rt.forward(first)), StatusCode::InvalidInstance);
    assert!(rt.forward(second).is_ok());

    let extra = rt
        .executor_create(model, ExecutorMemory::standalone(&plan))
        .unwrap();
    assert_ne!(extra, second);
}

#[test]
fn test_pool_backed_executors_are_independent() {
    let bytes = dma_model(&signed_pattern(32));
    let mut rt = builtin_runtime();
    let plan = rt.plan_memory(&bytes).unwrap();
    assert!(plan.check_budget(MemoryBudget::from_bytes(16)).is_err());

    let pool = MemoryPool::new(MemoryBudget::from_mb(1));
    let model = rt
        .model_init(&bytes, ModelMemory::allocate(&plan, &pool).unwrap())
        .unwrap();
    let a = rt
        .executor_create(model, ExecutorMemory::allocate(&plan, &pool).unwrap())
        .unwrap();
    assert_eq!(pool.allocated_bytes(), plan.allocated_bytes());
    let b = rt
        .executor_create(model, ExecutorMemory::allocate(&plan, &pool).unwrap())
        .unwrap();
    assert!(pool.allocated_bytes() > plan.allocated_bytes());

    rt.executor_stop(a).unwrap();
    assert_eq!(rt.forward(a).unwrap(), Completion::Stopped);
    assert_eq!(rt.forward(b).unwrap(), Completion::Finished);
    assert_eq!(rt.dma_stats(b).unwrap().completed, 1);

    let before = pool.allocated_bytes();
    drop(rt.executor_release(a).unwrap());
    assert!(pool.allocated_bytes() < before);
}

/// Caller copy of the shared weights, filled with `fill`.
fn parameter_store(plan: &memory_planner::MemoryPlan, fill: &[u8]) -> Vec<MemoryRegion> {
    plan.shared()
        .iter()
        .map(|desc| {
            let mut region = MemoryRegion::for_descriptor(desc);
            region.as_mut_slice().copy_from_slice(fill);
            region
        })
        .collect()
}

#[test]
fn test_parameter_store_serves_shared_blocks() {
    let bytes = dma_model(&signed_pattern(32));
    let mut rt = builtin_runtime();
    let plan = rt.plan_memory(&bytes).unwrap();
    let caller_weights: Vec<u8> = (0..32).map(|i| i as u8 * 3).collect();
    let store = parameter_store(&plan, &caller_weights);
    let memory = ModelMemory::standalone(&plan).with_parameters(store);

    let model = rt.model_init(&bytes, memory).unwrap();
    assert!(rt.model(model).unwrap().has_parameter_store());
    let exec = rt
        .executor_create(model, ExecutorMemory::standalone(&plan))
        .unwrap();
    assert_eq!(rt.forward(exec).unwrap(), Completion::Finished);

    // Output 1 is the DMA destination: the caller's bytes, not the resource's.
    let streamed = rt.get_output(exec, 1).unwrap();
    assert_eq!(streamed.data, caller_weights.as_slice());
}

#[test]
fn test_parameter_store_must_match_shared_blocks() {
    let bytes = dma_model(&signed_pattern(32));
    let mut rt = builtin_runtime();
    let plan = rt.plan_memory(&bytes).unwrap();

    let short = vec![MemoryRegion::new(31, MemoryClass::SharedParameter, DeviceType::Ddr)];
    let wrong_device = vec![MemoryRegion::new(32, MemoryClass::SharedParameter, DeviceType::Sram)];
    let extra = vec![
        MemoryRegion::new(32, MemoryClass::SharedParameter, DeviceType::Ddr),
        MemoryRegion::new(32, MemoryClass::SharedParameter, DeviceType::Ddr),
    ];
    for store in [short, wrong_device, extra] {
        let memory = ModelMemory::standalone(&plan).with_parameters(store);
        let r = rt.model_init(&bytes, memory);
        assert!(matches!(r, Err(RuntimeError::InvalidParameter(_))));
        assert_eq!(status(r), StatusCode::InvalidParameter);
    }
}

#[test]
fn test_unconsumed_transfer_is_rejected() {
    let mut b = ResourceBuilder::new();
    let ddr = b.shared_memory(&[1; 16], DeviceType::Ddr);
    let sram = b.runtime_memory(64, DeviceType::Sram);
    let src = b.tensor(DType::I8, &[16], ddr, 0);
    let staged = b.tensor(DType::I8, &[16], sram, 0);
    let x = b.tensor(DType::I8, &[16], sram, 16);
    let y = b.tensor(DType::I8, &[16], sram, 32);
    b.operator("Relu", &[x], &[y], &[], &[], &[]);
    b.dma(src, staged, 16);
    b.input("x", x).output("y", y);
    let bytes = b.build();

    let mut rt = builtin_runtime();
    let plan = rt.plan_memory(&bytes).unwrap();
    let r = rt.model_init(&bytes, ModelMemory::standalone(&plan));
    assert_eq!(status(r), StatusCode::InvalidData);
}

#[test]
fn test_transfers_must_follow_stream_order() {
    let mut b = ResourceBuilder::new();
    let ddr = b.shared_memory(&[1; 32], DeviceType::Ddr);
    let sram = b.runtime_memory(64, DeviceType::Sram);
    let w1_src = b.tensor(DType::I8, &[16], ddr, 0);
    let w2_src = b.tensor(DType::I8, &[16], ddr, 16);
    let w1 = b.tensor(DType::I8, &[16], sram, 0);
    let w2 = b.tensor(DType::I8, &[16], sram, 16);
    let y1 = b.tensor(DType::I8, &[16], sram, 32);
    let y2 = b.tensor(DType::I8, &[16], sram, 48);
    // The second operator reads the first transfer's destination.
    b.operator("Relu", &[w2], &[y1], &[], &[], &[]);
    b.operator("Relu", &[w1], &[y2], &[], &[], &[]);
    b.dma(w1_src, w1, 16);
    b.dma(w2_src, w2, 16);
    b.output("y1", y1).output("y2", y2);
    let bytes = b.build();

    let mut rt = builtin_runtime();
    let plan = rt.plan_memory(&bytes).unwrap();
    let r = rt.model_init(&bytes, ModelMemory::standalone(&plan));
    assert_eq!(status(r), StatusCode::InvalidData);
}

#[test]
#[should_panic]
fn test_mismatched_executor_memory_panics() {
    let bytes = dma_model(&signed_pattern(16));
    let mut rt = builtin_runtime();
    let plan = rt.plan_memory(&bytes).unwrap();
    let model = rt.model_init(&bytes, ModelMemory::standalone(&plan)).unwrap();
    let memory = ExecutorMemory {
        executor_static: memory_manager::MemoryRegion::for_descriptor(plan.executor_static()),
        runtime: Vec::new(),
    };
    let _ = rt.executor_create(model, memory);
}

// ── Load-time failures ─────────────────────────────────────────

#[test]
fn test_unsupported_operator() {
    let mut b = ResourceBuilder::new();
    let act = b.runtime_memory(64, DeviceType::Sram);
    let x = b.tensor(DType::F32, &[4], act, 0);
    let y = b.tensor(DType::F32, &[4], act, 16);
    b.operator("Softmax", &[x], &[y], &[], &[], &[]);
    let bytes = b.build();

    let mut rt = builtin_runtime();
    let plan = rt.plan_memory(&bytes).unwrap();
    let r = rt.model_init(&bytes, ModelMemory::standalone(&plan));
    assert!(matches!(&r, Err(RuntimeError::UnsupportedOperator { name, .. }) if name == "Softmax"));
    assert_eq!(status(r), StatusCode::NoSupportOp);
}

#[test]
fn test_init_rejects_bad_operator() {
    let mut b = ResourceBuilder::new();
    let act = b.runtime_memory(64, DeviceType::Sram);
    let x = b.tensor(DType::I32, &[4], act, 0);
    let y = b.tensor(DType::I32, &[4], act, 16);
    b.operator("Relu", &[x], &[y], &[], &[], &[]);
    let bytes = b.build();

    let mut rt = builtin_runtime();
    let plan = rt.plan_memory(&bytes).unwrap();
    let model = rt.model_init(&bytes, ModelMemory::standalone(&plan)).unwrap();
    let r = rt.executor_create(model, ExecutorMemory::standalone(&plan));
    assert!(matches!(&r, Err(RuntimeError::OperatorFailed { index: 0, .. })));
    assert_eq!(status(r), StatusCode::NoImplOp);
}

#[test]
fn test_resource_integrity() {
    let weights = signed_pattern(32);
    let mut bytes = dma_model(&weights);
    let base = Resource::parse(&bytes).unwrap().parameter_base().unwrap() as usize;
    bytes[base] ^= 0x5a;

    {
        let mut rt = builtin_runtime();
        assert_eq!(status(rt.plan_memory(&bytes)), StatusCode::ResCrcCheck);
    }

    let config = RuntimeConfig {
        verify_crc: false,
        ..RuntimeConfig::default()
    };
    let mut rt = Runtime::with_registry(config, Arc::new(OperatorRegistry::builtin()));
    let (_, exec) = load(&mut rt, &bytes);
    rt.executor_stop(exec).unwrap();
    rt.forward(exec).unwrap();
    let w = rt.get_output_by_name(exec, "w").unwrap();
    assert_eq!(w.data[0], weights[0] ^ 0x5a);
}

#[test]
fn test_platform_check() {
    let mut b = ResourceBuilder::new();
    b.platform(7);
    let bytes = b.build();

    let config = |platform_id| RuntimeConfig {
        platform_id,
        ..RuntimeConfig::default()
    };
    let registry = Arc::new(OperatorRegistry::builtin());

    let mut rt = Runtime::with_registry(config(3), Arc::clone(&registry));
    let plan = rt.plan_memory(&bytes).unwrap();
    let r = rt.model_init(&bytes, ModelMemory::standalone(&plan));
    assert_eq!(status(r), StatusCode::InvalidPlatform);

    let mut rt = Runtime::with_registry(config(7), registry);
    assert!(rt.model_init(&bytes, ModelMemory::standalone(&plan)).is_ok());
}

#[test]
fn test_truncated_resource() {
    let bytes = quantize_model();
    let rt = builtin_runtime();
    assert_eq!(status(rt.plan_memory(&bytes[..bytes.len() - 1])), StatusCode::ResIncomplete);
    assert_eq!(status(rt.plan_memory(&[])), StatusCode::ResMissing);
}

// ── Global registry and profiling ──────────────────────────────

#[test]
fn test_global_runtime_with_profiling() {
    runtime::initialize();
    let config = RuntimeConfig {
        enable_profiling: true,
        ..RuntimeConfig::default()
    };
    let bytes = dma_model(&signed_pattern(16));
    let mut rt = Runtime::new(config).unwrap();
    let (_, exec) = load(&mut rt, &bytes);

    assert!(rt.forward_metrics(exec).unwrap().is_none());
    rt.forward(exec).unwrap();
    let metrics = rt.forward_metrics(exec).unwrap().unwrap();
    assert_eq!(metrics.ops.len(), 1);
    assert_eq!(metrics.ops[0].name, "relu_0");
    assert_eq!(metrics.dma.completed, 1);
    assert_eq!(metrics.completion, Some(Completion::Finished));
    assert!(metrics.summary().contains("1 ops"));
}

#[test]
fn test_state_reset() {
    let mut b = ResourceBuilder::new();
    let act = b.runtime_memory(32, DeviceType::Sram);
    let x = b.tensor(DType::I8, &[8], act, 0);
    let h = b.tensor(DType::I8, &[8], act, 16);
    b.operator("Relu", &[x], &[h], &[], &[], &[]);
    b.input("x", x).output("h", h).state("h", h);
    let bytes = b.build();

    let mut rt = builtin_runtime();
    let (model, exec) = load(&mut rt, &bytes);
    assert_eq!(rt.model(model).unwrap().num_states(), 1);

    let xs = [5i8; 8];
    rt.set_input(exec, 0, TensorData::from_slice(DType::I8, Shape::vector(8), &xs))
        .unwrap();
    rt.forward(exec).unwrap();
    assert_eq!(rt.get_output(exec, 0).unwrap().data, &[5u8; 8]);

    rt.reset_states(exec).unwrap();
    assert_eq!(rt.get_output(exec, 0).unwrap().data, &[0u8; 8]);
}
