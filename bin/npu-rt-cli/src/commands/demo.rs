// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `npu-rt demo` command: build a small quantized model in memory and run it.
//!
//! The model is `x:f32[batch, hidden] → Quantize → FullyConnected+Relu →
//! Dequantize → y:f32`, with the weights streamed from DDR into SRAM by one
//! DMA transfer and `batch` driven by the shape input of the same name.

use super::run::{forward_loop, stop_on_interrupt};
use super::{banner, kb};
use memory_manager::DeviceType;
use model_ir::ResourceBuilder;
use runtime::ops::{FcActivation, FcAttrs};
use runtime::{
    ExecutorMemory, IoKind, ModelMemory, OperatorRegistry, Runtime, RuntimeConfig, TensorData,
};
use std::sync::Arc;
use std::time::Duration;
use tensor_core::DType;
use tracing::info;

const MAX_BATCH: u32 = 8;
const BATCH: usize = 4;

/// Serialises the demo model.
pub fn build_model(hidden: u32) -> Vec<u8> {
    let mut b = ResourceBuilder::new();
    let act = u64::from(MAX_BATCH * hidden);
    let weight_bytes = u64::from(hidden * hidden);

    let weights: Vec<u8> = (0..weight_bytes)
        .map(|i| {
            let (row, col) = (i / u64::from(hidden), i % u64::from(hidden));
            if row == col {
                64
            } else {
                ((row * 7 + col * 3) % 5) as u8
            }
        })
        .collect();
    let ddr = b.shared_memory(&weights, DeviceType::Ddr);
    // f32 input, i8 quantized, i8 hidden, f32 output, i8 weight staging.
    let sram = b.runtime_memory(act * 4 + act + act + act * 4 + weight_bytes, DeviceType::Sram);

    let x = b.tensor(DType::F32, &[MAX_BATCH, hidden], sram, 0);
    let q = b.quantized_tensor(DType::I8, &[MAX_BATCH, hidden], sram, act * 4, 0.02, 0);
    let h = b.quantized_tensor(DType::I8, &[MAX_BATCH, hidden], sram, act * 5, 0.05, 0);
    let y = b.tensor(DType::F32, &[MAX_BATCH, hidden], sram, act * 6);
    let w_src = b.quantized_tensor(DType::I8, &[hidden, hidden], ddr, 0, 1.0 / 64.0, 0);
    let w = b.quantized_tensor(DType::I8, &[hidden, hidden], sram, act * 10, 1.0 / 64.0, 0);

    let attrs = FcAttrs {
        activation: FcActivation::Relu.code(),
        _reserved: 0,
    };
    let quantize = b.operator("Quantize", &[x], &[q], &[], &[], &[]);
    let fc = b.operator("FullyConnected", &[q, w], &[h], &[], &[], bytemuck::bytes_of(&attrs));
    let dequantize = b.operator("Dequantize", &[h], &[y], &[], &[], &[]);
    b.debug_name(quantize, "input_quantize")
        .debug_name(fc, "dense_relu")
        .debug_name(dequantize, "output_dequantize");
    b.dma(w_src, w, weight_bytes);

    let batch = b.shape_input("batch");
    b.shape_output(batch, x, 0);

    b.input("x", x).output("y", y);
    b.build()
}

pub async fn execute(
    mut config: RuntimeConfig,
    iterations: usize,
    hidden: u32,
    stop_after_ms: Option<u64>,
) -> anyhow::Result<()> {
    banner("npu-rt · Demo");
    anyhow::ensure!(hidden > 0, "hidden width must be positive");

    let bytes = build_model(hidden);
    println!("  Built demo resource: {:.1} KB, hidden {hidden}", kb(bytes.len()));

    config.enable_profiling = true;
    let mut rt = Runtime::with_registry(config, Arc::new(OperatorRegistry::builtin()));
    let plan = rt.plan_memory(&bytes)?;
    println!("  {}", plan.summary());

    let model = rt.model_init(&bytes, ModelMemory::standalone(&plan))?;
    let exec = rt.executor_create(model, ExecutorMemory::standalone(&plan))?;

    rt.update_shape(exec, &["batch"], &[BATCH])?;
    let x_id = rt.model(model)?.io_tensor(IoKind::Input, 0)?;
    let x = rt.executor(exec)?.tensor_info(x_id)?;
    println!("  Input x resized to {}", x.shape);

    let input: Vec<f32> = (0..x.shape.num_elements())
        .map(|i| ((i as f32) * 0.37).sin() * 2.0)
        .collect();
    rt.set_input(exec, 0, TensorData::from_slice(DType::F32, x.shape, &input))?;
    println!();

    let token = rt.cancel_token(exec)?;
    let watcher = tokio::spawn(stop_on_interrupt(token.clone()));
    let timer = stop_after_ms.map(|ms| {
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            info!(ms, "demo timer expired, stopping executor");
            token.stop();
        })
    });

    let report = tokio::task::block_in_place(|| forward_loop(&mut rt, exec, iterations))?;
    watcher.abort();
    if let Some(timer) = timer {
        timer.abort();
    }
    report.print();
    if let Some(metrics) = rt.forward_metrics(exec)? {
        println!("  {}", metrics.summary());
        for op in &metrics.ops {
            println!(
                "   [{}] {:<20} compute {:>8.3}ms  dma wait {:>8.3}ms",
                op.index,
                op.name,
                op.compute.as_secs_f64() * 1000.0,
                op.dma_wait.as_secs_f64() * 1000.0
            );
        }
    }
    println!();

    if report.passes > 0 {
        let out = rt.get_output(exec, 0)?;
        let values = out.as_slice::<f32>()?;
        let preview: Vec<String> = values.iter().take(8).map(|v| format!("{v:.3}")).collect();
        println!("  y {}: [{}, ...]", out.shape, preview.join(", "));
        println!();
    }

    rt.executor_release(exec)?;
    rt.model_fini(model)?;
    Ok(())
}
