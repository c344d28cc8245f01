// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `npu-rt inspect` command: display the contents of a compiled resource.
//!
//! The resource is loaded through the runtime so that everything printed
//! has passed the same validation a real load does.

use super::{banner, kb, map_resource};
use memory_manager::{DeviceType, MemoryClass};
use runtime::{IoKind, Model, ModelMemory, OperatorRegistry, Runtime, RuntimeConfig};
use std::path::PathBuf;
use std::sync::Arc;

pub async fn execute(resource: PathBuf, config: RuntimeConfig) -> anyhow::Result<()> {
    banner("npu-rt · Resource Inspector");

    let bytes = map_resource(&resource)?;
    let mut rt = Runtime::with_registry(config, Arc::new(OperatorRegistry::builtin()));
    let plan = rt.plan_memory(&bytes)?;
    let handle = rt.model_init(&bytes, ModelMemory::standalone(&plan))?;
    let model = rt.model(handle)?;

    // ── Header ─────────────────────────────────────────────────
    let header = model.resource().header();
    println!("  Resource: {}", resource.display());
    println!("  Version:  {}", header.version);
    println!("  Size:     {:.1} KB", kb(model.resource().total_size()));
    println!(
        "  CRC:      {}",
        if header.crc == 0 {
            "unchecked".to_string()
        } else {
            format!("{:#010x}", header.crc)
        }
    );
    println!("  Platform: {}", header.platform);
    println!("  {}", plan.summary());
    println!();

    print_memory(model);
    print_tensors(model)?;
    print_io(model)?;
    print_operators(model);
    print_dma(model);
    print_shape(model);

    rt.model_fini(handle)?;
    Ok(())
}

fn print_memory(model: &Model<'_>) {
    println!("  Memory blocks:");
    println!("  {:<4} {:<18} {:<6} {:>12} {:>10}", "Id", "Class", "Device", "Size", "Offset");
    println!("  {}", "-".repeat(56));
    for (id, rec) in model.memory_records().iter().enumerate() {
        let class = MemoryClass::from_code(rec.class)
            .map(|c| c.to_string())
            .unwrap_or_else(|_| format!("?{}", rec.class));
        let device = DeviceType::from_code(rec.device)
            .map(|d| d.to_string())
            .unwrap_or_else(|_| format!("?{}", rec.device));
        println!(
            "  {:<4} {:<18} {:<6} {:>9.1} KB {:>10}",
            id,
            class,
            device,
            kb(rec.size as usize),
            rec.offset
        );
    }
    println!();
}

fn print_tensors(model: &Model<'_>) -> anyhow::Result<()> {
    println!("  Tensors ({}):", model.tensor_count());
    println!(
        "  {:<4} {:<5} {:<22} {:>4} {:>8} {:>10} {:>12}",
        "Id", "Type", "Max shape", "Mem", "Offset", "Scale", "Zero point"
    );
    println!("  {}", "-".repeat(72));
    for id in 0..model.tensor_count() as u32 {
        let info = model.tensor_info(id)?;
        let (scale, zp) = if info.dtype.is_quantized() {
            (format!("{:.6}", info.quant.scale), info.quant.zero_point.to_string())
        } else {
            ("-".to_string(), "-".to_string())
        };
        println!(
            "  {:<4} {:<5} {:<22} {:>4} {:>8} {:>10} {:>12}",
            id,
            info.dtype.as_str(),
            info.shape.to_string(),
            info.memory_id,
            info.offset,
            scale,
            zp
        );
    }
    println!();
    Ok(())
}

fn print_io(model: &Model<'_>) -> anyhow::Result<()> {
    let groups = [
        ("Inputs", IoKind::Input, model.num_inputs()),
        ("Outputs", IoKind::Output, model.num_outputs()),
        ("States", IoKind::State, model.num_states()),
    ];
    for (title, kind, count) in groups {
        if count == 0 {
            continue;
        }
        println!("  {title}:");
        for i in 0..count {
            let id = model.io_tensor(kind, i)?;
            let info = model.tensor_info(id)?;
            println!(
                "   [{i}] {:<20} tensor {:<4} {} {}",
                model.io_name(kind, i)?,
                id,
                info.dtype,
                info.shape
            );
        }
        println!();
    }
    Ok(())
}

fn print_operators(model: &Model<'_>) {
    println!("  Operators ({}):", model.op_count());
    println!(
        "  {:<4} {:<28} {:<16} {:<14} {:<14}",
        "Idx", "Name", "Type", "Inputs", "Outputs"
    );
    println!("  {}", "-".repeat(78));
    for i in 0..model.op_count() {
        let op = model.op(i);
        let ids = |range: std::ops::Range<usize>| {
            range
                .map(|k| op.tensor_id(k).to_string())
                .collect::<Vec<_>>()
                .join(",")
        };
        let inputs = ids(0..op.num_inputs());
        let outputs = ids(op.num_inputs()..op.num_inputs() + op.num_outputs());
        println!(
            "  {:<4} {:<28} {:<16} {:<14} {:<14}",
            i,
            truncate(&model.op_name(i), 28),
            model.operator(i).name(),
            inputs,
            outputs
        );
    }
    println!();
}

fn print_dma(model: &Model<'_>) {
    let records = model.dma_records();
    if records.is_empty() {
        return;
    }
    println!("  DMA transfers ({}):", records.len());
    for (i, rec) in records.iter().enumerate() {
        println!(
            "   [{i}] tensor {} -> tensor {}  {:.1} KB",
            rec.src_tensor,
            rec.dst_tensor,
            kb(rec.size as usize)
        );
    }
    println!();
}

fn print_shape(model: &Model<'_>) {
    let graph = model.shape_graph();
    if graph.num_nodes() == 0 && model.shape_pairs().is_empty() {
        return;
    }
    println!(
        "  Shape inference: {} registers, {} nodes, {} write-backs, {} observed axes",
        graph.num_scalars(),
        graph.num_nodes(),
        model.shape_pairs().len(),
        model.shape_axes().len()
    );
    for i in 0..graph.num_inputs() {
        println!("   input '{}' -> r{}", graph.input_name(i), graph.input_register(i));
    }
    println!();
}

/// Truncates a string to `max_len` with ellipsis if needed.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len - 3).collect();
        format!("{head}...")
    }
}
