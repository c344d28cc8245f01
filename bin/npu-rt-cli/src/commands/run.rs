// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `npu-rt run` command: load a resource and execute forward passes.
//!
//! ```text
//! plan_memory → pool.allocate → model_init → executor_create
//!   → [update_shape] → set_input… → forward × N → get_output…
//! ```
//!
//! Ctrl-C stops the executor between operators; the pass in progress
//! reports `stopped` and no further passes are started.

use super::{banner, kb, map_resource, split_pair};
use anyhow::Context;
use memory_manager::{MemoryClass, MemoryPool};
use runtime::{
    CancelToken, Completion, ExecutorHandle, ExecutorMemory, IoKind, ModelHandle, ModelMemory,
    Runtime, RuntimeConfig, TensorData,
};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Outcome of a forward loop.
pub struct LoopReport {
    pub passes: usize,
    pub stopped: bool,
    pub elapsed: Duration,
}

impl LoopReport {
    pub fn print(&self) {
        let per_pass = if self.passes == 0 {
            0.0
        } else {
            self.elapsed.as_secs_f64() * 1000.0 / self.passes as f64
        };
        println!(
            "  {} pass(es) in {:.2}ms ({:.3}ms/pass){}",
            self.passes,
            self.elapsed.as_secs_f64() * 1000.0,
            per_pass,
            if self.stopped { ", stopped" } else { "" }
        );
    }
}

pub async fn execute(
    resource: PathBuf,
    config: RuntimeConfig,
    inputs: Vec<String>,
    shapes: Vec<String>,
    output_dir: Option<PathBuf>,
    iterations: usize,
) -> anyhow::Result<()> {
    banner("npu-rt · Inference Runner");

    let bytes = map_resource(&resource)?;
    let budget = config.parse_budget()?;
    let profiling = config.enable_profiling;

    let pool = MemoryPool::new(budget);
    runtime::initialize();
    let mut rt = Runtime::new(config)?;

    // ── Load ───────────────────────────────────────────────────
    println!("  [1/3] Planning and loading {}...", resource.display());
    let plan = rt.plan_memory(&bytes)?;
    plan.check_budget(budget)?;
    println!("        {}", plan.summary());
    let model = rt.model_init(&bytes, ModelMemory::allocate(&plan, &pool)?)?;
    let exec = rt.executor_create(model, ExecutorMemory::allocate(&plan, &pool)?)?;
    println!(
        "        Pool: {:.1} KB of {budget} in use",
        kb(pool.allocated_bytes())
    );
    println!();

    // ── Inputs ─────────────────────────────────────────────────
    println!("  [2/3] Binding inputs...");
    if !shapes.is_empty() {
        let mut names = Vec::with_capacity(shapes.len());
        let mut sizes = Vec::with_capacity(shapes.len());
        for arg in &shapes {
            let (name, size) = split_pair(arg)?;
            names.push(name);
            sizes.push(size.parse::<usize>().with_context(|| format!("bad size in '{arg}'"))?);
        }
        rt.update_shape(exec, &names, &sizes)?;
        println!("        Shape inputs: {}", shapes.join(", "));
    }
    bind_inputs(&mut rt, model, exec, &inputs)?;
    println!();

    // ── Forward ────────────────────────────────────────────────
    println!("  [3/3] Running {iterations} forward pass(es)...");
    let token = rt.cancel_token(exec)?;
    let watcher = tokio::spawn(stop_on_interrupt(token));
    let report = tokio::task::block_in_place(|| forward_loop(&mut rt, exec, iterations))?;
    watcher.abort();
    report.print();
    if profiling {
        if let Some(metrics) = rt.forward_metrics(exec)? {
            println!("  {}", metrics.summary());
        }
    }
    println!();

    print_outputs(&rt, model, exec, output_dir.as_deref())?;

    rt.executor_release(exec)?;
    rt.model_fini(model)?;
    let stats = pool.stats();
    info!(
        regions = stats.handed_out(),
        reused = stats.reused,
        scratch_peak_kb = kb(stats.class(MemoryClass::RuntimeScratch).peak_bytes),
        shape_peak_kb = kb(stats.class(MemoryClass::ShapeWorkspace).peak_bytes),
        "pool released"
    );
    Ok(())
}

/// Stops the executor on Ctrl-C.
pub async fn stop_on_interrupt(token: CancelToken) {
    if tokio::signal::ctrl_c().await.is_ok() {
        warn!("interrupt received, stopping executor");
        token.stop();
    }
}

/// Runs up to `iterations` passes, ending early on a stop.
pub fn forward_loop(
    rt: &mut Runtime<'_>,
    exec: ExecutorHandle,
    iterations: usize,
) -> anyhow::Result<LoopReport> {
    let start = Instant::now();
    let mut passes = 0;
    let mut stopped = false;
    for _ in 0..iterations {
        match rt.forward(exec)? {
            Completion::Finished => passes += 1,
            Completion::Stopped => {
                stopped = true;
                break;
            }
        }
    }
    Ok(LoopReport {
        passes,
        stopped,
        elapsed: start.elapsed(),
    })
}

fn bind_inputs(
    rt: &mut Runtime<'_>,
    model: ModelHandle,
    exec: ExecutorHandle,
    args: &[String],
) -> anyhow::Result<()> {
    let mut files = Vec::with_capacity(args.len());
    for arg in args {
        let (name, path) = split_pair(arg)?;
        let data = std::fs::read(path).with_context(|| format!("failed to read input '{path}'"))?;
        files.push((name.to_string(), data));
    }

    let names = (0..rt.num_inputs(model)?)
        .map(|i| rt.input_name(model, i).map(str::to_string))
        .collect::<Result<Vec<_>, _>>()?;
    if let Some((unknown, _)) = files.iter().find(|(n, _)| !names.contains(n)) {
        anyhow::bail!("model has no input named '{unknown}'");
    }

    for (i, name) in names.iter().enumerate() {
        let id = rt.model(model)?.io_tensor(IoKind::Input, i)?;
        let info = rt.executor(exec)?.tensor_info(id)?;
        let supplied = files.iter().find(|(n, _)| n == name);
        let zeros;
        let data: &[u8] = match supplied {
            Some((_, bytes)) => bytes,
            None => {
                zeros = vec![0u8; info.byte_len()];
                &zeros
            }
        };
        rt.set_input(exec, i, TensorData::new(info.dtype, info.shape, data))
            .with_context(|| format!("binding input '{name}'"))?;
        println!(
            "        {name}: {} {} ({} bytes{})",
            info.dtype,
            info.shape,
            data.len(),
            if supplied.is_some() { "" } else { ", zeroed" }
        );
    }
    Ok(())
}

fn print_outputs(
    rt: &Runtime<'_>,
    model: ModelHandle,
    exec: ExecutorHandle,
    dir: Option<&Path>,
) -> anyhow::Result<()> {
    if let Some(dir) = dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create '{}'", dir.display()))?;
    }
    println!("  Outputs:");
    for i in 0..rt.num_outputs(model)? {
        let name = rt.output_name(model, i)?;
        let out = rt.get_output(exec, i)?;
        println!("   {name}: {} {} ({} bytes)", out.dtype, out.shape, out.data.len());
        if let Some(dir) = dir {
            let path = dir.join(format!("{name}.bin"));
            std::fs::write(&path, out.data)
                .with_context(|| format!("failed to write '{}'", path.display()))?;
        }
    }
    println!();
    Ok(())
}
