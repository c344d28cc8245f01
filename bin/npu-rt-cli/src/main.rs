// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # npu-rt
//!
//! Command-line interface for the npu-rt inference runtime.
//!
//! ## Usage
//! ```bash
//! # Print the sections, tensors and operators of a compiled resource
//! npu-rt inspect model.npures
//!
//! # Show the memory plan, optionally as JSON or against a budget
//! npu-rt plan model.npures --budget 8M --json
//!
//! # Run forward passes with raw input files, writing raw outputs
//! npu-rt run model.npures --input x=input.bin --output-dir out/ --iterations 10
//!
//! # Build and run a small quantized model end to end
//! npu-rt demo --iterations 100
//! ```

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "npu-rt",
    about = "Host runtime for compiled NPU model resources",
    version,
    author
)]
struct Cli {
    /// Path to a TOML runtime configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging (repeat for more: -v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print header, memory blocks, tensors, IO and operators of a resource.
    Inspect {
        /// Path to the compiled resource.
        resource: PathBuf,
    },

    /// Print the memory plan of a resource.
    Plan {
        /// Path to the compiled resource.
        resource: PathBuf,

        /// Check the plan against this budget (e.g., "512K", "8M").
        #[arg(short, long)]
        budget: Option<String>,

        /// Emit the plan as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Load a resource and run forward passes.
    Run {
        /// Path to the compiled resource.
        resource: PathBuf,

        /// Raw input bytes as NAME=FILE; unset inputs are zero.
        #[arg(short, long = "input", value_name = "NAME=FILE")]
        inputs: Vec<String>,

        /// Shape input sizes as NAME=SIZE, applied before the first pass.
        #[arg(short, long = "shape", value_name = "NAME=SIZE")]
        shapes: Vec<String>,

        /// Directory to write raw output bytes into.
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Number of forward passes.
        #[arg(short = 'n', long, default_value_t = 1)]
        iterations: usize,
    },

    /// Build a small quantized model in memory and run it.
    Demo {
        /// Number of forward passes.
        #[arg(short = 'n', long, default_value_t = 10)]
        iterations: usize,

        /// Hidden width of the fully-connected layers.
        #[arg(long, default_value_t = 64)]
        hidden: u32,

        /// Stop the executor after this many milliseconds.
        #[arg(long)]
        stop_after_ms: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    commands::init_tracing(cli.verbose);
    let config = commands::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Inspect { resource } => commands::inspect::execute(resource, config).await,
        Commands::Plan {
            resource,
            budget,
            json,
        } => commands::plan::execute(resource, config, budget, json).await,
        Commands::Run {
            resource,
            inputs,
            shapes,
            output_dir,
            iterations,
        } => commands::run::execute(resource, config, inputs, shapes, output_dir, iterations).await,
        Commands::Demo {
            iterations,
            hidden,
            stop_after_ms,
        } => commands::demo::execute(config, iterations, hidden, stop_after_ms).await,
    }
}
