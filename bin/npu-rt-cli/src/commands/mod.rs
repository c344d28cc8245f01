// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

pub mod demo;
pub mod inspect;
pub mod plan;
pub mod run;

use anyhow::Context;
use memmap2::Mmap;
use runtime::RuntimeConfig;
use std::fs::File;
use std::path::Path;
use tracing_subscriber::EnvFilter;

/// Installs the fmt subscriber. `RUST_LOG` wins over `-v`.
pub fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<RuntimeConfig> {
    match path {
        Some(p) => RuntimeConfig::from_file(p).context("loading runtime config"),
        None => Ok(RuntimeConfig::default()),
    }
}

/// Maps a resource file read-only.
pub fn map_resource(path: &Path) -> anyhow::Result<Mmap> {
    let file = File::open(path)
        .with_context(|| format!("failed to open resource '{}'", path.display()))?;
    // SAFETY: the mapping is read-only and the CLI does not modify the file
    // while it is mapped.
    let map = unsafe { Mmap::map(&file) }
        .with_context(|| format!("failed to map resource '{}'", path.display()))?;
    Ok(map)
}

/// Splits `NAME=VALUE`.
pub fn split_pair(arg: &str) -> anyhow::Result<(&str, &str)> {
    arg.split_once('=')
        .filter(|(k, _)| !k.is_empty())
        .ok_or_else(|| anyhow::anyhow!("expected NAME=VALUE, got '{arg}'"))
}

pub fn banner(title: &str) {
    println!("╔══════════════════════════════════════════════════════╗");
    println!("║ {:^52} ║", title);
    println!("╚══════════════════════════════════════════════════════╝");
    println!();
}

pub fn kb(bytes: usize) -> f64 {
    bytes as f64 / 1024.0
}
