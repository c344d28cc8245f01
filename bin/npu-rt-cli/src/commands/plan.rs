// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! `npu-rt plan` command: print the memory a resource needs.

use super::{banner, kb, map_resource};
use anyhow::Context;
use memory_manager::{MemoryAddress, MemoryBudget};
use memory_planner::MemoryPlan;
use runtime::RuntimeConfig;
use std::path::PathBuf;

pub async fn execute(
    resource: PathBuf,
    config: RuntimeConfig,
    budget: Option<String>,
    json: bool,
) -> anyhow::Result<()> {
    let bytes = map_resource(&resource)?;
    let plan = MemoryPlan::query_with(&bytes, config.validation())
        .with_context(|| format!("planning '{}'", resource.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(());
    }

    banner("npu-rt · Memory Plan");
    println!("  Resource: {}", resource.display());
    println!("  {}", plan.summary());
    println!();

    println!(
        "  {:<4} {:<18} {:<6} {:>12}  {}",
        "#", "Class", "Device", "Size", "Backing"
    );
    println!("  {}", "-".repeat(60));
    for (i, desc) in plan.descriptors().iter().enumerate() {
        let backing = match desc.address {
            MemoryAddress::Unassigned => "caller".to_string(),
            MemoryAddress::Resource { offset } => format!("resource @ {offset}"),
        };
        println!(
            "  {:<4} {:<18} {:<6} {:>9.1} KB  {}",
            i,
            desc.class.as_str(),
            desc.device.as_str(),
            kb(desc.size),
            backing
        );
    }
    println!();

    println!("  Per executor: {:.1} KB", kb(plan.per_executor_bytes()));
    println!("  First load:   {:.1} KB", kb(plan.allocated_bytes()));

    let budget = match budget {
        Some(s) => MemoryBudget::parse(&s)?,
        None => config.parse_budget()?,
    };
    match plan.check_budget(budget) {
        Ok(()) => {
            let spare = budget.as_bytes() - plan.allocated_bytes();
            let extra = spare.checked_div(plan.per_executor_bytes()).unwrap_or(0);
            println!(
                "  Budget {budget}: fits, room for {extra} more executor(s)"
            );
        }
        Err(e) => println!("  Budget {budget}: {e}"),
    }
    println!();
    Ok(())
}
