// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Per-class region accounting for a [`MemoryPool`](crate::MemoryPool).
//!
//! Each executor holds its own executor-static and runtime-scratch
//! regions while the model holds one model-static and one shape-workspace
//! region, so the interesting numbers are per [`MemoryClass`]: how many
//! regions are live and how high each class peaked.

use crate::MemoryClass;

/// Counters for one memory class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct ClassStats {
    /// Regions handed out.
    pub handed_out: u64,
    /// Regions dropped back to the pool.
    pub returned: u64,
    pub live_bytes: usize,
    pub peak_bytes: usize,
}

impl ClassStats {
    pub fn live_regions(&self) -> u64 {
        self.handed_out - self.returned
    }
}

/// Snapshot of pool activity.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct AllocationStats {
    classes: [ClassStats; MemoryClass::ALL.len()],
    /// Allocations served from the free list.
    pub reused: u64,
    /// Allocations refused because the budget was exhausted.
    pub refused: u64,
    /// High-water mark of live bytes across all classes.
    pub peak_bytes: usize,
}

impl AllocationStats {
    pub fn class(&self, class: MemoryClass) -> &ClassStats {
        &self.classes[class.code() as usize]
    }

    /// Regions handed out over the pool's lifetime.
    pub fn handed_out(&self) -> u64 {
        self.classes.iter().map(|c| c.handed_out).sum()
    }

    pub fn live_regions(&self) -> u64 {
        self.classes.iter().map(ClassStats::live_regions).sum()
    }

    pub(crate) fn record_allocation(
        &mut self,
        class: MemoryClass,
        size: usize,
        reused: bool,
        pool_bytes: usize,
    ) {
        let c = &mut self.classes[class.code() as usize];
        c.handed_out += 1;
        c.live_bytes += size;
        c.peak_bytes = c.peak_bytes.max(c.live_bytes);
        if reused {
            self.reused += 1;
        }
        self.peak_bytes = self.peak_bytes.max(pool_bytes);
    }

    pub(crate) fn record_return(&mut self, class: MemoryClass, size: usize) {
        let c = &mut self.classes[class.code() as usize];
        c.returned += 1;
        c.live_bytes = c.live_bytes.saturating_sub(size);
    }

    pub(crate) fn record_refusal(&mut self) {
        self.refused += 1;
    }

    /// One line per class that has seen traffic.
    pub fn summary(&self) -> String {
        let mut lines = vec![format!(
            "{} regions ({} reused, {} refused), peak {:.1} KB",
            self.handed_out(),
            self.reused,
            self.refused,
            self.peak_bytes as f64 / 1024.0
        )];
        for class in MemoryClass::ALL {
            let c = self.class(class);
            if c.handed_out == 0 {
                continue;
            }
            lines.push(format!(
                "  {class}: {} live of {}, peak {:.1} KB",
                c.live_regions(),
                c.handed_out,
                c.peak_bytes as f64 / 1024.0
            ));
        }
        lines.join("\n")
    }
}
