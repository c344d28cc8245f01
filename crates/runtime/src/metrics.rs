// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Forward-pass profiling metrics.
//!
//! [`ForwardMetrics`] is filled in by the dispatch loop when profiling is
//! enabled in [`RuntimeConfig`](crate::RuntimeConfig).

use crate::{Completion, DmaStats};
use std::time::Duration;

/// Timing for one dispatched operator.
#[derive(Debug, Clone, serde::Serialize)]
pub struct OpMetrics {
    pub index: usize,
    /// Debug name of the operator.
    pub name: String,
    /// Time spent waiting for this operator's weight transfers.
    pub dma_wait: Duration,
    /// Time spent inside the kernel.
    pub compute: Duration,
}

/// Aggregate metrics for one forward pass.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ForwardMetrics {
    pub total_duration: Duration,
    pub total_dma_wait: Duration,
    pub total_compute: Duration,
    pub ops: Vec<OpMetrics>,
    pub dma: DmaStats,
    pub completion: Option<Completion>,
}

impl ForwardMetrics {
    /// Creates an empty metrics container.
    pub fn new(op_count: usize) -> Self {
        Self {
            total_duration: Duration::ZERO,
            total_dma_wait: Duration::ZERO,
            total_compute: Duration::ZERO,
            ops: Vec::with_capacity(op_count),
            dma: DmaStats::default(),
            completion: None,
        }
    }

    pub fn record_op(&mut self, index: usize, name: String, dma_wait: Duration, compute: Duration) {
        self.total_dma_wait += dma_wait;
        self.total_compute += compute;
        self.ops.push(OpMetrics {
            index,
            name,
            dma_wait,
            compute,
        });
    }

    /// Finalises metrics with the wall-clock time, the DMA counters and
    /// how the pass ended.
    pub fn finalise(&mut self, total: Duration, dma: DmaStats, completion: Completion) {
        self.total_duration = total;
        self.dma = dma;
        self.completion = Some(completion);
    }

    /// Slowest operator by compute time.
    pub fn slowest(&self) -> Option<&OpMetrics> {
        self.ops.iter().max_by_key(|m| m.compute)
    }

    /// Returns a human-readable summary suitable for CLI output.
    pub fn summary(&self) -> String {
        let ms = |d: Duration| d.as_secs_f64() * 1000.0;
        let state = match self.completion {
            Some(Completion::Finished) => "finished",
            Some(Completion::Stopped) => "stopped",
            None => "incomplete",
        };
        format!(
            "Forward: {:.3}ms total ({state}), {} ops, {:.3}ms compute, \
             {:.3}ms DMA wait, {} transfers ({:.1} KB)",
            ms(self.total_duration),
            self.ops.len(),
            ms(self.total_compute),
            ms(self.total_dma_wait),
            self.dma.completed,
            self.dma.bytes as f64 / 1024.0,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_metrics() {
        let m = ForwardMetrics::new(3);
        assert!(m.ops.is_empty());
        assert!(m.slowest().is_none());
        assert!(m.summary().contains("incomplete"));
    }

    #[test]
    fn test_record_and_finalise() {
        let mut m = ForwardMetrics::new(2);
        m.record_op(0, "quantize_0".into(), Duration::ZERO, Duration::from_millis(2));
        m.record_op(1, "fc_1".into(), Duration::from_millis(1), Duration::from_millis(5));
        let dma = DmaStats {
            issued: 1,
            completed: 1,
            bytes: 2048,
        };
        m.finalise(Duration::from_millis(9), dma, Completion::Finished);

        assert_eq!(m.ops.len(), 2);
        assert_eq!(m.total_compute, Duration::from_millis(7));
        assert_eq!(m.total_dma_wait, Duration::from_millis(1));
        assert_eq!(m.slowest().unwrap().name, "fc_1");

        let s = m.summary();
        assert!(s.contains("Forward:"));
        assert!(s.contains("2 ops"));
        assert!(s.contains("1 transfers (2.0 KB)"));
        assert!(s.contains("finished"));
    }

    #[test]
    fn test_serialises_to_json() {
        let mut m = ForwardMetrics::new(1);
        m.record_op(0, "relu_0".into(), Duration::ZERO, Duration::from_micros(40));
        m.finalise(Duration::from_micros(50), DmaStats::default(), Completion::Stopped);

        let json = serde_json::to_value(&m).unwrap();
        assert_eq!(json["ops"][0]["name"], "relu_0");
        assert_eq!(json["completion"], "Stopped");
        assert_eq!(json["dma"]["bytes"], 0);
    }
}
