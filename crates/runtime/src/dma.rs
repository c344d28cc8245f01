// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Weight-streaming DMA channel.
//!
//! The channel is a one-slot pipeline over the executor's transfer list:
//! at most one transfer is in flight, and transfers are issued in
//! declaration order. Issuing only records the transfer; the bytes move
//! when the transfer is waited on, through a [`DmaBackend`]. Nothing can
//! observe the destination between issue and wait, so this behaves like
//! an asynchronous engine under the dispatch ordering rules.

use crate::RuntimeError;
use memory_manager::DeviceType;
use model_ir::DmaRecord;
use tracing::debug;

/// One resolved weight transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct DmaDescriptor {
    pub src_tensor: u32,
    pub dst_tensor: u32,
    pub bytes: usize,
    pub src_device: DeviceType,
    pub dst_device: DeviceType,
}

impl DmaDescriptor {
    pub fn from_record(rec: &DmaRecord) -> Result<Self, RuntimeError> {
        Ok(Self {
            src_tensor: rec.src_tensor,
            dst_tensor: rec.dst_tensor,
            bytes: usize::try_from(rec.size).map_err(|_| {
                RuntimeError::InvalidData(format!("transfer of {} bytes", rec.size))
            })?,
            src_device: DeviceType::from_code(rec.src_device)?,
            dst_device: DeviceType::from_code(rec.dst_device)?,
        })
    }
}

/// Transfer counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct DmaStats {
    pub issued: usize,
    pub completed: usize,
    pub bytes: u64,
}

impl DmaStats {
    /// Counters accumulated since `earlier`.
    pub fn since(&self, earlier: DmaStats) -> DmaStats {
        DmaStats {
            issued: self.issued - earlier.issued,
            completed: self.completed - earlier.completed,
            bytes: self.bytes - earlier.bytes,
        }
    }
}

/// Moves the bytes of one transfer.
pub trait DmaBackend {
    fn transfer(&mut self, desc: &DmaDescriptor) -> Result<(), RuntimeError>;
}

/// One-slot transfer pipeline.
#[derive(Debug)]
pub struct DmaChannel {
    descriptors: Vec<DmaDescriptor>,
    next: usize,
    in_flight: Option<usize>,
    stats: DmaStats,
}

impl DmaChannel {
    pub fn new(descriptors: Vec<DmaDescriptor>) -> Self {
        Self {
            descriptors,
            next: 0,
            in_flight: None,
            stats: DmaStats::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub fn descriptors(&self) -> &[DmaDescriptor] {
        &self.descriptors
    }

    /// Index of the transfer in flight.
    pub fn in_flight(&self) -> Option<usize> {
        self.in_flight
    }

    /// Index of the next transfer to issue.
    pub fn pending(&self) -> Option<usize> {
        (self.next < self.descriptors.len()).then_some(self.next)
    }

    pub fn stats(&self) -> DmaStats {
        self.stats
    }

    /// Issues the next pending transfer if the slot is free.
    ///
    /// Returns the issued index, or `None` when the slot is busy or every
    /// transfer of this pass has been issued.
    pub fn issue_next(&mut self) -> Option<usize> {
        if self.in_flight.is_some() {
            return None;
        }
        let index = self.pending()?;
        self.next += 1;
        self.in_flight = Some(index);
        self.stats.issued += 1;
        debug!(index, bytes = self.descriptors[index].bytes, "dma issued");
        Some(index)
    }

    /// Blocks until the in-flight transfer has completed.
    ///
    /// Returns the completed index, or `None` if nothing was in flight.
    /// The slot is free afterwards even if the backend failed.
    pub fn wait(&mut self, backend: &mut dyn DmaBackend) -> Result<Option<usize>, RuntimeError> {
        let Some(index) = self.in_flight.take() else {
            return Ok(None);
        };
        let desc = self.descriptors[index];
        backend.transfer(&desc)?;
        self.stats.completed += 1;
        self.stats.bytes += desc.bytes as u64;
        debug!(index, bytes = desc.bytes, "dma completed");
        Ok(Some(index))
    }

    /// Waits for the in-flight transfer without issuing another.
    pub fn drain(&mut self, backend: &mut dyn DmaBackend) -> Result<(), RuntimeError> {
        self.wait(backend).map(|_| ())
    }

    /// Starts a new pass from the first transfer.
    ///
    /// # Panics
    /// Panics if a transfer is still in flight.
    pub fn rewind(&mut self) {
        assert!(self.in_flight.is_none(), "rewind with a transfer in flight");
        self.next = 0;
    }

    /// Makes sure every transfer that writes one of `tensors` and sits at
    /// the head of the pipeline has completed.
    ///
    /// Transfers are consumed in order; the first one whose destination is
    /// not in `tensors` stops the scan.
    pub fn complete_for(
        &mut self,
        tensors: &[u32],
        backend: &mut dyn DmaBackend,
    ) -> Result<usize, RuntimeError> {
        let mut completed = 0;
        loop {
            let head = match self.in_flight.or_else(|| self.pending()) {
                Some(index) => index,
                None => return Ok(completed),
            };
            if !tensors.contains(&self.descriptors[head].dst_tensor) {
                return Ok(completed);
            }
            if self.in_flight.is_none() {
                self.issue_next();
            }
            self.wait(backend)?;
            completed += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder(Vec<u32>);

    impl DmaBackend for Recorder {
        fn transfer(&mut self, desc: &DmaDescriptor) -> Result<(), RuntimeError> {
            self.0.push(desc.dst_tensor);
            Ok(())
        }
    }

    fn desc(dst: u32, bytes: usize) -> DmaDescriptor {
        DmaDescriptor {
            src_tensor: 100 + dst,
            dst_tensor: dst,
            bytes,
            src_device: DeviceType::Ddr,
            dst_device: DeviceType::Sram,
        }
    }

    #[test]
    fn test_one_slot() {
        let mut ch = DmaChannel::new(vec![desc(1, 8), desc(2, 8)]);
        assert_eq!(ch.issue_next(), Some(0));
        assert_eq!(ch.issue_next(), None);
        assert_eq!(ch.in_flight(), Some(0));
        assert_eq!(ch.pending(), Some(1));

        let mut rec = Recorder::default();
        assert_eq!(ch.wait(&mut rec).unwrap(), Some(0));
        assert_eq!(ch.issue_next(), Some(1));
        ch.drain(&mut rec).unwrap();
        assert_eq!(ch.issue_next(), None);
        assert_eq!(rec.0, vec![1, 2]);
        assert_eq!(
            ch.stats(),
            DmaStats {
                issued: 2,
                completed: 2,
                bytes: 16
            }
        );
    }

    #[test]
    fn test_wait_without_transfer() {
        let mut ch = DmaChannel::new(vec![]);
        assert!(ch.is_empty());
        assert_eq!(ch.wait(&mut Recorder::default()).unwrap(), None);
    }

    #[test]
    fn test_complete_for_consumes_head_only() {
        let mut ch = DmaChannel::new(vec![desc(1, 4), desc(1, 4), desc(5, 4)]);
        let mut rec = Recorder::default();
        ch.issue_next();
        assert_eq!(ch.complete_for(&[0, 1, 2], &mut rec).unwrap(), 2);
        assert_eq!(ch.in_flight(), None);
        assert_eq!(ch.pending(), Some(2));
        assert_eq!(ch.complete_for(&[3], &mut rec).unwrap(), 0);
        assert_eq!(rec.0, vec![1, 1]);
    }

    #[test]
    fn test_rewind() {
        let mut ch = DmaChannel::new(vec![desc(1, 4)]);
        let mut rec = Recorder::default();
        ch.issue_next();
        ch.drain(&mut rec).unwrap();
        ch.rewind();
        assert_eq!(ch.issue_next(), Some(0));
    }

    #[test]
    fn test_from_record() {
        let rec = DmaRecord {
            src_device: DeviceType::Ddr.code(),
            dst_device: DeviceType::Sram.code(),
            src_tensor: 3,
            dst_tensor: 4,
            size: 256,
        };
        let d = DmaDescriptor::from_record(&rec).unwrap();
        assert_eq!(d.bytes, 256);
        assert_eq!(d.dst_device, DeviceType::Sram);
    }
}
