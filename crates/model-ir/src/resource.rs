// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Validated, zero-copy view over a resource buffer.
//!
//! [`Resource::parse`] checks the header (label, version, declared size,
//! CRC). Section accessors then bounds-check each section as it is read,
//! so a truncated or corrupt resource surfaces as a [`ResourceError`]
//! rather than a panic. Record-size fields that disagree with the compiled
//! record sizes are internal invariant violations and do panic.

use crate::crc::crc32;
use crate::format::{
    fixed_name, read_record, read_u32, AxisBinding, DebugSectionHeader, DimPair, DmaRecord,
    DmaSectionHeader, IoSectionHeader, MemoryRecord, MemorySectionHeader, OperatorSectionHeader,
    ParameterSectionHeader, ResourceHeader, ScalarGraphHeader, ScalarSectionHeader, ShapeInferHeader,
    TensorRecord, TensorSectionHeader, PLATFORM_ANY, RESOURCE_LABEL, RESOURCE_VERSION,
};
use crate::ResourceError;
use bytemuck::Pod;
use std::mem::size_of;
use tracing::debug;

/// Header checks applied by [`Resource::parse_with`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Validation {
    /// Verify a non-zero stored CRC against the body.
    pub verify_crc: bool,
}

impl Default for Validation {
    fn default() -> Self {
        Self { verify_crc: true }
    }
}

/// A resource whose header has been validated.
#[derive(Debug, Clone, Copy)]
pub struct Resource<'r> {
    bytes: &'r [u8],
    header: ResourceHeader,
}

impl<'r> Resource<'r> {
    /// Validates the header with default checks.
    pub fn parse(bytes: &'r [u8]) -> Result<Self, ResourceError> {
        Self::parse_with(bytes, Validation::default())
    }

    /// Validates the header.
    ///
    /// # Errors
    /// - [`ResourceError::Missing`]: empty buffer or wrong label.
    /// - [`ResourceError::Incomplete`]: buffer shorter than the declared size.
    /// - [`ResourceError::UnsupportedVersion`]: unknown format version.
    /// - [`ResourceError::CrcMismatch`]: stored CRC is non-zero and wrong.
    pub fn parse_with(bytes: &'r [u8], validation: Validation) -> Result<Self, ResourceError> {
        if bytes.is_empty() {
            return Err(ResourceError::Missing("empty buffer"));
        }
        let header_len = size_of::<ResourceHeader>();
        if bytes.len() < header_len {
            return Err(ResourceError::Incomplete {
                declared: header_len as u64,
                actual: bytes.len(),
            });
        }
        let header: ResourceHeader = bytemuck::pod_read_unaligned(&bytes[..header_len]);
        if header.label != RESOURCE_LABEL {
            return Err(ResourceError::Missing("bad resource label"));
        }
        if header.version != RESOURCE_VERSION {
            return Err(ResourceError::UnsupportedVersion {
                found: header.version,
                expected: RESOURCE_VERSION,
            });
        }
        assert_eq!(
            header.header_size as usize, header_len,
            "resource header size field disagrees with the compiled header"
        );
        if header.total_size > bytes.len() as u64 {
            return Err(ResourceError::Incomplete {
                declared: header.total_size,
                actual: bytes.len(),
            });
        }
        if header.total_size < header_len as u64 {
            return Err(ResourceError::InvalidData(format!(
                "declared total size {} is smaller than the header",
                header.total_size
            )));
        }
        let bytes = &bytes[..header.total_size as usize];
        if validation.verify_crc && header.crc != 0 {
            let computed = crc32(&bytes[header_len..]);
            if computed != header.crc {
                return Err(ResourceError::CrcMismatch {
                    stored: header.crc,
                    computed,
                });
            }
        }
        debug!(
            total_size = header.total_size,
            platform = header.platform,
            crc = header.crc,
            "resource header validated"
        );
        Ok(Self { bytes, header })
    }

    /// Fails if the resource targets a platform other than `runtime`.
    /// Either side being [`PLATFORM_ANY`] always passes.
    pub fn check_platform(&self, runtime: u32) -> Result<(), ResourceError> {
        let resource = self.header.platform;
        if resource != PLATFORM_ANY && runtime != PLATFORM_ANY && resource != runtime {
            return Err(ResourceError::InvalidPlatform { resource, runtime });
        }
        Ok(())
    }

    pub fn header(&self) -> &ResourceHeader {
        &self.header
    }

    /// The resource bytes, truncated to the declared total size.
    pub fn as_bytes(&self) -> &'r [u8] {
        self.bytes
    }

    pub fn total_size(&self) -> usize {
        self.bytes.len()
    }

    // ── Raw access ────────────────────────────────────────────────

    /// Bounds-checked slice of the resource.
    pub fn slice(&self, what: &'static str, offset: u64, len: u64) -> Result<&'r [u8], ResourceError> {
        let total = self.bytes.len() as u64;
        match offset.checked_add(len) {
            Some(end) if end <= total => Ok(&self.bytes[offset as usize..end as usize]),
            _ => Err(ResourceError::OutOfBounds {
                what,
                offset,
                len,
                total,
            }),
        }
    }

    fn read<T: Pod>(&self, what: &'static str, offset: u64) -> Result<T, ResourceError> {
        let raw = self.slice(what, offset, size_of::<T>() as u64)?;
        Ok(bytemuck::pod_read_unaligned(raw))
    }

    fn mandatory(&self, what: &'static str, offset: u64) -> Result<u64, ResourceError> {
        if offset == 0 {
            return Err(ResourceError::MissingSection(what));
        }
        Ok(offset)
    }

    fn array(
        &self,
        what: &'static str,
        offset: u64,
        count: u64,
        elem: u64,
    ) -> Result<&'r [u8], ResourceError> {
        let len = count.checked_mul(elem).ok_or(ResourceError::OutOfBounds {
            what,
            offset,
            len: u64::MAX,
            total: self.bytes.len() as u64,
        })?;
        self.slice(what, offset, len)
    }

    // ── Memory section ────────────────────────────────────────────

    pub fn memory_section(&self) -> Result<MemorySectionHeader, ResourceError> {
        let offset = self.mandatory("memory", self.header.memory_offset)?;
        let h: MemorySectionHeader = self.read("memory section", offset)?;
        assert_eq!(h.elem_size as usize, size_of::<MemoryRecord>(), "memory record size");
        assert_eq!(
            h.header_size as usize,
            size_of::<MemorySectionHeader>(),
            "memory section header size"
        );
        if h.shared_count > h.total_count {
            return Err(ResourceError::InvalidData(format!(
                "{} shared memory blocks declared but only {} in total",
                h.shared_count, h.total_count
            )));
        }
        Ok(h)
    }

    /// Raw memory record array.
    pub fn memory_records_bytes(&self) -> Result<&'r [u8], ResourceError> {
        let h = self.memory_section()?;
        self.array("memory records", h.body_offset, u64::from(h.total_count), h.elem_size as u64)
    }

    pub fn memory_records(&self) -> Result<Vec<MemoryRecord>, ResourceError> {
        let raw = self.memory_records_bytes()?;
        Ok((0..raw.len() / size_of::<MemoryRecord>())
            .map(|i| read_record(raw, i))
            .collect())
    }

    // ── Tensor section ────────────────────────────────────────────

    pub fn tensor_section(&self) -> Result<TensorSectionHeader, ResourceError> {
        let offset = self.mandatory("tensor", self.header.tensor_offset)?;
        let h: TensorSectionHeader = self.read("tensor section", offset)?;
        assert_eq!(h.elem_size as usize, size_of::<TensorRecord>(), "tensor record size");
        Ok(h)
    }

    pub fn tensor_records_bytes(&self) -> Result<&'r [u8], ResourceError> {
        let h = self.tensor_section()?;
        self.array("tensor records", h.body_offset, u64::from(h.count), h.elem_size as u64)
    }

    pub fn tensor_record(&self, index: u32) -> Result<TensorRecord, ResourceError> {
        let raw = self.tensor_records_bytes()?;
        if index as usize >= raw.len() / size_of::<TensorRecord>() {
            return Err(ResourceError::InvalidData(format!("tensor id {index} out of range")));
        }
        Ok(read_record(raw, index as usize))
    }

    // ── Scalar section ────────────────────────────────────────────

    /// Initial register values; empty when the section is absent.
    pub fn scalar_values(&self) -> Result<Vec<f64>, ResourceError> {
        if self.header.scalar_offset == 0 {
            return Ok(Vec::new());
        }
        let h: ScalarSectionHeader = self.read("scalar section", self.header.scalar_offset)?;
        assert_eq!(h.elem_size as usize, size_of::<f64>(), "scalar element size");
        let raw = self.array("scalar values", h.body_offset, u64::from(h.count), 8)?;
        Ok((0..h.count as usize).map(|i| read_record::<f64>(raw, i)).collect())
    }

    pub fn scalar_count(&self) -> Result<u32, ResourceError> {
        if self.header.scalar_offset == 0 {
            return Ok(0);
        }
        let h: ScalarSectionHeader = self.read("scalar section", self.header.scalar_offset)?;
        Ok(h.count)
    }

    /// Length of the scalar register file: the larger of the scalar
    /// section count and the shape graph's scalar count.
    pub fn register_count(&self) -> Result<u32, ResourceError> {
        let declared = self.scalar_count()?;
        let graph = self.shape_graph_bytes()?;
        let graph_scalars = if graph.len() >= size_of::<ScalarGraphHeader>() {
            let h: ScalarGraphHeader =
                bytemuck::pod_read_unaligned(&graph[..size_of::<ScalarGraphHeader>()]);
            h.num_scalars
        } else {
            0
        };
        Ok(declared.max(graph_scalars))
    }

    // ── Operator section ──────────────────────────────────────────

    pub fn operator_section(&self) -> Result<OperatorSectionHeader, ResourceError> {
        let offset = self.mandatory("operator", self.header.operator_offset)?;
        self.read("operator section", offset)
    }

    /// The fixed-width type name table.
    pub fn type_names_bytes(&self) -> Result<&'r [u8], ResourceError> {
        let h = self.operator_section()?;
        self.array(
            "operator type names",
            h.type_names_offset,
            u64::from(h.type_count),
            u64::from(h.type_name_len),
        )
    }

    /// Name of operator type `type_id`.
    pub fn type_name(&self, type_id: u32) -> Result<&'r str, ResourceError> {
        let h = self.operator_section()?;
        if type_id >= h.type_count {
            return Err(ResourceError::InvalidData(format!(
                "operator type {type_id} out of range ({} types)",
                h.type_count
            )));
        }
        let width = h.type_name_len as usize;
        let table = self.type_names_bytes()?;
        let field = &table[type_id as usize * width..(type_id as usize + 1) * width];
        fixed_name(field).ok_or_else(|| {
            ResourceError::InvalidData(format!("operator type {type_id} name is not UTF-8"))
        })
    }

    /// The packed operator record stream.
    pub fn op_stream(&self) -> Result<&'r [u8], ResourceError> {
        let h = self.operator_section()?;
        self.slice("operator stream", h.stream_offset, h.stream_size)
    }

    // ── IO section ────────────────────────────────────────────────

    pub fn io_section(&self) -> Result<IoSectionHeader, ResourceError> {
        let offset = self.mandatory("io", self.header.io_offset)?;
        self.read("io section", offset)
    }

    fn io_slots(h: &IoSectionHeader) -> u64 {
        u64::from(h.input_count) + u64::from(h.output_count) + u64::from(h.state_count)
    }

    /// Tensor ids: inputs, then outputs, then states.
    pub fn io_ids(&self) -> Result<Vec<u32>, ResourceError> {
        let h = self.io_section()?;
        let raw = self.array("io ids", h.ids_offset, Self::io_slots(&h), 4)?;
        Ok((0..raw.len() / 4).map(|i| read_u32(raw, i)).collect())
    }

    pub fn io_ids_bytes(&self) -> Result<&'r [u8], ResourceError> {
        let h = self.io_section()?;
        self.array("io ids", h.ids_offset, Self::io_slots(&h), 4)
    }

    pub fn io_names_bytes(&self) -> Result<&'r [u8], ResourceError> {
        let h = self.io_section()?;
        self.array("io names", h.names_offset, Self::io_slots(&h), u64::from(h.name_len))
    }

    // ── Debug section ─────────────────────────────────────────────

    pub fn debug_section(&self) -> Result<Option<DebugSectionHeader>, ResourceError> {
        if self.header.debug_offset == 0 {
            return Ok(None);
        }
        self.read("debug section", self.header.debug_offset).map(Some)
    }

    pub fn debug_names_bytes(&self) -> Result<&'r [u8], ResourceError> {
        match self.debug_section()? {
            None => Ok(&[]),
            Some(h) => self.array(
                "debug names",
                h.body_offset,
                u64::from(h.count),
                u64::from(h.name_len),
            ),
        }
    }

    // ── Parameter section ─────────────────────────────────────────

    /// Shared weight bytes; empty when the section is absent.
    pub fn parameters(&self) -> Result<&'r [u8], ResourceError> {
        if self.header.parameter_offset == 0 {
            return Ok(&[]);
        }
        let h: ParameterSectionHeader =
            self.read("parameter section", self.header.parameter_offset)?;
        self.slice("parameters", h.body_offset, h.size)
    }

    /// Absolute resource offset of the parameter body.
    pub fn parameter_base(&self) -> Result<u64, ResourceError> {
        if self.header.parameter_offset == 0 {
            return Ok(0);
        }
        let h: ParameterSectionHeader =
            self.read("parameter section", self.header.parameter_offset)?;
        Ok(h.body_offset)
    }

    // ── DMA section ───────────────────────────────────────────────

    pub fn dma_count(&self) -> Result<u32, ResourceError> {
        Ok(self.dma_section()?.map_or(0, |h| h.count))
    }

    fn dma_section(&self) -> Result<Option<DmaSectionHeader>, ResourceError> {
        if self.header.dma_offset == 0 {
            return Ok(None);
        }
        let h: DmaSectionHeader = self.read("dma section", self.header.dma_offset)?;
        assert_eq!(h.elem_size as usize, size_of::<DmaRecord>(), "dma record size");
        assert_eq!(
            h.header_size as usize,
            size_of::<DmaSectionHeader>(),
            "dma section header size"
        );
        Ok(Some(h))
    }

    pub fn dma_records(&self) -> Result<Vec<DmaRecord>, ResourceError> {
        let Some(h) = self.dma_section()? else {
            return Ok(Vec::new());
        };
        let raw = self.array("dma records", h.body_offset, u64::from(h.count), h.elem_size as u64)?;
        Ok((0..h.count as usize).map(|i| read_record(raw, i)).collect())
    }

    // ── Shape-inference section ───────────────────────────────────

    pub fn shape_section(&self) -> Result<Option<ShapeInferHeader>, ResourceError> {
        if self.header.shape_infer_offset == 0 {
            return Ok(None);
        }
        self.read("shape section", self.header.shape_infer_offset)
            .map(Some)
    }

    fn shape_part(
        &self,
        what: &'static str,
        relative: u64,
        len: u64,
    ) -> Result<&'r [u8], ResourceError> {
        let base = self.header.shape_infer_offset;
        let offset = base.checked_add(relative).ok_or(ResourceError::OutOfBounds {
            what,
            offset: relative,
            len,
            total: self.bytes.len() as u64,
        })?;
        self.slice(what, offset, len)
    }

    /// Scalar graph blob; empty when the section is absent.
    pub fn shape_graph_bytes(&self) -> Result<&'r [u8], ResourceError> {
        match self.shape_section()? {
            None => Ok(&[]),
            Some(h) => self.shape_part("scalar graph", h.graph_offset, h.graph_size),
        }
    }

    /// Write-back pairs as raw bytes.
    pub fn shape_pairs_bytes(&self) -> Result<&'r [u8], ResourceError> {
        match self.shape_section()? {
            None => Ok(&[]),
            Some(h) => self.shape_part(
                "shape pairs",
                h.pairs_offset,
                u64::from(h.pair_count) * size_of::<DimPair>() as u64,
            ),
        }
    }

    /// Axis observations as raw bytes.
    pub fn shape_axes_bytes(&self) -> Result<&'r [u8], ResourceError> {
        match self.shape_section()? {
            None => Ok(&[]),
            Some(h) => self.shape_part(
                "shape axes",
                h.axes_offset,
                u64::from(h.axis_count) * size_of::<AxisBinding>() as u64,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ResourceBuilder;
    use memory_manager::DeviceType;
    use tensor_core::DType;

    fn small() -> Vec<u8> {
        let mut b = ResourceBuilder::new();
        let mem = b.runtime_memory(256, DeviceType::Sram);
        let x = b.tensor(DType::F32, &[4], mem, 0);
        let y = b.tensor(DType::I8, &[4], mem, 64);
        b.operator("Quantize", &[x], &[y], &[], &[], &[]);
        b.input("x", x);
        b.output("y", y);
        b.build()
    }

    #[test]
    fn test_parse_valid() {
        let bytes = small();
        let res = Resource::parse(&bytes).unwrap();
        assert_eq!(res.total_size(), bytes.len());
        assert_eq!(res.tensor_section().unwrap().count, 2);
        assert_eq!(res.type_name(0).unwrap(), "Quantize");
        assert_eq!(res.io_ids().unwrap(), vec![0, 1]);
    }

    #[test]
    fn test_empty_and_bad_label() {
        assert!(matches!(Resource::parse(&[]), Err(ResourceError::Missing(_))));
        let mut bytes = small();
        bytes[0] = b'X';
        assert!(matches!(Resource::parse(&bytes), Err(ResourceError::Missing(_))));
    }

    #[test]
    fn test_truncated_is_incomplete() {
        let bytes = small();
        let err = Resource::parse(&bytes[..bytes.len() - 1]).unwrap_err();
        assert!(matches!(err, ResourceError::Incomplete { .. }));
        let err = Resource::parse(&bytes[..64]).unwrap_err();
        assert!(matches!(err, ResourceError::Incomplete { .. }));
    }

    #[test]
    fn test_crc_mismatch() {
        let mut bytes = small();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        let err = Resource::parse(&bytes).unwrap_err();
        assert!(matches!(err, ResourceError::CrcMismatch { .. }));
        // Skipping verification accepts the same bytes.
        assert!(Resource::parse_with(&bytes, Validation { verify_crc: false }).is_ok());
    }

    #[test]
    fn test_zero_crc_is_unchecked() {
        let mut b = ResourceBuilder::new();
        let mem = b.runtime_memory(16, DeviceType::Sram);
        let t = b.tensor(DType::I8, &[4], mem, 0);
        b.input("t", t);
        b.without_crc();
        let mut bytes = b.build();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        assert!(Resource::parse(&bytes).is_ok());
    }

    #[test]
    fn test_platform_check() {
        let mut b = ResourceBuilder::new();
        let mem = b.runtime_memory(16, DeviceType::Sram);
        let t = b.tensor(DType::I8, &[4], mem, 0);
        b.input("t", t);
        b.platform(7);
        let bytes = b.build();
        let res = Resource::parse(&bytes).unwrap();
        assert!(res.check_platform(7).is_ok());
        assert!(res.check_platform(PLATFORM_ANY).is_ok());
        assert!(matches!(
            res.check_platform(3),
            Err(ResourceError::InvalidPlatform { resource: 7, runtime: 3 })
        ));
    }

    #[test]
    fn test_trailing_bytes_beyond_total_are_ignored() {
        let mut bytes = small();
        let len = bytes.len();
        bytes.extend_from_slice(&[0xAA; 32]);
        let res = Resource::parse(&bytes).unwrap();
        assert_eq!(res.total_size(), len);
    }
}
