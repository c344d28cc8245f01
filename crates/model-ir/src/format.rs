// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! On-resource record layouts.
//!
//! Every structure here is `#[repr(C)]` plain data read with
//! [`bytemuck::pod_read_unaligned`], so the resource buffer needs no
//! particular alignment. Multi-byte fields use the host's native byte
//! order; a resource is only loadable on a machine of the same endianness
//! as the one that wrote it.
//!
//! ```text
//! ┌──────────────────┐ 0
//! │ ResourceHeader   │ 128 bytes: label, version, crc, platform, offsets
//! ├──────────────────┤ header_size
//! │ memory section   │ header + MemoryRecord[total_count]
//! │ tensor section   │ header + TensorRecord[count]
//! │ scalar section   │ header + f64[count]
//! │ operator section │ header + type names + record stream
//! │ io section       │ header + ids + fixed-width names
//! │ debug section    │ header + one name per operator
//! │ shape section    │ header + scalar graph + pairs + axes
//! │ parameter section│ header + shared weight bytes
//! │ dma section      │ header + DmaRecord[count]
//! └──────────────────┘ total_size (CRC covers header_size..total_size)
//! ```

use bytemuck::{Pod, Zeroable};
use tensor_core::MAX_RANK;

/// Label at the very start of every resource.
pub const RESOURCE_LABEL: [u8; 8] = *b"NPURES\0\0";

/// Format version understood by this crate.
pub const RESOURCE_VERSION: u32 = 1;

/// Platform id meaning "runs anywhere".
pub const PLATFORM_ANY: u32 = 0;

/// Resource header.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct ResourceHeader {
    pub label: [u8; 8],
    pub version: u32,
    /// CRC-32 of `bytes[header_size..total_size]`; 0 disables the check.
    pub crc: u32,
    pub platform: u32,
    pub header_size: u32,
    pub total_size: u64,
    pub memory_offset: u64,
    pub tensor_offset: u64,
    pub scalar_offset: u64,
    pub operator_offset: u64,
    pub io_offset: u64,
    pub debug_offset: u64,
    pub shape_infer_offset: u64,
    pub parameter_offset: u64,
    pub dma_offset: u64,
    pub _padding: [u8; 24],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct MemorySectionHeader {
    /// Leading records that are shared-parameter blocks.
    pub shared_count: u32,
    pub total_count: u32,
    pub elem_size: u32,
    pub header_size: u32,
    pub body_offset: u64,
}

/// One memory block declared by the resource.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct MemoryRecord {
    pub size: u64,
    /// For shared blocks, offset into the parameter section body.
    pub offset: u64,
    pub device: u32,
    pub class: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct TensorSectionHeader {
    pub count: u32,
    pub elem_size: u32,
    pub body_offset: u64,
}

/// One tensor. `dims` is the maximum shape.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct TensorRecord {
    pub mem_class: u8,
    pub device: u8,
    pub dtype: u8,
    pub byte_width: u8,
    pub mem_id: u32,
    pub scale: f32,
    pub zero_point: i32,
    pub rank: u32,
    pub dims: [u32; MAX_RANK],
    /// Byte offset inside the bound memory block.
    pub offset: u64,
    pub layout: u32,
    pub flags: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct ScalarSectionHeader {
    pub count: u32,
    pub elem_size: u32,
    pub body_offset: u64,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct OperatorSectionHeader {
    pub op_count: u32,
    pub type_count: u32,
    pub type_name_len: u32,
    pub _reserved: u32,
    pub type_names_offset: u64,
    pub stream_offset: u64,
    pub stream_size: u64,
}

/// Fixed prefix of every operator record. Offsets are relative to the
/// record start.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct OpRecordHeader {
    pub type_id: u32,
    pub total_size: u32,
    pub attr_offset: u32,
    pub attr_size: u32,
    pub tensor_ids_offset: u32,
    pub scalar_ids_offset: u32,
    pub num_inputs: u16,
    pub num_outputs: u16,
    pub num_temps: u16,
    pub num_scalars: u16,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct IoSectionHeader {
    pub input_count: u32,
    pub output_count: u32,
    pub state_count: u32,
    pub name_len: u32,
    pub ids_offset: u64,
    pub names_offset: u64,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct DebugSectionHeader {
    pub count: u32,
    pub name_len: u32,
    pub body_offset: u64,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct ParameterSectionHeader {
    pub size: u64,
    pub body_offset: u64,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct DmaSectionHeader {
    pub count: u32,
    pub elem_size: u32,
    pub header_size: u32,
    pub _reserved: u32,
    pub body_offset: u64,
}

/// A weight transfer from one tensor to another.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct DmaRecord {
    pub src_device: u32,
    pub dst_device: u32,
    pub src_tensor: u32,
    pub dst_tensor: u32,
    pub size: u64,
}

/// Shape-inference section header. Offsets are relative to the section.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct ShapeInferHeader {
    pub graph_size: u64,
    pub pairs_offset: u64,
    pub axes_offset: u64,
    pub graph_offset: u64,
    pub pair_count: u32,
    pub axis_count: u32,
}

/// Scalar graph blob header. Offsets are relative to the blob.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct ScalarGraphHeader {
    pub num_scalars: u32,
    pub num_inputs: u32,
    pub num_outputs: u32,
    pub num_nodes: u32,
    pub num_operands: u32,
    pub name_len: u32,
    pub inputs_offset: u32,
    pub outputs_offset: u32,
    pub names_offset: u32,
    pub nodes_offset: u32,
    pub opcodes_offset: u32,
    pub operands_offset: u32,
}

/// One scalar graph node: `operands[first..first + count]` → `output`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct NodeMeta {
    pub first_operand: u32,
    pub operand_count: u32,
    pub output: u32,
    pub _reserved: u32,
}

/// Write-back: `tensor.dims[dim_id] = round(register[scalar])`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct DimPair {
    pub scalar: u32,
    pub tensor_id: u32,
    pub dim_id: u32,
}

/// Observation: `register[scalar] = tensor.dims[dim_id]`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct AxisBinding {
    pub tensor_id: u32,
    pub dim_id: u32,
    pub scalar: u32,
}

const _: () = assert!(std::mem::size_of::<ResourceHeader>() == 128);
const _: () = assert!(std::mem::size_of::<MemorySectionHeader>() == 24);
const _: () = assert!(std::mem::size_of::<MemoryRecord>() == 24);
const _: () = assert!(std::mem::size_of::<TensorSectionHeader>() == 16);
const _: () = assert!(std::mem::size_of::<TensorRecord>() == 64);
const _: () = assert!(std::mem::size_of::<ScalarSectionHeader>() == 16);
const _: () = assert!(std::mem::size_of::<OperatorSectionHeader>() == 40);
const _: () = assert!(std::mem::size_of::<OpRecordHeader>() == 32);
const _: () = assert!(std::mem::size_of::<IoSectionHeader>() == 32);
const _: () = assert!(std::mem::size_of::<DebugSectionHeader>() == 16);
const _: () = assert!(std::mem::size_of::<ParameterSectionHeader>() == 16);
const _: () = assert!(std::mem::size_of::<DmaSectionHeader>() == 24);
const _: () = assert!(std::mem::size_of::<DmaRecord>() == 24);
const _: () = assert!(std::mem::size_of::<ShapeInferHeader>() == 40);
const _: () = assert!(std::mem::size_of::<ScalarGraphHeader>() == 48);
const _: () = assert!(std::mem::size_of::<NodeMeta>() == 16);
const _: () = assert!(std::mem::size_of::<DimPair>() == 12);
const _: () = assert!(std::mem::size_of::<AxisBinding>() == 12);

/// Decodes a fixed-width, NUL-padded name.
///
/// The name ends at the first NUL or at the field width, whichever comes
/// first. Non-UTF-8 bytes yield `None`.
pub fn fixed_name(field: &[u8]) -> Option<&str> {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    std::str::from_utf8(&field[..end]).ok()
}

/// Encodes `name` into a NUL-padded field of `width` bytes, truncating
/// at a character boundary if it does not fit.
pub fn encode_fixed_name(name: &str, width: usize) -> Vec<u8> {
    let mut end = name.len().min(width);
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    let mut field = vec![0u8; width];
    field[..end].copy_from_slice(&name.as_bytes()[..end]);
    field
}

/// Reads a native-endian `u32` array element.
pub(crate) fn read_u32(bytes: &[u8], index: usize) -> u32 {
    let start = index * 4;
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&bytes[start..start + 4]);
    u32::from_ne_bytes(raw)
}

/// Reads the `index`-th `T` of a packed record array.
pub(crate) fn read_record<T: Pod>(bytes: &[u8], index: usize) -> T {
    let size = std::mem::size_of::<T>();
    bytemuck::pod_read_unaligned(&bytes[index * size..(index + 1) * size])
}
