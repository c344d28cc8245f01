// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Operator records.
//!
//! The serialized stream packs variable-length records back to back and is
//! walked by each record's `total_size`. Once validated, a record is
//! addressed by index through an offset table; [`OpRecord`] is the view
//! handed to kernels.
//!
//! ```text
//! ┌────────────────┬────────────┬─────────────────────────────┬────────────┐
//! │ OpRecordHeader │ attributes │ tensor ids (in, out, temp)  │ scalar ids │
//! └────────────────┴────────────┴─────────────────────────────┴────────────┘
//! ```

use crate::format::{read_u32, OpRecordHeader};
use crate::ResourceError;
use bytemuck::Pod;

const HEADER_SIZE: usize = std::mem::size_of::<OpRecordHeader>();

/// A validated view of one operator record.
#[derive(Debug, Clone, Copy)]
pub struct OpRecord<'a> {
    header: OpRecordHeader,
    bytes: &'a [u8],
}

impl<'a> OpRecord<'a> {
    /// Validates the record at the start of `bytes`.
    ///
    /// `bytes` may extend past the record; only `total_size` bytes are used.
    pub fn parse(bytes: &'a [u8]) -> Result<Self, ResourceError> {
        if bytes.len() < HEADER_SIZE {
            return Err(ResourceError::InvalidData(format!(
                "operator record truncated: {} bytes left, header needs {HEADER_SIZE}",
                bytes.len()
            )));
        }
        let header: OpRecordHeader = bytemuck::pod_read_unaligned(&bytes[..HEADER_SIZE]);
        let total = header.total_size as usize;
        if total < HEADER_SIZE || total > bytes.len() || total % 4 != 0 {
            return Err(ResourceError::InvalidData(format!(
                "operator record size {total} invalid ({} bytes available)",
                bytes.len()
            )));
        }
        let num_ids = usize::from(header.num_inputs)
            + usize::from(header.num_outputs)
            + usize::from(header.num_temps);
        let ranges = [
            ("attribute", header.attr_offset as usize, header.attr_size as usize),
            ("tensor id", header.tensor_ids_offset as usize, num_ids * 4),
            (
                "scalar id",
                header.scalar_ids_offset as usize,
                usize::from(header.num_scalars) * 4,
            ),
        ];
        for (what, offset, len) in ranges {
            if len > 0 && (offset < HEADER_SIZE || offset + len > total) {
                return Err(ResourceError::InvalidData(format!(
                    "operator {what} block [{offset}, +{len}) outside record of {total} bytes"
                )));
            }
        }
        Ok(Self {
            header,
            bytes: &bytes[..total],
        })
    }

    pub fn header(&self) -> &OpRecordHeader {
        &self.header
    }

    /// Index into the resource's operator type table.
    pub fn type_id(&self) -> u32 {
        self.header.type_id
    }

    /// Serialized size in bytes.
    pub fn total_size(&self) -> usize {
        self.bytes.len()
    }

    /// Raw attribute block.
    pub fn attrs(&self) -> &'a [u8] {
        let start = self.header.attr_offset as usize;
        &self.bytes[start..start + self.header.attr_size as usize]
    }

    /// Attribute block decoded as `T`, or `None` if it is too short.
    pub fn attrs_as<T: Pod>(&self) -> Option<T> {
        let attrs = self.attrs();
        let size = std::mem::size_of::<T>();
        (attrs.len() >= size).then(|| bytemuck::pod_read_unaligned(&attrs[..size]))
    }

    pub fn num_inputs(&self) -> usize {
        usize::from(self.header.num_inputs)
    }

    pub fn num_outputs(&self) -> usize {
        usize::from(self.header.num_outputs)
    }

    pub fn num_temps(&self) -> usize {
        usize::from(self.header.num_temps)
    }

    pub fn num_scalars(&self) -> usize {
        usize::from(self.header.num_scalars)
    }

    /// Total number of tensor ids (inputs, outputs, temporaries).
    pub fn num_tensors(&self) -> usize {
        self.num_inputs() + self.num_outputs() + self.num_temps()
    }

    /// The `i`-th tensor id across inputs, outputs and temporaries.
    ///
    /// # Panics
    /// Panics if `i >= num_tensors()`.
    pub fn tensor_id(&self, i: usize) -> u32 {
        assert!(i < self.num_tensors(), "tensor slot {i} out of range");
        read_u32(&self.bytes[self.header.tensor_ids_offset as usize..], i)
    }

    pub fn input(&self, i: usize) -> Option<u32> {
        (i < self.num_inputs()).then(|| self.tensor_id(i))
    }

    pub fn output(&self, i: usize) -> Option<u32> {
        (i < self.num_outputs()).then(|| self.tensor_id(self.num_inputs() + i))
    }

    pub fn temp(&self, i: usize) -> Option<u32> {
        (i < self.num_temps()).then(|| self.tensor_id(self.num_inputs() + self.num_outputs() + i))
    }

    /// All tensor ids in slot order.
    pub fn tensor_ids(&self) -> impl Iterator<Item = u32> + '_ {
        (0..self.num_tensors()).map(move |i| self.tensor_id(i))
    }

    /// The `i`-th scalar register id.
    pub fn scalar_id(&self, i: usize) -> Option<u32> {
        (i < self.num_scalars())
            .then(|| read_u32(&self.bytes[self.header.scalar_ids_offset as usize..], i))
    }

    pub fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }
}

/// Splits a serialized stream into per-record byte offsets.
///
/// Fails if the stream does not hold exactly `op_count` well-formed records.
pub fn index_stream(stream: &[u8], op_count: usize) -> Result<Vec<u32>, ResourceError> {
    let mut offsets = Vec::with_capacity(op_count);
    let mut cursor = 0usize;
    for _ in 0..op_count {
        let record = OpRecord::parse(&stream[cursor..])?;
        offsets.push(cursor as u32);
        cursor += record.total_size();
    }
    if cursor != stream.len() {
        return Err(ResourceError::InvalidData(format!(
            "operator stream holds {} trailing bytes after {op_count} records",
            stream.len() - cursor
        )));
    }
    Ok(offsets)
}

/// Serializes one operator record. Used by the resource builder.
pub(crate) fn encode_record(
    type_id: u32,
    attrs: &[u8],
    inputs: &[u32],
    outputs: &[u32],
    temps: &[u32],
    scalars: &[u32],
) -> Vec<u8> {
    let attr_offset = HEADER_SIZE;
    let attr_padded = attrs.len().div_ceil(4) * 4;
    let ids_offset = attr_offset + attr_padded;
    let num_ids = inputs.len() + outputs.len() + temps.len();
    let scalars_offset = ids_offset + num_ids * 4;
    let total = scalars_offset + scalars.len() * 4;

    let header = OpRecordHeader {
        type_id,
        total_size: total as u32,
        attr_offset: attr_offset as u32,
        attr_size: attrs.len() as u32,
        tensor_ids_offset: ids_offset as u32,
        scalar_ids_offset: scalars_offset as u32,
        num_inputs: inputs.len() as u16,
        num_outputs: outputs.len() as u16,
        num_temps: temps.len() as u16,
        num_scalars: scalars.len() as u16,
    };
    let mut out = Vec::with_capacity(total);
    out.extend_from_slice(bytemuck::bytes_of(&header));
    out.extend_from_slice(attrs);
    out.resize(ids_offset, 0);
    for id in inputs.iter().chain(outputs).chain(temps).chain(scalars) {
        out.extend_from_slice(&id.to_ne_bytes());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_accessors() {
        let bytes = encode_record(3, &[1, 2, 3], &[0, 1], &[2], &[5], &[7, 8]);
        let rec = OpRecord::parse(&bytes).unwrap();
        assert_eq!(rec.type_id(), 3);
        assert_eq!(rec.attrs(), &[1, 2, 3]);
        assert_eq!(rec.input(1), Some(1));
        assert_eq!(rec.input(2), None);
        assert_eq!(rec.output(0), Some(2));
        assert_eq!(rec.temp(0), Some(5));
        assert_eq!(rec.scalar_id(1), Some(8));
        assert_eq!(rec.tensor_ids().collect::<Vec<_>>(), vec![0, 1, 2, 5]);
        assert_eq!(rec.total_size(), bytes.len());
    }

    #[test]
    fn test_attrs_as() {
        let attrs = 2.5f32.to_ne_bytes();
        let bytes = encode_record(0, &attrs, &[0], &[1], &[], &[]);
        let rec = OpRecord::parse(&bytes).unwrap();
        assert_eq!(rec.attrs_as::<f32>(), Some(2.5));
        assert_eq!(rec.attrs_as::<u64>(), None);
    }

    #[test]
    fn test_truncated_record_is_rejected() {
        let bytes = encode_record(0, &[], &[0], &[1], &[], &[]);
        assert!(OpRecord::parse(&bytes[..bytes.len() - 4]).is_err());
        assert!(OpRecord::parse(&bytes[..10]).is_err());
    }

    #[test]
    fn test_index_stream() {
        let mut stream = encode_record(0, &[], &[0], &[1], &[], &[]);
        let second = stream.len() as u32;
        stream.extend(encode_record(1, &[9; 8], &[1], &[2], &[], &[]));
        assert_eq!(index_stream(&stream, 2).unwrap(), vec![0, second]);
        assert!(index_stream(&stream, 1).is_err());
        assert!(index_stream(&stream, 3).is_err());
    }
}
