// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The scalar shape-inference graph.
//!
//! Dynamic axis sizes are computed by a tiny interpreter over a file of
//! `f64` registers. Each node folds its operand registers with one
//! [`Opcode`] and writes one output register:
//!
//! ```text
//!   seed ──► registers ──► node 0 ──► node 1 ──► … ──► write-back
//!   (by name or by          (stream order is a         round(x) into
//!    observed tensor dims)   topological order)        tensor dims
//! ```
//!
//! [`ScalarGraph::parse`] verifies the blob once: register indices in
//! range, operand arity per opcode, and that no node reads a register
//! first produced by itself or a later node. After that the graph is
//! trusted and [`ScalarGraph::evaluate`] runs without checks.

use crate::format::{fixed_name, read_record, read_u32, NodeMeta, ScalarGraphHeader};
use crate::{ResourceError, ShapeError};
use std::mem::size_of;

/// Node operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Opcode {
    Floor,
    Ceil,
    Sqrt,
    Add,
    Mul,
    Div,
    Pow,
    Min,
    Max,
}

impl Opcode {
    pub fn code(self) -> u32 {
        match self {
            Self::Floor => 0,
            Self::Ceil => 1,
            Self::Sqrt => 2,
            Self::Add => 3,
            Self::Mul => 4,
            Self::Div => 5,
            Self::Pow => 6,
            Self::Min => 7,
            Self::Max => 8,
        }
    }

    pub fn from_code(code: u32) -> Option<Self> {
        Some(match code {
            0 => Self::Floor,
            1 => Self::Ceil,
            2 => Self::Sqrt,
            3 => Self::Add,
            4 => Self::Mul,
            5 => Self::Div,
            6 => Self::Pow,
            7 => Self::Min,
            8 => Self::Max,
            _ => return None,
        })
    }

    /// Unary opcodes take exactly one operand; the rest left-fold one or more.
    pub fn is_unary(self) -> bool {
        matches!(self, Self::Floor | Self::Ceil | Self::Sqrt)
    }

    fn apply(self, operands: impl Iterator<Item = f64>) -> f64 {
        let mut operands = operands;
        let Some(first) = operands.next() else {
            panic!("scalar node {self:?} has no operands");
        };
        match self {
            Self::Floor => first.floor(),
            Self::Ceil => first.ceil(),
            Self::Sqrt => first.sqrt(),
            Self::Add => operands.fold(first, |a, b| a + b),
            Self::Mul => operands.fold(first, |a, b| a * b),
            Self::Div => operands.fold(first, |a, b| a / b),
            Self::Pow => operands.fold(first, f64::powf),
            Self::Min => operands.fold(first, f64::min),
            Self::Max => operands.fold(first, f64::max),
        }
    }
}

/// Rounds a register value to a dimension: add 0.5, truncate.
/// Negative and NaN values become 0.
pub fn round_dim(value: f64) -> usize {
    (value + 0.5) as usize
}

/// One decoded node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Node {
    pub op: Opcode,
    pub first_operand: u32,
    pub operand_count: u32,
    pub output: u32,
}

/// A validated view of a scalar graph blob.
#[derive(Debug, Clone, Copy)]
pub struct ScalarGraph<'a> {
    header: ScalarGraphHeader,
    bytes: &'a [u8],
}

fn invalid(detail: String) -> ResourceError {
    ResourceError::InvalidData(format!("scalar graph: {detail}"))
}

impl<'a> ScalarGraph<'a> {
    /// A graph with no registers or nodes.
    pub fn empty() -> ScalarGraph<'static> {
        ScalarGraph {
            header: bytemuck::Zeroable::zeroed(),
            bytes: &[],
        }
    }

    /// Validates a graph blob. An empty blob is the empty graph.
    pub fn parse(bytes: &'a [u8]) -> Result<Self, ResourceError> {
        if bytes.is_empty() {
            return Ok(ScalarGraph {
                header: bytemuck::Zeroable::zeroed(),
                bytes,
            });
        }
        let header_len = size_of::<ScalarGraphHeader>();
        if bytes.len() < header_len {
            return Err(invalid(format!("blob of {} bytes has no header", bytes.len())));
        }
        let header: ScalarGraphHeader = bytemuck::pod_read_unaligned(&bytes[..header_len]);
        let h = &header;
        let arrays = [
            ("inputs", h.inputs_offset, u64::from(h.num_inputs) * 4),
            ("outputs", h.outputs_offset, u64::from(h.num_outputs) * 4),
            ("names", h.names_offset, u64::from(h.num_inputs) * u64::from(h.name_len)),
            ("nodes", h.nodes_offset, u64::from(h.num_nodes) * size_of::<NodeMeta>() as u64),
            ("opcodes", h.opcodes_offset, u64::from(h.num_nodes) * 4),
            ("operands", h.operands_offset, u64::from(h.num_operands) * 4),
        ];
        // Offsets are checked even for empty arrays; accessors slice from them.
        for (what, offset, len) in arrays {
            if u64::from(offset) + len > bytes.len() as u64 {
                return Err(invalid(format!(
                    "{what} [{offset}, +{len}) outside blob of {} bytes",
                    bytes.len()
                )));
            }
        }

        let graph = Self { header, bytes };
        let n = h.num_scalars;
        let check_reg = |what: &str, reg: u32| {
            if reg >= n {
                Err(invalid(format!("{what} register {reg} >= {n} scalars")))
            } else {
                Ok(())
            }
        };
        for i in 0..graph.num_inputs() {
            check_reg("input", graph.input_register(i))?;
            if fixed_name(graph.input_name_field(i)).is_none() {
                return Err(invalid(format!("input {i} name is not UTF-8")));
            }
        }
        for i in 0..graph.num_outputs() {
            check_reg("output", graph.output_register(i))?;
        }

        let mut first_writer: Vec<Option<usize>> = vec![None; n as usize];
        let mut nodes = Vec::with_capacity(graph.num_nodes());
        for i in 0..graph.num_nodes() {
            let meta: NodeMeta = read_record(graph.array(h.nodes_offset), i);
            let code = read_u32(graph.array(h.opcodes_offset), i);
            let op = Opcode::from_code(code)
                .ok_or_else(|| invalid(format!("node {i} has unknown opcode {code}")))?;
            let arity_ok = if op.is_unary() {
                meta.operand_count == 1
            } else {
                meta.operand_count >= 1
            };
            if !arity_ok {
                return Err(invalid(format!(
                    "node {i} ({op:?}) has {} operands",
                    meta.operand_count
                )));
            }
            let end = u64::from(meta.first_operand) + u64::from(meta.operand_count);
            if end > u64::from(h.num_operands) {
                return Err(invalid(format!("node {i} operands end at {end}")));
            }
            check_reg("node output", meta.output)?;
            first_writer[meta.output as usize].get_or_insert(i);
            nodes.push(meta);
        }
        for (i, meta) in nodes.iter().enumerate() {
            for k in meta.first_operand..meta.first_operand + meta.operand_count {
                let reg = graph.operand(k as usize);
                check_reg("operand", reg)?;
                if let Some(writer) = first_writer[reg as usize] {
                    if writer >= i {
                        return Err(invalid(format!(
                            "node {i} reads register {reg} before node {writer} writes it"
                        )));
                    }
                }
            }
        }
        Ok(graph)
    }

    fn array(&self, offset: u32) -> &'a [u8] {
        &self.bytes[offset as usize..]
    }

    pub fn header(&self) -> &ScalarGraphHeader {
        &self.header
    }

    pub fn num_scalars(&self) -> usize {
        self.header.num_scalars as usize
    }

    pub fn num_inputs(&self) -> usize {
        self.header.num_inputs as usize
    }

    pub fn num_outputs(&self) -> usize {
        self.header.num_outputs as usize
    }

    pub fn num_nodes(&self) -> usize {
        self.header.num_nodes as usize
    }

    pub fn input_register(&self, i: usize) -> u32 {
        read_u32(self.array(self.header.inputs_offset), i)
    }

    pub fn output_register(&self, i: usize) -> u32 {
        read_u32(self.array(self.header.outputs_offset), i)
    }

    fn input_name_field(&self, i: usize) -> &'a [u8] {
        let width = self.header.name_len as usize;
        let start = self.header.names_offset as usize + i * width;
        &self.bytes[start..start + width]
    }

    /// Name of graph input `i`.
    pub fn input_name(&self, i: usize) -> &'a str {
        fixed_name(self.input_name_field(i)).unwrap_or_default()
    }

    fn operand(&self, k: usize) -> u32 {
        read_u32(self.array(self.header.operands_offset), k)
    }

    pub fn node(&self, i: usize) -> Node {
        let meta: NodeMeta = read_record(self.array(self.header.nodes_offset), i);
        let code = read_u32(self.array(self.header.opcodes_offset), i);
        let Some(op) = Opcode::from_code(code) else {
            panic!("scalar node {i} has opcode {code} that escaped validation");
        };
        Node {
            op,
            first_operand: meta.first_operand,
            operand_count: meta.operand_count,
            output: meta.output,
        }
    }

    /// Seeds input registers from caller-supplied `(name, size)` pairs.
    ///
    /// # Errors
    /// [`ShapeError::UnknownAxis`] if a name matches no graph input.
    pub fn seed_by_name(
        &self,
        registers: &mut [f64],
        names: &[&str],
        sizes: &[usize],
    ) -> Result<(), ShapeError> {
        if names.len() != sizes.len() {
            return Err(ShapeError::ArityMismatch {
                names: names.len(),
                sizes: sizes.len(),
            });
        }
        for (name, &size) in names.iter().zip(sizes) {
            let slot = (0..self.num_inputs())
                .find(|&i| self.input_name(i) == *name)
                .ok_or_else(|| ShapeError::UnknownAxis((*name).to_string()))?;
            let reg = self.input_register(slot);
            *register_mut(registers, reg)? = size as f64;
        }
        Ok(())
    }

    /// Seeds registers from observed tensor dimensions.
    ///
    /// Several observations of one register must agree exactly.
    pub fn seed_observed(
        &self,
        registers: &mut [f64],
        observations: impl IntoIterator<Item = (u32, f64)>,
    ) -> Result<(), ShapeError> {
        let mut seen: Vec<Option<f64>> = vec![None; registers.len()];
        for (reg, value) in observations {
            let slot = register_mut(registers, reg)?;
            match seen[reg as usize] {
                Some(first) if first != value => {
                    return Err(ShapeError::InconsistentAxis {
                        scalar: reg,
                        first,
                        second: value,
                    });
                }
                _ => {
                    seen[reg as usize] = Some(value);
                    *slot = value;
                }
            }
        }
        Ok(())
    }

    /// Runs every node once, in stream order.
    ///
    /// # Panics
    /// Panics if `registers` is shorter than `num_scalars()`.
    pub fn evaluate(&self, registers: &mut [f64]) {
        assert!(
            registers.len() >= self.num_scalars(),
            "register file of {} for {} scalars",
            registers.len(),
            self.num_scalars()
        );
        for i in 0..self.num_nodes() {
            let node = self.node(i);
            let first = node.first_operand as usize;
            let regs = &*registers;
            let value = node.op.apply(
                (first..first + node.operand_count as usize)
                    .map(|k| regs[self.operand(k) as usize]),
            );
            registers[node.output as usize] = value;
        }
    }
}

fn register_mut(registers: &mut [f64], reg: u32) -> Result<&mut f64, ShapeError> {
    let len = registers.len();
    registers
        .get_mut(reg as usize)
        .ok_or(ShapeError::RegisterOutOfRange { index: reg, len })
}

/// Serializes a scalar graph. Used by the resource builder.
#[derive(Debug, Clone, Default)]
pub(crate) struct GraphEncoder {
    pub num_scalars: u32,
    pub inputs: Vec<(u32, String)>,
    pub outputs: Vec<u32>,
    pub nodes: Vec<(Opcode, Vec<u32>, u32)>,
    pub name_len: u32,
}

impl GraphEncoder {
    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty() && self.nodes.is_empty() && self.outputs.is_empty()
    }

    pub fn encode(&self) -> Vec<u8> {
        let header_len = size_of::<ScalarGraphHeader>();
        let num_operands: usize = self.nodes.iter().map(|(_, ops, _)| ops.len()).sum();
        let name_len = self.name_len as usize;

        let inputs_offset = header_len;
        let outputs_offset = inputs_offset + self.inputs.len() * 4;
        let names_offset = outputs_offset + self.outputs.len() * 4;
        let nodes_offset = (names_offset + self.inputs.len() * name_len).div_ceil(16) * 16;
        let opcodes_offset = nodes_offset + self.nodes.len() * size_of::<NodeMeta>();
        let operands_offset = opcodes_offset + self.nodes.len() * 4;
        let total = operands_offset + num_operands * 4;

        let header = ScalarGraphHeader {
            num_scalars: self.num_scalars,
            num_inputs: self.inputs.len() as u32,
            num_outputs: self.outputs.len() as u32,
            num_nodes: self.nodes.len() as u32,
            num_operands: num_operands as u32,
            name_len: self.name_len,
            inputs_offset: inputs_offset as u32,
            outputs_offset: outputs_offset as u32,
            names_offset: names_offset as u32,
            nodes_offset: nodes_offset as u32,
            opcodes_offset: opcodes_offset as u32,
            operands_offset: operands_offset as u32,
        };
        let mut out = Vec::with_capacity(total);
        out.extend_from_slice(bytemuck::bytes_of(&header));
        for (reg, _) in &self.inputs {
            out.extend_from_slice(&reg.to_ne_bytes());
        }
        for reg in &self.outputs {
            out.extend_from_slice(&reg.to_ne_bytes());
        }
        for (_, name) in &self.inputs {
            out.extend(crate::format::encode_fixed_name(name, name_len));
        }
        out.resize(nodes_offset, 0);
        let mut first = 0u32;
        for (_, operands, output) in &self.nodes {
            let meta = NodeMeta {
                first_operand: first,
                operand_count: operands.len() as u32,
                output: *output,
                _reserved: 0,
            };
            out.extend_from_slice(bytemuck::bytes_of(&meta));
            first += operands.len() as u32;
        }
        for (op, _, _) in &self.nodes {
            out.extend_from_slice(&op.code().to_ne_bytes());
        }
        for (_, operands, _) in &self.nodes {
            for reg in operands {
                out.extend_from_slice(&reg.to_ne_bytes());
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// seq = input "seq"; half = ceil(seq / 2); total = seq * 8 + half
    fn sample() -> Vec<u8> {
        GraphEncoder {
            num_scalars: 6,
            inputs: vec![(0, "seq".into())],
            outputs: vec![3, 5],
            nodes: vec![
                (Opcode::Div, vec![0, 1], 2),
                (Opcode::Ceil, vec![2], 3),
                (Opcode::Mul, vec![0, 4], 5),
                (Opcode::Add, vec![5, 3], 5),
            ],
            name_len: 8,
        }
        .encode()
    }

    fn registers() -> Vec<f64> {
        vec![0.0, 2.0, 0.0, 0.0, 8.0, 0.0]
    }

    #[test]
    fn test_evaluate_by_name() {
        let blob = sample();
        let g = ScalarGraph::parse(&blob).unwrap();
        assert_eq!(g.input_name(0), "seq");
        let mut regs = registers();
        g.seed_by_name(&mut regs, &["seq"], &[7]).unwrap();
        g.evaluate(&mut regs);
        assert_eq!(regs[3], 4.0);
        assert_eq!(regs[5], 7.0 * 8.0 + 4.0);
    }

    #[test]
    fn test_unknown_axis_name() {
        let blob = sample();
        let g = ScalarGraph::parse(&blob).unwrap();
        let mut regs = registers();
        assert_eq!(
            g.seed_by_name(&mut regs, &["batch"], &[1]),
            Err(ShapeError::UnknownAxis("batch".into()))
        );
        assert!(matches!(
            g.seed_by_name(&mut regs, &["seq"], &[]),
            Err(ShapeError::ArityMismatch { .. })
        ));
    }

    #[test]
    fn test_observed_must_agree() {
        let blob = sample();
        let g = ScalarGraph::parse(&blob).unwrap();
        let mut regs = registers();
        assert!(g.seed_observed(&mut regs, [(0, 16.0), (0, 16.0)]).is_ok());
        assert_eq!(regs[0], 16.0);
        let err = g.seed_observed(&mut regs, [(0, 16.0), (0, 12.0)]).unwrap_err();
        assert!(matches!(err, ShapeError::InconsistentAxis { scalar: 0, .. }));
        assert!(g.seed_observed(&mut regs, [(99, 1.0)]).is_err());
    }

    #[test]
    fn test_fold_semantics() {
        let vals = || [2.0, 3.0, 2.0].into_iter();
        assert_eq!(Opcode::Pow.apply(vals()), 64.0);
        assert_eq!(Opcode::Div.apply(vals()), 2.0 / 3.0 / 2.0);
        assert_eq!(Opcode::Min.apply(vals()), 2.0);
        assert_eq!(Opcode::Max.apply(vals()), 3.0);
        assert_eq!(Opcode::Sqrt.apply([16.0].into_iter()), 4.0);
        assert_eq!(Opcode::Floor.apply([2.7].into_iter()), 2.0);
    }

    #[test]
    fn test_round_dim() {
        assert_eq!(round_dim(3.49), 3);
        assert_eq!(round_dim(3.5), 4);
        assert_eq!(round_dim(-2.0), 0);
    }

    #[test]
    fn test_rejects_forward_reference() {
        let blob = GraphEncoder {
            num_scalars: 3,
            inputs: vec![],
            outputs: vec![2],
            nodes: vec![(Opcode::Add, vec![1], 2), (Opcode::Floor, vec![0], 1)],
            name_len: 4,
        }
        .encode();
        assert!(ScalarGraph::parse(&blob).is_err());
    }

    #[test]
    fn test_rejects_bad_arity_and_registers() {
        let unary_pair = GraphEncoder {
            num_scalars: 3,
            nodes: vec![(Opcode::Ceil, vec![0, 1], 2)],
            name_len: 4,
            ..Default::default()
        }
        .encode();
        assert!(ScalarGraph::parse(&unary_pair).is_err());

        let out_of_range = GraphEncoder {
            num_scalars: 2,
            nodes: vec![(Opcode::Add, vec![0, 1], 5)],
            name_len: 4,
            ..Default::default()
        }
        .encode();
        assert!(ScalarGraph::parse(&out_of_range).is_err());
    }

    #[test]
    fn test_rejects_offsets_past_blob_for_empty_arrays() {
        let graph = GraphEncoder {
            num_scalars: 2,
            inputs: vec![(0, "n".into())],
            outputs: vec![1],
            nodes: vec![(Opcode::Floor, vec![0], 1)],
            name_len: 0,
        };
        let mut blob = graph.encode();
        assert!(ScalarGraph::parse(&blob).is_ok());

        let mut header: ScalarGraphHeader =
            bytemuck::pod_read_unaligned(&blob[..size_of::<ScalarGraphHeader>()]);
        header.names_offset = blob.len() as u32 + 64;
        blob[..size_of::<ScalarGraphHeader>()].copy_from_slice(bytemuck::bytes_of(&header));
        assert!(matches!(
            ScalarGraph::parse(&blob),
            Err(ResourceError::InvalidData(msg)) if msg.contains("names")
        ));
    }

    #[test]
    fn test_empty_graph() {
        let g = ScalarGraph::parse(&[]).unwrap();
        assert_eq!(g.num_nodes(), 0);
        let mut regs: Vec<f64> = vec![];
        g.evaluate(&mut regs);
        assert_eq!(ScalarGraph::empty().num_scalars(), 0);
    }
}
