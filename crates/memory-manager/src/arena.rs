// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Bump-allocated arena layouts.
//!
//! A model or executor lives entirely inside one caller-provided region.
//! [`ArenaLayout`] carves that region into named, individually
//! [`ARENA_ALIGN`]-aligned [`Span`]s. The same layout code runs twice:
//! once in the planner to size the region, once in the loader to place
//! the data, so the two can never disagree.

use crate::MemoryError;

/// Alignment of every sub-region.
pub const ARENA_ALIGN: usize = 16;

/// Rounds `n` up to the next multiple of [`ARENA_ALIGN`].
pub const fn align_up(n: usize) -> usize {
    (n + ARENA_ALIGN - 1) & !(ARENA_ALIGN - 1)
}

/// A byte range inside a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub struct Span {
    pub offset: usize,
    pub len: usize,
}

impl Span {
    /// Exclusive end offset.
    pub fn end(&self) -> usize {
        self.offset + self.len
    }

    /// The span as a slice range.
    pub fn range(&self) -> std::ops::Range<usize> {
        self.offset..self.end()
    }

    /// Returns `true` if the two spans share at least one byte.
    pub fn overlaps(&self, other: &Span) -> bool {
        self.len > 0 && other.len > 0 && self.offset < other.end() && other.offset < self.end()
    }

    /// Checks that the span lies inside a region of `region_bytes`.
    pub fn check(&self, region_bytes: usize) -> Result<(), MemoryError> {
        match self.offset.checked_add(self.len) {
            Some(end) if end <= region_bytes => Ok(()),
            _ => Err(MemoryError::OutOfBounds {
                offset: self.offset,
                len: self.len,
                region_bytes,
            }),
        }
    }
}

/// An ordered set of named spans, laid out back to back.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ArenaLayout {
    entries: Vec<(&'static str, Span)>,
    cursor: usize,
}

impl ArenaLayout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserves `len` bytes at the next aligned offset.
    pub fn push(&mut self, name: &'static str, len: usize) -> Span {
        let span = Span {
            offset: self.cursor,
            len,
        };
        self.cursor += align_up(len);
        self.entries.push((name, span));
        span
    }

    /// Reserves room for `count` records of `T`.
    pub fn push_array<T>(&mut self, name: &'static str, count: usize) -> Span {
        self.push(name, count * std::mem::size_of::<T>())
    }

    /// Total bytes the layout needs (sum of aligned sub-region sizes).
    pub fn total_bytes(&self) -> usize {
        self.cursor
    }

    /// Looks up a span by name.
    pub fn get(&self, name: &str) -> Option<Span> {
        self.entries
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, s)| *s)
    }

    /// Iterates over `(name, span)` pairs in placement order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, Span)> + '_ {
        self.entries.iter().copied()
    }
}
