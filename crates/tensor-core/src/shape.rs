// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Tensor shape descriptors and dimension utilities.
//!
//! The accelerator supports at most [`MAX_RANK`] dimensions, so a
//! [`Shape`] is a fixed-capacity, `Copy` value rather than a heap vector.
//! Shapes are patched in place by the shape-inference engine, which is
//! why a few mutating accessors exist.

use crate::{DType, TensorError};
use std::fmt;

/// Maximum number of dimensions a tensor may have.
pub const MAX_RANK: usize = 7;

/// Describes the dimensionality of a tensor.
#[derive(Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Shape {
    rank: u8,
    dims: [usize; MAX_RANK],
}

impl Shape {
    /// Creates a new shape from the given dimensions.
    ///
    /// # Examples
    /// ```
    /// use tensor_core::Shape;
    /// let s = Shape::new(&[2, 3, 4]).unwrap();
    /// assert_eq!(s.rank(), 3);
    /// assert_eq!(s.num_elements(), 24);
    /// ```
    ///
    /// # Errors
    /// Returns [`TensorError::RankTooLarge`] for more than [`MAX_RANK`] dims.
    pub fn new(dims: &[usize]) -> Result<Self, TensorError> {
        if dims.len() > MAX_RANK {
            return Err(TensorError::RankTooLarge {
                rank: dims.len(),
                max: MAX_RANK,
            });
        }
        let mut out = [0usize; MAX_RANK];
        out[..dims.len()].copy_from_slice(dims);
        Ok(Self {
            rank: dims.len() as u8,
            dims: out,
        })
    }

    /// Creates a shape from on-resource `u32` dimensions.
    pub fn from_u32(dims: &[u32]) -> Result<Self, TensorError> {
        let widened: Vec<usize> = dims.iter().map(|&d| d as usize).collect();
        Self::new(&widened)
    }

    /// Creates a scalar shape (rank 0).
    pub fn scalar() -> Self {
        Self {
            rank: 0,
            dims: [0; MAX_RANK],
        }
    }

    /// Creates a 1-D shape.
    pub fn vector(len: usize) -> Self {
        let mut dims = [0; MAX_RANK];
        dims[0] = len;
        Self { rank: 1, dims }
    }

    /// Creates a 2-D shape (matrix).
    pub fn matrix(rows: usize, cols: usize) -> Self {
        let mut dims = [0; MAX_RANK];
        dims[0] = rows;
        dims[1] = cols;
        Self { rank: 2, dims }
    }

    /// Returns the number of dimensions (rank).
    pub fn rank(&self) -> usize {
        self.rank as usize
    }

    /// Returns the total number of elements.
    ///
    /// For a scalar shape (rank 0), returns 1.
    pub fn num_elements(&self) -> usize {
        self.dims().iter().product()
    }

    /// Returns the dimensions as a slice.
    pub fn dims(&self) -> &[usize] {
        &self.dims[..self.rank()]
    }

    /// Returns the size of a specific dimension, or `None` if out of bounds.
    pub fn dim(&self, index: usize) -> Option<usize> {
        self.dims().get(index).copied()
    }

    /// Overwrites one dimension. Returns `false` if `index >= rank`.
    pub fn set_dim(&mut self, index: usize, value: usize) -> bool {
        if index >= self.rank() {
            return false;
        }
        self.dims[index] = value;
        true
    }

    /// Returns the innermost dimension, or 1 for a scalar.
    pub fn last_dim(&self) -> usize {
        self.dims().last().copied().unwrap_or(1)
    }

    /// Computes the memory footprint in bytes for a given [`DType`].
    pub fn size_bytes(&self, dtype: DType) -> usize {
        self.num_elements() * dtype.size_bytes()
    }

    /// Computes row-major (C-order) strides for this shape.
    pub fn strides(&self) -> Vec<usize> {
        let rank = self.rank();
        if rank == 0 {
            return vec![];
        }
        let dims = self.dims();
        let mut strides = vec![0usize; rank];
        strides[rank - 1] = 1;
        for i in (0..rank - 1).rev() {
            strides[i] = strides[i + 1] * dims[i + 1];
        }
        strides
    }

    /// Returns `true` if `self` has the same rank as `max` and no
    /// dimension larger than the corresponding one in `max`.
    ///
    /// This is the "maximum shape" contract used when binding inputs:
    /// the declared shape of a tensor is an upper bound, not an exact match.
    pub fn fits_within(&self, max: &Shape) -> bool {
        self.rank == max.rank && self.dims().iter().zip(max.dims()).all(|(d, m)| d <= m)
    }

    /// Returns `true` if two shapes are broadcast-compatible.
    ///
    /// Shapes are compatible when, aligning dimensions from the right,
    /// each pair is either equal or one of them is 1.
    pub fn is_broadcast_compatible(&self, other: &Shape) -> bool {
        let a = self.dims();
        let b = other.dims();
        a.iter()
            .rev()
            .zip(b.iter().rev())
            .all(|(&x, &y)| x == y || x == 1 || y == 1)
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, d) in self.dims().iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{d}")?;
        }
        write!(f, "]")
    }
}

impl fmt::Debug for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Shape{self}")
    }
}

impl TryFrom<&[usize]> for Shape {
    type Error = TensorError;

    fn try_from(dims: &[usize]) -> Result<Self, Self::Error> {
        Self::new(dims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_shape() {
        let s = Shape::scalar();
        assert_eq!(s.rank(), 0);
        assert_eq!(s.num_elements(), 1);
        assert!(s.strides().is_empty());
        assert_eq!(s.last_dim(), 1);
    }

    #[test]
    fn test_matrix_shape() {
        let s = Shape::matrix(3, 4);
        assert_eq!(s.rank(), 2);
        assert_eq!(s.num_elements(), 12);
        assert_eq!(s.strides(), vec![4, 1]);
        assert_eq!(s.size_bytes(DType::F32), 48);
    }

    #[test]
    fn test_rank_limit() {
        assert!(Shape::new(&[1; 7]).is_ok());
        let err = Shape::new(&[1; 8]).unwrap_err();
        assert!(matches!(err, TensorError::RankTooLarge { rank: 8, max: 7 }));
    }

    #[test]
    fn test_equality_ignores_unused_slots() {
        let a = Shape::new(&[2, 3]).unwrap();
        assert_eq!(a, Shape::matrix(2, 3));
        assert_ne!(a, Shape::new(&[2, 3, 1]).unwrap());
    }

    #[test]
    fn test_fits_within() {
        let max = Shape::new(&[1, 8, 64, 128]).unwrap();
        assert!(Shape::new(&[1, 8, 32, 128]).unwrap().fits_within(&max));
        assert!(max.fits_within(&max));
        assert!(!Shape::new(&[1, 8, 65, 128]).unwrap().fits_within(&max));
        assert!(!Shape::new(&[8, 64, 128]).unwrap().fits_within(&max));
    }

    #[test]
    fn test_set_dim() {
        let mut s = Shape::matrix(4, 16);
        assert!(s.set_dim(0, 2));
        assert!(!s.set_dim(2, 9));
        assert_eq!(s.dims(), &[2, 16]);
    }

    #[test]
    fn test_broadcast_compatible() {
        let a = Shape::matrix(1, 3);
        assert!(a.is_broadcast_compatible(&Shape::matrix(4, 3)));
        assert!(!a.is_broadcast_compatible(&Shape::matrix(4, 2)));
    }

    #[test]
    fn test_display() {
        let s = Shape::new(&[2, 3, 4]).unwrap();
        assert_eq!(format!("{s}"), "[2, 3, 4]");
        assert_eq!(format!("{s:?}"), "Shape[2, 3, 4]");
    }

    #[test]
    fn test_from_u32() {
        let s = Shape::from_u32(&[1, 8, 64, 128]).unwrap();
        assert_eq!(s.num_elements(), 65536);
    }
}
