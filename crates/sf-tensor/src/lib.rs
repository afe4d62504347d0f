// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralFuse — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Dense row-major `f32` tensors for the SpiralFuse inference stack.
//!
//! Everything here is safe Rust with no native bindings: the goal is a
//! pragmatic 2D tensor that carries per-location embedding grids and spatial
//! anomaly maps through the fusion pipeline without pulling in a full
//! deep-learning framework.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use rayon::prelude::*;
use thiserror::Error;

/// Result alias used throughout the tensor and module crates.
pub type PureResult<T> = Result<T, TensorError>;

/// Errors emitted by tensor construction and arithmetic.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum TensorError {
    /// A constructor received a zero-sized shape.
    #[error("invalid tensor dimensions {rows}x{cols}")]
    InvalidDimensions { rows: usize, cols: usize },
    /// Data provided to a constructor does not match the declared shape.
    #[error("data length mismatch: expected {expected} values, got {got}")]
    DataLength { expected: usize, got: usize },
    /// An operator was asked to combine tensors of incompatible shapes.
    #[error("shape mismatch between {left:?} and {right:?}")]
    ShapeMismatch {
        left: (usize, usize),
        right: (usize, usize),
    },
    /// A scalar argument was outside its legal range.
    #[error("invalid value for {label}")]
    InvalidValue { label: &'static str },
    /// A state dict is missing a parameter the module expects.
    #[error("missing parameter `{name}` in state dict")]
    MissingParameter { name: String },
    /// A state dict carries a parameter the module does not own.
    #[error("unexpected parameter `{name}` in state dict")]
    UnexpectedParameter { name: String },
    /// Wrapper around I/O failures when persisting or restoring tensors.
    #[error("tensor i/o failure: {message}")]
    Io { message: String },
    /// Wrapper around serde failures when (de)serialising snapshots.
    #[error("tensor serialization failure: {message}")]
    Serialization { message: String },
}

/// Two-dimensional row-major tensor of `f32` values.
#[derive(Clone, Debug, PartialEq)]
pub struct Tensor {
    data: Vec<f32>,
    rows: usize,
    cols: usize,
}

impl Tensor {
    /// Creates a tensor filled with zeros.
    pub fn zeros(rows: usize, cols: usize) -> PureResult<Self> {
        if rows == 0 || cols == 0 {
            return Err(TensorError::InvalidDimensions { rows, cols });
        }
        Ok(Self {
            data: vec![0.0; rows * cols],
            rows,
            cols,
        })
    }

    /// Builds a tensor from a row-major buffer.
    pub fn from_vec(rows: usize, cols: usize, data: Vec<f32>) -> PureResult<Self> {
        if rows == 0 || cols == 0 {
            return Err(TensorError::InvalidDimensions { rows, cols });
        }
        let expected = rows * cols;
        if data.len() != expected {
            return Err(TensorError::DataLength {
                expected,
                got: data.len(),
            });
        }
        Ok(Self { data, rows, cols })
    }

    /// Builds a tensor by evaluating `f` at every `(row, col)` index.
    pub fn from_fn<F>(rows: usize, cols: usize, mut f: F) -> PureResult<Self>
    where
        F: FnMut(usize, usize) -> f32,
    {
        if rows == 0 || cols == 0 {
            return Err(TensorError::InvalidDimensions { rows, cols });
        }
        let mut data = Vec::with_capacity(rows * cols);
        for r in 0..rows {
            for c in 0..cols {
                data.push(f(r, c));
            }
        }
        Ok(Self { data, rows, cols })
    }

    /// Samples a tensor from a normal distribution, optionally seeded for
    /// reproducible parameter initialisation.
    pub fn random_normal(
        rows: usize,
        cols: usize,
        mean: f32,
        std: f32,
        seed: Option<u64>,
    ) -> PureResult<Self> {
        if rows == 0 || cols == 0 {
            return Err(TensorError::InvalidDimensions { rows, cols });
        }
        if std <= 0.0 || !std.is_finite() {
            return Err(TensorError::InvalidValue {
                label: "random_normal_std",
            });
        }
        let mut rng = match seed {
            Some(value) => StdRng::seed_from_u64(value),
            None => StdRng::from_entropy(),
        };
        let mut data = Vec::with_capacity(rows * cols);
        for _ in 0..rows * cols {
            let sample: f32 = rng.sample(StandardNormal);
            data.push(mean + std * sample);
        }
        Ok(Self { data, rows, cols })
    }

    /// Returns the `(rows, cols)` shape.
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// Number of stored values.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` when the tensor holds no values. Constructors reject
    /// zero-sized shapes, so this only exists to satisfy the usual pairing.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Immutable view of the row-major buffer.
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Mutable view of the row-major buffer.
    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Immutable view of a single row.
    pub fn row(&self, index: usize) -> PureResult<&[f32]> {
        if index >= self.rows {
            return Err(TensorError::InvalidValue { label: "row_index" });
        }
        let start = index * self.cols;
        Ok(&self.data[start..start + self.cols])
    }

    /// Matrix product `self @ other`, parallelised over output rows.
    pub fn matmul(&self, other: &Tensor) -> PureResult<Tensor> {
        if self.cols != other.rows {
            return Err(TensorError::ShapeMismatch {
                left: self.shape(),
                right: other.shape(),
            });
        }
        let (m, k) = (self.rows, self.cols);
        let n = other.cols;
        let mut out = vec![0.0f32; m * n];
        out.par_chunks_mut(n).enumerate().for_each(|(r, out_row)| {
            let lhs_row = &self.data[r * k..(r + 1) * k];
            for (idx, &lhs) in lhs_row.iter().enumerate() {
                if lhs == 0.0 {
                    continue;
                }
                let rhs_row = &other.data[idx * n..(idx + 1) * n];
                for (dst, &rhs) in out_row.iter_mut().zip(rhs_row.iter()) {
                    *dst += lhs * rhs;
                }
            }
        });
        Tensor::from_vec(m, n, out)
    }

    /// Element-wise sum.
    pub fn add(&self, other: &Tensor) -> PureResult<Tensor> {
        self.zip_with(other, |a, b| a + b)
    }

    /// Element-wise difference.
    pub fn sub(&self, other: &Tensor) -> PureResult<Tensor> {
        self.zip_with(other, |a, b| a - b)
    }

    /// Element-wise product.
    pub fn hadamard(&self, other: &Tensor) -> PureResult<Tensor> {
        self.zip_with(other, |a, b| a * b)
    }

    /// Multiplies every value by a scalar.
    pub fn scale(&self, value: f32) -> PureResult<Tensor> {
        let data = self.data.iter().map(|v| v * value).collect();
        Tensor::from_vec(self.rows, self.cols, data)
    }

    /// Adds a bias row to every row in place.
    pub fn add_row_inplace(&mut self, bias: &[f32]) -> PureResult<()> {
        if bias.len() != self.cols {
            return Err(TensorError::DataLength {
                expected: self.cols,
                got: bias.len(),
            });
        }
        for row in self.data.chunks_mut(self.cols) {
            for (value, b) in row.iter_mut().zip(bias.iter()) {
                *value += b;
            }
        }
        Ok(())
    }

    /// Returns the transposed tensor.
    pub fn transpose(&self) -> Tensor {
        let mut data = vec![0.0f32; self.data.len()];
        for r in 0..self.rows {
            for c in 0..self.cols {
                data[c * self.rows + r] = self.data[r * self.cols + c];
            }
        }
        Tensor {
            data,
            rows: self.cols,
            cols: self.rows,
        }
    }

    /// Concatenates two tensors along the column axis. Rows must agree; this
    /// is the channel-wise join used before crossmodal fusion.
    pub fn concat_cols(&self, other: &Tensor) -> PureResult<Tensor> {
        if self.rows != other.rows {
            return Err(TensorError::ShapeMismatch {
                left: self.shape(),
                right: other.shape(),
            });
        }
        let cols = self.cols + other.cols;
        let mut data = Vec::with_capacity(self.rows * cols);
        for r in 0..self.rows {
            data.extend_from_slice(&self.data[r * self.cols..(r + 1) * self.cols]);
            data.extend_from_slice(&other.data[r * other.cols..(r + 1) * other.cols]);
        }
        Tensor::from_vec(self.rows, cols, data)
    }

    /// Applies `f` to every value, yielding a new tensor.
    pub fn map<F>(&self, f: F) -> Tensor
    where
        F: Fn(f32) -> f32,
    {
        Tensor {
            data: self.data.iter().map(|&v| f(v)).collect(),
            rows: self.rows,
            cols: self.cols,
        }
    }

    fn zip_with<F>(&self, other: &Tensor, f: F) -> PureResult<Tensor>
    where
        F: Fn(f32, f32) -> f32,
    {
        if self.shape() != other.shape() {
            return Err(TensorError::ShapeMismatch {
                left: self.shape(),
                right: other.shape(),
            });
        }
        let data = self
            .data
            .iter()
            .zip(other.data.iter())
            .map(|(&a, &b)| f(a, b))
            .collect();
        Tensor::from_vec(self.rows, self.cols, data)
    }
}
