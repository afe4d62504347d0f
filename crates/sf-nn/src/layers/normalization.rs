// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralFuse — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use crate::module::{Module, Parameter};
use crate::{PureResult, Tensor, TensorError};

/// Layer normalisation over the channel axis of a `(locations, channels)`
/// grid, with learned affine parameters.
#[derive(Debug)]
pub struct LayerNorm {
    features: usize,
    epsilon: f32,
    gamma: Parameter,
    beta: Parameter,
}

impl LayerNorm {
    /// Builds a new layer normalisation module.
    pub fn new(name: impl Into<String>, features: usize, epsilon: f32) -> PureResult<Self> {
        if features == 0 {
            return Err(TensorError::InvalidDimensions {
                rows: 1,
                cols: features,
            });
        }
        if epsilon <= 0.0 || !epsilon.is_finite() {
            return Err(TensorError::InvalidValue {
                label: "layernorm_epsilon",
            });
        }
        let name = name.into();
        let gamma = Tensor::from_fn(1, features, |_, _| 1.0)?;
        let beta = Tensor::zeros(1, features)?;
        Ok(Self {
            features,
            epsilon,
            gamma: Parameter::new(format!("{name}::gamma"), gamma),
            beta: Parameter::new(format!("{name}::beta"), beta),
        })
    }

    /// Number of channels normalised per location.
    pub fn features(&self) -> usize {
        self.features
    }
}

impl Module for LayerNorm {
    fn forward(&self, input: &Tensor) -> PureResult<Tensor> {
        let (rows, cols) = input.shape();
        if cols != self.features {
            return Err(TensorError::ShapeMismatch {
                left: (rows, cols),
                right: (rows, self.features),
            });
        }
        let gamma = self.gamma.value().data();
        let beta = self.beta.value().data();
        let inv_n = 1.0 / cols as f32;
        let mut out = Vec::with_capacity(rows * cols);
        for row in input.data().chunks(cols) {
            let mean = row.iter().sum::<f32>() * inv_n;
            let var = row.iter().map(|v| (v - mean) * (v - mean)).sum::<f32>() * inv_n;
            let inv_std = 1.0 / (var + self.epsilon).sqrt();
            for ((value, g), b) in row.iter().zip(gamma.iter()).zip(beta.iter()) {
                out.push((value - mean) * inv_std * g + b);
            }
        }
        Tensor::from_vec(rows, cols, out)
    }

    fn visit_parameters(
        &self,
        visitor: &mut dyn FnMut(&Parameter) -> PureResult<()>,
    ) -> PureResult<()> {
        visitor(&self.gamma)?;
        visitor(&self.beta)?;
        Ok(())
    }

    fn visit_parameters_mut(
        &mut self,
        visitor: &mut dyn FnMut(&mut Parameter) -> PureResult<()>,
    ) -> PureResult<()> {
        visitor(&mut self.gamma)?;
        visitor(&mut self.beta)?;
        Ok(())
    }
}
