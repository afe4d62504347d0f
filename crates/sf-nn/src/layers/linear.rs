// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralFuse — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use crate::module::{InitContext, Module, Parameter};
use crate::{PureResult, Tensor, TensorError};

/// Fully-connected layer with a `(in, out)` weight and a bias row.
#[derive(Debug)]
pub struct Linear {
    weight: Parameter,
    bias: Parameter,
}

impl Linear {
    /// Creates a new linear layer with small normal weights drawn from the
    /// deterministic init context.
    pub fn new(
        name: impl Into<String>,
        input_dim: usize,
        output_dim: usize,
        ctx: &mut InitContext,
    ) -> PureResult<Self> {
        if input_dim == 0 || output_dim == 0 {
            return Err(TensorError::InvalidDimensions {
                rows: input_dim,
                cols: output_dim,
            });
        }
        let name = name.into();
        let weight =
            Tensor::random_normal(input_dim, output_dim, 0.0, 0.02, Some(ctx.next_seed()))?;
        let bias = Tensor::zeros(1, output_dim)?;
        Ok(Self {
            weight: Parameter::new(format!("{name}::weight"), weight),
            bias: Parameter::new(format!("{name}::bias"), bias),
        })
    }

    /// Returns a reference to the weight parameter.
    pub fn weight(&self) -> &Parameter {
        &self.weight
    }

    /// Returns a reference to the bias parameter.
    pub fn bias(&self) -> &Parameter {
        &self.bias
    }

    /// Input width accepted by the layer.
    pub fn input_dim(&self) -> usize {
        self.weight.value().shape().0
    }

    /// Output width produced by the layer.
    pub fn output_dim(&self) -> usize {
        self.weight.value().shape().1
    }
}

impl Module for Linear {
    fn forward(&self, input: &Tensor) -> PureResult<Tensor> {
        if input.shape().1 != self.weight.value().shape().0 {
            return Err(TensorError::ShapeMismatch {
                left: input.shape(),
                right: self.weight.value().shape(),
            });
        }
        let mut out = input.matmul(self.weight.value())?;
        out.add_row_inplace(self.bias.value().data())?;
        Ok(out)
    }

    fn visit_parameters(
        &self,
        visitor: &mut dyn FnMut(&Parameter) -> PureResult<()>,
    ) -> PureResult<()> {
        visitor(&self.weight)?;
        visitor(&self.bias)?;
        Ok(())
    }

    fn visit_parameters_mut(
        &mut self,
        visitor: &mut dyn FnMut(&mut Parameter) -> PureResult<()>,
    ) -> PureResult<()> {
        visitor(&mut self.weight)?;
        visitor(&mut self.bias)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_matches_manual_affine() {
        let mut ctx = InitContext::seeded(1);
        let layer = Linear::new("fc", 3, 2, &mut ctx).unwrap();
        let input = Tensor::from_vec(1, 3, vec![1.0, -2.0, 0.5]).unwrap();
        let output = layer.forward(&input).unwrap();
        let mut expected = input.matmul(layer.weight().value()).unwrap();
        expected.add_row_inplace(layer.bias().value().data()).unwrap();
        assert_eq!(output, expected);
    }

    #[test]
    fn forward_rejects_width_mismatch() {
        let mut ctx = InitContext::seeded(1);
        let layer = Linear::new("fc", 3, 2, &mut ctx).unwrap();
        let input = Tensor::zeros(1, 4).unwrap();
        assert!(matches!(
            layer.forward(&input),
            Err(TensorError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn construction_is_deterministic_per_context() {
        let a = Linear::new("fc", 4, 4, &mut InitContext::seeded(42)).unwrap();
        let b = Linear::new("fc", 4, 4, &mut InitContext::seeded(42)).unwrap();
        assert_eq!(a.weight().value(), b.weight().value());
    }
}
