// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralFuse — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use crate::module::{Module, Parameter};
use crate::{PureResult, Tensor};

const SQRT_2_OVER_PI: f32 = 0.797_884_56;
const KAPPA: f32 = 0.044_715;

/// Gaussian Error Linear Unit, tanh approximation.
#[derive(Debug, Clone, Copy, Default)]
pub struct Gelu;

impl Gelu {
    /// Creates a new GELU activation.
    pub fn new() -> Self {
        Self
    }

    pub(crate) fn gelu(value: f32) -> f32 {
        let cubic = value * value * value;
        let inner = SQRT_2_OVER_PI * (value + KAPPA * cubic);
        0.5 * value * (1.0 + inner.tanh())
    }
}

impl Module for Gelu {
    fn forward(&self, input: &Tensor) -> PureResult<Tensor> {
        Ok(input.map(Self::gelu))
    }

    fn visit_parameters(
        &self,
        _visitor: &mut dyn FnMut(&Parameter) -> PureResult<()>,
    ) -> PureResult<()> {
        Ok(())
    }

    fn visit_parameters_mut(
        &mut self,
        _visitor: &mut dyn FnMut(&mut Parameter) -> PureResult<()>,
    ) -> PureResult<()> {
        Ok(())
    }
}

/// Rectified linear unit.
#[derive(Debug, Clone, Copy, Default)]
pub struct Relu;

impl Relu {
    /// Creates a new ReLU activation.
    pub fn new() -> Self {
        Self
    }
}

impl Module for Relu {
    fn forward(&self, input: &Tensor) -> PureResult<Tensor> {
        Ok(input.map(|v| v.max(0.0)))
    }

    fn visit_parameters(
        &self,
        _visitor: &mut dyn FnMut(&Parameter) -> PureResult<()>,
    ) -> PureResult<()> {
        Ok(())
    }

    fn visit_parameters_mut(
        &mut self,
        _visitor: &mut dyn FnMut(&mut Parameter) -> PureResult<()>,
    ) -> PureResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gelu_matches_scalar_reference() {
        let layer = Gelu::new();
        let input = Tensor::from_vec(1, 4, vec![-1.0, -0.5, 0.5, 1.0]).unwrap();
        let output = layer.forward(&input).unwrap();
        for (out, x) in output.data().iter().zip(input.data().iter()) {
            assert!((out - Gelu::gelu(*x)).abs() < 1e-6);
        }
        // GELU(0) == 0 and positive values stay close to identity.
        assert!(Gelu::gelu(0.0).abs() < 1e-7);
        assert!((Gelu::gelu(5.0) - 5.0).abs() < 1e-3);
    }

    #[test]
    fn relu_clamps_negative_values() {
        let layer = Relu::new();
        let input = Tensor::from_vec(1, 3, vec![-2.0, 0.0, 3.0]).unwrap();
        let output = layer.forward(&input).unwrap();
        assert_eq!(output.data(), &[0.0, 0.0, 3.0]);
    }
}
