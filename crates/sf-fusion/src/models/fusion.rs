// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralFuse — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use sf_nn::module::{InitContext, Module, Parameter};
use sf_nn::{Dropout, Gelu, LayerNorm, Linear};
use sf_tensor::{PureResult, Tensor, TensorError};

/// Hyperparameters of the fusion encoder. The defaults match the shipped
/// checkpoint sets; `out` is configurable but fixed at load time.
#[derive(Clone, Debug)]
pub struct FusionEncoderConfig {
    pub in_2d: usize,
    pub in_3d: usize,
    pub out: usize,
    /// Hidden width; `None` means "same as `out`".
    pub hidden: Option<usize>,
    /// Total affine blocks at the hidden width, input projection included.
    pub num_layers: usize,
    pub dropout: f32,
}

impl Default for FusionEncoderConfig {
    fn default() -> Self {
        Self {
            in_2d: crate::RGB_EMBED_DIM,
            in_3d: crate::XYZ_EMBED_DIM,
            out: crate::FUSED_DIM,
            hidden: None,
            num_layers: 2,
            dropout: 0.1,
        }
    }
}

/// Projects the channel-wise concatenation of the two embedding grids into
/// the shared fused representation.
///
/// Strictly per-location: every output row depends only on the same-index
/// input rows. Localisation accuracy depends on the encoder not blending
/// spatial neighbours, so there is deliberately no attention or positional
/// structure here.
#[derive(Debug)]
pub struct FusionEncoder {
    in_2d: usize,
    in_3d: usize,
    input_fc: Linear,
    layers: Vec<Linear>,
    output_fc: Linear,
    activation: Gelu,
    // One norm instance shared by every hidden block, matching the trained
    // checkpoint layout (a single gamma/beta pair).
    norm: LayerNorm,
    dropout: Dropout,
}

impl FusionEncoder {
    /// Builds the encoder from a config and a deterministic init context.
    pub fn new(config: &FusionEncoderConfig, ctx: &mut InitContext) -> PureResult<Self> {
        if config.num_layers == 0 {
            return Err(TensorError::InvalidValue {
                label: "fusion_num_layers",
            });
        }
        let hidden = config.hidden.unwrap_or(config.out);
        let input_fc = Linear::new(
            "fusion.input_fc",
            config.in_2d + config.in_3d,
            hidden,
            ctx,
        )?;
        let mut layers = Vec::with_capacity(config.num_layers - 1);
        for idx in 0..config.num_layers - 1 {
            layers.push(Linear::new(format!("fusion.layer{idx}"), hidden, hidden, ctx)?);
        }
        Ok(Self {
            in_2d: config.in_2d,
            in_3d: config.in_3d,
            input_fc,
            layers,
            output_fc: Linear::new("fusion.output_fc", hidden, config.out, ctx)?,
            activation: Gelu::new(),
            norm: LayerNorm::new("fusion.norm", hidden, 1.0e-5)?,
            dropout: Dropout::with_seed(config.dropout, ctx.next_seed())?,
        })
    }

    /// Fused channel depth.
    pub fn out_dim(&self) -> usize {
        self.output_fc.output_dim()
    }

    /// Expected channel depths of the `(2D, 3D)` inputs.
    pub fn in_dims(&self) -> (usize, usize) {
        (self.in_2d, self.in_3d)
    }

    /// Fuses the two embedding grids. Rows must agree (same location count)
    /// and the channel depths must match the configured contract.
    pub fn forward_pair(&self, rgb: &Tensor, xyz: &Tensor) -> PureResult<Tensor> {
        if rgb.shape().1 != self.in_2d {
            return Err(TensorError::ShapeMismatch {
                left: rgb.shape(),
                right: (rgb.shape().0, self.in_2d),
            });
        }
        if xyz.shape().1 != self.in_3d {
            return Err(TensorError::ShapeMismatch {
                left: xyz.shape(),
                right: (xyz.shape().0, self.in_3d),
            });
        }
        self.forward(&rgb.concat_cols(xyz)?)
    }
}

impl Module for FusionEncoder {
    /// Forward over the already concatenated `(locations, in_2d + in_3d)`
    /// grid. Order per block: affine, GELU, norm, dropout.
    fn forward(&self, input: &Tensor) -> PureResult<Tensor> {
        let mut x = self.activation.forward(&self.input_fc.forward(input)?)?;
        x = self.norm.forward(&x)?;
        x = self.dropout.forward(&x)?;
        for layer in &self.layers {
            x = self.activation.forward(&layer.forward(&x)?)?;
            x = self.norm.forward(&x)?;
            x = self.dropout.forward(&x)?;
        }
        self.output_fc.forward(&x)
    }

    fn visit_parameters(
        &self,
        visitor: &mut dyn FnMut(&Parameter) -> PureResult<()>,
    ) -> PureResult<()> {
        self.input_fc.visit_parameters(visitor)?;
        for layer in &self.layers {
            layer.visit_parameters(visitor)?;
        }
        self.output_fc.visit_parameters(visitor)?;
        self.norm.visit_parameters(visitor)?;
        Ok(())
    }

    fn visit_parameters_mut(
        &mut self,
        visitor: &mut dyn FnMut(&mut Parameter) -> PureResult<()>,
    ) -> PureResult<()> {
        self.input_fc.visit_parameters_mut(visitor)?;
        for layer in &mut self.layers {
            layer.visit_parameters_mut(visitor)?;
        }
        self.output_fc.visit_parameters_mut(visitor)?;
        self.norm.visit_parameters_mut(visitor)?;
        Ok(())
    }

    fn set_training(&self, training: bool) {
        self.dropout.set_training(training);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> FusionEncoderConfig {
        FusionEncoderConfig {
            in_2d: 6,
            in_3d: 10,
            out: 4,
            hidden: None,
            num_layers: 2,
            dropout: 0.1,
        }
    }

    #[test]
    fn output_width_is_fixed_by_config() {
        let encoder =
            FusionEncoder::new(&small_config(), &mut InitContext::seeded(42)).unwrap();
        encoder.set_training(false);
        let rgb = Tensor::random_normal(9, 6, 0.0, 1.0, Some(1)).unwrap();
        let xyz = Tensor::random_normal(9, 10, 0.0, 1.0, Some(2)).unwrap();
        let fused = encoder.forward_pair(&rgb, &xyz).unwrap();
        assert_eq!(fused.shape(), (9, 4));
    }

    #[test]
    fn mismatched_channel_depth_is_rejected() {
        let encoder =
            FusionEncoder::new(&small_config(), &mut InitContext::seeded(42)).unwrap();
        let rgb = Tensor::zeros(9, 7).unwrap();
        let xyz = Tensor::zeros(9, 10).unwrap();
        assert!(matches!(
            encoder.forward_pair(&rgb, &xyz),
            Err(TensorError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn mismatched_location_count_is_rejected() {
        let encoder =
            FusionEncoder::new(&small_config(), &mut InitContext::seeded(42)).unwrap();
        let rgb = Tensor::zeros(9, 6).unwrap();
        let xyz = Tensor::zeros(8, 10).unwrap();
        assert!(matches!(
            encoder.forward_pair(&rgb, &xyz),
            Err(TensorError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn eval_mode_forward_is_deterministic() {
        let encoder =
            FusionEncoder::new(&small_config(), &mut InitContext::seeded(42)).unwrap();
        encoder.set_training(false);
        let rgb = Tensor::random_normal(5, 6, 0.0, 1.0, Some(3)).unwrap();
        let xyz = Tensor::random_normal(5, 10, 0.0, 1.0, Some(4)).unwrap();
        let a = encoder.forward_pair(&rgb, &xyz).unwrap();
        let b = encoder.forward_pair(&rgb, &xyz).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn state_dict_has_one_shared_norm() {
        let encoder =
            FusionEncoder::new(&small_config(), &mut InitContext::seeded(42)).unwrap();
        let state = encoder.state_dict().unwrap();
        let norm_keys = state.keys().filter(|k| k.contains("norm")).count();
        assert_eq!(norm_keys, 2); // gamma + beta, one instance
    }
}
