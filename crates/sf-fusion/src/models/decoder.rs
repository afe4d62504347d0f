// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralFuse — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use sf_nn::module::{InitContext, Module, Parameter};
use sf_nn::{Cbam, Dropout, Gelu, Identity, LayerNorm, Linear};
use sf_tensor::{PureResult, Tensor, TensorError};

/// Hyperparameters of one decoupled decoder. Each modality gets its own
/// independently parameterised instance; the two never share weights.
#[derive(Clone, Debug)]
pub struct DecoderConfig {
    pub in_features: usize,
    pub out_features: usize,
    /// Hidden width; `None` means "same as `out_features`".
    pub hidden: Option<usize>,
    /// Total affine blocks at the hidden width, input projection included.
    pub num_layers: usize,
    pub dropout: f32,
    /// Bottleneck reduction ratio of the channel attention gate.
    pub attention_reduction: usize,
    /// Square kernel size of the spatial attention gate.
    pub attention_kernel: usize,
}

impl DecoderConfig {
    /// Decoder reconstructing embeddings of the given width from the fused
    /// representation, with the shipped-checkpoint hyperparameters.
    pub fn for_output(out_features: usize) -> Self {
        Self {
            in_features: crate::FUSED_DIM,
            out_features,
            hidden: None,
            num_layers: 3,
            dropout: 0.1,
            attention_reduction: 16,
            attention_kernel: 7,
        }
    }
}

/// Skip path from the fused input to the output width.
#[derive(Debug)]
enum SkipPath {
    Projection(Linear),
    PassThrough(Identity),
}

impl SkipPath {
    fn forward(&self, input: &Tensor) -> PureResult<Tensor> {
        match self {
            SkipPath::Projection(linear) => linear.forward(input),
            SkipPath::PassThrough(identity) => identity.forward(input),
        }
    }
}

/// Reconstructs one modality's embedding grid from the fused representation.
///
/// Per-location like the encoder: the channel+spatial attention refinement
/// runs over a degenerate 1x1 spatial extent, so it only re-weights the
/// hidden channels of each location independently.
#[derive(Debug)]
pub struct DecoupledDecoder {
    input_fc: Linear,
    layers: Vec<Linear>,
    output_fc: Linear,
    activation: Gelu,
    norm: LayerNorm,
    cbam: Cbam,
    skip: SkipPath,
    dropout: Dropout,
}

impl DecoupledDecoder {
    /// Builds a decoder from a config and a deterministic init context. The
    /// `name` prefixes every parameter, keeping the two modality instances
    /// distinct in their checkpoint files.
    pub fn new(
        name: &str,
        config: &DecoderConfig,
        ctx: &mut InitContext,
    ) -> PureResult<Self> {
        if config.num_layers == 0 {
            return Err(TensorError::InvalidValue {
                label: "decoder_num_layers",
            });
        }
        let hidden = config.hidden.unwrap_or(config.out_features);
        let input_fc = Linear::new(
            format!("{name}.input_fc"),
            config.in_features,
            hidden,
            ctx,
        )?;
        let mut layers = Vec::with_capacity(config.num_layers - 1);
        for idx in 0..config.num_layers - 1 {
            layers.push(Linear::new(
                format!("{name}.layer{idx}"),
                hidden,
                hidden,
                ctx,
            )?);
        }
        let skip = if config.in_features != config.out_features {
            SkipPath::Projection(Linear::new(
                format!("{name}.skip"),
                config.in_features,
                config.out_features,
                ctx,
            )?)
        } else {
            SkipPath::PassThrough(Identity::new())
        };
        Ok(Self {
            input_fc,
            layers,
            output_fc: Linear::new(
                format!("{name}.output_fc"),
                hidden,
                config.out_features,
                ctx,
            )?,
            activation: Gelu::new(),
            norm: LayerNorm::new(format!("{name}.norm"), hidden, 1.0e-5)?,
            cbam: Cbam::new(
                format!("{name}.cbam"),
                hidden,
                (1, 1),
                config.attention_reduction,
                config.attention_kernel,
                ctx,
            )?,
            skip,
            dropout: Dropout::with_seed(config.dropout, ctx.next_seed())?,
        })
    }

    /// Reconstructed channel depth.
    pub fn out_dim(&self) -> usize {
        self.output_fc.output_dim()
    }

    /// Fused channel depth accepted as input.
    pub fn in_dim(&self) -> usize {
        self.input_fc.input_dim()
    }
}

impl Module for DecoupledDecoder {
    /// Order per block: affine, norm, GELU, dropout — then attention over
    /// the hidden channels, then the output projection plus the skip path.
    fn forward(&self, input: &Tensor) -> PureResult<Tensor> {
        let residual = self.skip.forward(input)?;
        let mut x = self
            .activation
            .forward(&self.norm.forward(&self.input_fc.forward(input)?)?)?;
        x = self.dropout.forward(&x)?;
        for layer in &self.layers {
            x = self
                .activation
                .forward(&self.norm.forward(&layer.forward(&x)?)?)?;
            x = self.dropout.forward(&x)?;
        }
        x = self.cbam.forward(&x)?;
        self.output_fc.forward(&x)?.add(&residual)
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
        self.cbam.visit_parameters(visitor)?;
        if let SkipPath::Projection(linear) = &self.skip {
            linear.visit_parameters(visitor)?;
        }
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
        self.cbam.visit_parameters_mut(visitor)?;
        if let SkipPath::Projection(linear) = &mut self.skip {
            linear.visit_parameters_mut(visitor)?;
        }
        Ok(())
    }

    fn set_training(&self, training: bool) {
        self.dropout.set_training(training);
    }
}
