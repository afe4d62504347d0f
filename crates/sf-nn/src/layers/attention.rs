// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralFuse — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Channel-then-spatial attention refinement (CBAM style).
//!
//! Tensors use the flattened convolutional layout `(batch, channels * h * w)`
//! with channel-major ordering, matching the rest of the stack. The decoupled
//! decoders apply this block per location with a degenerate 1x1 spatial
//! extent, so both gates reduce to pure channel re-weighting there; the
//! implementation stays general so the gates keep working for real maps.

use crate::layers::activation::Relu;
use crate::layers::linear::Linear;
use crate::module::{InitContext, Module, Parameter};
use crate::{PureResult, Tensor, TensorError};

fn sigmoid(value: f32) -> f32 {
    1.0 / (1.0 + (-value).exp())
}

/// Channel gate: squeeze the spatial extent with average and max pooling,
/// push both descriptors through a shared bottleneck, and rescale channels by
/// the sigmoid of their sum.
#[derive(Debug)]
pub struct ChannelGate {
    channels: usize,
    hw: (usize, usize),
    fc1: Linear,
    fc2: Linear,
    relu: Relu,
}

impl ChannelGate {
    /// Builds a channel gate with the given bottleneck reduction ratio.
    pub fn new(
        name: impl Into<String>,
        channels: usize,
        hw: (usize, usize),
        reduction: usize,
        ctx: &mut InitContext,
    ) -> PureResult<Self> {
        if channels == 0 || hw.0 == 0 || hw.1 == 0 {
            return Err(TensorError::InvalidDimensions {
                rows: channels,
                cols: hw.0 * hw.1,
            });
        }
        if reduction == 0 || channels / reduction == 0 {
            return Err(TensorError::InvalidValue {
                label: "channel_gate_reduction",
            });
        }
        let name = name.into();
        Ok(Self {
            channels,
            hw,
            fc1: Linear::new(format!("{name}.fc1"), channels, channels / reduction, ctx)?,
            fc2: Linear::new(format!("{name}.fc2"), channels / reduction, channels, ctx)?,
            relu: Relu::new(),
        })
    }

    fn bottleneck(&self, descriptor: &Tensor) -> PureResult<Tensor> {
        let hidden = self.fc1.forward(descriptor)?;
        self.fc2.forward(&self.relu.forward(&hidden)?)
    }
}

impl Module for ChannelGate {
    fn forward(&self, input: &Tensor) -> PureResult<Tensor> {
        let (batch, cols) = input.shape();
        let spatial = self.hw.0 * self.hw.1;
        if cols != self.channels * spatial {
            return Err(TensorError::ShapeMismatch {
                left: (batch, cols),
                right: (batch, self.channels * spatial),
            });
        }
        let inv_spatial = 1.0 / spatial as f32;
        let mut avg = Vec::with_capacity(batch * self.channels);
        let mut max = Vec::with_capacity(batch * self.channels);
        for row in input.data().chunks(cols) {
            for c in 0..self.channels {
                let plane = &row[c * spatial..(c + 1) * spatial];
                avg.push(plane.iter().sum::<f32>() * inv_spatial);
                max.push(plane.iter().copied().fold(f32::NEG_INFINITY, f32::max));
            }
        }
        let avg = Tensor::from_vec(batch, self.channels, avg)?;
        let max = Tensor::from_vec(batch, self.channels, max)?;
        let gate = self.bottleneck(&avg)?.add(&self.bottleneck(&max)?)?;

        let mut out = Vec::with_capacity(batch * cols);
        for (row, gate_row) in input
            .data()
            .chunks(cols)
            .zip(gate.data().chunks(self.channels))
        {
            for c in 0..self.channels {
                let scale = sigmoid(gate_row[c]);
                for &value in &row[c * spatial..(c + 1) * spatial] {
                    out.push(value * scale);
                }
            }
        }
        Tensor::from_vec(batch, cols, out)
    }

    fn visit_parameters(
        &self,
        visitor: &mut dyn FnMut(&Parameter) -> PureResult<()>,
    ) -> PureResult<()> {
        self.fc1.visit_parameters(visitor)?;
        self.fc2.visit_parameters(visitor)?;
        Ok(())
    }

    fn visit_parameters_mut(
        &mut self,
        visitor: &mut dyn FnMut(&mut Parameter) -> PureResult<()>,
    ) -> PureResult<()> {
        self.fc1.visit_parameters_mut(visitor)?;
        self.fc2.visit_parameters_mut(visitor)?;
        Ok(())
    }
}

/// Spatial gate: collapse channels into average and max maps, convolve the
/// two-plane stack down to a single attention map, and rescale every channel
/// by its sigmoid.
#[derive(Debug)]
pub struct SpatialGate {
    channels: usize,
    hw: (usize, usize),
    kernel: usize,
    // (1, 2 * kernel * kernel): the average plane's taps followed by the max
    // plane's taps, row-major. The conv carries no bias.
    weight: Parameter,
}

impl SpatialGate {
    /// Builds a spatial gate with an odd square kernel.
    pub fn new(
        name: impl Into<String>,
        channels: usize,
        hw: (usize, usize),
        kernel: usize,
        ctx: &mut InitContext,
    ) -> PureResult<Self> {
        if channels == 0 || hw.0 == 0 || hw.1 == 0 {
            return Err(TensorError::InvalidDimensions {
                rows: channels,
                cols: hw.0 * hw.1,
            });
        }
        if kernel == 0 || kernel % 2 == 0 {
            return Err(TensorError::InvalidValue {
                label: "spatial_gate_kernel",
            });
        }
        let name = name.into();
        let weight =
            Tensor::random_normal(1, 2 * kernel * kernel, 0.0, 0.02, Some(ctx.next_seed()))?;
        Ok(Self {
            channels,
            hw,
            kernel,
            weight: Parameter::new(format!("{name}.conv::weight"), weight),
        })
    }
}

impl Module for SpatialGate {
    fn forward(&self, input: &Tensor) -> PureResult<Tensor> {
        let (batch, cols) = input.shape();
        let (h, w) = self.hw;
        let spatial = h * w;
        if cols != self.channels * spatial {
            return Err(TensorError::ShapeMismatch {
                left: (batch, cols),
                right: (batch, self.channels * spatial),
            });
        }
        let k = self.kernel;
        let pad = (k / 2) as isize;
        let taps = self.weight.value().data();
        let (avg_taps, max_taps) = taps.split_at(k * k);
        let inv_channels = 1.0 / self.channels as f32;

        let mut out = Vec::with_capacity(batch * cols);
        let mut avg_map = vec![0.0f32; spatial];
        let mut max_map = vec![0.0f32; spatial];
        for row in input.data().chunks(cols) {
            for s in 0..spatial {
                let mut sum = 0.0f32;
                let mut peak = f32::NEG_INFINITY;
                for c in 0..self.channels {
                    let value = row[c * spatial + s];
                    sum += value;
                    peak = peak.max(value);
                }
                avg_map[s] = sum * inv_channels;
                max_map[s] = peak;
            }
            // 2-in 1-out convolution with zero same-padding.
            let mut attn = vec![0.0f32; spatial];
            for y in 0..h as isize {
                for x in 0..w as isize {
                    let mut acc = 0.0f32;
                    for ky in 0..k as isize {
                        for kx in 0..k as isize {
                            let yy = y + ky - pad;
                            let xx = x + kx - pad;
                            if yy < 0 || xx < 0 || yy >= h as isize || xx >= w as isize {
                                continue;
                            }
                            let src = (yy * w as isize + xx) as usize;
                            let tap = (ky * k as isize + kx) as usize;
                            acc += avg_taps[tap] * avg_map[src] + max_taps[tap] * max_map[src];
                        }
                    }
                    attn[(y * w as isize + x) as usize] = sigmoid(acc);
                }
            }
            for c in 0..self.channels {
                for s in 0..spatial {
                    out.push(row[c * spatial + s] * attn[s]);
                }
            }
        }
        Tensor::from_vec(batch, cols, out)
    }

    fn visit_parameters(
        &self,
        visitor: &mut dyn FnMut(&Parameter) -> PureResult<()>,
    ) -> PureResult<()> {
        visitor(&self.weight)
    }

    fn visit_parameters_mut(
        &mut self,
        visitor: &mut dyn FnMut(&mut Parameter) -> PureResult<()>,
    ) -> PureResult<()> {
        visitor(&mut self.weight)
    }
}

/// Fixed two-stage refinement: channel gate, then spatial gate. Both stages
/// are multiplicative re-weightings; neither changes the tensor shape.
#[derive(Debug)]
pub struct Cbam {
    channel: ChannelGate,
    spatial: SpatialGate,
}

impl Cbam {
    /// Builds the two gates over the same `(channels, h, w)` extent.
    pub fn new(
        name: impl Into<String>,
        channels: usize,
        hw: (usize, usize),
        reduction: usize,
        kernel: usize,
        ctx: &mut InitContext,
    ) -> PureResult<Self> {
        let name = name.into();
        Ok(Self {
            channel: ChannelGate::new(format!("{name}.channel"), channels, hw, reduction, ctx)?,
            spatial: SpatialGate::new(format!("{name}.spatial"), channels, hw, kernel, ctx)?,
        })
    }
}

impl Module for Cbam {
    fn forward(&self, input: &Tensor) -> PureResult<Tensor> {
        let gated = self.channel.forward(input)?;
        self.spatial.forward(&gated)
    }

    fn visit_parameters(
        &self,
        visitor: &mut dyn FnMut(&Parameter) -> PureResult<()>,
    ) -> PureResult<()> {
        self.channel.visit_parameters(visitor)?;
        self.spatial.visit_parameters(visitor)?;
        Ok(())
    }

    fn visit_parameters_mut(
        &mut self,
        visitor: &mut dyn FnMut(&mut Parameter) -> PureResult<()>,
    ) -> PureResult<()> {
        self.channel.visit_parameters_mut(visitor)?;
        self.spatial.visit_parameters_mut(visitor)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gates_preserve_shape_and_attenuate() {
        let mut ctx = InitContext::seeded(3);
        let cbam = Cbam::new("cbam", 8, (1, 1), 2, 7, &mut ctx).unwrap();
        let input = Tensor::random_normal(4, 8, 0.0, 1.0, Some(5)).unwrap();
        let output = cbam.forward(&input).unwrap();
        assert_eq!(output.shape(), input.shape());
        // Both gates multiply by sigmoids, so magnitudes can only shrink and
        // signs never flip.
        for (out, inp) in output.data().iter().zip(input.data().iter()) {
            assert!(out.abs() <= inp.abs() + 1e-6);
            assert!(out * inp >= 0.0);
        }
    }

    #[test]
    fn spatial_gate_handles_real_maps() {
        let mut ctx = InitContext::seeded(4);
        let gate = SpatialGate::new("sg", 3, (5, 5), 7, &mut ctx).unwrap();
        let input = Tensor::random_normal(2, 3 * 25, 0.0, 1.0, Some(6)).unwrap();
        let output = gate.forward(&input).unwrap();
        assert_eq!(output.shape(), (2, 75));
    }

    #[test]
    fn channel_gate_rejects_wrong_extent() {
        let mut ctx = InitContext::seeded(3);
        let gate = ChannelGate::new("cg", 8, (1, 1), 2, &mut ctx).unwrap();
        let input = Tensor::zeros(4, 9).unwrap();
        assert!(matches!(
            gate.forward(&input),
            Err(TensorError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn rejects_even_kernel_and_degenerate_reduction() {
        let mut ctx = InitContext::seeded(3);
        assert!(SpatialGate::new("sg", 4, (1, 1), 6, &mut ctx).is_err());
        assert!(ChannelGate::new("cg", 4, (1, 1), 8, &mut ctx).is_err());
    }
}
