// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralFuse — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use crate::module::{Module, Parameter};
use crate::{PureResult, Tensor, TensorError};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::cell::{Cell, RefCell};

/// Bernoulli dropout that mirrors `nn.Dropout`: identity in evaluation mode,
/// inverted-scale masking in training mode.
pub struct Dropout {
    probability: f32,
    keep_scale: f32,
    train: Cell<bool>,
    rng: RefCell<StdRng>,
}

impl core::fmt::Debug for Dropout {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Dropout")
            .field("probability", &self.probability)
            .field("training", &self.train.get())
            .finish()
    }
}

impl Dropout {
    /// Builds a dropout layer with a deterministic RNG seed.
    pub fn with_seed(probability: f32, seed: u64) -> PureResult<Self> {
        if !(0.0..1.0).contains(&probability) {
            return Err(TensorError::InvalidValue {
                label: "dropout_probability",
            });
        }
        Ok(Self {
            probability,
            keep_scale: 1.0 / (1.0 - probability),
            train: Cell::new(true),
            rng: RefCell::new(StdRng::seed_from_u64(seed)),
        })
    }

    /// Returns the probability of zeroing an activation.
    pub fn probability(&self) -> f32 {
        self.probability
    }

    /// Returns whether the layer currently runs in training mode.
    pub fn is_training(&self) -> bool {
        self.train.get()
    }
}

impl Module for Dropout {
    fn forward(&self, input: &Tensor) -> PureResult<Tensor> {
        if !self.train.get() || self.probability == 0.0 {
            return Ok(input.clone());
        }
        let mut rng = self.rng.borrow_mut();
        let (rows, cols) = input.shape();
        let mut data = Vec::with_capacity(rows * cols);
        for &value in input.data() {
            if rng.gen::<f32>() < self.probability {
                data.push(0.0);
            } else {
                data.push(value * self.keep_scale);
            }
        }
        Tensor::from_vec(rows, cols, data)
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

    fn set_training(&self, training: bool) {
        self.train.set(training);
    }
}
