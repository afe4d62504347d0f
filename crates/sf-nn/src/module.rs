// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralFuse — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use crate::{PureResult, Tensor, TensorError};
use std::collections::HashMap;

/// Named, frozen weight owned by a module.
pub struct Parameter {
    name: String,
    value: Tensor,
}

impl core::fmt::Debug for Parameter {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let (rows, cols) = self.value.shape();
        write!(f, "Parameter(name={},shape=({rows},{cols}))", self.name)
    }
}

impl Parameter {
    /// Wraps a tensor as a named parameter.
    pub fn new(name: impl Into<String>, value: Tensor) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }

    /// Returns the fully qualified parameter name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Immutable access to the parameter value.
    pub fn value(&self) -> &Tensor {
        &self.value
    }

    /// Replaces the parameter value with a checkpointed tensor of the same
    /// shape. The shape check is what turns a malformed checkpoint into a
    /// load failure instead of a silent corruption.
    pub fn load_value(&mut self, value: &Tensor) -> PureResult<()> {
        if self.value.shape() != value.shape() {
            return Err(TensorError::ShapeMismatch {
                left: self.value.shape(),
                right: value.shape(),
            });
        }
        self.value = value.clone();
        Ok(())
    }
}

/// Deterministic initialisation context handed into every module constructor.
///
/// One context is created per model load from a single fixed seed and it
/// hands each parameter its own derived seed, so freshly constructed weights
/// are reproducible without mutating any global RNG state.
#[derive(Clone, Debug)]
pub struct InitContext {
    state: u64,
}

impl InitContext {
    /// Creates a context from a fixed root seed.
    pub fn seeded(seed: u64) -> Self {
        Self { state: seed }
    }

    /// Returns the next derived parameter seed (splitmix64 step).
    pub fn next_seed(&mut self) -> u64 {
        self.state = self.state.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = self.state;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    }
}

impl Default for InitContext {
    /// Fixed root seed shared by every fresh model build.
    fn default() -> Self {
        Self::seeded(42)
    }
}

/// Inference-only module: a forward pass over frozen parameters.
pub trait Module {
    /// Runs the forward pass.
    fn forward(&self, input: &Tensor) -> PureResult<Tensor>;

    /// Visits every owned parameter in registration order.
    fn visit_parameters(
        &self,
        visitor: &mut dyn FnMut(&Parameter) -> PureResult<()>,
    ) -> PureResult<()>;

    /// Mutable variant of [`Module::visit_parameters`].
    fn visit_parameters_mut(
        &mut self,
        visitor: &mut dyn FnMut(&mut Parameter) -> PureResult<()>,
    ) -> PureResult<()>;

    /// Switches stochastic sub-modules between training and evaluation
    /// behaviour. Inference loads call this with `false`; the default is a
    /// no-op for parameter-only modules.
    fn set_training(&self, _training: bool) {}

    /// Collects the module's parameters into a name-keyed state dict.
    fn state_dict(&self) -> PureResult<HashMap<String, Tensor>> {
        let mut state = HashMap::new();
        self.visit_parameters(&mut |param| {
            state.insert(param.name().to_string(), param.value().clone());
            Ok(())
        })?;
        Ok(state)
    }

    /// Restores every parameter from a state dict. Missing entries, unknown
    /// entries, and shape mismatches are all hard errors.
    fn load_state_dict(&mut self, state: &HashMap<String, Tensor>) -> PureResult<()> {
        let mut seen = Vec::new();
        self.visit_parameters_mut(&mut |param| {
            let tensor = state
                .get(param.name())
                .ok_or_else(|| TensorError::MissingParameter {
                    name: param.name().to_string(),
                })?;
            param.load_value(tensor)?;
            seen.push(param.name().to_string());
            Ok(())
        })?;
        if state.len() != seen.len() {
            for name in state.keys() {
                if !seen.iter().any(|s| s == name) {
                    return Err(TensorError::UnexpectedParameter { name: name.clone() });
                }
            }
        }
        Ok(())
    }
}
