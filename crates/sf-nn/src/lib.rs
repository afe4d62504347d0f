// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralFuse — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Inference-only neural module surface for SpiralFuse.
//!
//! This crate offers a lightweight `nn.Module` style API over the
//! [`sf_tensor::Tensor`] primitives: layers, a parameter visitor protocol,
//! deterministic construction, and state-dict checkpoint IO. Gradients and
//! optimisers are deliberately absent; the fusion engine only ever runs
//! forward passes over frozen weights.

pub mod io;
pub mod layers;
pub mod module;

pub use layers::activation::{Gelu, Relu};
pub use layers::attention::{Cbam, ChannelGate, SpatialGate};
pub use layers::dropout::Dropout;
pub use layers::identity::Identity;
pub use layers::linear::Linear;
pub use layers::normalization::LayerNorm;
pub use module::{InitContext, Module, Parameter};

pub use sf_tensor::{PureResult, Tensor, TensorError};
