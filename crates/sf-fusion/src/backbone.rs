// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralFuse — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use crate::error::InferError;
use sf_tensor::{Tensor, TensorError};

/// Two spatially aligned per-location embedding grids, one per modality.
/// Location *i* of the RGB grid corresponds to the same physical surface
/// point as location *i* of the 3D grid.
#[derive(Clone, Debug)]
pub struct PatchGrids {
    /// `(locations, rgb_dim)` embedding grid.
    pub rgb: Tensor,
    /// `(locations, xyz_dim)` embedding grid.
    pub xyz: Tensor,
}

impl PatchGrids {
    /// Validates the grid contract: equal location counts and the configured
    /// channel depths. Disagreement is a programming-contract violation and
    /// fails immediately rather than surfacing as a tensor error deep inside
    /// the forward pass.
    pub fn validated(
        rgb: Tensor,
        xyz: Tensor,
        rgb_dim: usize,
        xyz_dim: usize,
    ) -> Result<Self, InferError> {
        if rgb.shape().0 != xyz.shape().0 {
            return Err(InferError::Shape(TensorError::ShapeMismatch {
                left: rgb.shape(),
                right: xyz.shape(),
            }));
        }
        if rgb.shape().1 != rgb_dim {
            return Err(InferError::Shape(TensorError::ShapeMismatch {
                left: rgb.shape(),
                right: (rgb.shape().0, rgb_dim),
            }));
        }
        if xyz.shape().1 != xyz_dim {
            return Err(InferError::Shape(TensorError::ShapeMismatch {
                left: xyz.shape(),
                right: (xyz.shape().0, xyz_dim),
            }));
        }
        Ok(Self { rgb, xyz })
    }

    /// Shared location count.
    pub fn locations(&self) -> usize {
        self.rgb.shape().0
    }
}

/// External collaborator that turns preprocessed input tensors into the two
/// per-location embedding grids. The backbone body (patch extraction,
/// pretrained weights) is outside this crate; only the grid contract is
/// specified here.
pub trait FeatureBackbone {
    /// Produces spatially aligned embedding grids for both modalities.
    ///
    /// `rgb` is the normalised image tensor `(3, side*side)`; `cloud` is the
    /// bilinearly resized organized point cloud `(channels, side*side)`.
    fn patch_grids(&self, rgb: &Tensor, cloud: &Tensor) -> Result<PatchGrids, InferError>;
}
