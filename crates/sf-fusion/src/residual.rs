// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralFuse — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Residual assembly: reconstruction errors to anomaly map.

use crate::smoothing::smooth_anomaly_map;
use sf_tensor::{PureResult, Tensor, TensorError};

/// Per-request output maps, each `(side, side)`.
#[derive(Clone, Debug)]
pub struct AnomalyMaps {
    /// Raw 2D reconstruction residual.
    pub residual_2d: Tensor,
    /// Raw 3D reconstruction residual.
    pub residual_3d: Tensor,
    /// Combined, masked, smoothed anomaly score; higher = more anomalous.
    pub anomaly: Tensor,
}

/// Per-location Euclidean reconstruction error between an original and a
/// reconstructed embedding grid: one scalar per location.
pub fn modality_residual(original: &Tensor, reconstructed: &Tensor) -> PureResult<Vec<f32>> {
    if original.shape() != reconstructed.shape() {
        return Err(TensorError::ShapeMismatch {
            left: original.shape(),
            right: reconstructed.shape(),
        });
    }
    let cols = original.shape().1;
    let residual = original
        .data()
        .chunks(cols)
        .zip(reconstructed.data().chunks(cols))
        .map(|(orig, recon)| {
            orig.iter()
                .zip(recon.iter())
                .map(|(a, b)| (a - b) * (a - b))
                .sum::<f32>()
                .sqrt()
        })
        .collect();
    Ok(residual)
}

/// Validity mask over locations: `true` where the 3D original embedding is
/// identically zero across all channels, i.e. the sensor saw nothing there.
pub fn validity_mask(xyz_original: &Tensor) -> Vec<bool> {
    let cols = xyz_original.shape().1;
    xyz_original
        .data()
        .chunks(cols)
        .map(|row| row.iter().all(|v| *v == 0.0))
        .collect()
}

/// Combines residuals and smooths the result into the final anomaly map.
#[derive(Clone, Copy, Debug)]
pub struct ResidualAssembler {
    side: usize,
}

impl ResidualAssembler {
    /// Assembler for a `side x side` location grid.
    pub fn new(side: usize) -> PureResult<Self> {
        if side == 0 {
            return Err(TensorError::InvalidDimensions { rows: side, cols: side });
        }
        Ok(Self { side })
    }

    /// Grid side length.
    pub fn side(&self) -> usize {
        self.side
    }

    /// Full scoring sequence: per-modality residuals, validity mask,
    /// multiplicative combination (AND-like: a location scores high only if
    /// BOTH modalities reconstruct poorly), masking before smoothing,
    /// reshape, staged blur.
    ///
    /// Smoothing runs over the zeroed values, so score can bleed from valid
    /// neighbours into masked locations; that is accepted behaviour.
    pub fn assemble(
        &self,
        rgb_original: &Tensor,
        rgb_reconstructed: &Tensor,
        xyz_original: &Tensor,
        xyz_reconstructed: &Tensor,
    ) -> PureResult<AnomalyMaps> {
        let locations = self.side * self.side;
        if rgb_original.shape().0 != locations {
            return Err(TensorError::ShapeMismatch {
                left: rgb_original.shape(),
                right: (locations, rgb_original.shape().1),
            });
        }
        if rgb_original.shape().0 != xyz_original.shape().0 {
            return Err(TensorError::ShapeMismatch {
                left: rgb_original.shape(),
                right: xyz_original.shape(),
            });
        }
        let residual_2d = modality_residual(rgb_original, rgb_reconstructed)?;
        let residual_3d = modality_residual(xyz_original, xyz_reconstructed)?;
        let mask = validity_mask(xyz_original);

        let combined: Vec<f32> = residual_2d
            .iter()
            .zip(residual_3d.iter())
            .zip(mask.iter())
            .map(|((r2, r3), masked)| if *masked { 0.0 } else { r2 * r3 })
            .collect();

        let combined = Tensor::from_vec(self.side, self.side, combined)?;
        Ok(AnomalyMaps {
            residual_2d: Tensor::from_vec(self.side, self.side, residual_2d)?,
            residual_3d: Tensor::from_vec(self.side, self.side, residual_3d)?,
            anomaly: smooth_anomaly_map(&combined)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(rows: usize, cols: usize, seed: u64) -> Tensor {
        Tensor::random_normal(rows, cols, 0.0, 1.0, Some(seed)).unwrap()
    }

    #[test]
    fn residual_is_row_l2_distance() {
        let original = Tensor::from_vec(2, 2, vec![1.0, 2.0, 0.0, 0.0]).unwrap();
        let reconstructed = Tensor::from_vec(2, 2, vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let residual = modality_residual(&original, &reconstructed).unwrap();
        assert!((residual[0] - 0.0).abs() < 1e-6);
        assert!((residual[1] - 5.0).abs() < 1e-6);
    }

    #[test]
    fn mask_requires_every_channel_zero() {
        // Row 1 sums to zero without being the zero vector: it must stay
        // valid. Only row 2 is a true sensor void.
        let xyz = Tensor::from_vec(3, 2, vec![1.0, 2.0, -1.0, 1.0, 0.0, 0.0]).unwrap();
        assert_eq!(validity_mask(&xyz), vec![false, false, true]);
    }

    #[test]
    fn masked_locations_score_zero_before_smoothing() {
        let side = 4;
        let locations = side * side;
        let rgb = grid(locations, 3, 1);
        let rgb_recon = grid(locations, 3, 2);
        // All-zero 3D grid: every location masked.
        let xyz = Tensor::zeros(locations, 5).unwrap();
        let xyz_recon = grid(locations, 5, 3);

        let maps = ResidualAssembler::new(side)
            .unwrap()
            .assemble(&rgb, &rgb_recon, &xyz, &xyz_recon)
            .unwrap();
        assert!(maps.anomaly.data().iter().all(|v| *v == 0.0));
        // The raw 2D residual is still nonzero; masking only gates the
        // combined score.
        assert!(maps.residual_2d.data().iter().any(|v| *v > 0.0));
    }

    #[test]
    fn perfect_reconstruction_in_one_modality_zeroes_the_map() {
        let side = 4;
        let locations = side * side;
        let rgb = grid(locations, 3, 1);
        let xyz = grid(locations, 5, 2);
        let xyz_recon = grid(locations, 5, 3);

        // 2D reconstructs perfectly; multiplicative gating zeroes everything.
        let maps = ResidualAssembler::new(side)
            .unwrap()
            .assemble(&rgb, &rgb, &xyz, &xyz_recon)
            .unwrap();
        assert!(maps.anomaly.data().iter().all(|v| v.abs() < 1e-6));
    }

    #[test]
    fn location_count_mismatch_is_fatal() {
        let rgb = grid(16, 3, 1);
        let xyz = grid(15, 5, 2);
        let result = ResidualAssembler::new(4)
            .unwrap()
            .assemble(&rgb, &rgb, &xyz, &xyz);
        assert!(matches!(result, Err(TensorError::ShapeMismatch { .. })));
    }
}
