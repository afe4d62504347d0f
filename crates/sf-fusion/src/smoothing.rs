// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralFuse — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Staged mean-filter smoothing of the combined residual map.
//!
//! Repeated uniform box filters approximate a wider Gaussian-like blur from
//! cheap kernels. The pass counts and kernel sizes (5x5 run five times, then
//! 7x7 run three times) are load-bearing for parity with the trained
//! checkpoints and must not be tuned independently.
//!
//! Padding is explicit zero "same" padding: the filter conserves mass in the
//! interior (every kernel tap lands on the map) and attenuates within
//! `kernel/2` of the border, where part of the kernel hangs over the zero
//! padding.

use sf_tensor::{PureResult, Tensor, TensorError};

/// Kernel side of the first smoothing stage.
pub const LOWER_KERNEL: usize = 5;
/// Pass count of the first smoothing stage.
pub const LOWER_PASSES: usize = 5;
/// Kernel side of the second smoothing stage.
pub const UPPER_KERNEL: usize = 7;
/// Pass count of the second smoothing stage.
pub const UPPER_PASSES: usize = 3;

/// One pass of a `kernel x kernel` uniform mean filter with stride 1 and
/// zero same-padding. Pure function; the input map is left untouched.
pub fn uniform_filter(map: &Tensor, kernel: usize, passes: usize) -> PureResult<Tensor> {
    if kernel == 0 || kernel % 2 == 0 {
        return Err(TensorError::InvalidValue {
            label: "uniform_filter_kernel",
        });
    }
    let (h, w) = map.shape();
    let pad = (kernel / 2) as isize;
    let inv_area = 1.0 / (kernel * kernel) as f32;
    let mut current = map.clone();
    for _ in 0..passes {
        let src = current.data();
        let mut next = vec![0.0f32; h * w];
        for y in 0..h as isize {
            for x in 0..w as isize {
                let mut acc = 0.0f32;
                for ky in -pad..=pad {
                    for kx in -pad..=pad {
                        let yy = y + ky;
                        let xx = x + kx;
                        if yy < 0 || xx < 0 || yy >= h as isize || xx >= w as isize {
                            continue;
                        }
                        acc += src[(yy * w as isize + xx) as usize];
                    }
                }
                next[(y * w as isize + x) as usize] = acc * inv_area;
            }
        }
        current = Tensor::from_vec(h, w, next)?;
    }
    Ok(current)
}

/// The full smoothing schedule applied to a combined residual map.
pub fn smooth_anomaly_map(map: &Tensor) -> PureResult<Tensor> {
    let lowered = uniform_filter(map, LOWER_KERNEL, LOWER_PASSES)?;
    uniform_filter(&lowered, UPPER_KERNEL, UPPER_PASSES)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn total(map: &Tensor) -> f32 {
        map.data().iter().sum()
    }

    #[test]
    fn interior_impulse_conserves_mass() {
        // A unit impulse far from the border: every kernel tap of every pass
        // stays on the map, so the total mass is unchanged.
        let mut map = Tensor::zeros(64, 64).unwrap();
        map.data_mut()[32 * 64 + 32] = 1.0;
        let smoothed = smooth_anomaly_map(&map).unwrap();
        assert!((total(&smoothed) - 1.0).abs() < 1e-4);
        // The peak flattens but stays centred.
        let peak = smoothed
            .data()
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .unwrap()
            .0;
        assert_eq!(peak, 32 * 64 + 32);
    }

    #[test]
    fn border_impulse_loses_mass_under_zero_padding() {
        let mut map = Tensor::zeros(64, 64).unwrap();
        map.data_mut()[0] = 1.0;
        let smoothed = smooth_anomaly_map(&map).unwrap();
        assert!(total(&smoothed) < 1.0 - 1e-3);
    }

    #[test]
    fn zero_map_stays_zero() {
        let map = Tensor::zeros(32, 32).unwrap();
        let smoothed = smooth_anomaly_map(&map).unwrap();
        assert!(smoothed.data().iter().all(|v| *v == 0.0));
    }

    #[test]
    fn single_pass_matches_manual_mean() {
        let map = Tensor::from_vec(3, 3, vec![0.0, 0.0, 0.0, 0.0, 9.0, 0.0, 0.0, 0.0, 0.0])
            .unwrap();
        let filtered = uniform_filter(&map, 3, 1).unwrap();
        // Every cell of the 3x3 map sees the impulse exactly once.
        for value in filtered.data() {
            assert!((value - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn even_kernel_is_rejected() {
        let map = Tensor::zeros(8, 8).unwrap();
        assert!(uniform_filter(&map, 4, 1).is_err());
    }
}
