// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralFuse — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! RGB input adapter: decode, resize, normalise.

use crate::error::InferError;
use image::imageops::{self, FilterType};
use sf_tensor::Tensor;
use std::path::Path;

/// Per-channel normalisation mean, matching the statistics the feature
/// backbone was pretrained with.
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
/// Per-channel normalisation standard deviation.
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Decodes an image file, resizes it bilinearly to `side x side`, and
/// normalises it into a `(3, side*side)` tensor of channel planes.
pub fn load_rgb(path: &Path, side: usize) -> Result<Tensor, InferError> {
    let decoded = image::open(path)
        .map_err(|err| InferError::decode("rgb", path, err))?
        .to_rgb8();
    let resized = imageops::resize(&decoded, side as u32, side as u32, FilterType::Triangle);

    let pixels = side * side;
    let mut planes = vec![0.0f32; 3 * pixels];
    for (idx, pixel) in resized.pixels().enumerate() {
        for channel in 0..3 {
            let value = pixel.0[channel] as f32 / 255.0;
            planes[channel * pixels + idx] =
                (value - IMAGENET_MEAN[channel]) / IMAGENET_STD[channel];
        }
    }
    Ok(Tensor::from_vec(3, pixels, planes)?)
}

/// Inverts the normalisation back to `[0, 1]` channel planes, clamped. Used
/// when rendering the resized input alongside the anomaly map.
pub fn denormalize_rgb(normalized: &Tensor) -> Tensor {
    let pixels = normalized.shape().1;
    let mut planes = normalized.data().to_vec();
    for channel in 0..normalized.shape().0.min(3) {
        for value in &mut planes[channel * pixels..(channel + 1) * pixels] {
            *value = (*value * IMAGENET_STD[channel] + IMAGENET_MEAN[channel]).clamp(0.0, 1.0);
        }
    }
    Tensor::from_vec(normalized.shape().0, pixels, planes)
        .unwrap_or_else(|_| normalized.clone())
}
