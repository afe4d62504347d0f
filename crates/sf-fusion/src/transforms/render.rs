// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralFuse — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Output artifact rendering.
//!
//! Each scored request writes four PNGs into its own directory: the resized
//! input image, a depth view of the point cloud, the raw 2D residual, and
//! the final anomaly map. Residual maps are min-max normalised per image and
//! coloured with a jet ramp, the depth view is grayscale; the artifacts are
//! for human review, so per-image normalisation (losing absolute scale) is
//! acceptable.

use crate::error::InferError;
use image::{Rgb, RgbImage};
use sf_tensor::Tensor;
use std::fs;
use std::path::{Path, PathBuf};

/// Paths of the four rendered artifacts of one request.
#[derive(Clone, Debug)]
pub struct OutputArtifacts {
    pub directory: PathBuf,
    pub rgb: PathBuf,
    pub depth: PathBuf,
    pub residual_2d: PathBuf,
    pub anomaly: PathBuf,
}

fn jet(t: f32) -> Rgb<u8> {
    let t = t.clamp(0.0, 1.0);
    let r = (1.5 - (4.0 * t - 3.0).abs()).clamp(0.0, 1.0);
    let g = (1.5 - (4.0 * t - 2.0).abs()).clamp(0.0, 1.0);
    let b = (1.5 - (4.0 * t - 1.0).abs()).clamp(0.0, 1.0);
    Rgb([(r * 255.0) as u8, (g * 255.0) as u8, (b * 255.0) as u8])
}

/// Renders a `(side, side)` scalar map with per-image min-max normalisation.
/// A constant map renders as the ramp's low end.
fn colormap_image(map: &Tensor) -> RgbImage {
    let (h, w) = map.shape();
    let data = map.data();
    let min = data.iter().copied().fold(f32::INFINITY, f32::min);
    let max = data.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let range = if max - min > f32::EPSILON { max - min } else { 1.0 };
    RgbImage::from_fn(w as u32, h as u32, |x, y| {
        jet((data[y as usize * w + x as usize] - min) / range)
    })
}

/// Renders a `(side, side)` scalar map as grayscale, min-max normalised and
/// replicated across the colour channels. Used for the depth view.
fn grayscale_image(map: &Tensor) -> RgbImage {
    let (h, w) = map.shape();
    let data = map.data();
    let min = data.iter().copied().fold(f32::INFINITY, f32::min);
    let max = data.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let range = if max - min > f32::EPSILON { max - min } else { 1.0 };
    RgbImage::from_fn(w as u32, h as u32, |x, y| {
        let level = ((data[y as usize * w + x as usize] - min) / range * 255.0) as u8;
        Rgb([level, level, level])
    })
}

/// Renders `(3, side*side)` channel planes in `[0, 1]` as an RGB image.
fn planes_image(planes: &Tensor, side: usize) -> RgbImage {
    let pixels = side * side;
    RgbImage::from_fn(side as u32, side as u32, |x, y| {
        let idx = y as usize * side + x as usize;
        let sample = |channel: usize| {
            let value = if channel < planes.shape().0 {
                planes.data()[channel * pixels + idx]
            } else {
                0.0
            };
            (value.clamp(0.0, 1.0) * 255.0) as u8
        };
        Rgb([sample(0), sample(1), sample(2)])
    })
}

fn save(image: &RgbImage, path: &Path) -> Result<(), InferError> {
    image
        .save(path)
        .map_err(|err| InferError::io(path, std::io::Error::new(std::io::ErrorKind::Other, err)))
}

/// Writes the four artifacts into `output_root/<request_id>/`.
///
/// The directory is created fresh; if any write fails it is removed again so
/// a failed request never leaves a half-populated directory behind.
pub fn write_artifacts(
    output_root: &Path,
    request_id: &str,
    side: usize,
    rgb_planes: &Tensor,
    depth: &Tensor,
    residual_2d: &Tensor,
    anomaly: &Tensor,
) -> Result<OutputArtifacts, InferError> {
    let directory = output_root.join(request_id);
    fs::create_dir_all(&directory).map_err(|err| InferError::io(&directory, err))?;

    let artifacts = OutputArtifacts {
        rgb: directory.join("rgb.png"),
        depth: directory.join("depth.png"),
        residual_2d: directory.join("residual_2d.png"),
        anomaly: directory.join("anomaly.png"),
        directory,
    };
    let write_all = || -> Result<(), InferError> {
        save(&planes_image(rgb_planes, side), &artifacts.rgb)?;
        save(&grayscale_image(depth), &artifacts.depth)?;
        save(&colormap_image(residual_2d), &artifacts.residual_2d)?;
        save(&colormap_image(anomaly), &artifacts.anomaly)
    };
    if let Err(err) = write_all() {
        let _ = fs::remove_dir_all(&artifacts.directory);
        return Err(err);
    }
    Ok(artifacts)
}
