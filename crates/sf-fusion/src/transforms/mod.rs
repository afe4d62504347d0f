// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralFuse — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Raster adapters around the forward pipeline: decoding inputs into model
//! tensors and rendering output maps into viewable artifacts.

pub mod image;
pub mod pointcloud;
pub mod render;

pub use self::image::{denormalize_rgb, load_rgb, IMAGENET_MEAN, IMAGENET_STD};
pub use self::pointcloud::{load_point_cloud, PointCloudRaster};
pub use self::render::{write_artifacts, OutputArtifacts};
