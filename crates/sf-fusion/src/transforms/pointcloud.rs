// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralFuse — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Organized point cloud adapter.
//!
//! The 3D input is a TIFF raster whose pixels are XYZ coordinates in the
//! sensor frame; a pixel of all zeros marks a location the sensor saw
//! nothing at. Resizing must keep those zero pixels meaningful, so the
//! bilinear resample here treats them as ordinary values (blended voids are
//! resolved later by the validity mask over the embedding grid, not here).

use crate::error::InferError;
use sf_tensor::Tensor;
use std::fs::File;
use std::path::Path;
use tiff::decoder::{Decoder, DecodingResult};
use tiff::ColorType;

/// A decoded organized point cloud in row-major interleaved (HWC) layout.
#[derive(Clone, Debug)]
pub struct PointCloudRaster {
    pub width: usize,
    pub height: usize,
    pub channels: usize,
    data: Vec<f32>,
}

impl PointCloudRaster {
    /// One channel value at `(x, y)`.
    pub fn at(&self, x: usize, y: usize, channel: usize) -> f32 {
        self.data[(y * self.width + x) * self.channels + channel]
    }

    /// Bilinear resample to a `side x side` grid, returned as `(channels,
    /// side*side)` channel planes. Sample positions use half-pixel centres,
    /// so the corner pixels are not pinned to the corner samples.
    pub fn to_model_input(&self, side: usize) -> Result<Tensor, InferError> {
        let scale_x = self.width as f32 / side as f32;
        let scale_y = self.height as f32 / side as f32;
        let pixels = side * side;
        let mut planes = vec![0.0f32; self.channels * pixels];
        for dy in 0..side {
            let sy = ((dy as f32 + 0.5) * scale_y - 0.5).clamp(0.0, (self.height - 1) as f32);
            let y0 = sy.floor() as usize;
            let y1 = (y0 + 1).min(self.height - 1);
            let fy = sy - y0 as f32;
            for dx in 0..side {
                let sx = ((dx as f32 + 0.5) * scale_x - 0.5).clamp(0.0, (self.width - 1) as f32);
                let x0 = sx.floor() as usize;
                let x1 = (x0 + 1).min(self.width - 1);
                let fx = sx - x0 as f32;
                for channel in 0..self.channels {
                    let top = self.at(x0, y0, channel) * (1.0 - fx)
                        + self.at(x1, y0, channel) * fx;
                    let bottom = self.at(x0, y1, channel) * (1.0 - fx)
                        + self.at(x1, y1, channel) * fx;
                    planes[channel * pixels + dy * side + dx] =
                        top * (1.0 - fy) + bottom * fy;
                }
            }
        }
        Ok(Tensor::from_vec(self.channels, pixels, planes)?)
    }

    /// Nearest-neighbour view of the depth (last) channel as a `(side, side)`
    /// map, used for rendering only.
    pub fn depth_view(&self, side: usize) -> Result<Tensor, InferError> {
        let channel = self.channels - 1;
        let mut map = vec![0.0f32; side * side];
        for dy in 0..side {
            let sy = (dy * self.height / side).min(self.height - 1);
            for dx in 0..side {
                let sx = (dx * self.width / side).min(self.width - 1);
                map[dy * side + dx] = self.at(sx, sy, channel);
            }
        }
        Ok(Tensor::from_vec(side, side, map)?)
    }
}

fn channel_count(color: ColorType) -> Result<usize, String> {
    match color {
        ColorType::Gray(_) => Ok(1),
        ColorType::RGB(_) => Ok(3),
        ColorType::RGBA(_) => Ok(4),
        other => Err(format!("unsupported tiff color type {other:?}")),
    }
}

/// Decodes an organized point cloud TIFF. Integer sample formats are widened
/// to f32 untouched; f64 is narrowed.
pub fn load_point_cloud(path: &Path) -> Result<PointCloudRaster, InferError> {
    let file = File::open(path).map_err(|err| InferError::decode("point cloud", path, err))?;
    let mut decoder =
        Decoder::new(file).map_err(|err| InferError::decode("point cloud", path, err))?;
    let (width, height) = decoder
        .dimensions()
        .map_err(|err| InferError::decode("point cloud", path, err))?;
    let channels = decoder
        .colortype()
        .map_err(|err| InferError::decode("point cloud", path, err))
        .and_then(|color| {
            channel_count(color).map_err(|msg| InferError::decode("point cloud", path, msg))
        })?;
    let data = match decoder
        .read_image()
        .map_err(|err| InferError::decode("point cloud", path, err))?
    {
        DecodingResult::F32(values) => values,
        DecodingResult::F64(values) => values.into_iter().map(|v| v as f32).collect(),
        DecodingResult::U8(values) => values.into_iter().map(f32::from).collect(),
        DecodingResult::U16(values) => values.into_iter().map(f32::from).collect(),
        DecodingResult::U32(values) => values.into_iter().map(|v| v as f32).collect(),
        DecodingResult::I8(values) => values.into_iter().map(f32::from).collect(),
        DecodingResult::I16(values) => values.into_iter().map(f32::from).collect(),
        _ => {
            return Err(InferError::decode(
                "point cloud",
                path,
                "unsupported tiff sample format",
            ))
        }
    };
    let expected = width as usize * height as usize * channels;
    if data.len() != expected {
        return Err(InferError::decode(
            "point cloud",
            path,
            format!("raster length {} != {expected}", data.len()),
        ));
    }
    Ok(PointCloudRaster {
        width: width as usize,
        height: height as usize,
        channels,
        data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use tiff::encoder::{colortype, TiffEncoder};

    fn write_cloud(path: &Path, width: u32, height: u32, data: &[f32]) {
        let file = File::create(path).unwrap();
        let mut encoder = TiffEncoder::new(file).unwrap();
        encoder
            .write_image::<colortype::RGB32Float>(width, height, data)
            .unwrap();
    }

    #[test]
    fn decodes_an_f32_rgb_raster() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cloud.tiff");
        let data: Vec<f32> = (0..4 * 4 * 3).map(|v| v as f32).collect();
        write_cloud(&path, 4, 4, &data);

        let raster = load_point_cloud(&path).unwrap();
        assert_eq!((raster.width, raster.height, raster.channels), (4, 4, 3));
        assert_eq!(raster.at(1, 0, 2), 5.0);
    }

    #[test]
    fn identity_resize_preserves_values() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cloud.tiff");
        let data: Vec<f32> = (0..2 * 2 * 3).map(|v| v as f32).collect();
        write_cloud(&path, 2, 2, &data);

        let raster = load_point_cloud(&path).unwrap();
        let tensor = raster.to_model_input(2).unwrap();
        assert_eq!(tensor.shape(), (3, 4));
        // Channel 0 plane equals the source channel 0 samples.
        assert_eq!(&tensor.data()[..4], &[0.0, 3.0, 6.0, 9.0]);
    }

    #[test]
    fn upsampling_blends_neighbours() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cloud.tiff");
        // 2x1 raster, single row: Z channel values 0 and 4.
        let data = vec![0.0, 0.0, 0.0, 0.0, 0.0, 4.0];
        write_cloud(&path, 2, 1, &data);

        let raster = load_point_cloud(&path).unwrap();
        let tensor = raster.to_model_input(4).unwrap();
        let z = &tensor.data()[2 * 16..2 * 16 + 4];
        // Half-pixel sampling: centre samples interpolate, edges clamp.
        assert_eq!(z, &[0.0, 1.0, 3.0, 4.0]);
    }

    #[test]
    fn depth_view_takes_the_last_channel() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cloud.tiff");
        let data: Vec<f32> = (0..2 * 2 * 3).map(|v| v as f32).collect();
        write_cloud(&path, 2, 2, &data);

        let raster = load_point_cloud(&path).unwrap();
        let depth = raster.depth_view(2).unwrap();
        assert_eq!(depth.data(), &[2.0, 5.0, 8.0, 11.0]);
    }

    #[test]
    fn missing_file_is_a_decode_error() {
        assert!(matches!(
            load_point_cloud(Path::new("/nonexistent/cloud.tiff")),
            Err(InferError::InputDecode { .. })
        ));
    }
}
