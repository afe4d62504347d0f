// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralFuse — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Crossmodal fusion-and-reconstruction anomaly scoring.
//!
//! The engine maps per-location RGB and 3D patch embeddings into a shared
//! fused representation, reconstructs each modality independently from that
//! fusion, and turns the two reconstruction errors into a single smoothed
//! per-pixel anomaly heatmap. Checkpoint resolution, the model cache, and the
//! raster adapters around the forward pipeline live here too; the backbone
//! feature extractor and any serving layer are external collaborators behind
//! the [`FeatureBackbone`] seam.

pub mod backbone;
pub mod cache;
pub mod category;
pub mod checkpoint;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod residual;
pub mod smoothing;
pub mod transforms;

pub use backbone::{FeatureBackbone, PatchGrids};
pub use cache::ModelCache;
pub use category::Category;
pub use checkpoint::{CheckpointStore, FusionModel, ModelConfig, ModelKey};
pub use error::InferError;
pub use models::decoder::{DecoderConfig, DecoupledDecoder};
pub use models::fusion::{FusionEncoder, FusionEncoderConfig};
pub use pipeline::{
    FileRequest, InferenceOutcome, InferencePipeline, PipelineConfig, RunBudget,
};
pub use residual::{AnomalyMaps, ResidualAssembler};

pub use sf_tensor::{PureResult, Tensor, TensorError};

/// Side length of the spatial location grid shared by both modalities.
pub const GRID_SIDE: usize = 224;
/// Channel depth of the 2D (RGB) patch embeddings.
pub const RGB_EMBED_DIM: usize = 768;
/// Channel depth of the 3D (point cloud) patch embeddings.
pub const XYZ_EMBED_DIM: usize = 1152;
/// Channel depth of the fused embedding.
pub const FUSED_DIM: usize = 960;
