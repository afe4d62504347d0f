// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralFuse — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Request orchestration.
//!
//! A request flows through fixed stages: decode inputs, resolve the model,
//! extract patch embeddings, fuse, reconstruct both modalities, assemble the
//! anomaly map, render artifacts. The run budget is polled between stages
//! only; a stage that has started always runs to completion, so cancellation
//! latency is bounded by the slowest single stage rather than requiring
//! interruptible kernels.

use crate::backbone::{FeatureBackbone, PatchGrids};
use crate::cache::ModelCache;
use crate::category::Category;
use crate::checkpoint::{CheckpointStore, ModelConfig, ModelKey};
use crate::error::InferError;
use crate::residual::{AnomalyMaps, ResidualAssembler};
use crate::transforms::{denormalize_rgb, load_point_cloud, load_rgb, render, OutputArtifacts};
use sf_nn::module::Module;
use sf_tensor::Tensor;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Cooperative cancellation and wall-clock budget for one request.
#[derive(Clone, Debug, Default)]
pub struct RunBudget {
    cancel: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl RunBudget {
    /// Budget with no deadline and no cancellation.
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Budget that expires `limit` from now.
    pub fn with_deadline(limit: Duration) -> Self {
        Self {
            cancel: Arc::new(AtomicBool::new(false)),
            deadline: Some(Instant::now() + limit),
        }
    }

    /// Requests cancellation; takes effect at the next stage boundary.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    /// Checked between stages. Cancellation wins over the deadline when both
    /// have tripped.
    pub fn check(&self) -> Result<(), InferError> {
        if self.cancel.load(Ordering::Relaxed) {
            return Err(InferError::Cancelled);
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() > deadline {
                return Err(InferError::DeadlineExceeded);
            }
        }
        Ok(())
    }
}

/// Pipeline-wide settings. `epochs`/`batch_size` select which trained
/// checkpoint set serves each category.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    pub checkpoint_root: PathBuf,
    pub output_root: PathBuf,
    pub epochs: u32,
    pub batch_size: u32,
    pub grid_side: usize,
    pub model: ModelConfig,
}

impl PipelineConfig {
    /// Settings matching the shipped checkpoint sets.
    pub fn new(checkpoint_root: impl Into<PathBuf>, output_root: impl Into<PathBuf>) -> Self {
        Self {
            checkpoint_root: checkpoint_root.into(),
            output_root: output_root.into(),
            epochs: 750,
            batch_size: 4,
            grid_side: crate::GRID_SIDE,
            model: ModelConfig::default(),
        }
    }

    fn key(&self, category: Category) -> ModelKey {
        ModelKey::new(category, self.epochs, self.batch_size)
    }
}

/// A file-based scoring request.
#[derive(Clone, Debug)]
pub struct FileRequest {
    /// Names the artifact directory; must be unique per request.
    pub request_id: String,
    pub category: Category,
    pub rgb_path: PathBuf,
    pub cloud_path: PathBuf,
}

/// Result of one scored request.
#[derive(Clone, Debug)]
pub struct InferenceOutcome {
    pub maps: AnomalyMaps,
    /// Present only for file requests; in-memory scoring writes nothing.
    pub artifacts: Option<OutputArtifacts>,
}

/// Ties the model cache, checkpoint store, and feature backbone together
/// into the request-scoped scoring flow. Shared across threads behind an
/// `Arc`; all interior state is the cache's own synchronisation.
pub struct InferencePipeline<B> {
    config: PipelineConfig,
    store: CheckpointStore,
    cache: ModelCache,
    assembler: ResidualAssembler,
    backbone: B,
}

impl<B: FeatureBackbone> InferencePipeline<B> {
    pub fn new(config: PipelineConfig, backbone: B) -> Result<Self, InferError> {
        config.model.validate()?;
        let store = CheckpointStore::new(&config.checkpoint_root);
        let assembler = ResidualAssembler::new(config.grid_side)?;
        Ok(Self {
            config,
            store,
            cache: ModelCache::new(),
            assembler,
            backbone,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Warms the cache for a category without scoring anything.
    pub fn preload(&self, category: Category) -> Result<(), InferError> {
        self.cache
            .get_or_load(&self.config.key(category), &self.store, &self.config.model)
            .map(|_| ())
    }

    /// Scores already-preprocessed input tensors, returning the raw maps.
    pub fn run(
        &self,
        category: Category,
        rgb: &Tensor,
        cloud: &Tensor,
        budget: &RunBudget,
    ) -> Result<AnomalyMaps, InferError> {
        budget.check()?;
        let key = self.config.key(category);
        let model = self
            .cache
            .get_or_load(&key, &self.store, &self.config.model)?;

        budget.check()?;
        let grids = self.backbone.patch_grids(rgb, cloud)?;
        let grids = self.validated(grids)?;
        tracing::debug!(
            identity = %key.identity(),
            locations = grids.locations(),
            "patch grids extracted"
        );

        budget.check()?;
        let fused = model.fusion.forward_pair(&grids.rgb, &grids.xyz)?;
        let recon_2d = model.decoder_2d.forward(&fused)?;
        let recon_3d = model.decoder_3d.forward(&fused)?;

        budget.check()?;
        let maps = self
            .assembler
            .assemble(&grids.rgb, &recon_2d, &grids.xyz, &recon_3d)?;
        Ok(maps)
    }

    /// Full file request: decode inputs, score, render artifacts.
    pub fn infer_files(
        &self,
        request: &FileRequest,
        budget: &RunBudget,
    ) -> Result<InferenceOutcome, InferError> {
        let side = self.config.grid_side;
        budget.check()?;
        let rgb = load_rgb(&request.rgb_path, side)?;
        let raster = load_point_cloud(&request.cloud_path)?;
        let cloud = raster.to_model_input(side)?;

        let maps = self.run(request.category, &rgb, &cloud, budget)?;

        budget.check()?;
        let artifacts = render::write_artifacts(
            &self.config.output_root,
            &request.request_id,
            side,
            &denormalize_rgb(&rgb),
            &raster.depth_view(side)?,
            &maps.residual_2d,
            &maps.anomaly,
        )?;
        tracing::info!(
            request_id = %request.request_id,
            category = %request.category,
            directory = %artifacts.directory.display(),
            "request scored"
        );
        Ok(InferenceOutcome {
            maps,
            artifacts: Some(artifacts),
        })
    }

    /// Re-checks the grid contract at the pipeline boundary; the backbone is
    /// an external collaborator and is not trusted to have validated.
    fn validated(&self, grids: PatchGrids) -> Result<PatchGrids, InferError> {
        let grids = PatchGrids::validated(
            grids.rgb,
            grids.xyz,
            self.config.model.fusion.in_2d,
            self.config.model.fusion.in_3d,
        )?;
        let expected = self.config.grid_side * self.config.grid_side;
        if grids.locations() != expected {
            return Err(InferError::Shape(sf_tensor::TensorError::ShapeMismatch {
                left: grids.rgb.shape(),
                right: (expected, grids.rgb.shape().1),
            }));
        }
        Ok(grids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancelled_budget_fails_closed() {
        let budget = RunBudget::unbounded();
        budget.cancel();
        assert!(matches!(budget.check(), Err(InferError::Cancelled)));
    }

    #[test]
    fn expired_deadline_is_reported() {
        let budget = RunBudget::with_deadline(Duration::from_secs(0));
        std::thread::sleep(Duration::from_millis(5));
        assert!(matches!(budget.check(), Err(InferError::DeadlineExceeded)));
    }

    #[test]
    fn cancellation_wins_over_the_deadline() {
        let budget = RunBudget::with_deadline(Duration::from_secs(0));
        budget.cancel();
        std::thread::sleep(Duration::from_millis(5));
        assert!(matches!(budget.check(), Err(InferError::Cancelled)));
    }

    #[test]
    fn unbounded_budget_never_trips() {
        assert!(RunBudget::unbounded().check().is_ok());
    }
}
