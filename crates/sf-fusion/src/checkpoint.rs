// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralFuse — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Checkpoint resolution and model assembly.
//!
//! A model instance is a bundle of three modules with a shared training
//! lineage: the fusion encoder and the two modality decoders. The three are
//! trained jointly and must always be loaded from the same checkpoint set;
//! mixing files across sets silently produces garbage scores, so the store
//! resolves all three paths from one [`ModelKey`] and refuses to load unless
//! every file is present.

use crate::category::Category;
use crate::error::InferError;
use crate::models::decoder::{DecoderConfig, DecoupledDecoder};
use crate::models::fusion::{FusionEncoder, FusionEncoderConfig};
use sf_nn::io;
use sf_nn::module::{InitContext, Module};
use sf_tensor::{PureResult, TensorError};
use std::path::{Path, PathBuf};

/// Identity of one trained checkpoint set.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ModelKey {
    pub category: Category,
    pub epochs: u32,
    pub batch_size: u32,
}

impl ModelKey {
    pub fn new(category: Category, epochs: u32, batch_size: u32) -> Self {
        Self {
            category,
            epochs,
            batch_size,
        }
    }

    /// Canonical identity string embedded in every checkpoint filename,
    /// e.g. `bagel_750ep_4bs`.
    pub fn identity(&self) -> String {
        format!(
            "{}_{}ep_{}bs",
            self.category.as_str(),
            self.epochs,
            self.batch_size
        )
    }
}

/// Architecture hyperparameters of a full model bundle. The defaults match
/// the shipped checkpoint sets; custom values must stay cross-consistent
/// (both decoders consume the encoder's fused width).
#[derive(Clone, Debug)]
pub struct ModelConfig {
    pub fusion: FusionEncoderConfig,
    pub decoder_2d: DecoderConfig,
    pub decoder_3d: DecoderConfig,
}

impl Default for ModelConfig {
    fn default() -> Self {
        let fusion = FusionEncoderConfig::default();
        Self {
            decoder_2d: DecoderConfig::for_output(fusion.in_2d),
            decoder_3d: DecoderConfig::for_output(fusion.in_3d),
            fusion,
        }
    }
}

impl ModelConfig {
    /// Cross-consistency check: the decoders must consume the encoder's
    /// output and reconstruct the encoder's inputs.
    pub fn validate(&self) -> PureResult<()> {
        if self.decoder_2d.in_features != self.fusion.out
            || self.decoder_3d.in_features != self.fusion.out
        {
            return Err(TensorError::InvalidValue {
                label: "model_config_fused_width",
            });
        }
        if self.decoder_2d.out_features != self.fusion.in_2d
            || self.decoder_3d.out_features != self.fusion.in_3d
        {
            return Err(TensorError::InvalidValue {
                label: "model_config_decoder_width",
            });
        }
        Ok(())
    }
}

/// One loaded checkpoint set, ready for inference. Always in eval mode once
/// it leaves [`CheckpointStore::load`].
#[derive(Debug)]
pub struct FusionModel {
    pub fusion: FusionEncoder,
    pub decoder_2d: DecoupledDecoder,
    pub decoder_3d: DecoupledDecoder,
}

impl FusionModel {
    /// Freshly initialised bundle; parameter values are placeholders until a
    /// checkpoint set is loaded over them.
    pub fn new(config: &ModelConfig, ctx: &mut InitContext) -> PureResult<Self> {
        config.validate()?;
        Ok(Self {
            fusion: FusionEncoder::new(&config.fusion, ctx)?,
            decoder_2d: DecoupledDecoder::new("decoder_2d", &config.decoder_2d, ctx)?,
            decoder_3d: DecoupledDecoder::new("decoder_3d", &config.decoder_3d, ctx)?,
        })
    }

    /// Puts every stochastic submodule into deterministic eval mode.
    pub fn set_eval(&self) {
        self.fusion.set_training(false);
        self.decoder_2d.set_training(false);
        self.decoder_3d.set_training(false);
    }
}

/// Filenames of one checkpoint set, resolved under the store root.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckpointPaths {
    pub fusion: PathBuf,
    pub decoder_2d: PathBuf,
    pub decoder_3d: PathBuf,
}

impl CheckpointPaths {
    fn all(&self) -> [&PathBuf; 3] {
        [&self.fusion, &self.decoder_2d, &self.decoder_3d]
    }
}

/// Resolves and loads checkpoint sets from a directory tree laid out as
/// `root/<category>/<module>_<identity>.bin`.
#[derive(Clone, Debug)]
pub struct CheckpointStore {
    root: PathBuf,
}

impl CheckpointStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The three file paths a key resolves to.
    pub fn paths(&self, key: &ModelKey) -> CheckpointPaths {
        let dir = self.root.join(key.category.as_str());
        let id = key.identity();
        CheckpointPaths {
            fusion: dir.join(format!("fusion_encoder_{id}.bin")),
            decoder_2d: dir.join(format!("decoder_2d_{id}.bin")),
            decoder_3d: dir.join(format!("decoder_3d_{id}.bin")),
        }
    }

    /// Checks that every file of the set exists before anything is built.
    /// Reports ALL missing files at once so an operator can fix the set in
    /// one pass instead of discovering them one by one.
    pub fn preflight(&self, key: &ModelKey) -> Result<CheckpointPaths, InferError> {
        let paths = self.paths(key);
        let missing: Vec<PathBuf> = paths
            .all()
            .into_iter()
            .filter(|p| !p.is_file())
            .cloned()
            .collect();
        if missing.is_empty() {
            Ok(paths)
        } else {
            Err(InferError::MissingCheckpoints { files: missing })
        }
    }

    /// Preflights, builds the bundle, loads all three snapshots over it, and
    /// returns it in eval mode.
    pub fn load(&self, key: &ModelKey, config: &ModelConfig) -> Result<FusionModel, InferError> {
        let paths = self.preflight(key)?;
        let mut model = FusionModel::new(config, &mut InitContext::default())?;
        let restore = |module: &mut dyn Module, path: &PathBuf| {
            io::load_bincode(module, path).map_err(|source| InferError::CheckpointLoad {
                path: path.clone(),
                source,
            })
        };
        restore(&mut model.fusion, &paths.fusion)?;
        restore(&mut model.decoder_2d, &paths.decoder_2d)?;
        restore(&mut model.decoder_3d, &paths.decoder_3d)?;
        model.set_eval();
        tracing::info!(identity = %key.identity(), "checkpoint set loaded");
        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_string_matches_checkpoint_naming() {
        let key = ModelKey::new(Category::CableGland, 750, 4);
        assert_eq!(key.identity(), "cable_gland_750ep_4bs");
    }

    #[test]
    fn paths_resolve_under_the_category_directory() {
        let store = CheckpointStore::new("/weights");
        let key = ModelKey::new(Category::Bagel, 500, 8);
        let paths = store.paths(&key);
        assert_eq!(
            paths.fusion,
            PathBuf::from("/weights/bagel/fusion_encoder_bagel_500ep_8bs.bin")
        );
        assert_eq!(
            paths.decoder_3d,
            PathBuf::from("/weights/bagel/decoder_3d_bagel_500ep_8bs.bin")
        );
    }

    #[test]
    fn preflight_reports_every_missing_file() {
        let store = CheckpointStore::new("/nonexistent");
        let key = ModelKey::new(Category::Dowel, 750, 4);
        match store.preflight(&key) {
            Err(InferError::MissingCheckpoints { files }) => assert_eq!(files.len(), 3),
            other => panic!("expected MissingCheckpoints, got {other:?}"),
        }
    }

    #[test]
    fn default_config_is_cross_consistent() {
        ModelConfig::default().validate().unwrap();
    }

    #[test]
    fn inconsistent_decoder_width_is_rejected() {
        let mut config = ModelConfig::default();
        config.decoder_2d.out_features += 1;
        assert!(config.validate().is_err());
    }
}
