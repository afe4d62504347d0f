// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralFuse — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! End-to-end pipeline tests against a stub feature backbone and fixture
//! checkpoint sets written to a temporary store.

use sf_fusion::models::decoder::DecoderConfig;
use sf_fusion::models::fusion::FusionEncoderConfig;
use sf_fusion::{
    Category, CheckpointStore, FeatureBackbone, FileRequest, FusionModel, InferError,
    InferencePipeline, ModelCache, ModelConfig, ModelKey, PatchGrids, PipelineConfig, RunBudget,
    Tensor,
};
use sf_nn::io;
use sf_nn::module::InitContext;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::{tempdir, TempDir};

const SIDE: usize = 4;
const IN_2D: usize = 6;
const IN_3D: usize = 8;
const FUSED: usize = 4;

fn small_model_config() -> ModelConfig {
    ModelConfig {
        fusion: FusionEncoderConfig {
            in_2d: IN_2D,
            in_3d: IN_3D,
            out: FUSED,
            hidden: None,
            num_layers: 2,
            dropout: 0.1,
        },
        decoder_2d: DecoderConfig {
            in_features: FUSED,
            out_features: IN_2D,
            hidden: None,
            num_layers: 3,
            dropout: 0.1,
            attention_reduction: 2,
            attention_kernel: 7,
        },
        decoder_3d: DecoderConfig {
            in_features: FUSED,
            out_features: IN_3D,
            hidden: None,
            num_layers: 3,
            dropout: 0.1,
            attention_reduction: 2,
            attention_kernel: 7,
        },
    }
}

/// Deterministic stand-in for the pretrained feature extractor. Each
/// location's embedding is a fixed function of the input pixel values, and a
/// zero point-cloud pixel maps to a zero 3D embedding.
struct StubBackbone;

impl FeatureBackbone for StubBackbone {
    fn patch_grids(&self, rgb: &Tensor, cloud: &Tensor) -> Result<PatchGrids, InferError> {
        let locations = rgb.shape().1;
        let rgb_grid = Tensor::from_fn(locations, IN_2D, |loc, ch| {
            let plane = ch % rgb.shape().0;
            rgb.data()[plane * locations + loc] * 0.5 + ch as f32 * 0.1
        })?;
        let cloud_channels = cloud.shape().0;
        let xyz_grid = Tensor::from_fn(locations, IN_3D, |loc, ch| {
            let void = (0..cloud_channels).all(|c| cloud.data()[c * locations + loc] == 0.0);
            if void {
                0.0
            } else {
                let plane = ch % cloud_channels;
                cloud.data()[plane * locations + loc] * 0.25 + ch as f32 * 0.05
            }
        })?;
        Ok(PatchGrids {
            rgb: rgb_grid,
            xyz: xyz_grid,
        })
    }
}

fn write_checkpoint_set(store: &CheckpointStore, key: &ModelKey, config: &ModelConfig) {
    let paths = store.paths(key);
    fs::create_dir_all(paths.fusion.parent().unwrap()).unwrap();
    let model = FusionModel::new(config, &mut InitContext::seeded(7)).unwrap();
    io::save_bincode(&model.fusion, &paths.fusion).unwrap();
    io::save_bincode(&model.decoder_2d, &paths.decoder_2d).unwrap();
    io::save_bincode(&model.decoder_3d, &paths.decoder_3d).unwrap();
}

fn write_rgb_input(path: &Path) {
    let mut img = image::RgbImage::new(SIDE as u32, SIDE as u32);
    for (x, y, pixel) in img.enumerate_pixels_mut() {
        pixel.0 = [(x * 60) as u8, (y * 60) as u8, 128];
    }
    img.save(path).unwrap();
}

fn write_cloud_input(path: &Path, zero: bool) {
    let data: Vec<f32> = (0..SIDE * SIDE * 3)
        .map(|idx| if zero { 0.0 } else { 0.1 + idx as f32 * 0.01 })
        .collect();
    let file = fs::File::create(path).unwrap();
    let mut encoder = tiff::encoder::TiffEncoder::new(file).unwrap();
    encoder
        .write_image::<tiff::encoder::colortype::RGB32Float>(SIDE as u32, SIDE as u32, &data)
        .unwrap();
}

struct Fixture {
    _dirs: TempDir,
    pipeline: InferencePipeline<StubBackbone>,
    request: FileRequest,
}

fn fixture(category: Category, zero_cloud: bool) -> Fixture {
    let dirs = tempdir().unwrap();
    let checkpoint_root = dirs.path().join("weights");
    let output_root = dirs.path().join("out");

    let mut config = PipelineConfig::new(&checkpoint_root, &output_root);
    config.grid_side = SIDE;
    config.model = small_model_config();

    let key = ModelKey::new(category, config.epochs, config.batch_size);
    write_checkpoint_set(&CheckpointStore::new(&checkpoint_root), &key, &config.model);

    let rgb_path = dirs.path().join("input.png");
    let cloud_path = dirs.path().join("input.tiff");
    write_rgb_input(&rgb_path);
    write_cloud_input(&cloud_path, zero_cloud);

    Fixture {
        pipeline: InferencePipeline::new(config, StubBackbone).unwrap(),
        request: FileRequest {
            request_id: "req-0".to_string(),
            category,
            rgb_path,
            cloud_path,
        },
        _dirs: dirs,
    }
}

#[test]
fn scores_a_file_request_end_to_end() {
    let fx = fixture(Category::Bagel, false);
    let outcome = fx
        .pipeline
        .infer_files(&fx.request, &RunBudget::unbounded())
        .unwrap();

    assert_eq!(outcome.maps.anomaly.shape(), (SIDE, SIDE));
    assert_eq!(outcome.maps.residual_2d.shape(), (SIDE, SIDE));
    assert_eq!(outcome.maps.residual_3d.shape(), (SIDE, SIDE));
    assert!(outcome
        .maps
        .anomaly
        .data()
        .iter()
        .all(|v| v.is_finite() && *v >= 0.0));

    let artifacts = outcome.artifacts.unwrap();
    for path in [
        &artifacts.rgb,
        &artifacts.depth,
        &artifacts.residual_2d,
        &artifacts.anomaly,
    ] {
        assert!(path.is_file(), "missing artifact {}", path.display());
    }
}

#[test]
fn repeated_scoring_is_deterministic() {
    let fx = fixture(Category::Carrot, false);
    let budget = RunBudget::unbounded();
    let first = fx.pipeline.infer_files(&fx.request, &budget).unwrap();
    let mut second_request = fx.request.clone();
    second_request.request_id = "req-1".to_string();
    let second = fx.pipeline.infer_files(&second_request, &budget).unwrap();
    assert_eq!(first.maps.anomaly, second.maps.anomaly);
}

#[test]
fn empty_point_cloud_scores_zero_everywhere() {
    let fx = fixture(Category::Dowel, true);
    let outcome = fx
        .pipeline
        .infer_files(&fx.request, &RunBudget::unbounded())
        .unwrap();
    assert!(outcome.maps.anomaly.data().iter().all(|v| *v == 0.0));
    // The 2D modality still reconstructs imperfectly on its own.
    assert!(outcome.maps.residual_2d.data().iter().any(|v| *v > 0.0));
}

#[test]
fn missing_checkpoint_set_lists_every_file() {
    let dirs = tempdir().unwrap();
    let mut config = PipelineConfig::new(dirs.path().join("weights"), dirs.path().join("out"));
    config.grid_side = SIDE;
    config.model = small_model_config();
    let output_root = config.output_root.clone();
    let pipeline = InferencePipeline::new(config, StubBackbone).unwrap();

    let rgb = Tensor::zeros(3, SIDE * SIDE).unwrap();
    let cloud = Tensor::zeros(3, SIDE * SIDE).unwrap();
    match pipeline.run(Category::Peach, &rgb, &cloud, &RunBudget::unbounded()) {
        Err(InferError::MissingCheckpoints { files }) => {
            assert_eq!(files.len(), 3);
            assert!(files.iter().all(|f| f.to_string_lossy().contains("peach")));
        }
        other => panic!("expected MissingCheckpoints, got {other:?}"),
    }
    // No partial output directory is left behind.
    assert!(!output_root.exists());
}

#[test]
fn cancelled_request_writes_nothing() {
    let fx = fixture(Category::Foam, false);
    let budget = RunBudget::unbounded();
    budget.cancel();
    let result = fx.pipeline.infer_files(&fx.request, &budget);
    assert!(matches!(result, Err(InferError::Cancelled)));
    assert!(!fx.pipeline.config().output_root.join("req-0").exists());
}

#[test]
fn cache_returns_the_same_instance_for_one_key() {
    let dirs = tempdir().unwrap();
    let store = CheckpointStore::new(dirs.path());
    let config = small_model_config();
    let key = ModelKey::new(Category::Rope, 750, 4);
    write_checkpoint_set(&store, &key, &config);

    let cache = ModelCache::new();
    let first = cache.get_or_load(&key, &store, &config).unwrap();
    let second = cache.get_or_load(&key, &store, &config).unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(cache.len(), 1);

    cache.evict(&key);
    let third = cache.get_or_load(&key, &store, &config).unwrap();
    assert!(!Arc::ptr_eq(&first, &third));
}
