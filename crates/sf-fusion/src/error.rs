// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralFuse — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use sf_tensor::TensorError;
use std::path::PathBuf;
use thiserror::Error;

/// Request-scoped failure taxonomy for the inference pipeline.
///
/// Every variant is recovered at the request boundary; none of them should
/// take the process down. Deterministic failures (everything except `Io`)
/// are never retried.
#[derive(Debug, Error)]
pub enum InferError {
    /// One or more required weight files are absent. Reported before any
    /// module construction, listing every missing file.
    #[error("missing checkpoint files: {files:?}")]
    MissingCheckpoints { files: Vec<PathBuf> },

    /// A weight file exists but failed to deserialize or did not match the
    /// module's parameter shapes.
    #[error("failed to load checkpoint {path}: {source}")]
    CheckpointLoad {
        path: PathBuf,
        source: TensorError,
    },

    /// An input raster could not be decoded into the expected tensor shape.
    #[error("failed to decode {input} input {path}: {message}")]
    InputDecode {
        input: &'static str,
        path: PathBuf,
        message: String,
    },

    /// Internal shape-contract violation; a programming error, not a user
    /// input error. Aborts the request with the underlying diagnostic.
    #[error("shape contract violated: {0}")]
    Shape(#[from] TensorError),

    /// Filesystem failure while writing request artifacts.
    #[error("i/o failure at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The class name is not one of the fixed part categories.
    #[error("unknown category `{name}`")]
    UnknownCategory { name: String },

    /// The request was cancelled between pipeline stages.
    #[error("inference cancelled")]
    Cancelled,

    /// The request exceeded its wall-clock budget.
    #[error("inference deadline exceeded")]
    DeadlineExceeded,
}

impl InferError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn decode(
        input: &'static str,
        path: impl Into<PathBuf>,
        message: impl ToString,
    ) -> Self {
        Self::InputDecode {
            input,
            path: path.into(),
            message: message.to_string(),
        }
    }
}
