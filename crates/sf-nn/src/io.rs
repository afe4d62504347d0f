// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralFuse — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! State-dict checkpoint IO.
//!
//! A checkpoint is a snapshot of one module's parameters, keyed by the fully
//! qualified parameter names. Loading always routes through
//! [`Module::load_state_dict`] so shape and name mismatches surface as
//! errors instead of silently corrupting the model.

use crate::module::Module;
use crate::{PureResult, Tensor, TensorError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

#[derive(Clone, Debug, Serialize, Deserialize)]
struct StoredTensor {
    rows: usize,
    cols: usize,
    data: Vec<f32>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct ModuleSnapshot {
    parameters: HashMap<String, StoredTensor>,
}

fn to_snapshot<M: Module + ?Sized>(module: &M) -> PureResult<ModuleSnapshot> {
    let mut parameters = HashMap::new();
    for (name, tensor) in module.state_dict()? {
        parameters.insert(
            name,
            StoredTensor {
                rows: tensor.shape().0,
                cols: tensor.shape().1,
                data: tensor.data().to_vec(),
            },
        );
    }
    Ok(ModuleSnapshot { parameters })
}

fn from_snapshot(snapshot: ModuleSnapshot) -> PureResult<HashMap<String, Tensor>> {
    let mut state = HashMap::new();
    for (name, stored) in snapshot.parameters {
        state.insert(name, Tensor::from_vec(stored.rows, stored.cols, stored.data)?);
    }
    Ok(state)
}

fn io_error(err: std::io::Error) -> TensorError {
    TensorError::Io {
        message: err.to_string(),
    }
}

fn serde_error(err: impl ToString) -> TensorError {
    TensorError::Serialization {
        message: err.to_string(),
    }
}

/// Serialises a module snapshot as pretty JSON.
pub fn save_json<M: Module + ?Sized, P: AsRef<Path>>(module: &M, path: P) -> PureResult<()> {
    let snapshot = to_snapshot(module)?;
    let writer = BufWriter::new(File::create(path.as_ref()).map_err(io_error)?);
    serde_json::to_writer_pretty(writer, &snapshot).map_err(serde_error)
}

/// Restores a module from a JSON snapshot.
pub fn load_json<M: Module + ?Sized, P: AsRef<Path>>(module: &mut M, path: P) -> PureResult<()> {
    let reader = BufReader::new(File::open(path.as_ref()).map_err(io_error)?);
    let snapshot: ModuleSnapshot = serde_json::from_reader(reader).map_err(serde_error)?;
    module.load_state_dict(&from_snapshot(snapshot)?)
}

/// Serialises a module snapshot in the compact bincode format used for the
/// on-disk checkpoint sets.
pub fn save_bincode<M: Module + ?Sized, P: AsRef<Path>>(module: &M, path: P) -> PureResult<()> {
    let snapshot = to_snapshot(module)?;
    let writer = BufWriter::new(File::create(path.as_ref()).map_err(io_error)?);
    bincode::serialize_into(writer, &snapshot).map_err(serde_error)
}

/// Restores a module from a bincode snapshot.
pub fn load_bincode<M: Module + ?Sized, P: AsRef<Path>>(module: &mut M, path: P) -> PureResult<()> {
    let reader = BufReader::new(File::open(path.as_ref()).map_err(io_error)?);
    let snapshot: ModuleSnapshot = bincode::deserialize_from(reader).map_err(serde_error)?;
    module.load_state_dict(&from_snapshot(snapshot)?)
}
