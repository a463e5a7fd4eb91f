// Copyright (c) Kyutai, all rights reserved.
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use std::path::Path;

use candle::{DType, Tensor};

use crate::error::{PrepError, Result};
use crate::tensors::TensorCollection;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub name: String,
    pub shape: Vec<usize>,
    pub dtype: DType,
}

impl ArchiveEntry {
    pub fn numel(&self) -> usize {
        self.shape.iter().product()
    }
}

/// Writes every tensor as `<name>.npy` inside a single npz file, in key order.
pub fn write<P: AsRef<Path>>(tensors: &TensorCollection, path: P) -> Result<()> {
    let path = path.as_ref();
    let entries: Vec<(&str, &Tensor)> = tensors.iter().collect();
    Tensor::write_npz(&entries, path)
        .map_err(|source| PrepError::Serialization { path: path.to_path_buf(), source })?;
    tracing::info!(?path, tensors = entries.len(), "wrote archive");
    Ok(())
}

pub fn read<P: AsRef<Path>>(path: P) -> Result<TensorCollection> {
    let path = path.as_ref();
    let tensors = Tensor::read_npz(path).map_err(|e| PrepError::deserialization(path, e))?;
    Ok(tensors.into_iter().collect())
}

pub fn summarize<P: AsRef<Path>>(path: P) -> Result<Vec<ArchiveEntry>> {
    let tensors = read(path)?;
    Ok(tensors
        .iter()
        .map(|(name, t)| ArchiveEntry { name: name.to_string(), shape: t.dims().to_vec(), dtype: t.dtype() })
        .collect())
}
