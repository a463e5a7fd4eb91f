// Copyright (c) Kyutai, all rights reserved.
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use std::collections::BTreeMap;
use std::path::Path;

use candle::{Device, Tensor};

use crate::error::{PrepError, Result};

/// On-disk formats a checkpoint can be read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointFormat {
    PyTorch,
    SafeTensors,
    Npz,
}

impl CheckpointFormat {
    /// Picks the reader from the file extension. Anything unrecognised is
    /// treated as a pickle, which is what the hub serves as `pytorch_model.bin`.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("safetensors") => Self::SafeTensors,
            Some("npz") => Self::Npz,
            _ => Self::PyTorch,
        }
    }
}

/// Named tensors, always traversed in key order.
#[derive(Debug, Clone, Default)]
pub struct TensorCollection {
    tensors: BTreeMap<String, Tensor>,
}

impl TensorCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let format = CheckpointFormat::from_path(path);
        tracing::debug!(?path, ?format, "loading checkpoint");
        let err = |e: candle::Error| PrepError::deserialization(path, e);
        let tensors = match format {
            CheckpointFormat::PyTorch => candle::pickle::read_all(path).map_err(err)?,
            CheckpointFormat::SafeTensors => {
                candle::safetensors::load(path, &Device::Cpu).map_err(err)?.into_iter().collect()
            }
            CheckpointFormat::Npz => Tensor::read_npz(path).map_err(err)?,
        };
        Ok(tensors.into_iter().collect())
    }

    /// Inserts a tensor, refusing to replace an existing entry.
    pub fn insert_new(&mut self, key: String, tensor: Tensor) -> Result<()> {
        if self.tensors.contains_key(&key) {
            return Err(PrepError::DuplicateKey(key));
        }
        self.tensors.insert(key, tensor);
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&Tensor> {
        self.tensors.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.tensors.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.tensors.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Tensor)> {
        self.tensors.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }
}

impl FromIterator<(String, Tensor)> for TensorCollection {
    fn from_iter<I: IntoIterator<Item = (String, Tensor)>>(iter: I) -> Self {
        Self { tensors: iter.into_iter().collect() }
    }
}
