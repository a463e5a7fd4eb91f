// Copyright (c) Kyutai, all rights reserved.
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Re-keys a bare GPT-2 trunk checkpoint into the LM-head model layout.
//!
//! Every source tensor moves under the trunk prefix (`wte.weight` becomes
//! `transformer.wte.weight`). The token embedding is additionally copied to
//! `lm_head.weight` since the output projection shares its values with the
//! input embedding.

use std::path::Path;

use candle::{DType, Tensor};

use crate::archive;
use crate::error::{PrepError, Result};
use crate::tensors::TensorCollection;

pub const TRUNK_PREFIX: &str = "transformer";
pub const TOKEN_EMBEDDING: &str = "wte.weight";
pub const LM_HEAD: &str = "lm_head.weight";

/// A source tensor that is also emitted, unprefixed, under another name.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct TiedWeight {
    pub source: String,
    pub target: String,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct RemapRule {
    #[serde(default = "default_prefix")]
    pub prefix: String,
    #[serde(default = "default_tied")]
    pub tied: Vec<TiedWeight>,
}

fn default_prefix() -> String {
    TRUNK_PREFIX.to_string()
}

fn default_tied() -> Vec<TiedWeight> {
    vec![TiedWeight { source: TOKEN_EMBEDDING.to_string(), target: LM_HEAD.to_string() }]
}

impl Default for RemapRule {
    fn default() -> Self {
        Self { prefix: default_prefix(), tied: default_tied() }
    }
}

impl RemapRule {
    pub fn prefixed(&self, key: &str) -> String {
        if self.prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}.{key}", self.prefix)
        }
    }

    fn tied_targets<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.tied.iter().filter(move |t| t.source == key).map(|t| t.target.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct WeightRemapper {
    rule: RemapRule,
    upcast_bf16: bool,
}

impl Default for WeightRemapper {
    fn default() -> Self {
        Self::new(RemapRule::default())
    }
}

impl WeightRemapper {
    pub fn new(rule: RemapRule) -> Self {
        Self { rule, upcast_bf16: true }
    }

    /// Whether bf16 tensors are widened to f32. When disabled they are
    /// rejected, the npy format having no bf16 type.
    pub fn with_upcast_bf16(mut self, upcast_bf16: bool) -> Self {
        self.upcast_bf16 = upcast_bf16;
        self
    }

    pub fn remap(&self, source: &TensorCollection) -> Result<TensorCollection> {
        if source.is_empty() {
            return Err(PrepError::EmptyCheckpoint);
        }
        let mut out = TensorCollection::new();
        for (key, tensor) in source.iter() {
            let new_key = self.rule.prefixed(key);
            tracing::debug!(%key, %new_key, shape = ?tensor.dims(), dtype = ?tensor.dtype(), "remap");
            out.insert_new(new_key, self.contiguous_copy(key, tensor)?)?;
            for target in self.rule.tied_targets(key) {
                tracing::debug!(%key, %target, "tied weight");
                out.insert_new(target.to_string(), self.contiguous_copy(key, tensor)?)?;
            }
        }
        Ok(out)
    }

    /// Remaps `source` and writes the result as an npz archive at `dst`.
    pub fn remap_to_file<P: AsRef<Path>>(
        &self,
        source: &TensorCollection,
        dst: P,
    ) -> Result<TensorCollection> {
        let remapped = self.remap(source)?;
        archive::write(&remapped, dst)?;
        Ok(remapped)
    }

    fn contiguous_copy(&self, key: &str, tensor: &Tensor) -> Result<Tensor> {
        let conv = |e: candle::Error| PrepError::TypeConversion {
            key: key.to_string(),
            reason: e.to_string(),
        };
        let tensor = match tensor.dtype() {
            DType::U8 | DType::U32 | DType::I64 | DType::F16 | DType::F32 | DType::F64 => {
                tensor.clone()
            }
            DType::BF16 if self.upcast_bf16 => tensor.to_dtype(DType::F32).map_err(conv)?,
            dtype => {
                return Err(PrepError::TypeConversion {
                    key: key.to_string(),
                    reason: format!("unsupported dtype {dtype:?}"),
                })
            }
        };
        // `contiguous` hands back the same storage when the layout is already
        // contiguous, so copy explicitly to keep the output independent.
        tensor.contiguous().and_then(|t| t.copy()).map_err(conv)
    }
}
