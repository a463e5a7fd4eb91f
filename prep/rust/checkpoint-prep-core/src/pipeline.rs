// Copyright (c) Kyutai, all rights reserved.
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::config::PrepConfig;
use crate::convert::{ExternalConverter, Outcome};
use crate::error::{PrepError, Result};
use crate::fetch::{AssetFetcher, AssetKind};
use crate::tensors::TensorCollection;

#[derive(Debug, Clone)]
pub struct PrepReport {
    pub target_dir: PathBuf,
    pub archive: PathBuf,
    pub source_tensors: usize,
    pub written_tensors: usize,
    pub conversion: Option<Outcome>,
}

impl PrepReport {
    pub fn converted(&self) -> bool {
        matches!(self.conversion, Some(Outcome::Converted))
    }
}

/// Summary fields of a GPT-2 `config.json`, logged after install.
#[derive(Debug, serde::Deserialize)]
struct ModelConfigSummary {
    model_type: Option<String>,
    vocab_size: Option<usize>,
    n_layer: Option<usize>,
    n_embd: Option<usize>,
}

fn check_model_config(path: &Path) -> Result<()> {
    let bytes = std::fs::read(path).map_err(|e| PrepError::io(path, e))?;
    let summary: ModelConfigSummary =
        serde_json::from_slice(&bytes).map_err(|source| PrepError::ModelConfig {
            path: path.to_path_buf(),
            source,
        })?;
    tracing::info!(
        model_type = ?summary.model_type,
        vocab_size = ?summary.vocab_size,
        n_layer = ?summary.n_layer,
        n_embd = ?summary.n_embd,
        "model config"
    );
    Ok(())
}

/// Fetches, installs, remaps and converts one checkpoint. Any failure aborts
/// the run, nothing is retried.
pub fn run(
    config: &PrepConfig,
    fetcher: &dyn AssetFetcher,
    converter: Option<&ExternalConverter>,
) -> Result<PrepReport> {
    let layout = config.layout()?;
    let _span = tracing::info_span!("prep", model = %config.model_name).entered();

    let mut fetched = BTreeMap::new();
    for kind in AssetKind::ALL {
        fetched.insert(kind, fetcher.fetch(kind)?);
    }

    layout.create()?;
    tracing::info!(target_dir = ?layout.root(), "target directory ready");
    for (kind, src) in fetched.iter() {
        layout.install(*kind, src)?;
    }
    check_model_config(&layout.path_for(AssetKind::Config))?;

    let weights = TensorCollection::load(&fetched[&AssetKind::Weights])?;
    tracing::info!(tensors = weights.len(), "checkpoint loaded");

    let archive = layout.archive();
    let remapped = config.remapper().remap_to_file(&weights, &archive)?;

    let conversion = match converter {
        Some(converter) => Some(converter.convert(&archive, &layout.converted())?),
        None => {
            tracing::info!("converter disabled, stopping at the npz archive");
            None
        }
    };

    Ok(PrepReport {
        target_dir: layout.root().to_path_buf(),
        archive,
        source_tensors: weights.len(),
        written_tensors: remapped.len(),
        conversion,
    })
}
