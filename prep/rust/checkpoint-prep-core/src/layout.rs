// Copyright (c) Kyutai, all rights reserved.
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use std::path::{Path, PathBuf};

use crate::error::{PrepError, Result};
use crate::fetch::AssetKind;

pub const CONFIG_FILE: &str = "config.json";
pub const VOCAB_FILE: &str = "vocab.txt";
pub const MERGES_FILE: &str = "merges.txt";
pub const RAW_WEIGHTS_FILE: &str = "model.bin";
pub const ARCHIVE_FILE: &str = "model.npz";
pub const CONVERTED_FILE: &str = "model.ot";

/// The prepared model directory, `<home>/<namespace>/<model>/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetLayout {
    root: PathBuf,
}

impl TargetLayout {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, kind: AssetKind) -> PathBuf {
        let file = match kind {
            AssetKind::Config => CONFIG_FILE,
            AssetKind::Vocab => VOCAB_FILE,
            AssetKind::Merges => MERGES_FILE,
            AssetKind::Weights => RAW_WEIGHTS_FILE,
        };
        self.root.join(file)
    }

    pub fn archive(&self) -> PathBuf {
        self.root.join(ARCHIVE_FILE)
    }

    pub fn converted(&self) -> PathBuf {
        self.root.join(CONVERTED_FILE)
    }

    pub fn create(&self) -> Result<()> {
        std::fs::create_dir_all(&self.root).map_err(|e| PrepError::io(&self.root, e))
    }

    /// Copies a fetched asset verbatim into its slot. An asset that already
    /// is the slot is left alone, `fs::copy` would truncate it first.
    pub fn install(&self, kind: AssetKind, src: &Path) -> Result<PathBuf> {
        let dst = self.path_for(kind);
        let src_real = std::fs::canonicalize(src).map_err(|e| PrepError::io(src, e))?;
        if std::fs::canonicalize(&dst).is_ok_and(|d| d == src_real) {
            tracing::info!(%kind, ?dst, "already in place");
            return Ok(dst);
        }
        let bytes = std::fs::copy(src, &dst).map_err(|e| PrepError::io(src, e))?;
        tracing::info!(%kind, ?dst, bytes, "installed");
        Ok(dst)
    }

    /// Files the runtime needs that are not present yet.
    pub fn missing(&self) -> Vec<PathBuf> {
        [
            self.path_for(AssetKind::Config),
            self.path_for(AssetKind::Vocab),
            self.path_for(AssetKind::Merges),
            self.converted(),
        ]
        .into_iter()
        .filter(|p| !p.is_file())
        .collect()
    }
}
