// Copyright (c) Kyutai, all rights reserved.
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use std::path::{Path, PathBuf};

use crate::error::{PrepError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AssetKind {
    Config,
    Vocab,
    Merges,
    Weights,
}

impl AssetKind {
    pub const ALL: [AssetKind; 4] = [Self::Config, Self::Vocab, Self::Merges, Self::Weights];

    /// File name used when reading from a plain local directory.
    pub fn local_file_name(&self) -> &'static str {
        match self {
            Self::Config => "config.json",
            Self::Vocab => "vocab.json",
            Self::Merges => "merges.txt",
            Self::Weights => "pytorch_model.bin",
        }
    }
}

impl std::fmt::Display for AssetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Config => "config",
            Self::Vocab => "vocab",
            Self::Merges => "merges",
            Self::Weights => "weights",
        };
        f.write_str(s)
    }
}

/// Where each asset lives: `hf://org/repo/path/in/repo` or a local path.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct AssetSources {
    pub config: String,
    pub vocab: String,
    pub merges: String,
    pub weights: String,
}

impl AssetSources {
    pub fn get(&self, kind: AssetKind) -> &str {
        match kind {
            AssetKind::Config => &self.config,
            AssetKind::Vocab => &self.vocab,
            AssetKind::Merges => &self.merges,
            AssetKind::Weights => &self.weights,
        }
    }

    pub fn hub(repo: &str, weights_file: &str) -> Self {
        let hf = |file: &str| format!("hf://{repo}/{file}");
        Self {
            config: hf(AssetKind::Config.local_file_name()),
            vocab: hf(AssetKind::Vocab.local_file_name()),
            merges: hf(AssetKind::Merges.local_file_name()),
            weights: hf(weights_file),
        }
    }
}

/// Resolves a logical asset to a file on the local disk, downloading it first
/// if needed.
pub trait AssetFetcher {
    fn fetch(&self, kind: AssetKind) -> Result<PathBuf>;
}

pub fn replace_env_vars(input: &str) -> String {
    // The pattern is a literal, compilation cannot fail.
    let re = regex::Regex::new(r"\$([A-Za-z_][A-Za-z0-9_]*)").unwrap();
    re.replace_all(input, |caps: &regex::Captures| std::env::var(&caps[1]).unwrap_or_default())
        .to_string()
}

/// Splits `org/repo/path/in/repo` into the repo id and the file path.
pub fn parse_hub_path(path: &str) -> Option<(String, String)> {
    let s: Vec<&str> = path.split('/').collect();
    if s.len() < 3 || s.iter().any(|p| p.is_empty()) {
        return None;
    }
    Some((format!("{}/{}", s[0], s[1]), s[2..].join("/")))
}

/// Fetches through the Hugging Face hub cache; local sources pass through.
pub struct HubFetcher {
    sources: AssetSources,
    cache_dir: Option<PathBuf>,
}

impl HubFetcher {
    pub fn new(sources: AssetSources) -> Self {
        Self { sources, cache_dir: None }
    }

    pub fn with_cache_dir(mut self, cache_dir: Option<PathBuf>) -> Self {
        self.cache_dir = cache_dir;
        self
    }

    fn download(&self, kind: AssetKind, source: &str, repo: String, file: &str) -> Result<PathBuf> {
        let err = |e: hf_hub::api::sync::ApiError| PrepError::Fetch {
            kind,
            source_ref: source.to_string(),
            source: Box::new(e),
        };
        let mut builder = hf_hub::api::sync::ApiBuilder::from_env();
        if let Some(cache_dir) = &self.cache_dir {
            builder = builder.with_cache_dir(cache_dir.clone());
        }
        let api = builder.build().map_err(err)?.model(repo);
        api.get(file).map_err(err)
    }
}

impl AssetFetcher for HubFetcher {
    fn fetch(&self, kind: AssetKind) -> Result<PathBuf> {
        let source = self.sources.get(kind);
        let path = if let Some(path) = source.strip_prefix("hf://") {
            let (repo, file) = parse_hub_path(path).ok_or_else(|| PrepError::Fetch {
                kind,
                source_ref: source.to_string(),
                source: format!("unexpected format for hf path {source}").into(),
            })?;
            tracing::info!(%kind, %repo, %file, "fetching from hub");
            self.download(kind, source, repo, &file)?
        } else {
            let path = PathBuf::from(replace_env_vars(source));
            if !path.is_file() {
                return Err(PrepError::Fetch {
                    kind,
                    source_ref: source.to_string(),
                    source: format!("{path:?} does not exist").into(),
                });
            }
            path
        };
        tracing::debug!(%kind, ?path, "asset available");
        Ok(path)
    }
}

/// Reads every asset from an existing directory, no network access.
pub struct LocalDirFetcher {
    dir: PathBuf,
}

impl LocalDirFetcher {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self { dir: dir.as_ref().to_path_buf() }
    }
}

impl AssetFetcher for LocalDirFetcher {
    fn fetch(&self, kind: AssetKind) -> Result<PathBuf> {
        let path = self.dir.join(kind.local_file_name());
        if path.is_file() {
            return Ok(path);
        }
        // a prepared target directory names the vocabulary vocab.txt
        if kind == AssetKind::Vocab {
            let txt = self.dir.join("vocab.txt");
            if txt.is_file() {
                return Ok(txt);
            }
        }
        Err(PrepError::Fetch {
            kind,
            source_ref: path.display().to_string(),
            source: "file not found".into(),
        })
    }
}
