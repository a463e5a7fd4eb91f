// Copyright (c) Kyutai, all rights reserved.
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use std::path::{Path, PathBuf};

use crate::convert::{ExternalConverter, OnFailure};
use crate::error::{PrepError, Result};
use crate::fetch::{replace_env_vars, AssetSources};
use crate::layout::TargetLayout;
use crate::registry;
use crate::remap::{RemapRule, WeightRemapper};

fn default_namespace() -> String {
    "rustbert".to_string()
}

fn default_model_name() -> String {
    registry::DEFAULT_MODEL.to_string()
}

fn default_true() -> bool {
    true
}

fn default_converter_program() -> String {
    "convert-tensor".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct ConverterConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_converter_program")]
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub on_failure: OnFailure,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            program: default_converter_program(),
            args: vec![],
            on_failure: OnFailure::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct PrepConfig {
    /// Defaults to the user's home directory.
    #[serde(default)]
    pub home_directory: Option<PathBuf>,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default = "default_model_name")]
    pub model_name: String,
    /// Defaults to the registry entry for `model_name`.
    #[serde(default)]
    pub sources: Option<AssetSources>,
    #[serde(default = "default_true")]
    pub upcast_bf16: bool,
    #[serde(default)]
    pub remap: RemapRule,
    #[serde(default)]
    pub converter: ConverterConfig,
}

impl Default for PrepConfig {
    fn default() -> Self {
        Self {
            home_directory: None,
            namespace: default_namespace(),
            model_name: default_model_name(),
            sources: None,
            upcast_bf16: true,
            remap: RemapRule::default(),
            converter: ConverterConfig::default(),
        }
    }
}

impl std::str::FromStr for PrepConfig {
    type Err = PrepError;

    fn from_str(s: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(s).map_err(|e| PrepError::Config(e.to_string()))?;
        config.resolve_env();
        Ok(config)
    }
}

impl PrepConfig {
    pub fn load<P: AsRef<Path>>(p: P) -> Result<Self> {
        let p = p.as_ref();
        let config = std::fs::read_to_string(p).map_err(|e| PrepError::io(p, e))?;
        config.parse()
    }

    fn resolve_env(&mut self) {
        // a home that is not valid UTF-8 cannot name a variable, keep its bytes
        if let Some(home) = self.home_directory.as_mut() {
            if let Some(resolved) = home.to_str().map(replace_env_vars) {
                *home = PathBuf::from(resolved);
            }
        }
        self.namespace = replace_env_vars(&self.namespace);
        if let Some(sources) = self.sources.as_mut() {
            for s in [&mut sources.config, &mut sources.vocab, &mut sources.merges, &mut sources.weights] {
                *s = replace_env_vars(s);
            }
        }
        self.converter.program = replace_env_vars(&self.converter.program);
        for arg in self.converter.args.iter_mut() {
            *arg = replace_env_vars(arg);
        }
    }

    pub fn home_directory(&self) -> Result<PathBuf> {
        match &self.home_directory {
            Some(home) => Ok(home.clone()),
            None => dirs::home_dir()
                .ok_or_else(|| PrepError::Config("could not determine home directory".to_string())),
        }
    }

    pub fn layout(&self) -> Result<TargetLayout> {
        let root = self.home_directory()?.join(&self.namespace).join(&self.model_name);
        Ok(TargetLayout::new(root))
    }

    pub fn asset_sources(&self) -> Result<AssetSources> {
        match &self.sources {
            Some(sources) => Ok(sources.clone()),
            None => registry::sources(&self.model_name),
        }
    }

    pub fn remapper(&self) -> WeightRemapper {
        WeightRemapper::new(self.remap.clone()).with_upcast_bf16(self.upcast_bf16)
    }

    pub fn converter(&self) -> Option<ExternalConverter> {
        if !self.converter.enabled {
            return None;
        }
        let c = &self.converter;
        Some(ExternalConverter::new(&c.program).with_args(c.args.clone()).with_on_failure(c.on_failure))
    }

    /// Checks everything that can be checked without touching the network.
    pub fn validate(&self) -> Result<()> {
        self.asset_sources()?;
        self.home_directory()?;
        if self.model_name.is_empty() || self.namespace.is_empty() {
            return Err(PrepError::Config("namespace and model_name must not be empty".to_string()));
        }
        if self.converter.enabled && self.converter.program.is_empty() {
            return Err(PrepError::Config("converter.program is empty".to_string()));
        }
        Ok(())
    }
}
