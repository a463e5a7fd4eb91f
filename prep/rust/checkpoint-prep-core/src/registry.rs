// Copyright (c) Kyutai, all rights reserved.
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::error::{PrepError, Result};
use crate::fetch::AssetSources;

#[derive(Debug, Clone, Copy)]
pub struct ModelEntry {
    pub name: &'static str,
    pub repo: &'static str,
    pub weights_file: &'static str,
    pub description: &'static str,
}

impl ModelEntry {
    pub fn sources(&self) -> AssetSources {
        AssetSources::hub(self.repo, self.weights_file)
    }
}

pub const DEFAULT_MODEL: &str = "gpt2";

pub const MODELS: &[ModelEntry] = &[
    ModelEntry {
        name: "gpt2",
        repo: "openai-community/gpt2",
        weights_file: "pytorch_model.bin",
        description: "GPT-2 small, 124M parameters",
    },
    ModelEntry {
        name: "gpt2-medium",
        repo: "openai-community/gpt2-medium",
        weights_file: "pytorch_model.bin",
        description: "GPT-2 medium, 355M parameters",
    },
    ModelEntry {
        name: "gpt2-large",
        repo: "openai-community/gpt2-large",
        weights_file: "pytorch_model.bin",
        description: "GPT-2 large, 774M parameters",
    },
    ModelEntry {
        name: "gpt2-xl",
        repo: "openai-community/gpt2-xl",
        weights_file: "pytorch_model.bin",
        description: "GPT-2 xl, 1.5B parameters",
    },
    ModelEntry {
        name: "distilgpt2",
        repo: "distilbert/distilgpt2",
        weights_file: "pytorch_model.bin",
        description: "distilled GPT-2, 82M parameters",
    },
];

pub fn lookup(name: &str) -> Result<&'static ModelEntry> {
    MODELS.iter().find(|m| m.name == name).ok_or_else(|| PrepError::UnknownModel(name.to_string()))
}

pub fn sources(name: &str) -> Result<AssetSources> {
    Ok(lookup(name)?.sources())
}
