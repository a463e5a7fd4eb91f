// Copyright (c) Kyutai, all rights reserved.
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use std::path::PathBuf;

use thiserror::Error;

use crate::fetch::AssetKind;

pub type Result<T> = std::result::Result<T, PrepError>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum PrepError {
    #[error("failed to fetch {kind} from {source_ref}: {source}")]
    Fetch {
        kind: AssetKind,
        source_ref: String,
        #[source]
        source: BoxError,
    },

    #[error("io error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot load checkpoint {path:?}: {source}")]
    Deserialization {
        path: PathBuf,
        #[source]
        source: BoxError,
    },

    #[error("cannot parse model config {path:?}: {source}")]
    ModelConfig {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("cannot write archive {path:?}: {source}")]
    Serialization {
        path: PathBuf,
        #[source]
        source: candle::Error,
    },

    #[error("tensor {key}: {reason}")]
    TypeConversion { key: String, reason: String },

    #[error("checkpoint contains no tensors")]
    EmptyCheckpoint,

    #[error("remapped key {0} emitted twice")]
    DuplicateKey(String),

    #[error("unknown model {0}, see `checkpoint-prep models`")]
    UnknownModel(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("converter {program} failed: {status}")]
    Conversion { program: String, status: String },
}

impl PrepError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }

    pub(crate) fn deserialization(path: impl Into<PathBuf>, source: impl Into<BoxError>) -> Self {
        Self::Deserialization { path: path.into(), source: source.into() }
    }
}
