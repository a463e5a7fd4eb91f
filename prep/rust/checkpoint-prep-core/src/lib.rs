// Copyright (c) Kyutai, all rights reserved.
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

mod error;

pub mod archive;
pub mod config;
pub mod convert;
pub mod fetch;
pub mod layout;
pub mod pipeline;
pub mod registry;
pub mod remap;
pub mod tensors;

pub use candle;
pub use config::PrepConfig;
pub use error::{PrepError, Result};
pub use fetch::{AssetFetcher, AssetKind, AssetSources};
pub use remap::{RemapRule, WeightRemapper};
pub use tensors::TensorCollection;
