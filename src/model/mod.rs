//! Model module for CNN architectures using the Burn framework
//!
//! This module provides:
//! - The [`ImageClassifier`] seam the training loop is written against
//! - CNN architectures for the 18-class masked-face task
//! - The model registry ([`ModelKind`])

pub mod cnn;

use std::fmt;
use std::str::FromStr;

use burn::module::Module;
use burn::tensor::{backend::Backend, Tensor};
use serde::{Deserialize, Serialize};

use crate::utils::error::MaskClassifierError;

pub use cnn::{MaskClassifier, MaskClassifierConfig, MaskClassifierLite};

/// Default dropout rate for regularization
pub const DEFAULT_DROPOUT: f64 = 0.3;

/// Anything that maps an image batch to class logits
pub trait ImageClassifier<B: Backend>: Module<B> {
    /// `[batch, channels, height, width]` → `[batch, num_classes]`
    fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2>;

    fn num_classes(&self) -> usize;
}

/// Registered architectures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelKind {
    BaseModel,
    LiteModel,
}

impl FromStr for ModelKind {
    type Err = MaskClassifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BaseModel" => Ok(Self::BaseModel),
            "LiteModel" => Ok(Self::LiteModel),
            other => Err(MaskClassifierError::Config(format!(
                "unknown model '{}' (expected BaseModel or LiteModel)",
                other
            ))),
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}
