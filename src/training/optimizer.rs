//! Optimizer registry
//!
//! `SGD`, `Adam` and `AdamW` are Burn optimizers with weight decay. `SAM`
//! wraps one of them, chosen by `base_optimizer`.

use std::fmt;
use std::str::FromStr;

use burn::module::AutodiffModule;
use burn::optim::decay::WeightDecayConfig;
use burn::optim::{AdamConfig, AdamWConfig, GradientsParams, SgdConfig};
use burn::tensor::backend::AutodiffBackend;
use serde::{Deserialize, Serialize};

use super::sam::{GradientStep, Sam};
use crate::utils::error::{MaskClassifierError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptimizerKind {
    #[serde(rename = "SGD")]
    Sgd,
    Adam,
    AdamW,
    #[serde(rename = "SAM")]
    Sam,
}

impl FromStr for OptimizerKind {
    type Err = MaskClassifierError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "SGD" => Ok(Self::Sgd),
            "Adam" => Ok(Self::Adam),
            "AdamW" => Ok(Self::AdamW),
            "SAM" => Ok(Self::Sam),
            other => Err(MaskClassifierError::Config(format!(
                "unknown optimizer '{}' (expected SGD, Adam, AdamW or SAM)",
                other
            ))),
        }
    }
}

impl fmt::Display for OptimizerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Sgd => "SGD",
            Self::Adam => "Adam",
            Self::AdamW => "AdamW",
            Self::Sam => "SAM",
        };
        write!(f, "{}", name)
    }
}

/// Everything needed to build an optimizer
#[derive(Debug, Clone, Copy)]
pub struct OptimizerSettings {
    pub kind: OptimizerKind,
    pub base: Option<OptimizerKind>,
    pub weight_decay: f64,
    pub rho: f64,
    pub adaptive: bool,
}

/// The optimizer used by the trainer: a single step, or the two-phase SAM
pub enum TrainOptimizer<B: AutodiffBackend, M: AutodiffModule<B>> {
    Plain(Box<dyn GradientStep<B, M>>),
    Sam(Sam<B, M>),
}

impl<B: AutodiffBackend, M: AutodiffModule<B>> TrainOptimizer<B, M> {
    pub fn is_sam(&self) -> bool {
        matches!(self, Self::Sam(_))
    }

    /// Single update for the non-SAM case
    pub fn step(&mut self, lr: f64, model: M, grads: GradientsParams) -> Option<M> {
        match self {
            Self::Plain(step) => Some(step.apply(lr, model, grads)),
            Self::Sam(_) => None,
        }
    }
}

/// Build a non-SAM optimizer
fn base_optimizer<B, M>(kind: OptimizerKind, weight_decay: f64) -> Result<Box<dyn GradientStep<B, M>>>
where
    B: AutodiffBackend,
    M: AutodiffModule<B> + 'static,
{
    let decay = weight_decay as f32;
    let optimizer: Box<dyn GradientStep<B, M>> = match kind {
        OptimizerKind::Sgd => Box::new(
            SgdConfig::new()
                .with_weight_decay(Some(WeightDecayConfig::new(decay)))
                .init::<B, M>(),
        ),
        OptimizerKind::Adam => Box::new(
            AdamConfig::new()
                .with_weight_decay(Some(WeightDecayConfig::new(decay)))
                .init::<B, M>(),
        ),
        OptimizerKind::AdamW => Box::new(AdamWConfig::new().with_weight_decay(decay).init::<B, M>()),
        OptimizerKind::Sam => {
            return Err(MaskClassifierError::Config(
                "SAM cannot be its own base optimizer".to_string(),
            ))
        }
    };
    Ok(optimizer)
}

/// Resolve the configured optimizer
pub fn build_optimizer<B, M>(settings: &OptimizerSettings) -> Result<TrainOptimizer<B, M>>
where
    B: AutodiffBackend,
    M: AutodiffModule<B> + 'static,
{
    if !(settings.weight_decay >= 0.0) {
        return Err(MaskClassifierError::Config(format!(
            "weight_decay must be >= 0, got {}",
            settings.weight_decay
        )));
    }

    match settings.kind {
        OptimizerKind::Sam => {
            let base = settings.base.ok_or_else(|| {
                MaskClassifierError::Config(
                    "optimizer SAM requires base_optimizer (SGD, Adam or AdamW)".to_string(),
                )
            })?;
            if !(settings.rho >= 0.0 && settings.rho.is_finite()) {
                return Err(MaskClassifierError::Config(format!(
                    "sam_rho must be a finite value >= 0, got {}",
                    settings.rho
                )));
            }
            let base = base_optimizer::<B, M>(base, settings.weight_decay)?;
            Ok(TrainOptimizer::Sam(Sam::new(base, settings.rho, settings.adaptive)))
        }
        kind => Ok(TrainOptimizer::Plain(base_optimizer::<B, M>(
            kind,
            settings.weight_decay,
        )?)),
    }
}
