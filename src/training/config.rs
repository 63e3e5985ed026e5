//! Training run configuration
//!
//! Every hyperparameter of a run lives in [`TrainConfig`]. It is built from
//! CLI flags, optionally overridden by a JSON file, validated once before
//! training starts, and written next to the checkpoints as `config.json`.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::loss::CriterionKind;
use super::optimizer::{OptimizerKind, OptimizerSettings};
use crate::dataset::{AugmentationKind, DatasetKind};
use crate::model::ModelKind;
use crate::utils::error::{MaskClassifierError, Result, ResultExt};

/// Weight decay applied by every optimizer
pub const DEFAULT_WEIGHT_DECAY: f64 = 5e-4;

/// Hyperparameters and paths of one training run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    pub seed: u64,
    pub epochs: usize,
    pub dataset: DatasetKind,
    pub augmentation: AugmentationKind,
    pub val_augmentation: AugmentationKind,
    /// Input size as `[height, width]`
    pub resize: [u32; 2],
    pub batch_size: usize,
    pub valid_batch_size: usize,
    pub model: ModelKind,
    pub optimizer: OptimizerKind,
    /// Optimizer wrapped by SAM; required when `optimizer` is SAM
    pub base_optimizer: Option<OptimizerKind>,
    pub lr: f64,
    pub weight_decay: f64,
    pub sam_rho: f64,
    pub sam_adaptive: bool,
    /// Draw a fresh CutMix plan for the second SAM pass instead of replaying
    /// the first one
    pub sam_resample_mix: bool,
    pub val_ratio: f64,
    pub criterion: CriterionKind,
    pub lr_decay_step: usize,
    pub lr_gamma: f64,
    pub log_interval: usize,
    pub name: String,
    pub data_dir: PathBuf,
    pub model_dir: PathBuf,
    /// CutMix Beta distribution parameter; 0 disables mixing
    pub beta: f64,
    pub cutmix_prob: f64,
    /// Checkpoint to initialise the model from
    pub resume: Option<PathBuf>,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            epochs: 1,
            dataset: DatasetKind::MaskSplitByProfileDataset,
            augmentation: AugmentationKind::BaseAugmentation,
            val_augmentation: AugmentationKind::ValAugmentation,
            resize: [128, 96],
            batch_size: 64,
            valid_batch_size: 64,
            model: ModelKind::BaseModel,
            optimizer: OptimizerKind::Sgd,
            base_optimizer: None,
            lr: 1e-3,
            weight_decay: DEFAULT_WEIGHT_DECAY,
            sam_rho: 0.05,
            sam_adaptive: false,
            sam_resample_mix: false,
            val_ratio: 0.2,
            criterion: CriterionKind::CrossEntropy,
            lr_decay_step: 20,
            lr_gamma: 0.5,
            log_interval: 20,
            name: "exp".to_string(),
            data_dir: PathBuf::from("/opt/ml/input/data/train/images"),
            model_dir: PathBuf::from("./runs"),
            beta: 0.0,
            cutmix_prob: 0.0,
            resume: None,
        }
    }
}

impl TrainConfig {
    /// Read a JSON config; missing keys take their defaults
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: Self = serde_json::from_str(&text)?;
        Ok(config)
    }

    /// Override this config with the keys present in a JSON file
    pub fn merged_with_file(&self, path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let overrides: serde_json::Value = serde_json::from_str(&text)?;
        let serde_json::Value::Object(overrides) = overrides else {
            return Err(MaskClassifierError::Config(format!(
                "{} must hold a JSON object",
                path.display()
            )));
        };

        let mut merged = serde_json::to_value(self)?;
        if let serde_json::Value::Object(fields) = &mut merged {
            for (key, value) in overrides {
                if !fields.contains_key(&key) {
                    return Err(MaskClassifierError::Config(format!(
                        "unknown config key '{}' in {}",
                        key,
                        path.display()
                    )));
                }
                fields.insert(key, value);
            }
        }
        Ok(serde_json::from_value(merged)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).map_err(|e| {
            MaskClassifierError::Resource(format!("writing {}: {}", path.display(), e))
        })
    }

    /// `(height, width)` for the transforms
    pub fn input_size(&self) -> (u32, u32) {
        (self.resize[0], self.resize[1])
    }

    pub fn optimizer_settings(&self) -> OptimizerSettings {
        OptimizerSettings {
            kind: self.optimizer,
            base: self.base_optimizer,
            weight_decay: self.weight_decay,
            rho: self.sam_rho,
            adaptive: self.sam_adaptive,
        }
    }

    /// Reject any setting training cannot run with
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| Err(MaskClassifierError::Config(msg));

        if self.epochs == 0 {
            return fail("epochs must be at least 1".to_string());
        }
        if self.batch_size == 0 || self.valid_batch_size == 0 {
            return fail(format!(
                "batch sizes must be positive (got {} / {})",
                self.batch_size, self.valid_batch_size
            ));
        }
        if self.resize.iter().any(|&s| s == 0) {
            return fail(format!("resize must be positive, got {:?}", self.resize));
        }
        if !(self.lr > 0.0 && self.lr.is_finite()) {
            return fail(format!("lr must be a positive number, got {}", self.lr));
        }
        if !(self.weight_decay >= 0.0) {
            return fail(format!("weight_decay must be >= 0, got {}", self.weight_decay));
        }
        if !(self.val_ratio > 0.0 && self.val_ratio < 1.0) {
            return fail(format!("val_ratio must be in (0, 1), got {}", self.val_ratio));
        }
        if !(self.beta >= 0.0 && self.beta.is_finite()) {
            return fail(format!("beta must be a finite value >= 0, got {}", self.beta));
        }
        if !(0.0..=1.0).contains(&self.cutmix_prob) {
            return fail(format!("cutmix_prob must be in [0, 1], got {}", self.cutmix_prob));
        }
        if self.lr_decay_step == 0 {
            return fail("lr_decay_step must be at least 1".to_string());
        }
        if !(self.lr_gamma > 0.0) {
            return fail(format!("lr_gamma must be positive, got {}", self.lr_gamma));
        }
        if self.log_interval == 0 {
            return fail("log_interval must be at least 1".to_string());
        }
        if self.name.is_empty() {
            return fail("name must not be empty".to_string());
        }

        match (self.optimizer, self.base_optimizer) {
            (OptimizerKind::Sam, None) => {
                return fail("optimizer SAM requires base_optimizer".to_string())
            }
            (OptimizerKind::Sam, Some(OptimizerKind::Sam)) => {
                return fail("base_optimizer cannot be SAM".to_string())
            }
            _ => {}
        }
        if self.optimizer == OptimizerKind::Sam && !(self.sam_rho >= 0.0 && self.sam_rho.is_finite()) {
            return fail(format!("sam_rho must be a finite value >= 0, got {}", self.sam_rho));
        }

        Ok(())
    }
}
