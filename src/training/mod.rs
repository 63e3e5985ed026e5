//! Training module for the mask classifier
//!
//! This module provides:
//! - The epoch trainer and validator ([`Trainer`])
//! - CutMix augmentation with area-corrected loss blending
//! - Sharpness-Aware Minimization around SGD, Adam or AdamW
//! - Criterion and optimizer registries
//! - Learning rate scheduling, checkpoint selection and the full run loop
//!
//! ## One SAM step
//!
//! 1. Forward and backward at the current weights `w`
//! 2. Move to `w + e(w)` along the normalised gradient
//! 3. Forward and backward again at the perturbed point
//! 4. Return to `w` and let the base optimizer apply the step-3 gradients
//!
//! Under CutMix the second pass replays the first pass's mix unless
//! `sam_resample_mix` is set.

pub mod checkpoint;
pub mod config;
pub mod cutmix;
pub mod loss;
pub mod optimizer;
pub mod run;
pub mod sam;
pub mod scheduler;
pub mod trainer;

pub use checkpoint::{BestState, CheckpointPolicy, CheckpointSlot, CheckpointStore, RecorderStore};
pub use config::TrainConfig;
pub use cutmix::{rand_bbox, BoundingBox, CutMix, MixPlan};
pub use loss::{Criterion, CriterionKind};
pub use optimizer::{build_optimizer, OptimizerKind, OptimizerSettings, TrainOptimizer};
pub use run::{train_model, train_with_backend, EpochRecord, RunSummary};
pub use sam::{GradientStep, Sam, SamPerturbation};
pub use scheduler::{LRScheduler, SchedulerState};
pub use trainer::{FigureOptions, TrainEpochStats, Trainer, ValidationOutcome};
