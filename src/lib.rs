//! # Mask Classifier
//!
//! Trains an 18-class masked-face classifier (mask state x gender x age band)
//! with the Burn framework.
//!
//! ## Features
//!
//! - **CutMix** batch augmentation with area-corrected label blending
//! - **Sharpness-Aware Minimization** wrapping SGD, Adam or AdamW
//! - **Per-person splits** so validation measures unseen faces
//! - Best/last checkpoints selected by validation macro F1
//!
//! ## Modules
//!
//! - `dataset`: Folder discovery, label encoding, splits, transforms and batching
//! - `model`: CNN architectures and the `ImageClassifier` seam
//! - `training`: Trainer, CutMix, SAM, registries, checkpoints and the run loop
//! - `utils`: Logging, metrics, charts, figures and the event log
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use mask_classifier::backend::{default_device, TrainingBackend};
//! use mask_classifier::training::{train_with_backend, TrainConfig};
//!
//! let config = TrainConfig {
//!     data_dir: "data/train/images".into(),
//!     epochs: 5,
//!     ..Default::default()
//! };
//! let summary = train_with_backend::<TrainingBackend>(&config, &default_device())?;
//! println!("best f1 {:.4}", summary.best.best_f1);
//! ```

pub mod backend;
pub mod dataset;
pub mod model;
pub mod training;
pub mod utils;

// Re-export commonly used items for convenience
pub use dataset::{MaskBatch, MaskBatcher, MaskDataset, NUM_CLASSES};
pub use model::{ImageClassifier, MaskClassifier, MaskClassifierLite, ModelKind};
pub use training::{CutMix, Sam, TrainConfig, Trainer};
pub use utils::error::{MaskClassifierError, Result};
pub use utils::metrics::{ConfusionMatrix, Metrics};

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
