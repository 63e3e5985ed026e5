//! Mask Classifier CLI
//!
//! Entry point for training the masked-face classifier and inspecting the
//! dataset.

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use tracing::info;

use mask_classifier::backend::{backend_name, default_device, TrainingBackend};
use mask_classifier::dataset::{
    split_dataset, AugmentationKind, DatasetKind, MaskDataset,
};
use mask_classifier::model::ModelKind;
use mask_classifier::training::{train_with_backend, CriterionKind, OptimizerKind, TrainConfig};
use mask_classifier::utils::logging::{init_logging, LogConfig, LogLevel};

/// Masked-face classification with CutMix and Sharpness-Aware Minimization
#[derive(Parser, Debug)]
#[command(name = "mask-train")]
#[command(version)]
#[command(about = "Train an 18-class masked-face classifier with Burn", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, default_value = "false")]
    verbose: bool,

    /// Minimum log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Train a model and write checkpoints, logs and figures to a run directory
    Train(TrainArgs),

    /// Show dataset statistics
    Stats {
        /// Path to the dataset directory
        #[arg(short, long, env = "SM_CHANNEL_TRAIN", default_value = "/opt/ml/input/data/train/images")]
        data_dir: PathBuf,

        /// Also show the train/validation split
        #[arg(long, default_value = "false")]
        show_splits: bool,

        /// Split strategy used with --show-splits
        #[arg(long, default_value = "MaskSplitByProfileDataset")]
        dataset: DatasetKind,

        /// Validation ratio used with --show-splits
        #[arg(long, default_value = "0.2")]
        val_ratio: f64,

        #[arg(long, default_value = "0")]
        seed: u64,

        /// Estimate channel mean/std from this many photos (0 skips)
        #[arg(long, default_value = "0")]
        estimate: usize,
    },
}

#[derive(Args, Debug)]
struct TrainArgs {
    /// Random seed
    #[arg(long, default_value = "0")]
    seed: u64,

    /// Number of epochs to train
    #[arg(long, default_value = "1")]
    epochs: usize,

    /// Split strategy (MaskBaseDataset, MaskSplitByProfileDataset)
    #[arg(long, default_value = "MaskSplitByProfileDataset")]
    dataset: DatasetKind,

    /// Training transform (BaseAugmentation, CustomAugmentation, ValAugmentation)
    #[arg(long, default_value = "BaseAugmentation")]
    augmentation: AugmentationKind,

    /// Validation transform
    #[arg(long, default_value = "ValAugmentation")]
    val_augmentation: AugmentationKind,

    /// Input size as HEIGHT WIDTH
    #[arg(long, num_args = 2, value_names = ["HEIGHT", "WIDTH"], default_values_t = [128u32, 96])]
    resize: Vec<u32>,

    #[arg(long, default_value = "64")]
    batch_size: usize,

    #[arg(long, default_value = "64")]
    valid_batch_size: usize,

    /// Model architecture (BaseModel, LiteModel)
    #[arg(long, default_value = "BaseModel")]
    model: ModelKind,

    /// Optimizer (SGD, Adam, AdamW, SAM)
    #[arg(long, default_value = "SGD")]
    optimizer: OptimizerKind,

    /// Optimizer wrapped by SAM
    #[arg(long)]
    base_optimizer: Option<OptimizerKind>,

    /// Learning rate
    #[arg(long, default_value = "1e-3")]
    lr: f64,

    /// Neighbourhood radius for SAM
    #[arg(long, default_value = "0.05")]
    sam_rho: f64,

    /// Scale the SAM neighbourhood by parameter magnitude
    #[arg(long, default_value = "false")]
    sam_adaptive: bool,

    /// Draw a new CutMix plan for the second SAM pass
    #[arg(long, default_value = "false")]
    sam_resample_mix: bool,

    /// Fraction of images (or people) held out for validation
    #[arg(long, default_value = "0.2")]
    val_ratio: f64,

    /// Loss function (cross_entropy, label_smoothing, focal, f1)
    #[arg(long, default_value = "cross_entropy")]
    criterion: CriterionKind,

    /// Halve the learning rate every N epochs
    #[arg(long, default_value = "20")]
    lr_decay_step: usize,

    /// Batches between progress lines
    #[arg(long, default_value = "20")]
    log_interval: usize,

    /// Run name; results go to MODEL_DIR/NAME
    #[arg(long, default_value = "exp")]
    name: String,

    /// CutMix Beta parameter (0 disables CutMix)
    #[arg(long, default_value = "0")]
    beta: f64,

    /// Probability of applying CutMix to a batch
    #[arg(long, default_value = "0")]
    cutmix_prob: f64,

    /// JSON file whose keys override the flags above
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Checkpoint to start from
    #[arg(long)]
    resume: Option<PathBuf>,

    #[arg(long, env = "SM_CHANNEL_TRAIN", default_value = "/opt/ml/input/data/train/images")]
    data_dir: PathBuf,

    #[arg(long, env = "SM_MODEL_DIR", default_value = "./runs")]
    model_dir: PathBuf,
}

impl TrainArgs {
    fn into_config(self) -> mask_classifier::Result<TrainConfig> {
        let resize = match self.resize.as_slice() {
            [h, w] => [*h, *w],
            other => {
                return Err(mask_classifier::MaskClassifierError::Config(format!(
                    "resize takes HEIGHT WIDTH, got {:?}",
                    other
                )))
            }
        };

        let config = TrainConfig {
            seed: self.seed,
            epochs: self.epochs,
            dataset: self.dataset,
            augmentation: self.augmentation,
            val_augmentation: self.val_augmentation,
            resize,
            batch_size: self.batch_size,
            valid_batch_size: self.valid_batch_size,
            model: self.model,
            optimizer: self.optimizer,
            base_optimizer: self.base_optimizer,
            lr: self.lr,
            sam_rho: self.sam_rho,
            sam_adaptive: self.sam_adaptive,
            sam_resample_mix: self.sam_resample_mix,
            val_ratio: self.val_ratio,
            criterion: self.criterion,
            lr_decay_step: self.lr_decay_step,
            log_interval: self.log_interval,
            name: self.name,
            data_dir: self.data_dir,
            model_dir: self.model_dir,
            beta: self.beta,
            cutmix_prob: self.cutmix_prob,
            resume: self.resume,
            ..TrainConfig::default()
        };

        match &self.config {
            Some(path) => config.merged_with_file(path),
            None => Ok(config),
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = if cli.verbose {
        LogConfig::verbose()
    } else {
        LogConfig {
            level: LogLevel::parse(&cli.log_level),
            ..LogConfig::default()
        }
    };

    let _ = init_logging(&log_config);

    print_banner();

    match cli.command {
        Commands::Train(args) => {
            cmd_train(args)?;
        }

        Commands::Stats {
            data_dir,
            show_splits,
            dataset,
            val_ratio,
            seed,
            estimate,
        } => {
            cmd_stats(&data_dir, show_splits, dataset, val_ratio, seed, estimate)?;
        }
    }

    Ok(())
}

fn print_banner() {
    println!(
        "{}",
        r#"
 +--------------------------------------------------------------+
 |   Mask Classifier                                            |
 |   CutMix + Sharpness-Aware Minimization with Burn + Rust     |
 +--------------------------------------------------------------+
  "#
        .green()
    );
}

fn cmd_train(args: TrainArgs) -> Result<()> {
    let config = args.into_config()?;
    config.validate()?;

    println!("{}", "Configuration".cyan().bold());
    println!("  Backend:    {}", backend_name());
    println!("  Data:       {}", config.data_dir.display());
    println!("  Model:      {}", config.model);
    println!(
        "  Optimizer:  {}{}",
        config.optimizer,
        config
            .base_optimizer
            .map(|b| format!(" (base {})", b))
            .unwrap_or_default()
    );
    println!("  Criterion:  {}", config.criterion);
    println!("  Epochs:     {}", config.epochs);
    println!("  CutMix:     beta {} / prob {}", config.beta, config.cutmix_prob);
    println!();

    let summary = train_with_backend::<TrainingBackend>(&config, &default_device())?;

    println!();
    println!("{}", "Training Complete!".green().bold());
    println!("  Best F1:        {:.4}", summary.best.best_f1);
    println!("  Best Val Loss:  {:.5}", summary.best.best_val_loss);
    println!("  Run directory:  {}", summary.run_dir.display());

    Ok(())
}

fn cmd_stats(
    data_dir: &Path,
    show_splits: bool,
    kind: DatasetKind,
    val_ratio: f64,
    seed: u64,
    estimate: usize,
) -> Result<()> {
    info!("Computing dataset statistics for: {}", data_dir.display());

    if !data_dir.exists() {
        println!(
            "{} Dataset directory not found: {}",
            "Error:".red(),
            data_dir.display()
        );
        return Ok(());
    }

    let mut dataset = MaskDataset::new(data_dir)?;
    dataset.get_stats().print();

    if estimate > 0 {
        dataset.estimate_statistics(estimate)?;
        println!();
        println!("  Mean: {:?}", dataset.mean);
        println!("  Std:  {:?}", dataset.std);
    }

    if show_splits {
        let splits = split_dataset(&dataset, kind, val_ratio, seed)?;
        println!();
        println!("{}", format!("Split ({})", kind).cyan().bold());
        println!("  Train: {} images", splits.train.len());
        println!("  Val:   {} images", splits.val.len());
    }

    Ok(())
}
