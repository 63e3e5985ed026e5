//! Full training run
//!
//! Prepares the data, builds the configured model/optimizer/criterion and
//! drives the fixed-length epoch loop:
//! train → scheduler step → validate → checkpoint → logs and events.
//!
//! Every run writes into its own directory under `model_dir`:
//!
//! ```text
//! runs/exp2/
//!   config.json
//!   log.log
//!   events.jsonl
//!   best.mpk, last.mpk
//!   confusion_matrix.svg, confusion_matrix.csv, classification_report.txt
//!   training_curves.svg
//!   figures/results_epoch_{e}.png
//! ```

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use burn::module::AutodiffModule;
use burn::record::CompactRecorder;
use burn::tensor::backend::AutodiffBackend;
use tracing::{info, warn};

use super::checkpoint::{BestState, CheckpointPolicy, RecorderStore};
use super::config::TrainConfig;
use super::cutmix::CutMix;
use super::loss::Criterion;
use super::optimizer::build_optimizer;
use super::scheduler::{LRScheduler, SchedulerState};
use super::trainer::{FigureOptions, Trainer};
use crate::dataset::{
    class_names, split_dataset, BatchLoader, MaskBatcher, MaskBurnDataset, MaskDataset, Transform,
    NUM_CLASSES,
};
use crate::model::{ImageClassifier, MaskClassifier, MaskClassifierConfig, MaskClassifierLite, ModelKind, DEFAULT_DROPOUT};
use crate::utils::charts::{generate_line_chart, DataSeries, COLOR_F1, COLOR_TRAIN, COLOR_VAL};
use crate::utils::error::{MaskClassifierError, Result};
use crate::utils::events::EventWriter;
use crate::utils::increment_path;
use crate::utils::logging::TrainingLogger;

pub const CONFIG_FILE: &str = "config.json";
pub const LOG_FILE: &str = "log.log";
pub const CURVES_FILE: &str = "training_curves.svg";
pub const FIGURES_DIR: &str = "figures";

/// Metrics of one finished epoch
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpochRecord {
    pub epoch: usize,
    pub lr: f64,
    pub train_loss: f64,
    pub train_accuracy: f64,
    pub val_loss: f64,
    pub val_accuracy: f64,
    pub val_f1: f64,
    pub improved: bool,
}

/// Outcome of a whole run
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_dir: PathBuf,
    pub best: BestState,
    pub history: Vec<EpochRecord>,
}

/// Train with the model named in `config` on backend `B`
pub fn train_with_backend<B: AutodiffBackend>(config: &TrainConfig, device: &B::Device) -> Result<RunSummary> {
    config.validate()?;
    B::seed(config.seed);

    match config.model {
        ModelKind::BaseModel => {
            let model = MaskClassifier::<B>::new(&MaskClassifierConfig::new(), device);
            train_model(config, model, device)
        }
        ModelKind::LiteModel => {
            let model = MaskClassifierLite::<B>::new(NUM_CLASSES, DEFAULT_DROPOUT, device);
            train_model(config, model, device)
        }
    }
}

/// Run the epoch loop for an already constructed model
pub fn train_model<B, M>(config: &TrainConfig, model: M, device: &B::Device) -> Result<RunSummary>
where
    B: AutodiffBackend,
    M: AutodiffModule<B> + ImageClassifier<B> + 'static,
    M::InnerModule: ImageClassifier<B::InnerBackend>,
{
    config.validate()?;

    let model = match &config.resume {
        Some(path) => {
            info!("Resuming from checkpoint {}", path.display());
            model
                .load_file(path, &CompactRecorder::new(), device)
                .map_err(|e| {
                    MaskClassifierError::Resource(format!("loading checkpoint {}: {:?}", path.display(), e))
                })?
        }
        None => model,
    };

    // Data
    let dataset = MaskDataset::new(&config.data_dir)?;
    let splits = split_dataset(&dataset, config.dataset, config.val_ratio, config.seed)?;
    info!(
        "Dataset {}: {} train / {} val images",
        config.dataset,
        splits.train.len(),
        splits.val.len()
    );

    let size = config.input_size();
    let train_set = MaskBurnDataset::new(&splits.train, Transform::new(config.augmentation, size), config.seed);
    let val_set = MaskBurnDataset::new(&splits.val, Transform::new(config.val_augmentation, size), config.seed);

    let train_loader = BatchLoader::new(train_set, config.batch_size).with_shuffle(config.seed);
    let val_loader = BatchLoader::new(val_set, config.valid_batch_size);
    let train_batcher = MaskBatcher::<B>::new(device.clone(), size, dataset.mean, dataset.std);
    let val_batcher = MaskBatcher::<B::InnerBackend>::new(device.clone(), size, dataset.mean, dataset.std);

    // Run directory
    let run_dir = increment_path(&config.model_dir.join(&config.name));
    let figures_dir = run_dir.join(FIGURES_DIR);
    fs::create_dir_all(&figures_dir).map_err(|e| {
        MaskClassifierError::Resource(format!("creating {}: {}", figures_dir.display(), e))
    })?;
    config.save(&run_dir.join(CONFIG_FILE))?;
    info!("Saving run to {}", run_dir.display());

    // Training state
    let optimizer = build_optimizer::<B, M>(&config.optimizer_settings())?;
    let criterion = Criterion::new(config.criterion, model.num_classes());
    let cutmix = CutMix::new(config.beta, config.cutmix_prob)?;
    let mut trainer = Trainer::new(model, optimizer, criterion, cutmix, config.seed)
        .with_log_interval(config.log_interval)
        .with_resampled_mix(config.sam_resample_mix);

    let mut scheduler = SchedulerState::new(LRScheduler::step_lr(
        config.lr,
        config.lr_decay_step,
        config.lr_gamma,
    ));
    info!("LR schedule: {}", scheduler.schedule().description());

    let policy = CheckpointPolicy::new(&run_dir, class_names());
    let mut store = RecorderStore::<B>::new(&run_dir);
    let mut best = BestState::default();
    let mut events = EventWriter::create(&run_dir)?;
    let mut logger = TrainingLogger::new(config.epochs);
    let figure = FigureOptions {
        shuffle: config.dataset.shuffle_figure_samples(),
        input_size: size,
        mean: dataset.mean,
        std: dataset.std,
    };

    let mut history = Vec::with_capacity(config.epochs);

    for epoch in 0..config.epochs {
        let lr = scheduler.current_lr();
        logger.start_epoch(epoch, lr);

        let train = trainer.train_epoch(epoch, train_loader.epoch_batches(&train_batcher, epoch), lr)?;
        scheduler.step();

        let outcome = trainer.validate(
            val_loader.epoch_batches(&val_batcher, epoch),
            val_loader.len(),
            Some(figure),
        )?;

        let decision = policy.apply(&mut best, &mut store, trainer.model(), epoch, &outcome)?;
        if decision.improved {
            logger.log_new_best(outcome.f1);
        }

        append_log_line(
            &run_dir.join(LOG_FILE),
            &format!(
                "Epoch {}, F1_Score: {:.3}, Val Loss: {:.5}, Val Acc: {:.5}, Train Loss: {:.5}",
                epoch, outcome.f1, outcome.loss, outcome.accuracy, train.loss
            ),
        )?;

        events.add_scalar("Train/loss", train.loss, epoch)?;
        events.add_scalar("Val/loss", outcome.loss, epoch)?;
        events.add_scalar("Val/accuracy", outcome.accuracy, epoch)?;
        events.add_scalar("Val/f1_score", outcome.f1, epoch)?;
        if let Some(grid) = &outcome.grid {
            let path = figures_dir.join(format!("results_epoch_{}.png", epoch));
            grid.save(&path)?;
            events.add_figure("results", &path, grid.captions.clone(), epoch)?;
        }

        logger.end_epoch(train.loss, outcome.loss, outcome.accuracy, outcome.f1);
        info!(
            "[Val] acc : {:4.2}%, loss: {:4.2} || best f1 : {:.4}, best loss: {:4.2} || epoch f1 : {:.4}",
            outcome.accuracy * 100.0,
            outcome.loss,
            best.best_f1,
            best.best_val_loss,
            outcome.epoch_f1
        );

        history.push(EpochRecord {
            epoch,
            lr,
            train_loss: train.loss,
            train_accuracy: train.accuracy,
            val_loss: outcome.loss,
            val_accuracy: outcome.accuracy,
            val_f1: outcome.f1,
            improved: decision.improved,
        });
    }

    if let Err(e) = write_curves(&run_dir.join(CURVES_FILE), &history) {
        warn!("Could not write training curves: {}", e);
    }
    logger.log_complete(best.best_f1, best.best_val_loss);

    Ok(RunSummary {
        run_dir,
        best,
        history,
    })
}

fn append_log_line(path: &Path, line: &str) -> Result<()> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .and_then(|mut f| writeln!(f, "{}", line))
        .map_err(|e| MaskClassifierError::Resource(format!("writing {}: {}", path.display(), e)))
}

fn write_curves(path: &Path, history: &[EpochRecord]) -> std::io::Result<()> {
    let collect = |f: fn(&EpochRecord) -> f64| history.iter().map(f).collect::<Vec<_>>();
    let series = [
        DataSeries::per_epoch("Train loss", &collect(|r| r.train_loss), COLOR_TRAIN),
        DataSeries::per_epoch("Val loss", &collect(|r| r.val_loss), COLOR_VAL),
        DataSeries::per_epoch("Val F1", &collect(|r| r.val_f1), COLOR_F1),
    ];
    generate_line_chart("Training curves", "Epoch", "Value", &series, path)
}
