//! Epoch-level training and validation
//!
//! The [`Trainer`] owns the model, the optimizer and the random source for
//! CutMix. One call to [`Trainer::train_epoch`] consumes an epoch's batches
//! in loader order; [`Trainer::validate`] runs the inner (non-autodiff)
//! model over the validation batches and gathers everything the checkpoint
//! policy and the run logs need.

use burn::module::AutodiffModule;
use burn::optim::GradientsParams;
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::ElementConversion;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info};

use super::cutmix::CutMix;
use super::loss::Criterion;
use super::optimizer::TrainOptimizer;
use crate::dataset::MaskBatch;
use crate::model::ImageClassifier;
use crate::utils::error::{MaskClassifierError, Result};
use crate::utils::grid::{figure_indices, GridSample, PredictionGrid};
use crate::utils::metrics::{macro_f1_score, RunningAverage};

/// Result of one training epoch
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainEpochStats {
    /// Mean loss over the epoch's batches; under SAM the loss at the
    /// perturbed weights
    pub loss: f64,
    /// Accuracy of the phase-A predictions against the unmixed labels
    pub accuracy: f64,
    pub batches: usize,
}

/// How to draw the validation figure
#[derive(Debug, Clone, Copy)]
pub struct FigureOptions {
    /// Pick random items from the first batch instead of the leading ones
    pub shuffle: bool,
    /// `(height, width)`
    pub input_size: (u32, u32),
    pub mean: [f32; 3],
    pub std: [f32; 3],
}

/// Everything gathered during one validation pass
#[derive(Debug, Clone)]
pub struct ValidationOutcome {
    /// Mean of per-batch losses
    pub loss: f64,
    /// Exact matches over the validation set size
    pub accuracy: f64,
    /// Mean of per-batch macro F1 scores; drives checkpoint selection
    pub f1: f64,
    /// Macro F1 over the whole epoch, for reporting
    pub epoch_f1: f64,
    pub predictions: Vec<usize>,
    pub labels: Vec<usize>,
    pub grid: Option<PredictionGrid>,
}

/// Trains one model; owns all mutable training state
pub struct Trainer<B: AutodiffBackend, M: AutodiffModule<B>> {
    model: M,
    optimizer: TrainOptimizer<B, M>,
    criterion: Criterion,
    cutmix: CutMix,
    rng: ChaCha8Rng,
    log_interval: usize,
    resample_mix: bool,
}

impl<B, M> Trainer<B, M>
where
    B: AutodiffBackend,
    M: AutodiffModule<B> + ImageClassifier<B>,
    M::InnerModule: ImageClassifier<B::InnerBackend>,
{
    pub fn new(model: M, optimizer: TrainOptimizer<B, M>, criterion: Criterion, cutmix: CutMix, seed: u64) -> Self {
        Self {
            model,
            optimizer,
            criterion,
            cutmix,
            rng: ChaCha8Rng::seed_from_u64(seed),
            log_interval: 20,
            resample_mix: false,
        }
    }

    /// Log running loss and accuracy every `interval` batches
    pub fn with_log_interval(mut self, interval: usize) -> Self {
        self.log_interval = interval.max(1);
        self
    }

    /// Under SAM, draw a new CutMix plan for the second pass
    pub fn with_resampled_mix(mut self, resample: bool) -> Self {
        self.resample_mix = resample;
        self
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn into_model(self) -> M {
        self.model
    }

    /// Run one epoch over `batches`.
    ///
    /// Fails on the first malformed batch or non-finite loss; an epoch with
    /// no batches is an error rather than a zero loss.
    pub fn train_epoch<I>(&mut self, epoch: usize, batches: I, lr: f64) -> Result<TrainEpochStats>
    where
        I: IntoIterator<Item = Result<MaskBatch<B>>>,
        I::IntoIter: ExactSizeIterator,
    {
        let batches = batches.into_iter();
        let num_batches = batches.len();

        let mut loss_sum = 0.0f64;
        let mut count = 0usize;
        let mut correct = 0usize;
        let mut seen = 0usize;
        let mut interval_loss = RunningAverage::new();
        let mut interval_correct = 0usize;
        let mut interval_seen = 0usize;

        for (batch_idx, batch) in batches.enumerate() {
            let batch = batch?;
            let batch_size = batch.validate()?;
            let MaskBatch { images, targets } = batch;

            let plan = self
                .cutmix
                .plan(images.clone(), targets.clone(), &mut self.rng);
            let (loss, logits) = plan.forward_loss(&self.model, &self.criterion);
            let loss_value = finite_loss(loss.clone(), epoch, batch_idx)?;

            let batch_correct = count_correct(logits, targets.clone());

            let grads = GradientsParams::from_grads(loss.backward(), &self.model);

            let loss_value = match &mut self.optimizer {
                TrainOptimizer::Plain(step) => {
                    self.model = step.apply(lr, self.model.clone(), grads);
                    loss_value
                }
                TrainOptimizer::Sam(sam) => {
                    let perturbation = sam.first_step(self.model.clone(), &grads);
                    drop(grads);

                    let plan_b = if self.resample_mix {
                        self.cutmix.plan(images, targets, &mut self.rng)
                    } else {
                        plan
                    };
                    let (loss_b, _) = plan_b.forward_loss(&perturbation.perturbed, &self.criterion);
                    let loss_b_value = finite_loss(loss_b.clone(), epoch, batch_idx)?;

                    let grads_b = GradientsParams::from_grads(loss_b.backward(), &perturbation.perturbed);
                    self.model = sam.second_step(lr, perturbation, grads_b);
                    loss_b_value
                }
            };

            loss_sum += loss_value;
            count += 1;
            correct += batch_correct;
            seen += batch_size;
            interval_loss.add(loss_value);
            interval_correct += batch_correct;
            interval_seen += batch_size;

            if (batch_idx + 1) % self.log_interval == 0 {
                info!(
                    "Epoch[{}]({}/{}) || training loss {:.4} || training accuracy {:.2}% || lr {:e}",
                    epoch,
                    batch_idx + 1,
                    num_batches,
                    interval_loss.average(),
                    100.0 * interval_correct as f64 / interval_seen.max(1) as f64,
                    lr
                );
                interval_loss.reset();
                interval_correct = 0;
                interval_seen = 0;
            }
        }

        if count == 0 {
            return Err(MaskClassifierError::Training(format!(
                "epoch {} produced no training batches",
                epoch
            )));
        }

        let stats = TrainEpochStats {
            loss: loss_sum / count as f64,
            accuracy: correct as f64 / seen.max(1) as f64,
            batches: count,
        };
        debug!("Epoch {} train: {:?}", epoch, stats);
        Ok(stats)
    }

    /// Evaluate on the validation batches without building an autodiff graph.
    ///
    /// `val_set_size` is the number of validation samples; accuracy divides
    /// by it. A figure is built from the first batch when `figure` is set.
    pub fn validate<I>(
        &mut self,
        batches: I,
        val_set_size: usize,
        figure: Option<FigureOptions>,
    ) -> Result<ValidationOutcome>
    where
        I: IntoIterator<Item = Result<MaskBatch<B::InnerBackend>>>,
    {
        if val_set_size == 0 {
            return Err(MaskClassifierError::Training(
                "validation set is empty".to_string(),
            ));
        }

        let model = self.model.valid();

        let mut loss_sum = 0.0f64;
        let mut f1_sum = 0.0f64;
        let mut count = 0usize;
        let mut matches = 0usize;
        let mut predictions = Vec::with_capacity(val_set_size);
        let mut labels = Vec::with_capacity(val_set_size);
        let mut grid = None;

        for batch in batches {
            let batch = batch?;
            batch.validate()?;
            let MaskBatch { images, targets } = batch;

            let logits = model.forward(images.clone());
            let loss: f64 = self
                .criterion
                .forward(logits.clone(), targets.clone())
                .into_scalar()
                .elem();

            let preds: Vec<usize> = to_indices(logits.argmax(1).squeeze::<1>(1));
            let truth: Vec<usize> = to_indices(targets);

            matches += preds.iter().zip(&truth).filter(|(p, t)| p == t).count();
            f1_sum += macro_f1_score(&preds, &truth);
            loss_sum += loss;
            count += 1;

            if grid.is_none() {
                if let Some(options) = figure {
                    grid = Some(self.figure(images, &preds, &truth, options));
                }
            }

            predictions.extend(preds);
            labels.extend(truth);
        }

        if count == 0 {
            return Err(MaskClassifierError::Training(
                "validation produced no batches".to_string(),
            ));
        }

        Ok(ValidationOutcome {
            loss: loss_sum / count as f64,
            accuracy: matches as f64 / val_set_size as f64,
            f1: f1_sum / count as f64,
            epoch_f1: macro_f1_score(&predictions, &labels),
            predictions,
            labels,
            grid,
        })
    }

    fn figure(
        &mut self,
        images: Tensor<B::InnerBackend, 4>,
        preds: &[usize],
        truth: &[usize],
        options: FigureOptions,
    ) -> PredictionGrid {
        let [n, c, h, w] = images.dims();
        let per_image = c * h * w;
        let pixels: Vec<f32> = images.into_data().iter::<f32>().collect();

        let samples: Vec<GridSample> = figure_indices(n, options.shuffle, &mut self.rng)
            .into_iter()
            .map(|i| GridSample {
                image: pixels[i * per_image..(i + 1) * per_image].to_vec(),
                label: truth[i],
                prediction: preds[i],
            })
            .collect();

        PredictionGrid::build(&samples, options.input_size, options.mean, options.std)
    }
}

/// Loss as f64, or `NumericInstability` when it is NaN or infinite
fn finite_loss<B: Backend>(loss: Tensor<B, 1>, epoch: usize, batch: usize) -> Result<f64> {
    let value: f64 = loss.into_scalar().elem();
    if value.is_finite() {
        Ok(value)
    } else {
        Err(MaskClassifierError::NumericInstability {
            epoch,
            batch,
            value,
        })
    }
}

fn count_correct<B: Backend>(logits: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> usize {
    let correct: i64 = logits
        .argmax(1)
        .squeeze::<1>(1)
        .equal(targets)
        .int()
        .sum()
        .into_scalar()
        .elem();
    correct.max(0) as usize
}

fn to_indices<B: Backend>(tensor: Tensor<B, 1, Int>) -> Vec<usize> {
    tensor
        .into_data()
        .iter::<i64>()
        .map(|v| v.max(0) as usize)
        .collect()
}
