//! Checkpoint selection and persistence
//!
//! A model is "best" when its validation F1 strictly beats every earlier
//! epoch. The lowest validation loss is tracked for reporting only. The
//! latest weights are always saved as "last".

use std::fs;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use burn::module::Module;
use burn::record::CompactRecorder;
use burn::tensor::backend::Backend;
use tracing::info;

use super::trainer::ValidationOutcome;
use crate::utils::charts::generate_confusion_matrix;
use crate::utils::error::{MaskClassifierError, Result};
use crate::utils::metrics::Metrics;

pub const CONFUSION_MATRIX_SVG: &str = "confusion_matrix.svg";
pub const CONFUSION_MATRIX_CSV: &str = "confusion_matrix.csv";
pub const CLASSIFICATION_REPORT: &str = "classification_report.txt";

/// Best metrics seen so far in a run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BestState {
    pub best_val_loss: f64,
    pub best_f1: f64,
}

impl Default for BestState {
    fn default() -> Self {
        Self {
            best_val_loss: f64::INFINITY,
            best_f1: 0.0,
        }
    }
}

impl BestState {
    /// Fold in one epoch's validation result; true when F1 improved
    pub fn observe(&mut self, val_loss: f64, f1: f64) -> bool {
        self.best_val_loss = self.best_val_loss.min(val_loss);
        if f1 > self.best_f1 {
            self.best_f1 = f1;
            true
        } else {
            false
        }
    }
}

/// Which checkpoint to write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointSlot {
    Best,
    Last,
}

impl CheckpointSlot {
    pub fn file_stem(&self) -> &'static str {
        match self {
            Self::Best => "best",
            Self::Last => "last",
        }
    }
}

/// Somewhere model snapshots can be written
pub trait CheckpointStore<M> {
    /// Save `model` into `slot`, returning where it went
    fn persist(&mut self, model: &M, slot: CheckpointSlot) -> Result<PathBuf>;
}

/// Burn `CompactRecorder` files in a directory (`best.mpk`, `last.mpk`)
pub struct RecorderStore<B: Backend> {
    dir: PathBuf,
    _backend: PhantomData<B>,
}

impl<B: Backend> RecorderStore<B> {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            _backend: PhantomData,
        }
    }

    /// Path handed to the recorder; it appends the extension itself
    pub fn path(&self, slot: CheckpointSlot) -> PathBuf {
        self.dir.join(slot.file_stem())
    }
}

impl<B: Backend, M: Module<B>> CheckpointStore<M> for RecorderStore<B> {
    fn persist(&mut self, model: &M, slot: CheckpointSlot) -> Result<PathBuf> {
        let path = self.path(slot);
        model
            .clone()
            .save_file(&path, &CompactRecorder::new())
            .map_err(|e| {
                MaskClassifierError::Resource(format!(
                    "saving {} checkpoint to {}: {:?}",
                    slot.file_stem(),
                    path.display(),
                    e
                ))
            })?;
        Ok(path)
    }
}

/// What the policy did for one epoch
#[derive(Debug, Clone, PartialEq)]
pub struct CheckpointDecision {
    pub improved: bool,
    pub best: Option<PathBuf>,
    pub last: PathBuf,
}

/// Saves checkpoints and best-model reports into a run directory
#[derive(Debug, Clone)]
pub struct CheckpointPolicy {
    run_dir: PathBuf,
    class_names: Vec<String>,
}

impl CheckpointPolicy {
    pub fn new(run_dir: impl Into<PathBuf>, class_names: Vec<String>) -> Self {
        Self {
            run_dir: run_dir.into(),
            class_names,
        }
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    pub fn apply<M, S: CheckpointStore<M>>(
        &self,
        state: &mut BestState,
        store: &mut S,
        model: &M,
        epoch: usize,
        outcome: &ValidationOutcome,
    ) -> Result<CheckpointDecision> {
        let improved = state.observe(outcome.loss, outcome.f1);

        let best = if improved {
            info!(
                "New best model for f1 : {:.4}! saving the best model at epoch {}",
                outcome.f1, epoch
            );
            let path = store.persist(model, CheckpointSlot::Best)?;
            self.write_reports(outcome)?;
            Some(path)
        } else {
            None
        };

        let last = store.persist(model, CheckpointSlot::Last)?;

        Ok(CheckpointDecision {
            improved,
            best,
            last,
        })
    }

    /// Confusion matrix (SVG + CSV) and classification report for the best model
    fn write_reports(&self, outcome: &ValidationOutcome) -> Result<()> {
        let metrics = Metrics::from_predictions(
            &outcome.predictions,
            &outcome.labels,
            self.class_names.len(),
        );
        let resource = |what: &str, e: std::io::Error| {
            MaskClassifierError::Resource(format!("writing {}: {}", what, e))
        };

        generate_confusion_matrix(
            &metrics.confusion_matrix,
            &self.class_names,
            &self.run_dir.join(CONFUSION_MATRIX_SVG),
        )
        .map_err(|e| resource(CONFUSION_MATRIX_SVG, e))?;

        metrics
            .confusion_matrix
            .save_csv(&self.run_dir.join(CONFUSION_MATRIX_CSV))
            .map_err(|e| resource(CONFUSION_MATRIX_CSV, e))?;

        fs::write(
            self.run_dir.join(CLASSIFICATION_REPORT),
            metrics.classification_report(&self.class_names),
        )
        .map_err(|e| resource(CLASSIFICATION_REPORT, e))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::class_names;

    #[derive(Default)]
    struct RecordingStore {
        writes: Vec<CheckpointSlot>,
        fail: bool,
    }

    impl CheckpointStore<()> for RecordingStore {
        fn persist(&mut self, _model: &(), slot: CheckpointSlot) -> Result<PathBuf> {
            if self.fail {
                return Err(MaskClassifierError::Resource("disk full".to_string()));
            }
            self.writes.push(slot);
            Ok(PathBuf::from(slot.file_stem()))
        }
    }

    fn outcome(f1: f64, loss: f64) -> ValidationOutcome {
        ValidationOutcome {
            loss,
            accuracy: 0.5,
            f1,
            epoch_f1: f1,
            predictions: vec![0, 1, 2, 2],
            labels: vec![0, 1, 1, 2],
            grid: None,
        }
    }

    #[test]
    fn test_best_state_requires_strict_improvement() {
        let mut state = BestState::default();
        assert!(state.observe(1.0, 0.5));
        assert!(!state.observe(0.8, 0.5));
        assert_eq!(state.best_val_loss, 0.8);
        assert!(!state.observe(2.0, 0.1));
        assert_eq!(state.best_val_loss, 0.8);
        assert!(state.observe(3.0, 0.6));
        assert_eq!(state.best_f1, 0.6);
    }

    #[test]
    fn test_zero_f1_never_counts_as_best() {
        let mut state = BestState::default();
        assert!(!state.observe(1.0, 0.0));
    }

    #[test]
    fn test_best_and_last_sequence() {
        let dir = tempfile::tempdir().unwrap();
        let policy = CheckpointPolicy::new(dir.path(), class_names());
        let mut state = BestState::default();
        let mut store = RecordingStore::default();

        let mut best_epochs = Vec::new();
        let epochs = [(0.5, 0.9), (0.3, 0.4), (0.7, 0.6), (0.6, 0.5)];
        for (epoch, (f1, loss)) in epochs.into_iter().enumerate() {
            let decision = policy
                .apply(&mut state, &mut store, &(), epoch, &outcome(f1, loss))
                .unwrap();
            if decision.improved {
                best_epochs.push(epoch);
            }
            assert_eq!(decision.last, PathBuf::from("last"));
        }

        assert_eq!(best_epochs, vec![0, 2]);
        let lasts = store.writes.iter().filter(|s| **s == CheckpointSlot::Last).count();
        let bests = store.writes.iter().filter(|s| **s == CheckpointSlot::Best).count();
        assert_eq!((bests, lasts), (2, 4));
        assert_eq!(state.best_val_loss, 0.4);

        for file in [CONFUSION_MATRIX_SVG, CONFUSION_MATRIX_CSV, CLASSIFICATION_REPORT] {
            assert!(dir.path().join(file).exists(), "{} missing", file);
        }
    }

    #[test]
    fn test_store_failure_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let policy = CheckpointPolicy::new(dir.path(), class_names());
        let mut store = RecordingStore {
            fail: true,
            ..Default::default()
        };
        let result = policy.apply(&mut BestState::default(), &mut store, &(), 0, &outcome(0.4, 1.0));
        assert!(matches!(result, Err(MaskClassifierError::Resource(_))));
    }

    #[test]
    fn test_recorder_store_writes_files() {
        use crate::model::MaskClassifierLite;
        use burn::backend::NdArray;

        let dir = tempfile::tempdir().unwrap();
        let model = MaskClassifierLite::<NdArray<f32>>::new(18, 0.3, &Default::default());
        let mut store = RecorderStore::<NdArray<f32>>::new(dir.path());

        let path = store.persist(&model, CheckpointSlot::Best).unwrap();
        assert_eq!(path, dir.path().join("best"));
        assert!(dir.path().join("best.mpk").exists());
    }
}
