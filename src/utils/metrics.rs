//! Metrics Module for Model Evaluation
//!
//! Provides the metrics used to judge the mask classifier:
//! - Accuracy (overall and per-class)
//! - Precision, Recall, F1-score (macro averages follow scikit-learn: the
//!   average runs over every label that appears in either the ground truth or
//!   the predictions)
//! - Confusion Matrix
//! - A text classification report for the best model

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Macro-averaged F1 over the labels present in `ground_truth` or `predictions`.
///
/// A label that is predicted but never true contributes an F1 of 0, as does a
/// label that is true but never predicted. Empty input yields 0.
pub fn macro_f1_score(predictions: &[usize], ground_truth: &[usize]) -> f64 {
    let labels: BTreeSet<usize> = predictions
        .iter()
        .chain(ground_truth.iter())
        .copied()
        .collect();

    if labels.is_empty() {
        return 0.0;
    }

    let sum: f64 = labels
        .iter()
        .map(|&label| {
            let mut tp = 0usize;
            let mut fp = 0usize;
            let mut fn_ = 0usize;
            for (&p, &g) in predictions.iter().zip(ground_truth.iter()) {
                match (p == label, g == label) {
                    (true, true) => tp += 1,
                    (true, false) => fp += 1,
                    (false, true) => fn_ += 1,
                    (false, false) => {}
                }
            }
            f1_from_counts(tp, fp, fn_)
        })
        .sum();

    sum / labels.len() as f64
}

fn f1_from_counts(tp: usize, fp: usize, fn_: usize) -> f64 {
    let denom = 2 * tp + fp + fn_;
    if denom == 0 {
        0.0
    } else {
        2.0 * tp as f64 / denom as f64
    }
}

/// Comprehensive metrics for model evaluation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metrics {
    /// Total number of samples evaluated
    pub total_samples: usize,

    /// Number of correct predictions
    pub correct_predictions: usize,

    /// Overall accuracy (correct / total)
    pub accuracy: f64,

    /// Macro-averaged precision
    pub macro_precision: f64,

    /// Macro-averaged recall
    pub macro_recall: f64,

    /// Macro-averaged F1-score
    pub macro_f1: f64,

    /// Weighted F1-score (weighted by class support)
    pub weighted_f1: f64,

    /// Per-class metrics
    pub per_class: Vec<ClassMetrics>,

    /// Confusion matrix
    pub confusion_matrix: ConfusionMatrix,
}

impl Metrics {
    /// Create new metrics from predictions and ground truth labels
    pub fn from_predictions(
        predictions: &[usize],
        ground_truth: &[usize],
        num_classes: usize,
    ) -> Self {
        let total_samples = predictions.len().min(ground_truth.len());
        if total_samples == 0 {
            return Self::default();
        }

        let confusion_matrix =
            ConfusionMatrix::from_predictions(predictions, ground_truth, num_classes);

        let correct_predictions = confusion_matrix.correct();
        let accuracy = correct_predictions as f64 / total_samples as f64;

        let per_class: Vec<ClassMetrics> = (0..num_classes)
            .map(|class_idx| ClassMetrics::from_confusion_matrix(&confusion_matrix, class_idx))
            .collect();

        // Labels seen on either side of the comparison
        let present: Vec<&ClassMetrics> = per_class
            .iter()
            .filter(|m| m.support > 0 || m.true_positives + m.false_positives > 0)
            .collect();

        let num_present = present.len() as f64;
        let mean_of = |f: fn(&ClassMetrics) -> f64| -> f64 {
            if num_present > 0.0 {
                present.iter().map(|m| f(m)).sum::<f64>() / num_present
            } else {
                0.0
            }
        };

        let macro_precision = mean_of(|m| m.precision);
        let macro_recall = mean_of(|m| m.recall);
        let macro_f1 = mean_of(|m| m.f1);

        let total_support: usize = per_class.iter().map(|m| m.support).sum();
        let weighted_f1 = if total_support > 0 {
            per_class
                .iter()
                .map(|m| m.f1 * m.support as f64)
                .sum::<f64>()
                / total_support as f64
        } else {
            0.0
        };

        Self {
            total_samples,
            correct_predictions,
            accuracy,
            macro_precision,
            macro_recall,
            macro_f1,
            weighted_f1,
            per_class,
            confusion_matrix,
        }
    }

    /// Render a text report with one row per class that has support, followed
    /// by accuracy and the macro/weighted averages.
    pub fn classification_report(&self, class_names: &[String]) -> String {
        let name_width = class_names
            .iter()
            .map(|n| n.len())
            .max()
            .unwrap_or(0)
            .max("weighted avg".len());

        let mut out = String::new();
        out.push_str(&format!(
            "{:>w$} {:>10} {:>10} {:>10} {:>10}\n\n",
            "",
            "precision",
            "recall",
            "f1-score",
            "support",
            w = name_width
        ));

        for m in self.per_class.iter().filter(|m| m.support > 0) {
            let name = class_names
                .get(m.class_idx)
                .cloned()
                .unwrap_or_else(|| m.class_idx.to_string());
            out.push_str(&format!(
                "{:>w$} {:>10.2} {:>10.2} {:>10.2} {:>10}\n",
                name,
                m.precision,
                m.recall,
                m.f1,
                m.support,
                w = name_width
            ));
        }

        let weighted = |f: fn(&ClassMetrics) -> f64| -> f64 {
            if self.total_samples == 0 {
                return 0.0;
            }
            self.per_class
                .iter()
                .map(|m| f(m) * m.support as f64)
                .sum::<f64>()
                / self.total_samples as f64
        };

        out.push('\n');
        out.push_str(&format!(
            "{:>w$} {:>10} {:>10} {:>10.2} {:>10}\n",
            "accuracy",
            "",
            "",
            self.accuracy,
            self.total_samples,
            w = name_width
        ));
        out.push_str(&format!(
            "{:>w$} {:>10.2} {:>10.2} {:>10.2} {:>10}\n",
            "macro avg",
            self.macro_precision,
            self.macro_recall,
            self.macro_f1,
            self.total_samples,
            w = name_width
        ));
        out.push_str(&format!(
            "{:>w$} {:>10.2} {:>10.2} {:>10.2} {:>10}\n",
            "weighted avg",
            weighted(|m| m.precision),
            weighted(|m| m.recall),
            self.weighted_f1,
            self.total_samples,
            w = name_width
        ));

        out
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self {
            total_samples: 0,
            correct_predictions: 0,
            accuracy: 0.0,
            macro_precision: 0.0,
            macro_recall: 0.0,
            macro_f1: 0.0,
            weighted_f1: 0.0,
            per_class: Vec::new(),
            confusion_matrix: ConfusionMatrix::default(),
        }
    }
}

/// Per-class metrics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassMetrics {
    /// Class index
    pub class_idx: usize,

    /// True positives
    pub true_positives: usize,

    /// False positives
    pub false_positives: usize,

    /// False negatives
    pub false_negatives: usize,

    /// Precision = TP / (TP + FP)
    pub precision: f64,

    /// Recall = TP / (TP + FN)
    pub recall: f64,

    /// F1 = 2 * (precision * recall) / (precision + recall)
    pub f1: f64,

    /// Support = number of actual samples of this class
    pub support: usize,
}

impl ClassMetrics {
    /// Calculate metrics for a class from confusion matrix
    pub fn from_confusion_matrix(cm: &ConfusionMatrix, class_idx: usize) -> Self {
        let true_positives = cm.get(class_idx, class_idx);

        // Predicted as this class but actually another one
        let false_positives: usize = (0..cm.num_classes)
            .filter(|&i| i != class_idx)
            .map(|i| cm.get(i, class_idx))
            .sum();

        // Actually this class but predicted as another one
        let false_negatives: usize = (0..cm.num_classes)
            .filter(|&i| i != class_idx)
            .map(|i| cm.get(class_idx, i))
            .sum();

        let support = true_positives + false_negatives;

        let precision = if true_positives + false_positives > 0 {
            true_positives as f64 / (true_positives + false_positives) as f64
        } else {
            0.0
        };

        let recall = if support > 0 {
            true_positives as f64 / support as f64
        } else {
            0.0
        };

        Self {
            class_idx,
            true_positives,
            false_positives,
            false_negatives,
            precision,
            recall,
            f1: f1_from_counts(true_positives, false_positives, false_negatives),
            support,
        }
    }
}

/// Confusion Matrix for multi-class classification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    /// Number of classes
    pub num_classes: usize,

    /// Matrix data (row = actual, column = predicted), flat row-major
    pub matrix: Vec<usize>,
}

impl Default for ConfusionMatrix {
    fn default() -> Self {
        Self::new(0)
    }
}

impl ConfusionMatrix {
    /// Create a new empty confusion matrix
    pub fn new(num_classes: usize) -> Self {
        Self {
            num_classes,
            matrix: vec![0; num_classes * num_classes],
        }
    }

    /// Create confusion matrix from predictions and ground truth
    pub fn from_predictions(
        predictions: &[usize],
        ground_truth: &[usize],
        num_classes: usize,
    ) -> Self {
        let mut cm = Self::new(num_classes);

        for (&pred, &actual) in predictions.iter().zip(ground_truth.iter()) {
            cm.add(actual, pred);
        }

        cm
    }

    /// Add a single prediction to the matrix
    pub fn add(&mut self, actual: usize, predicted: usize) {
        if actual < self.num_classes && predicted < self.num_classes {
            let idx = actual * self.num_classes + predicted;
            self.matrix[idx] += 1;
        }
    }

    /// Get the count at (actual, predicted)
    pub fn get(&self, actual: usize, predicted: usize) -> usize {
        if actual < self.num_classes && predicted < self.num_classes {
            self.matrix[actual * self.num_classes + predicted]
        } else {
            0
        }
    }

    /// Get the total count
    pub fn total(&self) -> usize {
        self.matrix.iter().sum()
    }

    /// Get the number of correct predictions (diagonal sum)
    pub fn correct(&self) -> usize {
        (0..self.num_classes).map(|i| self.get(i, i)).sum()
    }

    /// Get overall accuracy
    pub fn accuracy(&self) -> f64 {
        let total = self.total();
        if total > 0 {
            self.correct() as f64 / total as f64
        } else {
            0.0
        }
    }

    /// Largest single cell, used to scale heatmap colors
    pub fn max_count(&self) -> usize {
        self.matrix.iter().copied().max().unwrap_or(0)
    }

    /// Save confusion matrix to CSV
    pub fn save_csv(&self, path: &std::path::Path) -> std::io::Result<()> {
        let mut content = String::new();

        content.push_str("actual\\predicted");
        for col in 0..self.num_classes {
            content.push_str(&format!(",{}", col));
        }
        content.push('\n');

        for row in 0..self.num_classes {
            content.push_str(&format!("{}", row));
            for col in 0..self.num_classes {
                content.push_str(&format!(",{}", self.get(row, col)));
            }
            content.push('\n');
        }

        std::fs::write(path, content)
    }
}

/// Running average for tracking metrics during training
#[derive(Debug, Clone, Default)]
pub struct RunningAverage {
    sum: f64,
    count: usize,
}

impl RunningAverage {
    /// Create a new running average
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a value
    pub fn add(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
    }

    /// Sum of all values added so far
    pub fn sum(&self) -> f64 {
        self.sum
    }

    /// Get the current average
    pub fn average(&self) -> f64 {
        if self.count > 0 {
            self.sum / self.count as f64
        } else {
            0.0
        }
    }

    /// Get the count
    pub fn count(&self) -> usize {
        self.count
    }

    /// Reset the running average
    pub fn reset(&mut self) {
        self.sum = 0.0;
        self.count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // (pred, gt) pairs: 7 of 10 correct
    const PREDICTIONS: [usize; 10] = [0, 1, 2, 0, 1, 2, 0, 0, 2, 2];
    const GROUND_TRUTH: [usize; 10] = [0, 1, 2, 0, 2, 2, 1, 0, 1, 2];

    #[test]
    fn test_confusion_matrix() {
        let cm = ConfusionMatrix::from_predictions(&PREDICTIONS, &GROUND_TRUTH, 3);

        assert_eq!(cm.get(0, 0), 3);
        assert_eq!(cm.get(1, 1), 1);
        assert_eq!(cm.get(2, 2), 3);
        assert_eq!(cm.get(1, 0), 1);
        assert_eq!(cm.get(1, 2), 1);
        assert_eq!(cm.get(2, 1), 1);

        assert_eq!(cm.total(), 10);
        assert_eq!(cm.correct(), 7);
        assert!((cm.accuracy() - 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_macro_f1_hand_computed() {
        // class 0: P=3/4 R=1   -> F1 = 6/7
        // class 1: P=1/2 R=1/3 -> F1 = 0.4
        // class 2: P=3/4 R=3/4 -> F1 = 0.75
        let expected = (6.0 / 7.0 + 0.4 + 0.75) / 3.0;
        let f1 = macro_f1_score(&PREDICTIONS, &GROUND_TRUTH);
        assert!((f1 - expected).abs() < 1e-9, "got {}", f1);

        let metrics = Metrics::from_predictions(&PREDICTIONS, &GROUND_TRUTH, 18);
        assert!((metrics.macro_f1 - expected).abs() < 1e-9);
        assert_eq!(metrics.correct_predictions, 7);
    }

    #[test]
    fn test_macro_f1_counts_predicted_only_labels() {
        // label 5 never appears in truth but is predicted once
        let f1 = macro_f1_score(&[0, 5], &[0, 0]);
        // label 0: tp=1 fn=1 -> 2/3, label 5: fp=1 -> 0
        assert!((f1 - (2.0 / 3.0) / 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_macro_f1_empty() {
        assert_eq!(macro_f1_score(&[], &[]), 0.0);
    }

    #[test]
    fn test_class_metrics() {
        let predictions = vec![0, 0, 0, 1, 1];
        let ground_truth = vec![0, 0, 1, 1, 0];

        let cm = ConfusionMatrix::from_predictions(&predictions, &ground_truth, 2);
        let class0 = ClassMetrics::from_confusion_matrix(&cm, 0);

        assert_eq!(class0.true_positives, 2);
        assert_eq!(class0.false_positives, 1);
        assert_eq!(class0.false_negatives, 1);
        assert!((class0.precision - 2.0 / 3.0).abs() < 0.001);
        assert!((class0.recall - 2.0 / 3.0).abs() < 0.001);
    }

    #[test]
    fn test_classification_report_lists_supported_classes() {
        let metrics = Metrics::from_predictions(&PREDICTIONS, &GROUND_TRUTH, 4);
        let names: Vec<String> = ["a", "b", "c", "d"].iter().map(|s| s.to_string()).collect();
        let report = metrics.classification_report(&names);

        assert!(report.contains("precision"));
        assert!(report.contains("macro avg"));
        assert!(report.contains("weighted avg"));
        // class "d" has no support
        assert!(!report.lines().any(|l| l.trim_start().starts_with("d ")));
    }

    #[test]
    fn test_running_average() {
        let mut avg = RunningAverage::new();

        avg.add(1.0);
        avg.add(2.0);
        avg.add(3.0);

        assert_eq!(avg.count(), 3);
        assert!((avg.average() - 2.0).abs() < 0.001);

        avg.reset();
        assert_eq!(avg.count(), 0);
        assert_eq!(avg.average(), 0.0);
    }
}
