//! Loss functions selectable by name
//!
//! `cross_entropy`, `label_smoothing`, `focal` and `f1`. All reduce to a
//! scalar mean over the batch.

use std::fmt;
use std::str::FromStr;

use burn::nn::loss::CrossEntropyLossConfig;
use burn::prelude::*;
use burn::tensor::activation::{log_softmax, softmax};
use serde::{Deserialize, Serialize};

use crate::utils::error::MaskClassifierError;

const LABEL_SMOOTHING: f32 = 0.1;
const FOCAL_GAMMA: f64 = 2.0;
const F1_EPSILON: f64 = 1e-7;

/// Registered criteria
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CriterionKind {
    #[serde(rename = "cross_entropy")]
    CrossEntropy,
    #[serde(rename = "label_smoothing")]
    LabelSmoothing,
    #[serde(rename = "focal")]
    Focal,
    #[serde(rename = "f1")]
    F1,
}

impl FromStr for CriterionKind {
    type Err = MaskClassifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cross_entropy" => Ok(Self::CrossEntropy),
            "label_smoothing" => Ok(Self::LabelSmoothing),
            "focal" => Ok(Self::Focal),
            "f1" => Ok(Self::F1),
            other => Err(MaskClassifierError::Config(format!(
                "unknown criterion '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for CriterionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::CrossEntropy => "cross_entropy",
            Self::LabelSmoothing => "label_smoothing",
            Self::Focal => "focal",
            Self::F1 => "f1",
        };
        write!(f, "{}", name)
    }
}

/// A configured criterion
#[derive(Debug, Clone, Copy)]
pub struct Criterion {
    kind: CriterionKind,
    num_classes: usize,
}

impl Criterion {
    pub fn new(kind: CriterionKind, num_classes: usize) -> Self {
        Self { kind, num_classes }
    }

    pub fn kind(&self) -> CriterionKind {
        self.kind
    }

    /// Mean loss of `logits` `[N, C]` against `targets` `[N]`, shape `[1]`
    pub fn forward<B: Backend>(&self, logits: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> Tensor<B, 1> {
        let device = logits.device();
        match self.kind {
            CriterionKind::CrossEntropy => CrossEntropyLossConfig::new()
                .init(&device)
                .forward(logits, targets),
            CriterionKind::LabelSmoothing => CrossEntropyLossConfig::new()
                .with_smoothing(Some(LABEL_SMOOTHING))
                .init(&device)
                .forward(logits, targets),
            CriterionKind::Focal => focal_loss(logits, targets, FOCAL_GAMMA),
            CriterionKind::F1 => f1_loss(logits, targets, self.num_classes),
        }
    }
}

/// `-(1 - p_t)^gamma * log(p_t)`, averaged
fn focal_loss<B: Backend>(logits: Tensor<B, 2>, targets: Tensor<B, 1, Int>, gamma: f64) -> Tensor<B, 1> {
    let [n, _] = logits.dims();
    let log_prob = log_softmax(logits, 1)
        .gather(1, targets.reshape([n, 1]))
        .reshape([n]);
    let prob = log_prob.clone().exp();
    let weight = prob.neg().add_scalar(1.0).powf_scalar(gamma);
    (weight * log_prob).neg().mean()
}

/// One minus the soft macro F1 of the softmax outputs
fn f1_loss<B: Backend>(logits: Tensor<B, 2>, targets: Tensor<B, 1, Int>, num_classes: usize) -> Tensor<B, 1> {
    let [n, _] = logits.dims();
    let device = logits.device();

    let y_true = Tensor::<B, 2>::zeros([n, num_classes], &device).scatter(
        1,
        targets.reshape([n, 1]),
        Tensor::ones([n, 1], &device),
    );
    let y_pred = softmax(logits, 1);

    let tp = (y_true.clone() * y_pred.clone()).sum_dim(0);
    let fp = (y_true.clone().neg().add_scalar(1.0) * y_pred.clone()).sum_dim(0);
    let fn_ = (y_true * y_pred.neg().add_scalar(1.0)).sum_dim(0);

    let precision = tp.clone() / (tp.clone() + fp).add_scalar(F1_EPSILON);
    let recall = tp.clone() / (tp + fn_).add_scalar(F1_EPSILON);

    let f1 = (precision.clone() * recall.clone()).mul_scalar(2.0)
        / (precision + recall).add_scalar(F1_EPSILON);
    let f1 = f1.clamp(F1_EPSILON, 1.0 - F1_EPSILON);

    f1.mean().neg().add_scalar(1.0)
}
