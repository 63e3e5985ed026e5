//! CutMix augmentation
//!
//! With probability `cutmix_prob` (and only when `beta > 0`) a band of every
//! image in the batch is replaced by the same band of another image from the
//! same batch, and the loss is blended between both label sets in proportion
//! to the area actually swapped.
//!
//! The band spans the full extent of tensor axis 2 and a random slice of
//! axis 3. Following the usual CutMix naming, axis 2 is called `W` (x) and
//! axis 3 `H` (y).

use burn::prelude::*;
use rand::seq::SliceRandom;
use rand::Rng;
use rand_distr::{Beta, Distribution};

use super::loss::Criterion;
use crate::model::ImageClassifier;
use crate::utils::error::{MaskClassifierError, Result};

/// Half-open pixel box `[x1, x2) x [y1, y2)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
    pub x1: usize,
    pub y1: usize,
    pub x2: usize,
    pub y2: usize,
}

impl BoundingBox {
    pub fn area(&self) -> usize {
        (self.x2 - self.x1) * (self.y2 - self.y1)
    }

    pub fn is_empty(&self) -> bool {
        self.area() == 0
    }
}

/// Draw the region to swap for a mixing ratio `lam`.
///
/// `cut_h = floor(H * sqrt(1 - lam))` around a uniformly drawn center; the
/// box always covers all of `W`. Bounds are clipped into the image, so the
/// box can end up smaller than `cut_h` (or empty).
pub fn rand_bbox<R: Rng>(width: usize, height: usize, lam: f64, rng: &mut R) -> BoundingBox {
    let lam = lam.clamp(0.0, 1.0);
    let cut_ratio = (1.0 - lam).sqrt();
    let cut_h = (height as f64 * cut_ratio) as usize;

    // The center along W is drawn to keep the random stream aligned with
    // the two-center formulation, but the band always spans W.
    let _cx = if width > 0 { rng.gen_range(0..width) } else { 0 };
    let cy = if height > 0 { rng.gen_range(0..height) } else { 0 };

    let half = cut_h / 2;
    BoundingBox {
        x1: 0,
        y1: cy.saturating_sub(half).min(height),
        x2: width,
        y2: (cy + half).min(height),
    }
}

/// Applied mix: partner labels, box, and the area-corrected ratio
#[derive(Debug, Clone)]
pub struct Mix<B: Backend> {
    pub targets_b: Tensor<B, 1, Int>,
    pub bbox: BoundingBox,
    /// Fraction of each image that still belongs to its own label
    pub lam: f64,
    pub permutation: Vec<usize>,
}

/// Images to feed forward and how to score the output
#[derive(Debug, Clone)]
pub struct MixPlan<B: Backend> {
    pub images: Tensor<B, 4>,
    pub targets_a: Tensor<B, 1, Int>,
    pub mix: Option<Mix<B>>,
}

impl<B: Backend> MixPlan<B> {
    /// Plan without mixing
    pub fn plain(images: Tensor<B, 4>, targets: Tensor<B, 1, Int>) -> Self {
        Self {
            images,
            targets_a: targets,
            mix: None,
        }
    }

    pub fn is_mixed(&self) -> bool {
        self.mix.is_some()
    }

    /// Loss of `logits` under this plan
    pub fn loss(&self, logits: Tensor<B, 2>, criterion: &Criterion) -> Tensor<B, 1> {
        match &self.mix {
            None => criterion.forward(logits, self.targets_a.clone()),
            Some(mix) => {
                let loss_a = criterion.forward(logits.clone(), self.targets_a.clone());
                let loss_b = criterion.forward(logits, mix.targets_b.clone());
                loss_a.mul_scalar(mix.lam) + loss_b.mul_scalar(1.0 - mix.lam)
            }
        }
    }

    /// One forward pass of `model` plus the loss; returns `(loss, logits)`
    pub fn forward_loss<M: ImageClassifier<B>>(
        &self,
        model: &M,
        criterion: &Criterion,
    ) -> (Tensor<B, 1>, Tensor<B, 2>) {
        let logits = model.forward(self.images.clone());
        (self.loss(logits.clone(), criterion), logits)
    }
}

/// The random mixing policy
#[derive(Debug, Clone)]
pub struct CutMix {
    beta: f64,
    prob: f64,
    distribution: Option<Beta<f64>>,
}

impl CutMix {
    pub fn new(beta: f64, prob: f64) -> Result<Self> {
        if !(beta >= 0.0 && beta.is_finite()) {
            return Err(MaskClassifierError::Config(format!(
                "beta must be a finite value >= 0, got {}",
                beta
            )));
        }
        if !(0.0..=1.0).contains(&prob) {
            return Err(MaskClassifierError::Config(format!(
                "cutmix_prob must be in [0, 1], got {}",
                prob
            )));
        }

        let distribution = if beta > 0.0 {
            Some(Beta::new(beta, beta).map_err(|e| {
                MaskClassifierError::Config(format!("invalid beta {}: {}", beta, e))
            })?)
        } else {
            None
        };

        Ok(Self {
            beta,
            prob,
            distribution,
        })
    }

    /// Never mixes
    pub fn disabled() -> Self {
        Self {
            beta: 0.0,
            prob: 0.0,
            distribution: None,
        }
    }

    pub fn beta(&self) -> f64 {
        self.beta
    }

    pub fn prob(&self) -> f64 {
        self.prob
    }

    /// Draw the gate (one uniform per batch) and, if it fires, build the
    /// mixed images. The input tensors are not modified.
    pub fn plan<B: Backend, R: Rng>(
        &self,
        images: Tensor<B, 4>,
        targets: Tensor<B, 1, Int>,
        rng: &mut R,
    ) -> MixPlan<B> {
        let r: f64 = rng.gen();
        match &self.distribution {
            Some(dist) if r < self.prob => {
                let lam = dist.sample(rng);
                mix_batch(images, targets, lam, rng)
            }
            _ => MixPlan::plain(images, targets),
        }
    }
}

/// Pair every sample with a random partner and paste the partner's band
fn mix_batch<B: Backend, R: Rng>(
    images: Tensor<B, 4>,
    targets: Tensor<B, 1, Int>,
    lam: f64,
    rng: &mut R,
) -> MixPlan<B> {
    let [n, c, w, h] = images.dims();
    let device = images.device();

    let mut permutation: Vec<usize> = (0..n).collect();
    permutation.shuffle(rng);
    let perm_tensor = Tensor::<B, 1, Int>::from_data(
        TensorData::new(
            permutation.iter().map(|&i| i as i64).collect::<Vec<_>>(),
            [n],
        ),
        &device,
    );

    let targets_b = targets.clone().select(0, perm_tensor.clone());
    let bbox = rand_bbox(w, h, lam, rng);

    let mixed = if bbox.is_empty() {
        images
    } else {
        let ranges = [0..n, 0..c, bbox.x1..bbox.x2, bbox.y1..bbox.y2];
        let patch = images.clone().select(0, perm_tensor).slice(ranges.clone());
        images.slice_assign(ranges, patch)
    };

    let lam = 1.0 - bbox.area() as f64 / (w * h).max(1) as f64;

    MixPlan {
        images: mixed,
        targets_a: targets,
        mix: Some(Mix {
            targets_b,
            bbox,
            lam,
            permutation,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::loss::CriterionKind;
    use burn::backend::NdArray;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    type TestBackend = NdArray<f32>;

    fn batch(n: usize) -> (Tensor<TestBackend, 4>, Tensor<TestBackend, 1, Int>) {
        let device = Default::default();
        // sample i is filled with the value i
        let data: Vec<f32> = (0..n).flat_map(|i| vec![i as f32; 3 * 8 * 6]).collect();
        let images = Tensor::<TestBackend, 4>::from_floats(TensorData::new(data, [n, 3, 8, 6]), &device);
        let targets = Tensor::<TestBackend, 1, Int>::from_data(
            TensorData::new((0..n as i64).collect::<Vec<_>>(), [n]),
            &device,
        );
        (images, targets)
    }

    #[test]
    fn test_rand_bbox_bounds() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        for i in 0..500 {
            let lam = (i % 11) as f64 / 10.0;
            let (w, h) = (1 + i % 7, 1 + i % 13);
            let b = rand_bbox(w, h, lam, &mut rng);
            assert_eq!(b.x1, 0);
            assert_eq!(b.x2, w);
            assert!(b.y1 <= b.y2 && b.y2 <= h, "{:?} for h={}", b, h);
        }
    }

    #[test]
    fn test_rand_bbox_lam_one_is_empty() {
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        for _ in 0..20 {
            let b = rand_bbox(32, 24, 1.0, &mut rng);
            assert!(b.is_empty());
        }
    }

    #[test]
    fn test_disabled_plan_is_identity() {
        let (images, targets) = batch(4);
        let mut rng = ChaCha8Rng::seed_from_u64(3);

        for cutmix in [CutMix::new(0.0, 1.0).unwrap(), CutMix::new(1.0, 0.0).unwrap()] {
            let plan = cutmix.plan(images.clone(), targets.clone(), &mut rng);
            assert!(!plan.is_mixed());
            let same: Vec<f32> = plan.images.into_data().iter::<f32>().collect();
            let orig: Vec<f32> = images.clone().into_data().iter::<f32>().collect();
            assert_eq!(same, orig);
        }
    }

    #[test]
    fn test_plain_loss_equals_criterion() {
        let device = Default::default();
        let (_, targets) = batch(4);
        let logits = Tensor::<TestBackend, 2>::random(
            [4, 4],
            burn::tensor::Distribution::Uniform(-1.0, 1.0),
            &device,
        );
        let criterion = Criterion::new(CriterionKind::CrossEntropy, 4);

        let plan = MixPlan::plain(Tensor::zeros([4, 3, 8, 6], &device), targets.clone());
        let a: f32 = plan.loss(logits.clone(), &criterion).into_scalar();
        let b: f32 = criterion.forward(logits, targets).into_scalar();
        assert_eq!(a, b);
    }

    #[test]
    fn test_mixed_batch_is_copy_on_mix() {
        let (images, targets) = batch(4);
        let original: Vec<f32> = images.clone().into_data().iter::<f32>().collect();
        let mut rng = ChaCha8Rng::seed_from_u64(5);

        // lam = 0 asks for a full-height band
        let plan = mix_batch(images.clone(), targets, 0.0, &mut rng);
        let mix = plan.mix.as_ref().unwrap();

        let after: Vec<f32> = images.into_data().iter::<f32>().collect();
        assert_eq!(original, after);

        assert!((0.0..=1.0).contains(&mix.lam));
        let expected_lam = 1.0 - mix.bbox.area() as f64 / (8 * 6) as f64;
        assert!((mix.lam - expected_lam).abs() < 1e-12);

        // inside the band sample i holds its partner's value
        let mixed: Vec<f32> = plan.images.clone().into_data().iter::<f32>().collect();
        let plane = 8 * 6;
        for (i, &p) in mix.permutation.iter().enumerate() {
            if mix.bbox.is_empty() {
                break;
            }
            let x = mix.bbox.x1;
            let y = mix.bbox.y1;
            let idx = i * 3 * plane + x * 6 + y;
            assert_eq!(mixed[idx], p as f32);
        }

        let targets_b: Vec<i64> = mix.targets_b.clone().into_data().iter::<i64>().collect();
        let expected: Vec<i64> = mix.permutation.iter().map(|&p| p as i64).collect();
        assert_eq!(targets_b, expected);
    }

    #[test]
    fn test_zero_area_mix_reduces_to_target_a() {
        let device = Default::default();
        let (_, targets) = batch(4);
        let logits = Tensor::<TestBackend, 2>::random(
            [4, 4],
            burn::tensor::Distribution::Uniform(-1.0, 1.0),
            &device,
        );
        let criterion = Criterion::new(CriterionKind::CrossEntropy, 4);
        let targets_b = Tensor::<TestBackend, 1, Int>::from_data(
            TensorData::new(vec![3i64, 2, 1, 0], [4]),
            &device,
        );

        let plan = MixPlan {
            images: Tensor::zeros([4, 3, 8, 6], &device),
            targets_a: targets.clone(),
            mix: Some(Mix {
                targets_b,
                bbox: BoundingBox { x1: 0, y1: 3, x2: 8, y2: 3 },
                lam: 1.0,
                permutation: vec![3, 2, 1, 0],
            }),
        };

        let mixed: f32 = plan.loss(logits.clone(), &criterion).into_scalar();
        let plain: f32 = criterion.forward(logits, targets).into_scalar();
        assert!((mixed - plain).abs() < 1e-6);
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(CutMix::new(-1.0, 0.5).is_err());
        assert!(CutMix::new(1.0, 1.5).is_err());
        assert!(CutMix::new(f64::NAN, 0.5).is_err());
    }

    #[test]
    fn test_gate_fires_with_prob_one() {
        let (images, targets) = batch(4);
        let mut rng = ChaCha8Rng::seed_from_u64(8);
        let cutmix = CutMix::new(1.0, 1.0).unwrap();
        let plan = cutmix.plan(images, targets, &mut rng);
        assert!(plan.is_mixed());
    }
}
