//! Sharpness-Aware Minimization
//!
//! SAM wraps a base optimizer and splits every update into two phases:
//!
//! 1. `first_step` moves the weights to `w + e(w)`, the worst-case point
//!    inside an L2 ball of radius `rho` along the current gradient.
//! 2. The caller computes the loss at the perturbed point and backpropagates.
//! 3. `second_step` returns to the original weights `w` and applies the base
//!    optimizer using the gradients from the perturbed point.
//!
//! The adaptive variant scales each coordinate by `|w|`, so `rho` is
//! relative to the parameter magnitude.

use std::marker::PhantomData;

use burn::module::{AutodiffModule, ModuleMapper, ModuleVisitor, ParamId};
use burn::optim::{GradientsParams, Optimizer};
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::ElementConversion;

/// Keeps the denominator away from zero when the gradient is tiny
const NORM_EPSILON: f64 = 1e-12;

/// One optimizer update on a module, usable behind a trait object
pub trait GradientStep<B: AutodiffBackend, M: AutodiffModule<B>>: Send {
    fn apply(&mut self, lr: f64, model: M, grads: GradientsParams) -> M;
}

impl<B, M, O> GradientStep<B, M> for O
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
    O: Optimizer<M, B>,
{
    fn apply(&mut self, lr: f64, model: M, grads: GradientsParams) -> M {
        self.step(lr, model, grads)
    }
}

/// Result of the ascent phase
pub struct SamPerturbation<M> {
    /// Weights at `w + e(w)`; run the second forward/backward pass on these
    pub perturbed: M,
    /// Weights before the ascent, restored by `second_step`
    pub original: M,
    /// Global gradient norm used to scale the perturbation
    pub grad_norm: f64,
}

/// SAM around any base optimizer
pub struct Sam<B: AutodiffBackend, M: AutodiffModule<B>> {
    base: Box<dyn GradientStep<B, M>>,
    rho: f64,
    adaptive: bool,
}

impl<B: AutodiffBackend, M: AutodiffModule<B>> Sam<B, M> {
    pub fn new(base: Box<dyn GradientStep<B, M>>, rho: f64, adaptive: bool) -> Self {
        Self {
            base,
            rho,
            adaptive,
        }
    }

    pub fn rho(&self) -> f64 {
        self.rho
    }

    pub fn adaptive(&self) -> bool {
        self.adaptive
    }

    /// Ascend to the sharpest nearby point.
    ///
    /// With `rho == 0` or an all-zero gradient the perturbed model is the
    /// original one, unchanged.
    pub fn first_step(&self, model: M, grads: &GradientsParams) -> SamPerturbation<M> {
        let grad_norm = grad_norm::<B, M>(&model, grads, self.adaptive);

        if self.rho == 0.0 || grad_norm == 0.0 || !grad_norm.is_finite() {
            return SamPerturbation {
                perturbed: model.clone(),
                original: model,
                grad_norm,
            };
        }

        let mut ascent = Ascent::<B> {
            grads,
            scale: self.rho / (grad_norm + NORM_EPSILON),
            adaptive: self.adaptive,
            _backend: PhantomData,
        };
        let perturbed = model.clone().map(&mut ascent);

        SamPerturbation {
            perturbed,
            original: model,
            grad_norm,
        }
    }

    /// Restore the original weights and take the base step with the
    /// gradients measured at the perturbed point
    pub fn second_step(&mut self, lr: f64, perturbation: SamPerturbation<M>, grads: GradientsParams) -> M {
        self.base.apply(lr, perturbation.original, grads)
    }
}

/// `||g||_2` over every parameter, or `||(|w| * g)||_2` when adaptive
pub fn grad_norm<B: AutodiffBackend, M: AutodiffModule<B>>(
    model: &M,
    grads: &GradientsParams,
    adaptive: bool,
) -> f64 {
    let mut visitor = NormVisitor::<B> {
        grads,
        adaptive,
        sum_sq: 0.0,
        _backend: PhantomData,
    };
    model.visit(&mut visitor);
    visitor.sum_sq.sqrt()
}

struct NormVisitor<'a, B: AutodiffBackend> {
    grads: &'a GradientsParams,
    adaptive: bool,
    sum_sq: f64,
    _backend: PhantomData<B>,
}

impl<B: AutodiffBackend> ModuleVisitor<B> for NormVisitor<'_, B> {
    fn visit_float<const D: usize>(&mut self, id: ParamId, tensor: &Tensor<B, D>) {
        let Some(grad) = self.grads.get::<B::InnerBackend, D>(id) else {
            return;
        };
        let grad = if self.adaptive {
            tensor.clone().inner().abs() * grad
        } else {
            grad
        };
        let sq: f64 = (grad.clone() * grad).sum().into_scalar().elem();
        self.sum_sq += sq;
    }
}

/// Adds `e(w) = scale * g` (times `w^2` when adaptive) to every parameter
/// that has a gradient, keeping its id and grad requirement
struct Ascent<'a, B: AutodiffBackend> {
    grads: &'a GradientsParams,
    scale: f64,
    adaptive: bool,
    _backend: PhantomData<B>,
}

impl<B: AutodiffBackend> ModuleMapper<B> for Ascent<'_, B> {
    fn map_float<const D: usize>(&mut self, id: ParamId, tensor: Tensor<B, D>) -> Tensor<B, D> {
        let Some(grad) = self.grads.get::<B::InnerBackend, D>(id) else {
            return tensor;
        };

        let is_require_grad = tensor.is_require_grad();
        let weights = tensor.inner();
        let e_w = if self.adaptive {
            weights.clone().powf_scalar(2.0) * grad
        } else {
            grad
        }
        .mul_scalar(self.scale);

        let mut perturbed = Tensor::from_inner(weights + e_w);
        if is_require_grad {
            perturbed = perturbed.require_grad();
        }
        perturbed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray};
    use burn::module::Module;
    use burn::nn::{Linear, LinearConfig};
    use burn::optim::SgdConfig;

    type TestBackend = Autodiff<NdArray<f32>>;

    #[derive(Module, Debug)]
    struct Probe<B: Backend> {
        linear: Linear<B>,
    }

    impl<B: Backend> Probe<B> {
        fn new(device: &B::Device) -> Self {
            Self {
                linear: LinearConfig::new(3, 2).init(device),
            }
        }

        fn loss(&self, x: Tensor<B, 2>) -> Tensor<B, 1> {
            let y = self.linear.forward(x);
            (y.clone() * y).sum()
        }
    }

    fn input() -> Tensor<TestBackend, 2> {
        Tensor::from_floats([[1.0, -2.0, 0.5], [0.3, 0.7, -1.1]], &Default::default())
    }

    fn grads_of(model: &Probe<TestBackend>) -> GradientsParams {
        let loss = model.loss(input());
        GradientsParams::from_grads(loss.backward(), model)
    }

    fn weights(model: &Probe<TestBackend>) -> Vec<f32> {
        model.linear.weight.val().into_data().iter::<f32>().collect()
    }

    fn sam(rho: f64, adaptive: bool) -> Sam<TestBackend, Probe<TestBackend>> {
        let base = SgdConfig::new().init::<TestBackend, Probe<TestBackend>>();
        Sam::new(Box::new(base), rho, adaptive)
    }

    #[test]
    fn test_rho_zero_leaves_weights_unchanged() {
        let model = Probe::<TestBackend>::new(&Default::default());
        let grads = grads_of(&model);

        let perturbation = sam(0.0, false).first_step(model.clone(), &grads);
        assert!(perturbation.grad_norm > 0.0);
        assert_eq!(weights(&perturbation.perturbed), weights(&model));
        assert_eq!(weights(&perturbation.original), weights(&model));
    }

    #[test]
    fn test_zero_gradient_leaves_weights_unchanged() {
        let model = Probe::<TestBackend>::new(&Default::default());
        let loss = model.loss(input()) * 0.0;
        let grads = GradientsParams::from_grads(loss.backward(), &model);

        let perturbation = sam(0.05, false).first_step(model.clone(), &grads);
        assert_eq!(perturbation.grad_norm, 0.0);
        assert_eq!(weights(&perturbation.perturbed), weights(&model));

        let bias = |m: &Probe<TestBackend>| -> Vec<f32> {
            m.linear.bias.as_ref().unwrap().val().into_data().iter::<f32>().collect()
        };
        assert_eq!(bias(&perturbation.perturbed), bias(&model));
    }

    #[test]
    fn test_perturbation_has_length_rho() {
        let model = Probe::<TestBackend>::new(&Default::default());
        let grads = grads_of(&model);
        let rho = 0.05;

        let p = sam(rho, false).first_step(model.clone(), &grads);

        let before: Vec<f32> = weights(&model)
            .into_iter()
            .chain(model.linear.bias.as_ref().unwrap().val().into_data().iter::<f32>())
            .collect();
        let after: Vec<f32> = weights(&p.perturbed)
            .into_iter()
            .chain(p.perturbed.linear.bias.as_ref().unwrap().val().into_data().iter::<f32>())
            .collect();

        let dist: f64 = before
            .iter()
            .zip(&after)
            .map(|(a, b)| ((b - a) as f64).powi(2))
            .sum::<f64>()
            .sqrt();
        assert!((dist - rho).abs() < 1e-4, "moved {}", dist);
    }

    #[test]
    fn test_second_step_is_base_step_on_perturbed_gradients() {
        let device = Default::default();
        let model = Probe::<TestBackend>::new(&device);
        let lr = 0.1;

        let mut optimizer = sam(0.05, false);
        let grads_a = grads_of(&model);
        let p = optimizer.first_step(model.clone(), &grads_a);
        let grads_b = grads_of(&p.perturbed);
        let reference_grads = grads_of(&p.perturbed);
        let updated = optimizer.second_step(lr, p, grads_b);

        let mut plain = SgdConfig::new().init::<TestBackend, Probe<TestBackend>>();
        let expected = plain.step(lr, model, reference_grads);

        for (a, b) in weights(&updated).iter().zip(weights(&expected)) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn test_adaptive_norm_weights_by_magnitude() {
        let model = Probe::<TestBackend>::new(&Default::default());
        let grads = grads_of(&model);

        let plain = grad_norm::<TestBackend, _>(&model, &grads, false);
        let adaptive = grad_norm::<TestBackend, _>(&model, &grads, true);
        assert!(plain > 0.0 && adaptive >= 0.0);
        assert_ne!(plain, adaptive);
    }
}
