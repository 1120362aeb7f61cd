//! Path-integrated gradients.
//!
//! Reference: Sundararajan et al., "Axiomatic Attribution for Deep Networks", ICML 2017.

use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::TensorData;
use image::RgbImage;
use saliency_core::{ExecutionContext, ImageClassifier, Preprocessor, Seed};
use serde::{Deserialize, Serialize};

use crate::attribution::{AttributionMethod, BaselineType, SaliencyMap, TargetPolicy};
use crate::error::{ExplainError, Result};
use crate::gradient::{backprop_class_score, fixed_target, GradientAccumulator};

/// Configuration for Integrated Gradients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegratedGradientsConfig {
    /// Number of points of the evenly spaced path, including the excluded
    /// baseline endpoint.
    pub n_steps: usize,
    /// Baseline type for the path integral.
    pub baseline: BaselineType,
    /// Which class score to backpropagate.
    pub target: TargetPolicy,
    /// Seed for [`BaselineType::Random`].
    pub seed: Seed,
}

impl Default for IntegratedGradientsConfig {
    fn default() -> Self {
        Self {
            n_steps: 25,
            baseline: BaselineType::Zeros,
            target: TargetPolicy::Recompute,
            seed: Seed::new(0),
        }
    }
}

impl IntegratedGradientsConfig {
    /// Set the number of steps.
    #[must_use]
    pub fn with_n_steps(mut self, n_steps: usize) -> Self {
        self.n_steps = n_steps;
        self
    }

    /// Set the baseline type.
    #[must_use]
    pub fn with_baseline(mut self, baseline: BaselineType) -> Self {
        self.baseline = baseline;
        self
    }

    /// Set the target policy.
    #[must_use]
    pub fn with_target(mut self, target: TargetPolicy) -> Self {
        self.target = target;
        self
    }

    /// Check that the parameters describe a valid computation.
    pub fn validate(&self) -> Result<()> {
        if self.n_steps < 2 {
            return Err(ExplainError::invalid(format!(
                "Integrated Gradients needs n_steps >= 2, got {}",
                self.n_steps
            )));
        }
        Ok(())
    }
}

/// Interpolation coefficients: `linspace(0, 1, n_steps)` without its first
/// point.
///
/// The baseline endpoint (alpha = 0) is dropped but the input endpoint
/// (alpha = 1) is kept, giving `n_steps - 1` values.
pub fn step_sizes(n_steps: usize) -> Vec<f32> {
    if n_steps < 2 {
        return Vec::new();
    }
    let denom = (n_steps - 1) as f32;
    (1..n_steps).map(|i| i as f32 / denom).collect()
}

/// Build the reference input the path starts from.
pub fn make_baseline<B: Backend>(
    baseline: BaselineType,
    input: &Tensor<B, 4>,
    seed: Seed,
    device: &B::Device,
) -> Tensor<B, 4> {
    let dims = input.dims();
    match baseline {
        BaselineType::Zeros => Tensor::zeros(dims, device),
        BaselineType::Random => {
            let numel = dims.iter().product::<usize>();
            let values = seed.derive("ig-baseline").normal_vec(numel, 1.0);
            Tensor::from_data(TensorData::new(values, dims), device)
        }
        BaselineType::Mean => {
            let [_, _, height, width] = dims;
            input
                .clone()
                .detach()
                .mean_dim(3)
                .mean_dim(2)
                .repeat_dim(2, height)
                .repeat_dim(3, width)
        }
    }
}

/// Compute an Integrated Gradients saliency map.
///
/// Gradients are taken with respect to the preprocessed input `X` itself
/// while the model is evaluated at `B + alpha * (X - B)` for every alpha in
/// [`step_sizes`]. The mean gradient is scaled by `X - B` and collapsed to a
/// map with the channel-wise maximum absolute value.
///
/// # Arguments
///
/// * `model` - Classifier on an autodiff backend
/// * `image` - Raw RGB image
/// * `preprocessor` - Resize / crop / normalize pipeline
/// * `config` - Step count, baseline and target policy
/// * `ctx` - Device to run on
///
/// # Errors
///
/// [`ExplainError::InvalidArgument`] when `n_steps < 2`.
pub fn integrated_gradients<B, M>(
    model: &M,
    image: &RgbImage,
    preprocessor: &Preprocessor,
    config: &IntegratedGradientsConfig,
    ctx: &ExecutionContext<B>,
) -> Result<SaliencyMap>
where
    B: AutodiffBackend,
    M: ImageClassifier<B> + ?Sized,
{
    config.validate()?;

    let input = preprocessor.preprocess::<B>(image, ctx.device())?.require_grad();
    let baseline = make_baseline(config.baseline, &input, config.seed, ctx.device());
    let target = fixed_target(model, &input, config.target)?;
    let alphas = step_sizes(config.n_steps);

    tracing::debug!(
        "Integrated Gradients: n_steps={}, baseline={:?}, target={:?}",
        config.n_steps,
        config.baseline,
        config.target
    );

    // The path is rebuilt from the leaf each step: a backward pass consumes
    // the intermediate nodes it traverses.
    let mut acc = GradientAccumulator::<B>::with_capacity(alphas.len());
    for alpha in alphas {
        let interpolated = baseline.clone() + (input.clone() - baseline.clone()) * alpha;
        let sample = backprop_class_score(model, interpolated, &input, target)?;
        tracing::trace!("Integrated Gradients alpha={:.3} -> class {}", alpha, sample.class);
        acc.push(sample);
    }

    let (mean, classes) = acc.mean()?;
    let [_, channels, height, width] = input.dims();
    let displacement = (input.inner() - baseline.inner()).reshape([channels, height, width]);

    SaliencyMap::from_channel_signal(
        displacement * mean,
        AttributionMethod::IntegratedGradients,
        classes,
    )
}
