//! Noisy-gradient averaging (SmoothGrad).
//!
//! Reference: Smilkov et al., "SmoothGrad: removing noise by adding noise", 2017.

use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::TensorData;
use image::RgbImage;
use saliency_core::{ExecutionContext, ImageClassifier, Preprocessor, Seed};
use serde::{Deserialize, Serialize};

use crate::attribution::{AttributionMethod, SaliencyMap, TargetPolicy};
use crate::error::{ExplainError, Result};
use crate::gradient::{backprop_class_score, fixed_target, GradientAccumulator};

/// Configuration for SmoothGrad.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmoothGradConfig {
    /// Standard deviation of the Gaussian noise added to the input.
    pub sigma: f32,
    /// Number of noisy samples averaged.
    pub n_samples: usize,
    /// Which class score to backpropagate.
    pub target: TargetPolicy,
    /// Seed for the noise stream.
    pub seed: Seed,
}

impl Default for SmoothGradConfig {
    fn default() -> Self {
        Self {
            sigma: 0.10,
            n_samples: 25,
            target: TargetPolicy::Recompute,
            seed: Seed::new(0),
        }
    }
}

impl SmoothGradConfig {
    /// Set the noise level.
    #[must_use]
    pub fn with_sigma(mut self, sigma: f32) -> Self {
        self.sigma = sigma;
        self
    }

    /// Set the number of samples.
    #[must_use]
    pub fn with_n_samples(mut self, n_samples: usize) -> Self {
        self.n_samples = n_samples;
        self
    }

    /// Set the target policy.
    #[must_use]
    pub fn with_target(mut self, target: TargetPolicy) -> Self {
        self.target = target;
        self
    }

    /// Set the noise seed.
    #[must_use]
    pub fn with_seed(mut self, seed: Seed) -> Self {
        self.seed = seed;
        self
    }

    /// Check that the parameters describe a valid computation.
    pub fn validate(&self) -> Result<()> {
        if self.n_samples == 0 {
            return Err(ExplainError::invalid("SmoothGrad needs at least one sample"));
        }
        if !self.sigma.is_finite() || self.sigma < 0.0 {
            return Err(ExplainError::invalid(format!(
                "SmoothGrad sigma must be finite and non-negative, got {}",
                self.sigma
            )));
        }
        Ok(())
    }
}

/// Compute a SmoothGrad saliency map.
///
/// The image is preprocessed once. For each of `n_samples` draws, Gaussian
/// noise with standard deviation `sigma` is added, the target class score is
/// backpropagated to the noisy input, and the gradient is recorded. The map
/// is the channel-wise maximum of the absolute mean gradient.
///
/// # Arguments
///
/// * `model` - Classifier on an autodiff backend
/// * `image` - Raw RGB image
/// * `preprocessor` - Resize / crop / normalize pipeline
/// * `config` - Noise level, sample count, target policy and seed
/// * `ctx` - Device to run on
///
/// # Returns
///
/// Map of shape (crop height, crop width), all values non-negative.
///
/// # Errors
///
/// [`ExplainError::InvalidArgument`] for `n_samples == 0` or a negative
/// `sigma`; any failing backward pass aborts the whole computation.
///
/// # Example
///
/// ```rust,ignore
/// let config = SmoothGradConfig::default().with_seed(Seed::new(42));
/// let map = smooth_grad(&model, &image, &Preprocessor::default(), &config, &ctx)?;
/// assert_eq!(map.dims(), (224, 224));
/// ```
pub fn smooth_grad<B, M>(
    model: &M,
    image: &RgbImage,
    preprocessor: &Preprocessor,
    config: &SmoothGradConfig,
    ctx: &ExecutionContext<B>,
) -> Result<SaliencyMap>
where
    B: AutodiffBackend,
    M: ImageClassifier<B> + ?Sized,
{
    config.validate()?;

    let input = preprocessor.preprocess::<B>(image, ctx.device())?;
    let dims = input.dims();
    let numel = dims.iter().product::<usize>();
    let target = fixed_target(model, &input, config.target)?;

    tracing::debug!(
        "SmoothGrad: sigma={}, n_samples={}, target={:?}",
        config.sigma,
        config.n_samples,
        config.target
    );

    let mut acc = GradientAccumulator::<B>::with_capacity(config.n_samples);
    for i in 0..config.n_samples {
        let noise = config
            .seed
            .derive(&format!("smoothgrad-{}", i))
            .normal_vec(numel, config.sigma);
        let noise = Tensor::<B, 4>::from_data(TensorData::new(noise, dims), ctx.device());

        let noisy = (input.clone() + noise).detach().require_grad();
        let sample = backprop_class_score(model, noisy.clone(), &noisy, target)?;
        tracing::trace!("SmoothGrad sample {} -> class {}", i, sample.class);
        acc.push(sample);
    }

    let (mean, classes) = acc.mean()?;
    SaliencyMap::from_channel_signal(mean, AttributionMethod::SmoothGrad, classes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{LinearScorer, SquareModel};
    use burn_autodiff::Autodiff;
    use burn_ndarray::NdArray;
    use image::Rgb;
    use saliency_core::{ExecutionMode, PreprocessConfig};

    type TestBackend = Autodiff<NdArray>;

    fn small_preprocessor() -> Preprocessor {
        Preprocessor::new(PreprocessConfig::default().with_sizes(16, 12)).unwrap()
    }

    fn test_image() -> RgbImage {
        RgbImage::from_fn(20, 20, |x, y| Rgb([(x * 12) as u8, (y * 12) as u8, ((x + y) * 6) as u8]))
    }

    #[test]
    fn test_default_shape_and_non_negative() {
        let ctx = ExecutionContext::<TestBackend>::default();
        let config = SmoothGradConfig::default().with_n_samples(2);

        let map = smooth_grad(&SquareModel, &test_image(), &Preprocessor::default(), &config, &ctx)
            .unwrap();

        assert_eq!(map.dims(), (224, 224));
        assert!(map.values().iter().all(|&v| v >= 0.0));
        assert_eq!(map.n_samples(), 2);
        assert_eq!(map.method(), AttributionMethod::SmoothGrad);
    }

    #[test]
    fn test_zero_sigma_matches_linear_weights() {
        let ctx = ExecutionContext::<TestBackend>::default();
        let scorer = LinearScorer::<TestBackend>::new(12, 12, 3, ctx.device());
        let preprocessor = small_preprocessor();
        let image = test_image();

        let input = preprocessor.preprocess::<TestBackend>(&image, ctx.device()).unwrap();
        let scores: Vec<f32> = scorer
            .forward(input, ExecutionMode::Inference)
            .into_data()
            .to_vec()
            .unwrap();
        let class = scores
            .iter()
            .enumerate()
            .fold((0, f32::NEG_INFINITY), |(bi, bv), (i, &v)| if v > bv { (i, v) } else { (bi, bv) })
            .0;
        let weights = scorer.weights_for(class);

        let config = SmoothGradConfig::default().with_sigma(0.0).with_n_samples(3);
        let map = smooth_grad(&scorer, &image, &preprocessor, &config, &ctx).unwrap();

        assert_eq!(map.target_classes(), &[class, class, class]);
        for h in 0..12 {
            for w in 0..12 {
                let expected = (0..3)
                    .map(|c| weights[c * 144 + h * 12 + w].abs())
                    .fold(0.0f32, f32::max);
                assert!((map.values()[[h, w]] - expected).abs() < 1e-5);
            }
        }
    }

    #[test]
    fn test_zero_sigma_is_deterministic() {
        let ctx = ExecutionContext::<TestBackend>::default();
        let config = SmoothGradConfig::default().with_sigma(0.0).with_n_samples(4);
        let preprocessor = small_preprocessor();

        let a = smooth_grad(&SquareModel, &test_image(), &preprocessor, &config, &ctx).unwrap();
        let b = smooth_grad(
            &SquareModel,
            &test_image(),
            &preprocessor,
            &config.clone().with_seed(Seed::new(99)),
            &ctx,
        )
        .unwrap();

        assert_eq!(a.values(), b.values());
    }

    #[test]
    fn test_seed_reproducibility() {
        let ctx = ExecutionContext::<TestBackend>::default();
        let preprocessor = small_preprocessor();
        let config = SmoothGradConfig::default()
            .with_n_samples(3)
            .with_seed(Seed::new(7));

        let a = smooth_grad(&SquareModel, &test_image(), &preprocessor, &config, &ctx).unwrap();
        let b = smooth_grad(&SquareModel, &test_image(), &preprocessor, &config, &ctx).unwrap();
        let c = smooth_grad(
            &SquareModel,
            &test_image(),
            &preprocessor,
            &config.clone().with_seed(Seed::new(8)),
            &ctx,
        )
        .unwrap();

        assert_eq!(a.values(), b.values());
        assert_ne!(a.values(), c.values());
    }

    #[test]
    fn test_parameters_unchanged() {
        let ctx = ExecutionContext::<TestBackend>::default();
        let scorer = LinearScorer::<TestBackend>::new(12, 12, 3, ctx.device());
        let before: Vec<f32> = scorer.linear.weight.val().into_data().to_vec().unwrap();

        let config = SmoothGradConfig::default().with_n_samples(5);
        smooth_grad(&scorer, &test_image(), &small_preprocessor(), &config, &ctx).unwrap();

        let after: Vec<f32> = scorer.linear.weight.val().into_data().to_vec().unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn test_invalid_config() {
        let ctx = ExecutionContext::<TestBackend>::default();
        let preprocessor = small_preprocessor();

        for config in [
            SmoothGradConfig::default().with_n_samples(0),
            SmoothGradConfig::default().with_sigma(-0.1),
            SmoothGradConfig::default().with_sigma(f32::NAN),
        ] {
            let result = smooth_grad(&SquareModel, &test_image(), &preprocessor, &config, &ctx);
            assert!(matches!(result, Err(ExplainError::InvalidArgument(_))));
        }
    }

    #[test]
    fn test_config_serde() {
        let config = SmoothGradConfig::default().with_target(TargetPolicy::Class(3));
        let json = serde_json::to_string(&config).unwrap();
        let back: SmoothGradConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, back);
    }
}
