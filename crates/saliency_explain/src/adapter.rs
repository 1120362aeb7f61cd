//! Adapts an [`ImageClassifier`] to the batch-prediction interface of a
//! [`PerturbationExplainer`].

use burn::prelude::*;
use image::RgbImage;
use ndarray::Array2;
use saliency_core::{ExecutionContext, ExecutionMode, ImageClassifier, Preprocessor};
use serde::{Deserialize, Serialize};

use crate::attribution::tensor_to_array2;
use crate::error::{ExplainError, Result};
use crate::perturbation::{Explanation, PerturbationExplainer};

/// Settings for [`explain_with_perturbation`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerturbationConfig {
    /// Number of perturbed images the explainer may evaluate.
    pub num_samples: usize,
}

impl Default for PerturbationConfig {
    fn default() -> Self {
        Self { num_samples: 100 }
    }
}

impl PerturbationConfig {
    /// Set the sample budget.
    #[must_use]
    pub fn with_num_samples(mut self, num_samples: usize) -> Self {
        self.num_samples = num_samples;
        self
    }
}

/// Class probabilities for a batch of already cropped images.
///
/// Only normalization is applied; the model runs in inference mode.
pub fn batch_predict<B, M>(
    model: &M,
    images: &[RgbImage],
    preprocessor: &Preprocessor,
    ctx: &ExecutionContext<B>,
) -> Result<Array2<f32>>
where
    B: Backend,
    M: ImageClassifier<B> + ?Sized,
{
    let batch = preprocessor.to_batch::<B>(images, ctx.device())?;
    let probs = model.forward_probs(batch, ExecutionMode::Inference);
    let probs = tensor_to_array2(probs)?;
    if probs.nrows() != images.len() {
        return Err(ExplainError::ModelOutput {
            expected: format!("{} rows", images.len()),
            got: format!("{} rows", probs.nrows()),
        });
    }
    Ok(probs)
}

/// Explain `model` on `image` with a perturbation explainer.
///
/// The image is resized and cropped once so the explainer segments exactly
/// the view the model sees. The explanation and any explainer error are
/// returned unchanged.
pub fn explain_with_perturbation<B, M, E>(
    model: &M,
    image: &RgbImage,
    preprocessor: &Preprocessor,
    explainer: &E,
    config: &PerturbationConfig,
    ctx: &ExecutionContext<B>,
) -> Result<Explanation>
where
    B: Backend,
    M: ImageClassifier<B> + ?Sized,
    E: PerturbationExplainer + ?Sized,
{
    let cropped = preprocessor.resize_and_crop(image)?;
    let predict = |images: &[RgbImage]| batch_predict(model, images, preprocessor, ctx);

    tracing::debug!(
        "Perturbation explanation: {}x{} view, {} samples",
        cropped.width(),
        cropped.height(),
        config.num_samples
    );
    explainer.explain(&cropped, &predict, config.num_samples)
}
