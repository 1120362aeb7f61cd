//! Perturbation-based (segment masking) explanations.
//!
//! The explainer contract is [`PerturbationExplainer`]; [`LimeImageExplainer`]
//! is the bundled implementation. Explanations are consumed through
//! [`Explanation::segment_mask`].

mod explanation;
mod lime;
mod ridge;
mod segmentation;

pub use explanation::{mark_boundaries, Explanation, LocalModel, MaskOptions, SegmentMask};
pub use lime::{LimeConfig, LimeImageExplainer};
pub use ridge::{weighted_ridge, RidgeFit};
pub use segmentation::{GridSegmenter, Segmenter, SlicConfig, SlicSegmenter};

use image::RgbImage;
use ndarray::Array2;

use crate::error::Result;

/// Batch prediction function handed to a perturbation explainer.
///
/// Receives a batch of perturbed images (already resized and cropped) and
/// returns one probability row per image: shape (batch, n_classes).
pub type BatchPredictFn<'a> = dyn Fn(&[RgbImage]) -> Result<Array2<f32>> + 'a;

/// A model-agnostic explainer that perturbs image segments.
pub trait PerturbationExplainer {
    /// Explain the predictions of `predict` around `image`.
    ///
    /// # Arguments
    ///
    /// * `image` - Image exactly as the model sees it (post resize/crop)
    /// * `predict` - Batch prediction function
    /// * `num_samples` - Number of perturbed images to evaluate
    fn explain(
        &self,
        image: &RgbImage,
        predict: &BatchPredictFn<'_>,
        num_samples: usize,
    ) -> Result<Explanation>;
}

impl<E: PerturbationExplainer + ?Sized> PerturbationExplainer for &E {
    fn explain(
        &self,
        image: &RgbImage,
        predict: &BatchPredictFn<'_>,
        num_samples: usize,
    ) -> Result<Explanation> {
        (**self).explain(image, predict, num_samples)
    }
}
