//! LIME for images: segment masking with a weighted ridge surrogate.
//!
//! Reference: Ribeiro et al., "Why Should I Trust You?": Explaining the
//! Predictions of Any Classifier, KDD 2016.

use std::collections::BTreeMap;

use image::{Rgb, RgbImage};
use ndarray::{Array1, Array2, Axis};
use rand::Rng;
use saliency_core::Seed;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::explanation::{Explanation, LocalModel};
use super::ridge::weighted_ridge;
use super::segmentation::{Segmenter, SlicConfig, SlicSegmenter};
use super::{BatchPredictFn, PerturbationExplainer};
use crate::error::{ExplainError, Result};

/// Configuration for [`LimeImageExplainer`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimeConfig {
    /// Width of the exponential kernel over cosine distance.
    pub kernel_width: f32,
    /// Number of most probable classes to explain.
    pub top_labels: usize,
    /// Perturbed images per prediction call.
    pub batch_size: usize,
    /// L2 penalty of the surrogate.
    pub ridge_alpha: f32,
    /// Colour of hidden segments; `None` uses each segment's mean colour.
    pub hide_color: Option<[u8; 3]>,
    /// Default superpixel settings.
    pub slic: SlicConfig,
    /// Seed for the on/off sampling.
    pub seed: Seed,
}

impl Default for LimeConfig {
    fn default() -> Self {
        Self {
            kernel_width: 0.25,
            top_labels: 5,
            batch_size: 10,
            ridge_alpha: 1.0,
            hide_color: None,
            slic: SlicConfig::default(),
            seed: Seed::new(0),
        }
    }
}

impl LimeConfig {
    /// Set the sampling seed.
    #[must_use]
    pub fn with_seed(mut self, seed: impl Into<Seed>) -> Self {
        self.seed = seed.into();
        self
    }

    /// Set the number of explained classes.
    #[must_use]
    pub fn with_top_labels(mut self, top_labels: usize) -> Self {
        self.top_labels = top_labels;
        self
    }

    /// Set the colour used for hidden segments.
    #[must_use]
    pub fn with_hide_color(mut self, colour: [u8; 3]) -> Self {
        self.hide_color = Some(colour);
        self
    }

    fn validate(&self) -> Result<()> {
        if !(self.kernel_width > 0.0 && self.kernel_width.is_finite()) {
            return Err(ExplainError::invalid(format!(
                "kernel_width must be positive, got {}",
                self.kernel_width
            )));
        }
        if self.top_labels == 0 || self.batch_size == 0 {
            return Err(ExplainError::invalid("top_labels and batch_size must be >= 1"));
        }
        Ok(())
    }
}

/// Image explainer fitting one local linear model per top class.
pub struct LimeImageExplainer {
    config: LimeConfig,
    segmenter: Box<dyn Segmenter>,
}

impl Default for LimeImageExplainer {
    fn default() -> Self {
        Self::new(LimeConfig::default())
    }
}

impl std::fmt::Debug for LimeImageExplainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LimeImageExplainer")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl LimeImageExplainer {
    /// Create an explainer using SLIC superpixels from `config.slic`.
    pub fn new(config: LimeConfig) -> Self {
        let segmenter = Box::new(SlicSegmenter::new(config.slic.clone()));
        Self { config, segmenter }
    }

    /// Replace the segmentation algorithm.
    #[must_use]
    pub fn with_segmenter(mut self, segmenter: impl Segmenter + 'static) -> Self {
        self.segmenter = Box::new(segmenter);
        self
    }

    /// The configuration.
    pub fn config(&self) -> &LimeConfig {
        &self.config
    }

    /// Image where every segment is replaced by its hide colour.
    fn fudged_image(&self, image: &RgbImage, segments: &Array2<usize>, n_segments: usize) -> RgbImage {
        let colours: Vec<Rgb<u8>> = match self.config.hide_color {
            Some(colour) => vec![Rgb(colour); n_segments],
            None => {
                let mut sums = vec![[0u64; 3]; n_segments];
                let mut counts = vec![0u64; n_segments];
                for ((y, x), &s) in segments.indexed_iter() {
                    let p = image.get_pixel(x as u32, y as u32);
                    for c in 0..3 {
                        sums[s][c] += u64::from(p[c]);
                    }
                    counts[s] += 1;
                }
                sums.iter()
                    .zip(&counts)
                    .map(|(sum, &n)| {
                        let n = n.max(1) as f64;
                        Rgb([0, 1, 2].map(|c| (sum[c] as f64 / n).round() as u8))
                    })
                    .collect()
            }
        };

        let (width, height) = image.dimensions();
        RgbImage::from_fn(width, height, |x, y| colours[segments[[y as usize, x as usize]]])
    }

    /// Random on/off segment matrix; the first row keeps every segment.
    fn sample_rows(&self, num_samples: usize, n_segments: usize) -> Array2<f32> {
        let mut rng = self.config.seed.derive("lime-samples").to_rng();
        let mut data = Array2::from_shape_fn((num_samples, n_segments), |_| {
            if rng.gen_bool(0.5) {
                1.0
            } else {
                0.0
            }
        });
        data.row_mut(0).fill(1.0);
        data
    }

    fn perturbed_image(
        image: &RgbImage,
        fudged: &RgbImage,
        segments: &Array2<usize>,
        row: ndarray::ArrayView1<'_, f32>,
    ) -> RgbImage {
        let (width, height) = image.dimensions();
        RgbImage::from_fn(width, height, |x, y| {
            let s = segments[[y as usize, x as usize]];
            if row[s] > 0.0 {
                *image.get_pixel(x, y)
            } else {
                *fudged.get_pixel(x, y)
            }
        })
    }

    fn predict_all(
        &self,
        image: &RgbImage,
        fudged: &RgbImage,
        segments: &Array2<usize>,
        data: &Array2<f32>,
        predict: &BatchPredictFn<'_>,
    ) -> Result<Array2<f32>> {
        let mut rows: Vec<Array1<f32>> = Vec::with_capacity(data.nrows());
        let mut n_classes = None;

        for (batch_idx, chunk) in data.axis_chunks_iter(Axis(0), self.config.batch_size).enumerate() {
            let images: Vec<RgbImage> = chunk
                .axis_iter(Axis(0))
                .map(|row| Self::perturbed_image(image, fudged, segments, row))
                .collect();

            let probs = predict(&images)?;
            if probs.nrows() != images.len() {
                return Err(ExplainError::upstream(format!(
                    "predictor returned {} rows for a batch of {} images",
                    probs.nrows(),
                    images.len()
                )));
            }
            match n_classes {
                None if probs.ncols() == 0 => {
                    return Err(ExplainError::upstream("predictor returned no classes"));
                }
                None => n_classes = Some(probs.ncols()),
                Some(n) if n != probs.ncols() => {
                    return Err(ExplainError::upstream(format!(
                        "predictor changed its class count from {} to {}",
                        n,
                        probs.ncols()
                    )));
                }
                Some(_) => {}
            }
            debug!(batch = batch_idx, size = images.len(), "predicted perturbation batch");
            rows.extend(probs.axis_iter(Axis(0)).map(|r| r.to_owned()));
        }

        let n_classes = n_classes.unwrap_or(0);
        let flat: Vec<f32> = rows.iter().flat_map(|r| r.iter().copied()).collect();
        Array2::from_shape_vec((rows.len(), n_classes), flat)
            .map_err(|e| ExplainError::upstream(e.to_string()))
    }
}

/// Kernel weight of each sample from its cosine distance to the all-on row.
fn sample_weights(data: &Array2<f32>, kernel_width: f32) -> Array1<f32> {
    let n = data.ncols() as f32;
    data.axis_iter(Axis(0))
        .map(|row| {
            let active = row.sum();
            let distance = if active > 0.0 { 1.0 - (active / n).sqrt() } else { 1.0 };
            (-(distance * distance) / (kernel_width * kernel_width)).exp().sqrt()
        })
        .collect()
}

/// Class indices ordered by decreasing score; ties keep index order.
fn ranked_labels(scores: ndarray::ArrayView1<'_, f32>, k: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));
    order.truncate(k);
    order
}

impl PerturbationExplainer for LimeImageExplainer {
    fn explain(
        &self,
        image: &RgbImage,
        predict: &BatchPredictFn<'_>,
        num_samples: usize,
    ) -> Result<Explanation> {
        self.config.validate()?;
        if num_samples == 0 {
            return Err(ExplainError::invalid("num_samples must be >= 1"));
        }
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(ExplainError::upstream(format!(
                "cannot segment a {}x{} image",
                width, height
            )));
        }

        let segments = self.segmenter.segment(image);
        if segments.dim() != (height as usize, width as usize) {
            return Err(ExplainError::upstream(format!(
                "segmentation has shape {:?}, expected ({}, {})",
                segments.dim(),
                height,
                width
            )));
        }
        let n_segments = segments.iter().copied().max().map_or(0, |m| m + 1);
        if n_segments == 0 {
            return Err(ExplainError::upstream("segmentation produced no segments"));
        }
        debug!(n_segments, num_samples, "segmented image");

        let fudged = self.fudged_image(image, &segments, n_segments);
        let data = self.sample_rows(num_samples, n_segments);
        let labels = self.predict_all(image, &fudged, &segments, &data, predict)?;
        let weights = sample_weights(&data, self.config.kernel_width);

        let top_labels = ranked_labels(labels.row(0), self.config.top_labels);
        let mut local = BTreeMap::new();
        for &label in &top_labels {
            let target = labels.column(label);
            let fit = weighted_ridge(data.view(), target, weights.view(), self.config.ridge_alpha)?;
            let score = fit.score(data.view(), target, weights.view());
            let local_pred = fit.predict_row(data.row(0));

            let mut ranked: Vec<(usize, f32)> = fit.coefficients.iter().copied().enumerate().collect();
            ranked.sort_by(|a, b| b.1.abs().total_cmp(&a.1.abs()));

            debug!(label, intercept = fit.intercept, score, local_pred, "fitted local model");
            local.insert(
                label,
                LocalModel {
                    weights: ranked,
                    intercept: fit.intercept,
                    score,
                    local_pred,
                },
            );
        }

        info!(
            n_segments,
            num_samples,
            top_label = top_labels.first().copied(),
            "LIME explanation complete"
        );
        Explanation::new(image.clone(), segments, top_labels, local)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::perturbation::GridSegmenter;
    use std::cell::Cell;

    fn red_left_image() -> RgbImage {
        RgbImage::from_fn(8, 8, |x, _| if x < 4 { Rgb([255, 0, 0]) } else { Rgb([0, 0, 255]) })
    }

    /// Class 0 probability is the fraction of red pixels in the left half.
    fn redness(images: &[RgbImage]) -> Result<Array2<f32>> {
        let mut out = Array2::zeros((images.len(), 2));
        for (i, img) in images.iter().enumerate() {
            let red = img
                .enumerate_pixels()
                .filter(|(x, _, p)| *x < 4 && p[0] == 255 && p[2] == 0)
                .count() as f32
                / 32.0;
            out[[i, 0]] = red;
            out[[i, 1]] = 1.0 - red;
        }
        Ok(out)
    }

    fn explainer() -> LimeImageExplainer {
        LimeImageExplainer::new(LimeConfig::default().with_hide_color([0, 0, 0]))
            .with_segmenter(GridSegmenter::new(4))
    }

    #[test]
    fn test_left_segments_drive_red_class() {
        let explanation = explainer().explain(&red_left_image(), &redness, 200).unwrap();

        assert_eq!(explanation.n_segments(), 4);
        assert_eq!(explanation.top_labels(), &[0, 1]);

        let model = explanation.local_model(0).unwrap();
        let top_two: Vec<usize> = model.weights.iter().take(2).map(|&(s, _)| s).collect();
        // grid cells 0 and 2 form the left half
        assert!(top_two.contains(&0) && top_two.contains(&2));
        assert!(model.weights[0].1 > 0.0);
        assert!(model.score > 0.9);
        assert!((model.local_pred - 1.0).abs() < 0.1);
    }

    #[test]
    fn test_batches_of_ten() {
        let calls = Cell::new(0usize);
        let predict = |images: &[RgbImage]| {
            calls.set(calls.get() + 1);
            assert!(images.len() <= 10);
            redness(images)
        };
        explainer().explain(&red_left_image(), &predict, 25).unwrap();
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn test_seeded_sampling_is_reproducible() {
        let a = explainer().explain(&red_left_image(), &redness, 50).unwrap();
        let b = explainer().explain(&red_left_image(), &redness, 50).unwrap();
        assert_eq!(a.local_model(0), b.local_model(0));
    }

    #[test]
    fn test_wrong_row_count_is_upstream_failure() {
        let predict = |_: &[RgbImage]| Ok::<_, ExplainError>(Array2::<f32>::zeros((1, 2)));
        let result = explainer().explain(&red_left_image(), &predict, 20);
        assert!(matches!(result, Err(ExplainError::UpstreamFailure(_))));
    }

    #[test]
    fn test_empty_image_is_upstream_failure() {
        let result = explainer().explain(&RgbImage::new(0, 0), &redness, 20);
        assert!(matches!(result, Err(ExplainError::UpstreamFailure(_))));
    }

    #[test]
    fn test_zero_samples_is_invalid() {
        let result = explainer().explain(&red_left_image(), &redness, 0);
        assert!(matches!(result, Err(ExplainError::InvalidArgument(_))));
    }

    #[test]
    fn test_kernel_weights() {
        let data = ndarray::array![[1.0f32, 1.0, 1.0, 1.0], [1.0, 0.0, 0.0, 0.0], [0.0, 0.0, 0.0, 0.0]];
        let w = sample_weights(&data, 0.25);
        assert!((w[0] - 1.0).abs() < 1e-6);
        // d = 1 - sqrt(1/4) = 0.5
        let expected = (-(0.25f32) / 0.0625).exp().sqrt();
        assert!((w[1] - expected).abs() < 1e-6);
        assert!(w[2] < w[1]);
    }

    #[test]
    fn test_mean_colour_fudging() {
        let image = RgbImage::from_fn(4, 2, |x, _| Rgb([(x * 40) as u8, 0, 0]));
        let explainer = LimeImageExplainer::default().with_segmenter(GridSegmenter::new(2));
        let segments = explainer.segmenter.segment(&image);
        let fudged = explainer.fudged_image(&image, &segments, 2);
        // left cell: red 0 and 40 -> 20; right cell: 80 and 120 -> 100
        assert_eq!(fudged.get_pixel(0, 0), &Rgb([20, 0, 0]));
        assert_eq!(fudged.get_pixel(3, 1), &Rgb([100, 0, 0]));
    }
}
