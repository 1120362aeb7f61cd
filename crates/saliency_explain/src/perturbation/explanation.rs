//! Explanation object returned by perturbation explainers.

use std::collections::BTreeMap;

use image::{Rgb, RgbImage};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::error::{ExplainError, Result};

/// Local linear surrogate fitted for one class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalModel {
    /// `(segment, weight)` pairs sorted by decreasing |weight|.
    pub weights: Vec<(usize, f32)>,
    /// Surrogate intercept.
    pub intercept: f32,
    /// Weighted R² of the surrogate on the perturbation samples.
    pub score: f32,
    /// Surrogate prediction for the unperturbed image.
    pub local_pred: f32,
}

/// Options for [`Explanation::segment_mask`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaskOptions {
    /// Keep only segments that push towards the class.
    pub positive_only: bool,
    /// Keep only segments that push away from the class.
    pub negative_only: bool,
    /// Maximum number of segments to keep.
    pub num_segments: usize,
    /// Black out everything outside the kept segments.
    pub hide_background: bool,
    /// Ignore segments whose |weight| is below this.
    pub min_weight: f32,
}

impl Default for MaskOptions {
    fn default() -> Self {
        Self {
            positive_only: true,
            negative_only: false,
            num_segments: 5,
            hide_background: false,
            min_weight: 0.0,
        }
    }
}

impl MaskOptions {
    /// Set the number of segments to keep.
    #[must_use]
    pub fn with_num_segments(mut self, num_segments: usize) -> Self {
        self.num_segments = num_segments;
        self
    }

    /// Keep segments of both signs; the mask then holds -1 / +1.
    #[must_use]
    pub fn signed(mut self) -> Self {
        self.positive_only = false;
        self.negative_only = false;
        self
    }

    /// Set whether to hide everything outside the selected segments.
    #[must_use]
    pub fn with_hide_background(mut self, hide: bool) -> Self {
        self.hide_background = hide;
        self
    }
}

/// Per-pixel segment selection: 1 for kept positive segments, -1 for kept
/// negative segments (signed mode only), 0 elsewhere.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentMask {
    values: Array2<i8>,
}

impl SegmentMask {
    /// Raw signed mask of shape (height, width).
    pub fn values(&self) -> &Array2<i8> {
        &self.values
    }

    /// Boolean view: true wherever a segment was kept.
    pub fn as_bool(&self) -> Array2<bool> {
        self.values.mapv(|v| v != 0)
    }

    /// Shape as (height, width).
    pub fn dims(&self) -> (usize, usize) {
        self.values.dim()
    }

    /// Number of selected pixels.
    pub fn count(&self) -> usize {
        self.values.iter().filter(|&&v| v != 0).count()
    }
}

/// Result of a perturbation explanation.
#[derive(Debug, Clone)]
pub struct Explanation {
    image: RgbImage,
    segments: Array2<usize>,
    n_segments: usize,
    top_labels: Vec<usize>,
    local: BTreeMap<usize, LocalModel>,
}

impl Explanation {
    /// Assemble an explanation.
    ///
    /// `segments` must match the image's (height, width) and `top_labels`
    /// must all have a fitted local model.
    pub fn new(
        image: RgbImage,
        segments: Array2<usize>,
        top_labels: Vec<usize>,
        local: BTreeMap<usize, LocalModel>,
    ) -> Result<Self> {
        let (w, h) = image.dimensions();
        if segments.dim() != (h as usize, w as usize) {
            return Err(ExplainError::invalid(format!(
                "segmentation is {:?} but the image is {}x{}",
                segments.dim(),
                h,
                w
            )));
        }
        if let Some(missing) = top_labels.iter().find(|l| !local.contains_key(l)) {
            return Err(ExplainError::invalid(format!(
                "top label {} has no local model",
                missing
            )));
        }
        let n_segments = segments.iter().copied().max().map_or(0, |m| m + 1);

        Ok(Self {
            image,
            segments,
            n_segments,
            top_labels,
            local,
        })
    }

    /// The explained image.
    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    /// Per-pixel segment ids.
    pub fn segments(&self) -> &Array2<usize> {
        &self.segments
    }

    /// Number of segments.
    pub fn n_segments(&self) -> usize {
        self.n_segments
    }

    /// Explained classes, most probable first.
    pub fn top_labels(&self) -> &[usize] {
        &self.top_labels
    }

    /// Local model for `class`, if it was explained.
    pub fn local_model(&self, class: usize) -> Option<&LocalModel> {
        self.local.get(&class)
    }

    /// Pixels of the top-weighted segments for `class`.
    ///
    /// Returns the annotated image and the mask. With `positive_only` or
    /// `negative_only` the annotated image is the original restricted to the
    /// kept segments when `hide_background` is set. In signed mode every kept
    /// segment additionally has its green (positive) or red (negative)
    /// channel raised to the image maximum.
    pub fn segment_mask(&self, class: usize, options: &MaskOptions) -> Result<(RgbImage, SegmentMask)> {
        let local = self.local.get(&class).ok_or_else(|| {
            ExplainError::invalid(format!("class {} was not explained", class))
        })?;
        if options.positive_only && options.negative_only {
            return Err(ExplainError::invalid(
                "positive_only and negative_only are mutually exclusive",
            ));
        }

        let (width, height) = self.image.dimensions();
        let mut annotated = if options.hide_background {
            RgbImage::new(width, height)
        } else {
            self.image.clone()
        };
        let mut mask = Array2::<i8>::zeros((height as usize, width as usize));

        let selected: Vec<(usize, f32)> = if options.positive_only {
            local
                .weights
                .iter()
                .copied()
                .filter(|&(_, w)| w > 0.0 && w > options.min_weight)
                .take(options.num_segments)
                .collect()
        } else if options.negative_only {
            local
                .weights
                .iter()
                .copied()
                .filter(|&(_, w)| w < 0.0 && w.abs() > options.min_weight)
                .take(options.num_segments)
                .collect()
        } else {
            local
                .weights
                .iter()
                .copied()
                .take(options.num_segments)
                .filter(|&(_, w)| w.abs() > options.min_weight)
                .collect()
        };

        let signed = !(options.positive_only || options.negative_only);
        let highlight = self.image.pixels().flat_map(|p| p.0).max().unwrap_or(0);

        for (segment, weight) in selected {
            let sign: i8 = if signed && weight < 0.0 { -1 } else { 1 };
            for ((y, x), _) in self.segments.indexed_iter().filter(|(_, &s)| s == segment) {
                mask[[y, x]] = sign;
                let mut pixel = *self.image.get_pixel(x as u32, y as u32);
                if signed {
                    let channel = if weight < 0.0 { 0 } else { 1 };
                    pixel[channel] = highlight;
                }
                annotated.put_pixel(x as u32, y as u32, pixel);
            }
        }

        Ok((annotated, SegmentMask { values: mask }))
    }
}

/// Colour the boundaries between regions of `labels` on a copy of `image`.
///
/// A pixel is a boundary pixel when any of its 4-neighbours has a different
/// label.
pub fn mark_boundaries<T: PartialEq>(
    image: &RgbImage,
    labels: &Array2<T>,
    colour: Rgb<u8>,
) -> Result<RgbImage> {
    let (w, h) = image.dimensions();
    let (height, width) = labels.dim();
    if (height, width) != (h as usize, w as usize) {
        return Err(ExplainError::invalid(format!(
            "labels are {}x{} but the image is {}x{}",
            height, width, h, w
        )));
    }

    let mut out = image.clone();
    for y in 0..height {
        for x in 0..width {
            let here = &labels[[y, x]];
            let boundary = (x > 0 && labels[[y, x - 1]] != *here)
                || (x + 1 < width && labels[[y, x + 1]] != *here)
                || (y > 0 && labels[[y - 1, x]] != *here)
                || (y + 1 < height && labels[[y + 1, x]] != *here);
            if boundary {
                out.put_pixel(x as u32, y as u32, colour);
            }
        }
    }
    Ok(out)
}
