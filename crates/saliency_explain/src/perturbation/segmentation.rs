//! Superpixel segmentation.

use std::collections::VecDeque;

use image::RgbImage;
use ndarray::Array2;
use palette::{FromColor, Lab, LinSrgb, Srgb};
use serde::{Deserialize, Serialize};

/// Splits an image into labelled segments.
///
/// Returned labels have shape (height, width) and are consecutive integers
/// starting from zero.
pub trait Segmenter: Send + Sync {
    /// Segment the image.
    fn segment(&self, image: &RgbImage) -> Array2<usize>;
}

/// Fixed square grid; each cell is one segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridSegmenter {
    /// Cell edge length in pixels.
    pub cell: u32,
}

impl GridSegmenter {
    /// Create a grid segmenter with `cell`-pixel cells (minimum 1).
    #[must_use]
    pub fn new(cell: u32) -> Self {
        Self { cell: cell.max(1) }
    }
}

impl Segmenter for GridSegmenter {
    fn segment(&self, image: &RgbImage) -> Array2<usize> {
        let (width, height) = image.dimensions();
        let cell = self.cell.max(1) as usize;
        let cols = (width as usize).div_ceil(cell);
        Array2::from_shape_fn((height as usize, width as usize), |(y, x)| {
            (y / cell) * cols + x / cell
        })
    }
}

/// Configuration for SLIC superpixels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlicConfig {
    /// Approximate number of segments.
    pub n_segments: usize,
    /// Balance between colour and spatial proximity; higher is more square.
    pub compactness: f32,
    /// Number of k-means iterations.
    pub max_iter: usize,
    /// Components smaller than this fraction of the expected segment area
    /// are merged into a neighbour.
    pub min_size_factor: f32,
}

impl Default for SlicConfig {
    fn default() -> Self {
        Self {
            n_segments: 50,
            compactness: 10.0,
            max_iter: 10,
            min_size_factor: 0.25,
        }
    }
}

/// Simple Linear Iterative Clustering in CIELAB space.
///
/// Reference: Achanta et al., "SLIC Superpixels Compared to State-of-the-art
/// Superpixel Methods", TPAMI 2012.
#[derive(Debug, Clone, Default)]
pub struct SlicSegmenter {
    config: SlicConfig,
}

impl SlicSegmenter {
    /// Create from config.
    #[must_use]
    pub fn new(config: SlicConfig) -> Self {
        Self { config }
    }
}

#[derive(Debug, Clone, Copy)]
struct Center {
    lab: [f32; 3],
    x: f32,
    y: f32,
}

impl Segmenter for SlicSegmenter {
    fn segment(&self, image: &RgbImage) -> Array2<usize> {
        let (w, h) = image.dimensions();
        let (width, height) = (w as usize, h as usize);
        if width == 0 || height == 0 {
            return Array2::zeros((height, width));
        }

        let lab: Vec<[f32; 3]> = image
            .pixels()
            .map(|p| {
                let srgb: Srgb<f32> = Srgb::new(
                    f32::from(p[0]) / 255.0,
                    f32::from(p[1]) / 255.0,
                    f32::from(p[2]) / 255.0,
                );
                let lin: LinSrgb<f32> = srgb.into_linear();
                let c: Lab = Lab::from_color(lin);
                [c.l, c.a, c.b]
            })
            .collect();

        let n_segments = self.config.n_segments.max(1);
        let step = ((width * height) as f32 / n_segments as f32).sqrt().max(1.0);
        let grid = step.round().max(1.0) as usize;

        let mut centers = Vec::new();
        let mut y = grid / 2;
        while y < height {
            let mut x = grid / 2;
            while x < width {
                centers.push(Center {
                    lab: lab[y * width + x],
                    x: x as f32,
                    y: y as f32,
                });
                x += grid;
            }
            y += grid;
        }
        if centers.is_empty() {
            centers.push(Center {
                lab: lab[0],
                x: 0.0,
                y: 0.0,
            });
        }

        let spatial_weight = (self.config.compactness / step).powi(2);
        let window = (2.0 * step).ceil() as isize;
        let mut labels = vec![0usize; width * height];
        let mut distance = vec![f32::INFINITY; width * height];

        for _ in 0..self.config.max_iter.max(1) {
            distance.iter_mut().for_each(|d| *d = f32::INFINITY);

            for (k, center) in centers.iter().enumerate() {
                let cx = center.x.round() as isize;
                let cy = center.y.round() as isize;
                let y0 = (cy - window).max(0) as usize;
                let y1 = ((cy + window + 1).max(0) as usize).min(height);
                let x0 = (cx - window).max(0) as usize;
                let x1 = ((cx + window + 1).max(0) as usize).min(width);

                for py in y0..y1 {
                    for px in x0..x1 {
                        let idx = py * width + px;
                        let p = lab[idx];
                        let dc = (p[0] - center.lab[0]).powi(2)
                            + (p[1] - center.lab[1]).powi(2)
                            + (p[2] - center.lab[2]).powi(2);
                        let ds = (px as f32 - center.x).powi(2) + (py as f32 - center.y).powi(2);
                        let d = dc + spatial_weight * ds;
                        if d < distance[idx] {
                            distance[idx] = d;
                            labels[idx] = k;
                        }
                    }
                }
            }

            let mut sums = vec![[0.0f32; 5]; centers.len()];
            let mut counts = vec![0usize; centers.len()];
            for (idx, &k) in labels.iter().enumerate() {
                let p = lab[idx];
                let s = &mut sums[k];
                s[0] += p[0];
                s[1] += p[1];
                s[2] += p[2];
                s[3] += (idx % width) as f32;
                s[4] += (idx / width) as f32;
                counts[k] += 1;
            }
            for (center, (s, &n)) in centers.iter_mut().zip(sums.iter().zip(&counts)) {
                if n > 0 {
                    let n = n as f32;
                    center.lab = [s[0] / n, s[1] / n, s[2] / n];
                    center.x = s[3] / n;
                    center.y = s[4] / n;
                }
            }
        }

        let min_size = ((step * step * self.config.min_size_factor) as usize).max(1);
        let relabelled = enforce_connectivity(&labels, width, height, min_size);
        Array2::from_shape_vec((height, width), relabelled)
            .unwrap_or_else(|_| Array2::zeros((height, width)))
    }
}

/// Split clusters into 4-connected components and merge the small ones into
/// an already labelled neighbour. Output labels are consecutive from zero.
fn enforce_connectivity(labels: &[usize], width: usize, height: usize, min_size: usize) -> Vec<usize> {
    const UNSET: usize = usize::MAX;
    let mut out = vec![UNSET; labels.len()];
    let mut next = 0usize;
    let mut queue = VecDeque::new();
    let mut component = Vec::new();

    let neighbours = |idx: usize| {
        let x = idx % width;
        let y = idx / width;
        let mut n = Vec::with_capacity(4);
        if x > 0 {
            n.push(idx - 1);
        }
        if x + 1 < width {
            n.push(idx + 1);
        }
        if y > 0 {
            n.push(idx - width);
        }
        if y + 1 < height {
            n.push(idx + width);
        }
        n
    };

    for start in 0..labels.len() {
        if out[start] != UNSET {
            continue;
        }

        let adjacent = neighbours(start).into_iter().map(|n| out[n]).find(|&l| l != UNSET);

        component.clear();
        queue.clear();
        out[start] = next;
        queue.push_back(start);
        while let Some(idx) = queue.pop_front() {
            component.push(idx);
            for n in neighbours(idx) {
                if out[n] == UNSET && labels[n] == labels[start] {
                    out[n] = next;
                    queue.push_back(n);
                }
            }
        }

        match adjacent {
            Some(label) if component.len() < min_size => {
                for &idx in &component {
                    out[idx] = label;
                }
            }
            _ => next += 1,
        }
    }

    out
}
