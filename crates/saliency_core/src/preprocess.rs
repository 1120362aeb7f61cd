//! Image preprocessing: resize, centre crop, tensor conversion, normalization.

use burn::prelude::*;
use burn::tensor::TensorData;
use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::Array3;
use std::path::Path;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Configuration for the preprocessing pipeline.
///
/// The defaults reproduce the usual ImageNet evaluation transform:
/// resize to 256x256, centre crop 224x224, normalize with ImageNet
/// channel statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    /// Size (width, height) images are resized to.
    pub resize: (u32, u32),
    /// Size (width, height) of the centre crop.
    pub crop: (u32, u32),
    /// Per-channel mean subtracted after scaling to [0, 1].
    pub mean: [f32; 3],
    /// Per-channel standard deviation divided out after mean subtraction.
    pub std: [f32; 3],
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            resize: (256, 256),
            crop: (224, 224),
            mean: [0.485, 0.456, 0.406],
            std: [0.229, 0.224, 0.225],
        }
    }
}

impl PreprocessConfig {
    /// Set resize and crop sizes (square).
    #[must_use]
    pub fn with_sizes(mut self, resize: u32, crop: u32) -> Self {
        self.resize = (resize, resize);
        self.crop = (crop, crop);
        self
    }

    /// Set normalization statistics.
    #[must_use]
    pub fn with_normalization(mut self, mean: [f32; 3], std: [f32; 3]) -> Self {
        self.mean = mean;
        self.std = std;
        self
    }
}

/// Deterministic image-to-tensor pipeline.
///
/// The pipeline is split in two halves because the perturbation explainer
/// works on the already resized and cropped pixels and only needs the
/// tensor half:
///
/// - [`Preprocessor::resize_and_crop`]: `RgbImage -> RgbImage`
/// - [`Preprocessor::to_tensor`] / [`Preprocessor::to_batch`]: pixels to a
///   normalized `(N, 3, H, W)` tensor
#[derive(Debug, Clone)]
pub struct Preprocessor {
    config: PreprocessConfig,
}

impl Preprocessor {
    /// Create a preprocessor, validating the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidArgument`] if any size is zero, the crop
    /// exceeds the resized image, or a standard deviation is not positive.
    pub fn new(config: PreprocessConfig) -> Result<Self> {
        let (rw, rh) = config.resize;
        let (cw, ch) = config.crop;
        if rw == 0 || rh == 0 || cw == 0 || ch == 0 {
            return Err(CoreError::invalid("preprocess sizes must be non-zero"));
        }
        if cw > rw || ch > rh {
            return Err(CoreError::invalid(format!(
                "crop {}x{} larger than resized image {}x{}",
                cw, ch, rw, rh
            )));
        }
        if config.std.iter().any(|&s| !(s > 0.0)) {
            return Err(CoreError::invalid("normalization std must be positive"));
        }
        Ok(Self { config })
    }

    /// Get the configuration.
    #[must_use]
    pub fn config(&self) -> &PreprocessConfig {
        &self.config
    }

    /// Resize then centre crop.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidShape`] for an image with no pixels.
    pub fn resize_and_crop(&self, image: &RgbImage) -> Result<RgbImage> {
        if image.width() == 0 || image.height() == 0 {
            return Err(CoreError::InvalidShape {
                expected: "non-empty RGB image".to_string(),
                got: format!("{}x{}", image.width(), image.height()),
            });
        }
        let (rw, rh) = self.config.resize;
        let (cw, ch) = self.config.crop;
        let resized = imageops::resize(image, rw, rh, FilterType::Triangle);

        let left = ((rw - cw) as f32 / 2.0).round() as u32;
        let top = ((rh - ch) as f32 / 2.0).round() as u32;
        Ok(imageops::crop_imm(&resized, left, top, cw, ch).to_image())
    }

    /// Convert already cropped pixels into a normalized `(1, 3, H, W)` tensor.
    pub fn to_tensor<B: Backend>(&self, image: &RgbImage, device: &B::Device) -> Tensor<B, 4> {
        let (width, height) = image.dimensions();
        let data = self.normalized_chw(image);
        Tensor::from_data(
            TensorData::new(data, [1, 3, height as usize, width as usize]),
            device,
        )
    }

    /// Full pipeline: resize, crop, normalize.
    ///
    /// # Errors
    ///
    /// See [`Preprocessor::resize_and_crop`].
    pub fn preprocess<B: Backend>(&self, image: &RgbImage, device: &B::Device) -> Result<Tensor<B, 4>> {
        let cropped = self.resize_and_crop(image)?;
        Ok(self.to_tensor(&cropped, device))
    }

    /// Normalize a batch of equally sized images into `(N, 3, H, W)`.
    ///
    /// No resizing or cropping is applied.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidArgument`] for an empty batch and
    /// [`CoreError::InvalidShape`] if the images differ in size.
    pub fn to_batch<B: Backend>(&self, images: &[RgbImage], device: &B::Device) -> Result<Tensor<B, 4>> {
        let first = images
            .first()
            .ok_or_else(|| CoreError::invalid("cannot build a batch from zero images"))?;
        let (width, height) = first.dimensions();

        let mut data = Vec::with_capacity(images.len() * 3 * (width * height) as usize);
        for image in images {
            if image.dimensions() != (width, height) {
                return Err(CoreError::InvalidShape {
                    expected: format!("{}x{}", width, height),
                    got: format!("{}x{}", image.width(), image.height()),
                });
            }
            data.extend(self.normalized_chw(image));
        }

        Ok(Tensor::from_data(
            TensorData::new(data, [images.len(), 3, height as usize, width as usize]),
            device,
        ))
    }

    fn normalized_chw(&self, image: &RgbImage) -> Vec<f32> {
        let (width, height) = image.dimensions();
        let mut data = Vec::with_capacity((3 * width * height) as usize);
        for c in 0..3 {
            let mean = self.config.mean[c];
            let std = self.config.std[c];
            for y in 0..height {
                for x in 0..width {
                    let value = image.get_pixel(x, y)[c] as f32 / 255.0;
                    data.push((value - mean) / std);
                }
            }
        }
        data
    }
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self {
            config: PreprocessConfig::default(),
        }
    }
}

/// Decode a PNG or JPEG file into an [`RgbImage`].
///
/// Other colour types (grey, RGBA) are converted to 8-bit RGB.
pub fn load_rgb_image(path: impl AsRef<Path>) -> Result<RgbImage> {
    Ok(image::open(path)?.to_rgb8())
}

/// Build an [`RgbImage`] from an `(height, width, 3)` array.
///
/// # Errors
///
/// Returns [`CoreError::InvalidShape`] if the last axis is not 3 or either
/// spatial axis is empty.
pub fn image_from_array(array: &Array3<u8>) -> Result<RgbImage> {
    let (height, width, channels) = array.dim();
    if channels != 3 || height == 0 || width == 0 {
        return Err(CoreError::InvalidShape {
            expected: "(height > 0, width > 0, 3)".to_string(),
            got: format!("({}, {}, {})", height, width, channels),
        });
    }
    let raw: Vec<u8> = array.iter().copied().collect();
    RgbImage::from_raw(width as u32, height as u32, raw).ok_or_else(|| CoreError::InvalidShape {
        expected: format!("{} bytes", height * width * 3),
        got: "short pixel buffer".to_string(),
    })
}
