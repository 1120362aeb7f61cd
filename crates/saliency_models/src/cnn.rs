//! Small 2-D convolutional image classifier.

use burn::nn::{
    conv::{Conv2d, Conv2dConfig},
    pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig},
    Dropout, DropoutConfig, Linear, LinearConfig, PaddingConfig2d, Relu,
};
use burn::prelude::*;
use saliency_core::{ExecutionMode, ImageClassifier};
use serde::{Deserialize, Serialize};

/// Configuration for [`ImageCnn`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageCnnConfig {
    /// Number of output classes.
    pub n_classes: usize,
    /// Output channels of each convolution stage.
    pub channels: Vec<usize>,
    /// Square kernel size.
    pub kernel_size: usize,
    /// Dropout before the classifier head; active only in training mode.
    pub dropout: f64,
}

impl Default for ImageCnnConfig {
    fn default() -> Self {
        Self {
            n_classes: 2,
            channels: vec![16, 32, 64],
            kernel_size: 3,
            dropout: 0.2,
        }
    }
}

impl ImageCnnConfig {
    /// Create a config for `n_classes` outputs.
    pub fn new(n_classes: usize) -> Self {
        Self {
            n_classes,
            ..Default::default()
        }
    }

    /// Set the per-stage channel counts.
    #[must_use]
    pub fn with_channels(mut self, channels: Vec<usize>) -> Self {
        self.channels = channels;
        self
    }

    /// Set the kernel size.
    #[must_use]
    pub fn with_kernel_size(mut self, kernel_size: usize) -> Self {
        self.kernel_size = kernel_size;
        self
    }

    /// Set the dropout probability.
    #[must_use]
    pub fn with_dropout(mut self, dropout: f64) -> Self {
        self.dropout = dropout;
        self
    }

    /// Initialize the model.
    pub fn init<B: Backend>(&self, device: &B::Device) -> ImageCnn<B> {
        ImageCnn::new(self, device)
    }
}

/// Convolution, ReLU, 2x2 max pooling.
#[derive(Module, Debug)]
pub struct ConvStage<B: Backend> {
    conv: Conv2d<B>,
    pool: MaxPool2d,
}

impl<B: Backend> ConvStage<B> {
    fn new(in_channels: usize, out_channels: usize, kernel_size: usize, device: &B::Device) -> Self {
        let pad = kernel_size / 2;
        let conv = Conv2dConfig::new([in_channels, out_channels], [kernel_size, kernel_size])
            .with_padding(PaddingConfig2d::Explicit(pad, pad))
            .init(device);
        let pool = MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init();
        Self { conv, pool }
    }

    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv.forward(x);
        let x = Relu::new().forward(x);
        self.pool.forward(x)
    }
}

/// CNN over (batch, 3, height, width) RGB tensors.
///
/// Has no batch normalization, so inference output depends only on the
/// weights; dropout is applied only in [`ExecutionMode::Training`].
#[derive(Module, Debug)]
pub struct ImageCnn<B: Backend> {
    stages: Vec<ConvStage<B>>,
    gap: AdaptiveAvgPool2d,
    dropout: Dropout,
    fc: Linear<B>,
}

impl<B: Backend> ImageCnn<B> {
    /// Create a model with freshly initialized weights.
    pub fn new(config: &ImageCnnConfig, device: &B::Device) -> Self {
        let mut stages = Vec::with_capacity(config.channels.len());
        let mut in_channels = 3;
        for &out_channels in &config.channels {
            stages.push(ConvStage::new(in_channels, out_channels, config.kernel_size.max(1), device));
            in_channels = out_channels;
        }

        Self {
            stages,
            gap: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            dropout: DropoutConfig::new(config.dropout).init(),
            fc: LinearConfig::new(in_channels, config.n_classes).init(device),
        }
    }
}

impl<B: Backend> ImageClassifier<B> for ImageCnn<B> {
    fn forward(&self, images: Tensor<B, 4>, mode: ExecutionMode) -> Tensor<B, 2> {
        let mut x = images;
        for stage in &self.stages {
            x = stage.forward(x);
        }

        let x = self.gap.forward(x);
        let [batch, channels, _, _] = x.dims();
        let x = x.reshape([batch, channels]);
        let x = if mode.is_training() {
            self.dropout.forward(x)
        } else {
            x
        };
        self.fc.forward(x)
    }

    fn n_classes(&self) -> usize {
        self.fc.weight.dims()[1]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_autodiff::Autodiff;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_image_cnn_forward_shape() {
        let device = Default::default();
        let model = ImageCnnConfig::new(5).init::<TestBackend>(&device);

        let x = Tensor::<TestBackend, 4>::zeros([2, 3, 32, 32], &device);
        let scores = model.forward(x, ExecutionMode::Inference);

        assert_eq!(scores.dims(), [2, 5]);
        assert_eq!(model.n_classes(), 5);
    }

    #[test]
    fn test_small_input_and_custom_stages() {
        let device = Default::default();
        let model = ImageCnnConfig::new(2)
            .with_channels(vec![4, 8])
            .with_kernel_size(5)
            .init::<TestBackend>(&device);

        let x = Tensor::<TestBackend, 4>::ones([1, 3, 12, 12], &device);
        assert_eq!(model.forward(x, ExecutionMode::Inference).dims(), [1, 2]);
    }

    #[test]
    fn test_inference_is_deterministic_on_autodiff() {
        type AdBackend = Autodiff<NdArray>;
        let device = Default::default();
        let model = ImageCnnConfig::new(3)
            .with_dropout(0.9)
            .with_channels(vec![4])
            .init::<AdBackend>(&device);
        let x = Tensor::<AdBackend, 4>::ones([1, 3, 8, 8], &device);

        let a: Vec<f32> = model
            .forward(x.clone(), ExecutionMode::Inference)
            .into_data()
            .to_vec()
            .unwrap();
        let b: Vec<f32> = model
            .forward(x, ExecutionMode::Inference)
            .into_data()
            .to_vec()
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_config_serde() {
        let config = ImageCnnConfig::new(4).with_channels(vec![8, 8]);
        let json = serde_json::to_string(&config).unwrap();
        let back: ImageCnnConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, back);
    }
}
