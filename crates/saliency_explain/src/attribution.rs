//! Saliency map types shared by the gradient-based methods.

use burn::prelude::*;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::error::{ExplainError, Result};

/// Method used to produce an explanation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttributionMethod {
    /// Gradients averaged over noise-perturbed copies of the input.
    SmoothGrad,
    /// Gradients averaged along a straight path from a baseline.
    IntegratedGradients,
    /// Segment-perturbation surrogate model (LIME).
    Perturbation,
}

impl std::fmt::Display for AttributionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttributionMethod::SmoothGrad => write!(f, "Smoothed Gradients"),
            AttributionMethod::IntegratedGradients => write!(f, "Integrated Gradients"),
            AttributionMethod::Perturbation => write!(f, "LIME"),
        }
    }
}

/// Which class score is backpropagated at each sample or step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum TargetPolicy {
    /// Recompute the argmax class on every perturbed or interpolated input.
    #[default]
    Recompute,
    /// Take the argmax once, on the unperturbed input, and keep it.
    FixedAtInput,
    /// Always use the given class index.
    Class(usize),
}

/// Type of baseline to use for Integrated Gradients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum BaselineType {
    /// All-zero input (most common).
    #[default]
    Zeros,
    /// Seeded standard normal noise.
    Random,
    /// Per-channel mean of the input.
    Mean,
}

/// Per-pixel importance map of shape (height, width).
///
/// Values are the maximum absolute gradient signal across colour channels,
/// so every entry is non-negative.
#[derive(Debug, Clone, PartialEq)]
pub struct SaliencyMap {
    values: Array2<f32>,
    method: AttributionMethod,
    target_classes: Vec<usize>,
    n_samples: usize,
}

impl SaliencyMap {
    /// Collapse a (channels, height, width) signal into a map by taking the
    /// maximum absolute value over channels.
    pub fn from_channel_signal<B: Backend>(
        signal: Tensor<B, 3>,
        method: AttributionMethod,
        target_classes: Vec<usize>,
    ) -> Result<Self> {
        let [_, height, width] = signal.dims();
        let collapsed = signal.abs().max_dim(0).reshape([height, width]);
        let data: Vec<f32> = tensor_to_vec(collapsed)?;
        let values = Array2::from_shape_vec((height, width), data)
            .map_err(|e| ExplainError::invalid(e.to_string()))?;
        let n_samples = target_classes.len();

        Ok(Self {
            values,
            method,
            target_classes,
            n_samples,
        })
    }

    /// The importance values.
    pub fn values(&self) -> &Array2<f32> {
        &self.values
    }

    /// Consume the map and return its values.
    pub fn into_values(self) -> Array2<f32> {
        self.values
    }

    /// Shape as (height, width).
    pub fn dims(&self) -> (usize, usize) {
        self.values.dim()
    }

    /// The method used.
    pub fn method(&self) -> AttributionMethod {
        self.method
    }

    /// Class backpropagated at each sample or step, in order.
    pub fn target_classes(&self) -> &[usize] {
        &self.target_classes
    }

    /// Number of gradient samples (backward passes) folded into the map.
    pub fn n_samples(&self) -> usize {
        self.n_samples
    }

    /// Largest value in the map.
    pub fn max(&self) -> f32 {
        self.values.iter().copied().fold(0.0, f32::max)
    }

    /// Rescale the values to [0, 1].
    pub fn normalize(&self) -> Self {
        let min_val = self.values.iter().copied().fold(f32::INFINITY, f32::min);
        let max_val = self.max();
        let range = max_val - min_val;

        let values = if range > 1e-8 {
            self.values.mapv(|v| (v - min_val) / range)
        } else {
            self.values.clone()
        };

        Self {
            values,
            method: self.method,
            target_classes: self.target_classes.clone(),
            n_samples: self.n_samples,
        }
    }
}

/// Read a tensor back to host memory as `f32`.
pub(crate) fn tensor_to_vec<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Result<Vec<f32>> {
    tensor
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| saliency_core::CoreError::TensorData(format!("{:?}", e)).into())
}

/// Read a (rows, cols) tensor back to host memory.
pub(crate) fn tensor_to_array2<B: Backend>(tensor: Tensor<B, 2>) -> Result<Array2<f32>> {
    let [rows, cols] = tensor.dims();
    let data = tensor_to_vec(tensor)?;
    Array2::from_shape_vec((rows, cols), data).map_err(|e| ExplainError::invalid(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_from_channel_signal_takes_abs_max() {
        let device = Default::default();
        // channel 0: [1, -4], channel 1: [-2, 3]
        let signal = Tensor::<TestBackend, 1>::from_floats([1.0, -4.0, -2.0, 3.0], &device)
            .reshape([2, 1, 2]);

        let map = SaliencyMap::from_channel_signal(signal, AttributionMethod::SmoothGrad, vec![0])
            .unwrap();

        assert_eq!(map.dims(), (1, 2));
        assert_eq!(map.values()[[0, 0]], 2.0);
        assert_eq!(map.values()[[0, 1]], 4.0);
        assert_eq!(map.n_samples(), 1);
        assert_eq!(map.method(), AttributionMethod::SmoothGrad);
    }

    #[test]
    fn test_normalize_range() {
        let device = Default::default();
        let data: Vec<f32> = (0..24).map(|i| i as f32 / 3.0).collect();
        let signal = Tensor::<TestBackend, 1>::from_floats(data.as_slice(), &device).reshape([2, 3, 4]);
        let map = SaliencyMap::from_channel_signal(
            signal,
            AttributionMethod::IntegratedGradients,
            vec![1, 1],
        )
        .unwrap()
        .normalize();

        let min = map.values().iter().copied().fold(f32::INFINITY, f32::min);
        assert!(min.abs() < 1e-6);
        assert!((map.max() - 1.0).abs() < 1e-6);
        assert_eq!(map.target_classes(), &[1, 1]);
    }

    #[test]
    fn test_normalize_constant_map_unchanged() {
        let device = Default::default();
        let signal = Tensor::<TestBackend, 3>::zeros([3, 4, 4], &device);
        let map = SaliencyMap::from_channel_signal(signal, AttributionMethod::SmoothGrad, vec![0])
            .unwrap();
        assert_eq!(map.normalize().values(), map.values());
    }

    #[test]
    fn test_tensor_to_array2() {
        let device = Default::default();
        let t = Tensor::<TestBackend, 2>::from_floats([[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]], &device);
        let arr = tensor_to_array2(t).unwrap();
        assert_eq!(arr.dim(), (2, 3));
        assert_eq!(arr[[1, 2]], 6.0);
    }

    #[test]
    fn test_enum_serde() {
        let json = serde_json::to_string(&TargetPolicy::Class(3)).unwrap();
        let decoded: TargetPolicy = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, TargetPolicy::Class(3));

        let baseline: BaselineType = serde_json::from_str("\"Mean\"").unwrap();
        assert_eq!(baseline, BaselineType::Mean);
    }

    #[test]
    fn test_method_display() {
        assert_eq!(AttributionMethod::SmoothGrad.to_string(), "Smoothed Gradients");
        assert_eq!(AttributionMethod::Perturbation.to_string(), "LIME");
    }
}
