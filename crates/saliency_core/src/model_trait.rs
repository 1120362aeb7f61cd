//! Classifier capability consumed by every explanation method.

use burn::prelude::*;

use crate::mode::ExecutionMode;

/// An image classifier that can be evaluated and differentiated.
///
/// This is the single contract the explanation routines rely on. Any model
/// mapping a batch of preprocessed images to per-class scores qualifies;
/// backpropagation comes from running the model on an autodiff backend.
///
/// Implementations must disable stochastic and statistics-updating layers
/// when `mode` is [`ExecutionMode::Inference`], and must never mutate their
/// parameters from `forward`.
pub trait ImageClassifier<B: Backend> {
    /// Forward pass returning raw class scores.
    ///
    /// # Arguments
    ///
    /// * `images` - Input tensor of shape (batch, 3, height, width)
    /// * `mode` - Execution mode for this call
    ///
    /// # Returns
    ///
    /// Scores tensor of shape (batch, n_classes)
    fn forward(&self, images: Tensor<B, 4>, mode: ExecutionMode) -> Tensor<B, 2>;

    /// Number of classes the model scores.
    fn n_classes(&self) -> usize;

    /// Forward pass returning class probabilities.
    fn forward_probs(&self, images: Tensor<B, 4>, mode: ExecutionMode) -> Tensor<B, 2> {
        let scores = self.forward(images, mode);
        burn::tensor::activation::softmax(scores, 1)
    }
}

impl<B: Backend, M: ImageClassifier<B> + ?Sized> ImageClassifier<B> for &M {
    fn forward(&self, images: Tensor<B, 4>, mode: ExecutionMode) -> Tensor<B, 2> {
        (**self).forward(images, mode)
    }

    fn n_classes(&self) -> usize {
        (**self).n_classes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    struct MeanScore;

    impl<B: Backend> ImageClassifier<B> for MeanScore {
        fn forward(&self, images: Tensor<B, 4>, _mode: ExecutionMode) -> Tensor<B, 2> {
            let [batch, _, _, _] = images.dims();
            let mean = images.flatten::<2>(1, 3).mean_dim(1);
            Tensor::cat(vec![mean.clone(), mean.neg()], 1).reshape([batch, 2])
        }

        fn n_classes(&self) -> usize {
            2
        }
    }

    #[test]
    fn test_forward_probs_sum_to_one() {
        let device = Default::default();
        let images = Tensor::<NdArray, 4>::ones([3, 3, 4, 4], &device);
        let probs = MeanScore.forward_probs(images, ExecutionMode::Inference);

        assert_eq!(probs.dims(), [3, 2]);
        let sums: Vec<f32> = probs.sum_dim(1).into_data().to_vec().unwrap();
        for s in sums {
            assert!((s - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_reference_forwards() {
        let model = MeanScore;
        let by_ref = &model;
        assert_eq!(ImageClassifier::<NdArray>::n_classes(&by_ref), 2);
    }
}
