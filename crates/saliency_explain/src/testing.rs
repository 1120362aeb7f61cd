//! Small classifiers with known gradients for unit tests.

use std::cell::{Cell, RefCell};

use burn::nn::{Linear, LinearConfig};
use burn::prelude::*;
use saliency_core::{ExecutionMode, ImageClassifier};

/// Linear model over the flattened image.
#[derive(Module, Debug)]
pub struct LinearScorer<B: Backend> {
    pub linear: Linear<B>,
}

impl<B: Backend> LinearScorer<B> {
    pub fn new(height: usize, width: usize, n_classes: usize, device: &B::Device) -> Self {
        Self {
            linear: LinearConfig::new(3 * height * width, n_classes).init(device),
        }
    }

    /// Weight column for `class`, in (channel, row, col) order.
    pub fn weights_for(&self, class: usize) -> Vec<f32> {
        let [d_input, _] = self.linear.weight.dims();
        self.linear
            .weight
            .val()
            .slice([0..d_input, class..class + 1])
            .into_data()
            .convert::<f32>()
            .to_vec()
            .unwrap()
    }
}

impl<B: Backend> ImageClassifier<B> for LinearScorer<B> {
    fn forward(&self, images: Tensor<B, 4>, _mode: ExecutionMode) -> Tensor<B, 2> {
        self.linear.forward(images.flatten::<2>(1, 3))
    }

    fn n_classes(&self) -> usize {
        self.linear.weight.dims()[1]
    }
}

/// Single class scored by `sum(x²)`, so the gradient is `2x`.
pub struct SquareModel;

impl<B: Backend> ImageClassifier<B> for SquareModel {
    fn forward(&self, images: Tensor<B, 4>, _mode: ExecutionMode) -> Tensor<B, 2> {
        images.powf_scalar(2.0).flatten::<2>(1, 3).sum_dim(1)
    }

    fn n_classes(&self) -> usize {
        1
    }
}

/// Returns the same scores for every image.
///
/// The output stays connected to the input so backpropagation yields a
/// (zero) gradient.
pub struct ConstantClassifier {
    pub scores: Vec<f32>,
}

impl<B: Backend> ImageClassifier<B> for ConstantClassifier {
    fn forward(&self, images: Tensor<B, 4>, _mode: ExecutionMode) -> Tensor<B, 2> {
        let device = images.device();
        let [batch, _, _, _] = images.dims();
        let n = self.scores.len();
        let anchor = images.flatten::<2>(1, 3).sum_dim(1) * 0.0;
        let scores = Tensor::<B, 1>::from_floats(self.scores.as_slice(), &device)
            .reshape([1, n])
            .repeat_dim(0, batch);
        anchor.repeat_dim(1, n) + scores
    }

    fn n_classes(&self) -> usize {
        self.scores.len()
    }
}

/// Counts forward calls made on the wrapped model and the mode of each.
pub struct CountingModel<M> {
    pub inner: M,
    pub calls: Cell<usize>,
    pub modes: RefCell<Vec<ExecutionMode>>,
}

impl<M> CountingModel<M> {
    pub fn new(inner: M) -> Self {
        Self {
            inner,
            calls: Cell::new(0),
            modes: RefCell::new(Vec::new()),
        }
    }
}

impl<B: Backend, M: ImageClassifier<B>> ImageClassifier<B> for CountingModel<M> {
    fn forward(&self, images: Tensor<B, 4>, mode: ExecutionMode) -> Tensor<B, 2> {
        self.calls.set(self.calls.get() + 1);
        self.modes.borrow_mut().push(mode);
        self.inner.forward(images, mode)
    }

    fn n_classes(&self) -> usize {
        self.inner.n_classes()
    }
}
