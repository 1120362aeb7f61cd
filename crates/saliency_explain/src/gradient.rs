//! Single forward/backward step shared by the gradient saliency methods.

use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use saliency_core::{ExecutionMode, ImageClassifier};

use crate::attribution::{tensor_to_vec, TargetPolicy};
use crate::error::{ExplainError, Result};

/// Gradient of one class score with respect to an input, batch dim removed.
pub(crate) struct GradientSample<B: AutodiffBackend> {
    pub class: usize,
    pub gradient: Tensor<B::InnerBackend, 3>,
}

/// Index of the largest score in a (1, n_classes) tensor.
///
/// Ties resolve to the first index.
pub(crate) fn argmax_class<B: Backend>(scores: Tensor<B, 2>) -> Result<usize> {
    let [batch, n_classes] = scores.dims();
    if batch != 1 || n_classes == 0 {
        return Err(ExplainError::ModelOutput {
            expected: "[1, n_classes > 0]".to_string(),
            got: format!("[{}, {}]", batch, n_classes),
        });
    }
    let values = tensor_to_vec(scores)?;
    let (best, _) = values
        .iter()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |(bi, bv), (i, &v)| {
            if v > bv {
                (i, v)
            } else {
                (bi, bv)
            }
        });
    Ok(best)
}

/// Resolve a [`TargetPolicy`] into a class that stays fixed for the whole
/// computation, or `None` when it must be recomputed per sample.
pub(crate) fn fixed_target<B, M>(
    model: &M,
    input: &Tensor<B, 4>,
    policy: TargetPolicy,
) -> Result<Option<usize>>
where
    B: AutodiffBackend,
    M: ImageClassifier<B> + ?Sized,
{
    match policy {
        TargetPolicy::Recompute => Ok(None),
        TargetPolicy::Class(class) => {
            if class >= model.n_classes() {
                return Err(ExplainError::invalid(format!(
                    "target class {} out of range for a model with {} classes",
                    class,
                    model.n_classes()
                )));
            }
            Ok(Some(class))
        }
        TargetPolicy::FixedAtInput => {
            let scores = model.forward(input.clone().detach(), ExecutionMode::Inference);
            argmax_class(scores).map(Some)
        }
    }
}

/// Run `forward_input` through the model, pick the target class and
/// backpropagate its score into `wrt`.
///
/// Every call builds a fresh gradient container, so nothing accumulated by
/// a previous sample can leak into this one, and the model parameters are
/// only read.
pub(crate) fn backprop_class_score<B, M>(
    model: &M,
    forward_input: Tensor<B, 4>,
    wrt: &Tensor<B, 4>,
    target: Option<usize>,
) -> Result<GradientSample<B>>
where
    B: AutodiffBackend,
    M: ImageClassifier<B> + ?Sized,
{
    let scores = model.forward(forward_input, ExecutionMode::Inference);
    let [batch, n_classes] = scores.dims();
    if batch != 1 {
        return Err(ExplainError::ModelOutput {
            expected: format!("[1, {}]", n_classes),
            got: format!("[{}, {}]", batch, n_classes),
        });
    }

    let class = match target {
        Some(class) => class,
        None => argmax_class(scores.clone().detach())?,
    };
    if class >= n_classes {
        return Err(ExplainError::ModelOutput {
            expected: format!("more than {} classes", class),
            got: format!("{} classes", n_classes),
        });
    }

    let score = scores.slice([0..1, class..class + 1]).sum();
    let grads = score.backward();
    let gradient = wrt.grad(&grads).ok_or(ExplainError::MissingGradient)?;

    let [_, channels, height, width] = gradient.dims();
    Ok(GradientSample {
        class,
        gradient: gradient.reshape([channels, height, width]),
    })
}

/// Running sum of gradient samples.
pub(crate) struct GradientAccumulator<B: AutodiffBackend> {
    sum: Option<Tensor<B::InnerBackend, 3>>,
    classes: Vec<usize>,
}

impl<B: AutodiffBackend> GradientAccumulator<B> {
    pub fn with_capacity(n: usize) -> Self {
        Self {
            sum: None,
            classes: Vec::with_capacity(n),
        }
    }

    pub fn push(&mut self, sample: GradientSample<B>) {
        self.classes.push(sample.class);
        self.sum = Some(match self.sum.take() {
            Some(sum) => sum + sample.gradient,
            None => sample.gradient,
        });
    }

    /// Element-wise mean of every pushed sample, with the class sequence.
    pub fn mean(self) -> Result<(Tensor<B::InnerBackend, 3>, Vec<usize>)> {
        let n = self.classes.len();
        let sum = self
            .sum
            .ok_or_else(|| ExplainError::invalid("no gradient samples were collected"))?;
        Ok((sum / n as f32, self.classes))
    }
}
