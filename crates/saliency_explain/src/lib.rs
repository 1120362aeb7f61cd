//! # saliency_explain
//!
//! Explanations for image classifiers.
//!
//! This crate provides:
//! - SmoothGrad: gradients averaged over noisy copies of the input
//! - Integrated Gradients: gradients averaged along a baseline-to-input path
//! - A perturbation explainer contract with a bundled LIME implementation
//! - A comparison harness running every method over several models
//!
//! Gradient methods need an autodiff backend; every backward pass starts
//! from a fresh gradient container and model parameters are only read.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

mod adapter;
mod attribution;
mod comparison;
mod error;
mod gradient;
mod integrated;
pub mod perturbation;
mod smoothgrad;

#[cfg(test)]
mod testing;

pub use adapter::{batch_predict, explain_with_perturbation, PerturbationConfig};
pub use attribution::{AttributionMethod, BaselineType, SaliencyMap, TargetPolicy};
pub use comparison::{
    compare_models, ComparisonConfig, ComparisonGrid, ComparisonRow, NamedModel, Panel,
};
pub use error::{ExplainError, Result};
pub use integrated::{integrated_gradients, make_baseline, step_sizes, IntegratedGradientsConfig};
pub use perturbation::{
    mark_boundaries, Explanation, LimeConfig, LimeImageExplainer, MaskOptions,
    PerturbationExplainer, SegmentMask,
};
pub use smoothgrad::{smooth_grad, SmoothGradConfig};
