//! # saliency
//!
//! Post-hoc explanations for image classifiers in Rust.
//!
//! - **Gradient saliency**: SmoothGrad and Integrated Gradients over any
//!   [`core::ImageClassifier`] running on a burn autodiff backend
//! - **Perturbation**: a LIME explainer behind the
//!   [`explain::PerturbationExplainer`] trait
//! - **Comparison**: every method over several models, one row per model
//! - **Models**: a small CNN with checkpoint save/load
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use saliency::prelude::*;
//! use burn_autodiff::Autodiff;
//! use burn_ndarray::NdArray;
//!
//! type B = Autodiff<NdArray>;
//!
//! let ctx = ExecutionContext::<B>::default();
//! let (model, meta) = load_image_cnn::<B>("runs/erm", ctx.device())?;
//! let image = image::open("bird.jpg")?.to_rgb8();
//! let preprocessor = Preprocessor::default();
//!
//! let sg = smooth_grad(&model, &image, &preprocessor, &SmoothGradConfig::default(), &ctx)?;
//! let ig = integrated_gradients(&model, &image, &preprocessor, &IntegratedGradientsConfig::default(), &ctx)?;
//! assert_eq!(sg.dims(), (224, 224));
//! ```
//!
//! ## Feature Flags
//!
//! - `backend-ndarray` (default): CPU backend using ndarray
//! - `backend-wgpu`: GPU backend using WGPU
//! - `backend-tch`: PyTorch backend via tch-rs

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

// Re-export all crates
pub use saliency_core as core;
pub use saliency_explain as explain;
pub use saliency_models as models;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use saliency::prelude::*;
/// ```
pub mod prelude {
    // Core types
    pub use saliency_core::{
        image_from_array, DevicePreference, ExecutionContext, ExecutionMode, ImageClassifier,
        PreprocessConfig, Preprocessor, Seed,
    };

    // Explanations
    pub use saliency_explain::{
        compare_models, explain_with_perturbation, integrated_gradients, mark_boundaries,
        smooth_grad, AttributionMethod, BaselineType, ComparisonConfig, ComparisonGrid,
        ComparisonRow, Explanation, IntegratedGradientsConfig, LimeConfig, LimeImageExplainer,
        MaskOptions, NamedModel, Panel, PerturbationConfig, PerturbationExplainer, SaliencyMap,
        SegmentMask, SmoothGradConfig, TargetPolicy,
    };

    // Models
    pub use saliency_models::{
        load_image_cnn, save_image_cnn, CheckpointMetadata, ImageCnn, ImageCnnConfig,
    };
}

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
