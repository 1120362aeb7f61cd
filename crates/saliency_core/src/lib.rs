//! # saliency_core
//!
//! Core types and traits for saliency-rs image explanations.
//!
//! This crate provides:
//! - [`ImageClassifier`], the capability every explained model implements
//! - [`ExecutionContext`] threading device and [`ExecutionMode`] explicitly
//! - [`Preprocessor`] for the resize / centre-crop / normalize pipeline
//! - [`Seed`] for deterministic random number generation
//! - Error types and common utilities
//!
//! ## Shape Convention
//!
//! Image tensors follow the convention `(N, C, H, W)`:
//! - `N`: Batch size
//! - `C`: Colour channels (always 3, RGB)
//! - `H`, `W`: Spatial height and width
//!
//! ## Example
//!
//! ```rust,ignore
//! use saliency_core::{ExecutionContext, Preprocessor, Seed};
//!
//! let ctx = ExecutionContext::<Backend>::inference(device);
//! let input = Preprocessor::default().preprocess(&image, ctx.device())?;
//! // input shape: [1, 3, 224, 224]
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

mod context;
mod error;
mod preprocess;
mod mode;
mod model_trait;
mod seed;

pub use context::{DevicePreference, ExecutionContext};
pub use error::{CoreError, Result};
pub use preprocess::{image_from_array, load_rgb_image, PreprocessConfig, Preprocessor};
pub use mode::ExecutionMode;
pub use model_trait::ImageClassifier;
pub use seed::Seed;
