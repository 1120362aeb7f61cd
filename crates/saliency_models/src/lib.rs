//! # saliency_models
//!
//! Image classifiers for saliency-rs.
//!
//! - [`ImageCnn`] - small 2-D CNN implementing [`saliency_core::ImageClassifier`]
//! - [`checkpoint`] - burn record + JSON metadata save/load

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod checkpoint;
pub mod cnn;

pub use checkpoint::{
    load_image_cnn, load_record, save_image_cnn, save_model, CheckpointError, CheckpointMetadata,
};
pub use cnn::{ImageCnn, ImageCnnConfig};
