//! Checkpoint save/load for image classifiers.
//!
//! A checkpoint is a burn named MessagePack record (`<stem>.mpk`, full
//! precision) next to a JSON metadata file (`<stem>.json`) holding the
//! architecture config and class labels.
//!
//! # Example
//!
//! ```rust,ignore
//! use saliency_models::{checkpoint, ImageCnnConfig};
//!
//! let config = ImageCnnConfig::new(2);
//! let model = config.init::<NdArray>(&device);
//! let meta = CheckpointMetadata::for_image_cnn(&config)?.with_labels(["Landbird", "Waterbird"]);
//! checkpoint::save_image_cnn(&model, &meta, "erm")?;
//!
//! let (loaded, meta) = checkpoint::load_image_cnn::<NdArray>("erm", &device)?;
//! ```

use std::path::{Path, PathBuf};

use burn::module::Module;
use burn::prelude::*;
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder, Recorder};
use serde::{Deserialize, Serialize};

use crate::cnn::{ImageCnn, ImageCnnConfig};

/// Architecture name recorded for [`ImageCnn`] checkpoints.
pub const IMAGE_CNN_ARCH: &str = "ImageCnn";

/// Result type for checkpoint operations.
pub type Result<T> = std::result::Result<T, CheckpointError>;

/// Checkpoint-related errors.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    /// Error saving checkpoint.
    #[error("Failed to save checkpoint: {0}")]
    Save(String),

    /// Error loading checkpoint.
    #[error("Failed to load checkpoint: {0}")]
    Load(String),

    /// Metadata missing, unreadable, or describing another architecture.
    #[error("Invalid checkpoint metadata: {0}")]
    Metadata(String),
}

/// Path of the weight record for a checkpoint stem.
pub fn weights_path(stem: impl AsRef<Path>) -> PathBuf {
    stem.as_ref().with_extension("mpk")
}

/// Path of the metadata file for a checkpoint stem.
pub fn metadata_path(stem: impl AsRef<Path>) -> PathBuf {
    stem.as_ref().with_extension("json")
}

/// Save a module's weights.
pub fn save_model<B, M>(model: &M, path: impl AsRef<Path>) -> Result<()>
where
    B: Backend,
    M: Module<B>,
{
    let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
    Recorder::<B>::record(&recorder, model.clone().into_record(), weights_path(path))
        .map_err(|e| CheckpointError::Save(e.to_string()))
}

/// Load a module record saved by [`save_model`].
pub fn load_record<B, M>(path: impl AsRef<Path>, device: &B::Device) -> Result<M::Record>
where
    B: Backend,
    M: Module<B>,
{
    let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
    Recorder::<B>::load(&recorder, weights_path(path), device)
        .map_err(|e| CheckpointError::Load(e.to_string()))
}

/// Checkpoint metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMetadata {
    /// Model architecture name.
    pub arch: String,
    /// Model configuration as JSON.
    pub config_json: String,
    /// Class names by index; may be empty.
    #[serde(default)]
    pub class_labels: Vec<String>,
    /// Training objective the weights came from, e.g. "ERM" or "GroupDRO".
    #[serde(default)]
    pub objective: Option<String>,
    /// Additional metadata.
    #[serde(default)]
    pub extra: std::collections::BTreeMap<String, String>,
}

impl CheckpointMetadata {
    /// Create metadata for an architecture.
    pub fn new(arch: impl Into<String>) -> Self {
        Self {
            arch: arch.into(),
            config_json: String::new(),
            class_labels: Vec::new(),
            objective: None,
            extra: Default::default(),
        }
    }

    /// Metadata describing an [`ImageCnn`] built from `config`.
    pub fn for_image_cnn(config: &ImageCnnConfig) -> Result<Self> {
        let config_json =
            serde_json::to_string(config).map_err(|e| CheckpointError::Metadata(e.to_string()))?;
        Ok(Self {
            config_json,
            ..Self::new(IMAGE_CNN_ARCH)
        })
    }

    /// Set the class labels.
    #[must_use]
    pub fn with_labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.class_labels = labels.into_iter().map(Into::into).collect();
        self
    }

    /// Set the training objective.
    #[must_use]
    pub fn with_objective(mut self, objective: impl Into<String>) -> Self {
        self.objective = Some(objective.into());
        self
    }

    /// Add extra metadata.
    #[must_use]
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Decode the stored [`ImageCnnConfig`].
    pub fn image_cnn_config(&self) -> Result<ImageCnnConfig> {
        if self.arch != IMAGE_CNN_ARCH {
            return Err(CheckpointError::Metadata(format!(
                "expected architecture {}, found {}",
                IMAGE_CNN_ARCH, self.arch
            )));
        }
        serde_json::from_str(&self.config_json).map_err(|e| CheckpointError::Metadata(e.to_string()))
    }

    /// Save metadata to a JSON file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| CheckpointError::Save(e.to_string()))?;
        std::fs::write(path, json).map_err(|e| CheckpointError::Save(e.to_string()))?;
        Ok(())
    }

    /// Load metadata from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json =
            std::fs::read_to_string(path).map_err(|e| CheckpointError::Load(e.to_string()))?;
        serde_json::from_str(&json).map_err(|e| CheckpointError::Metadata(e.to_string()))
    }
}

/// Save an [`ImageCnn`] and its metadata under `stem`.
pub fn save_image_cnn<B: Backend>(
    model: &ImageCnn<B>,
    metadata: &CheckpointMetadata,
    stem: impl AsRef<Path>,
) -> Result<()> {
    let stem = stem.as_ref();
    save_model::<B, _>(model, stem)?;
    metadata.save(metadata_path(stem))?;
    tracing::info!("Saved checkpoint {}", weights_path(stem).display());
    Ok(())
}

/// Load an [`ImageCnn`] saved by [`save_image_cnn`].
pub fn load_image_cnn<B: Backend>(
    stem: impl AsRef<Path>,
    device: &B::Device,
) -> Result<(ImageCnn<B>, CheckpointMetadata)> {
    let stem = stem.as_ref();
    let metadata = CheckpointMetadata::load(metadata_path(stem))?;
    let config = metadata.image_cnn_config()?;

    let record = load_record::<B, ImageCnn<B>>(stem, device)?;
    let model = config.init::<B>(device).load_record(record);
    tracing::info!(
        "Loaded {} checkpoint {} ({} classes)",
        metadata.arch,
        weights_path(stem).display(),
        config.n_classes
    );
    Ok((model, metadata))
}
