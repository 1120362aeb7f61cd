//! Side-by-side comparison of every explanation method across models.

use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use image::{Rgb, RgbImage};
use saliency_core::{ExecutionContext, ImageClassifier, Preprocessor};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::adapter::{explain_with_perturbation, PerturbationConfig};
use crate::attribution::SaliencyMap;
use crate::error::{ExplainError, Result};
use crate::gradient::argmax_class;
use crate::integrated::{integrated_gradients, IntegratedGradientsConfig};
use crate::perturbation::{
    mark_boundaries, LimeConfig, LimeImageExplainer, MaskOptions, PerturbationExplainer, SegmentMask,
};
use crate::smoothgrad::{smooth_grad, SmoothGradConfig};

/// A classifier and the name shown for its row.
pub struct NamedModel<'a, B: Backend> {
    /// Display name.
    pub name: String,
    /// The classifier.
    pub model: &'a dyn ImageClassifier<B>,
}

impl<'a, B: Backend> NamedModel<'a, B> {
    /// Pair a model with its display name.
    pub fn new(name: impl Into<String>, model: &'a dyn ImageClassifier<B>) -> Self {
        Self {
            name: name.into(),
            model,
        }
    }
}

/// Settings for every method run by [`compare_models`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ComparisonConfig {
    /// SmoothGrad settings.
    pub smooth_grad: SmoothGradConfig,
    /// Integrated Gradients settings.
    pub integrated_gradients: IntegratedGradientsConfig,
    /// Perturbation sample budget.
    pub perturbation: PerturbationConfig,
    /// Which segments the perturbation panel shows.
    pub mask: MaskOptions,
    /// Settings for the explainer built by [`ComparisonConfig::lime_explainer`].
    pub lime: LimeConfig,
}

impl ComparisonConfig {
    /// LIME explainer with SLIC segmentation built from `self.lime`.
    pub fn lime_explainer(&self) -> LimeImageExplainer {
        LimeImageExplainer::new(self.lime.clone())
    }
}

/// One cell of a comparison row.
#[derive(Debug, Clone)]
pub enum Panel {
    /// The cropped input with its labels.
    Input {
        /// Image as the model sees it.
        image: RgbImage,
        /// Known class, if any.
        ground_truth: Option<String>,
        /// Predicted class.
        predicted: String,
    },
    /// SmoothGrad map.
    SmoothGrad(SaliencyMap),
    /// Integrated Gradients map.
    IntegratedGradients(SaliencyMap),
    /// Top segments of the perturbation explanation.
    Perturbation {
        /// Annotated image with segment boundaries drawn.
        overlay: RgbImage,
        /// Selected pixels.
        mask: SegmentMask,
        /// Class the mask explains.
        label: String,
    },
}

impl Panel {
    /// Caption for rendering.
    pub fn title(&self) -> String {
        match self {
            Panel::Input {
                ground_truth,
                predicted,
                ..
            } => match ground_truth {
                Some(truth) => format!("Ground truth: {} / Predicted: {}", truth, predicted),
                None => format!("Predicted: {}", predicted),
            },
            Panel::SmoothGrad(_) => "Smoothed Gradients".to_string(),
            Panel::IntegratedGradients(_) => "Integrated Gradients".to_string(),
            Panel::Perturbation { label, .. } => format!("LIME ({})", label),
        }
    }
}

/// Every panel computed for one model.
#[derive(Debug, Clone)]
pub struct ComparisonRow {
    /// Display name of the model.
    pub model_name: String,
    /// Predicted class index.
    pub predicted_class: usize,
    /// Predicted class label.
    pub predicted_label: String,
    /// Input, SmoothGrad, Integrated Gradients and perturbation panels.
    pub panels: [Panel; 4],
}

/// One row per model, in the order the models were given.
#[derive(Debug, Clone, Default)]
pub struct ComparisonGrid {
    rows: Vec<ComparisonRow>,
}

impl ComparisonGrid {
    /// All rows.
    pub fn rows(&self) -> &[ComparisonRow] {
        &self.rows
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the grid has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

fn label_for(class_labels: &[String], class: usize) -> String {
    class_labels
        .get(class)
        .cloned()
        .unwrap_or_else(|| class.to_string())
}

/// Run every explanation method on every model for a single image.
///
/// # Arguments
///
/// * `models` - Models to compare, one row each
/// * `image` - Raw RGB image
/// * `class_labels` - Class names by index; empty to show indices
/// * `ground_truth` - Known label shown on the input panel
/// * `preprocessor` - Resize / crop / normalize pipeline
/// * `config` - Settings for each method
/// * `explainer` - Perturbation explainer
/// * `ctx` - Device to run on
///
/// # Errors
///
/// [`ExplainError::InvalidArgument`] when no models are given or
/// `class_labels` does not match a model's class count. Any method failing
/// on any model aborts the whole grid.
///
/// The prediction shown on the input panel runs in `ctx.mode()`; the
/// explanation methods always run the model in inference mode.
#[allow(clippy::too_many_arguments)]
pub fn compare_models<B, E>(
    models: &[NamedModel<'_, B>],
    image: &RgbImage,
    class_labels: &[String],
    ground_truth: Option<&str>,
    preprocessor: &Preprocessor,
    config: &ComparisonConfig,
    explainer: &E,
    ctx: &ExecutionContext<B>,
) -> Result<ComparisonGrid>
where
    B: AutodiffBackend,
    E: PerturbationExplainer + ?Sized,
{
    if models.is_empty() {
        return Err(ExplainError::invalid("no models to compare"));
    }
    for named in models {
        if !class_labels.is_empty() && class_labels.len() != named.model.n_classes() {
            return Err(ExplainError::invalid(format!(
                "{} class labels given but model '{}' has {} classes",
                class_labels.len(),
                named.name,
                named.model.n_classes()
            )));
        }
    }

    let cropped = preprocessor.resize_and_crop(image)?;
    let mut rows = Vec::with_capacity(models.len());

    for (i, named) in models.iter().enumerate() {
        info!("Explaining model {}/{}: {}", i + 1, models.len(), named.name);
        let model = named.model;

        let input = preprocessor.to_tensor::<B>(&cropped, ctx.device());
        let predicted_class = argmax_class(model.forward(input, ctx.mode()).detach())?;
        let predicted_label = label_for(class_labels, predicted_class);
        info!("{} predicts {}", named.name, predicted_label);

        let smooth = smooth_grad(model, image, preprocessor, &config.smooth_grad, ctx)?;
        let integrated =
            integrated_gradients(model, image, preprocessor, &config.integrated_gradients, ctx)?;

        let explanation =
            explain_with_perturbation(model, image, preprocessor, explainer, &config.perturbation, ctx)?;
        let top = *explanation
            .top_labels()
            .first()
            .ok_or_else(|| ExplainError::upstream("explanation has no labels"))?;
        let (annotated, mask) = explanation.segment_mask(top, &config.mask)?;
        let overlay = mark_boundaries(&annotated, mask.values(), Rgb([255, 255, 0]))?;

        rows.push(ComparisonRow {
            model_name: named.name.clone(),
            predicted_class,
            predicted_label: predicted_label.clone(),
            panels: [
                Panel::Input {
                    image: cropped.clone(),
                    ground_truth: ground_truth.map(str::to_string),
                    predicted: predicted_label,
                },
                Panel::SmoothGrad(smooth),
                Panel::IntegratedGradients(integrated),
                Panel::Perturbation {
                    overlay,
                    mask,
                    label: label_for(class_labels, top),
                },
            ],
        });
    }

    info!("Comparison grid complete: {} rows", rows.len());
    Ok(ComparisonGrid { rows })
}
