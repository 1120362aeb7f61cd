//! saliency-rs CLI: explain image classifier predictions and compare models.

mod render;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use burn_autodiff::Autodiff;
use burn_ndarray::NdArray;
use image::{Rgb, RgbImage};
use saliency_core::{load_rgb_image, ExecutionContext, ImageClassifier, Preprocessor, Seed};
use saliency_explain::{
    compare_models, explain_with_perturbation, integrated_gradients, mark_boundaries, smooth_grad,
    ComparisonConfig, NamedModel,
};
use saliency_models::{load_image_cnn, ImageCnn, ImageCnnConfig};

/// Backend type for explanations (gradients need autodiff).
type ExplainBackend = Autodiff<NdArray>;

#[derive(Parser)]
#[command(name = "saliency")]
#[command(author, version)]
#[command(about = "Explain image classifier predictions with SmoothGrad, Integrated Gradients and LIME")]
#[command(long_about = "saliency-rs: post-hoc explanations for image classifiers.

EXAMPLES:
  # All three explanations for one model
  saliency explain --image bird.jpg --checkpoint runs/erm

  # Only Integrated Gradients, fixed seed
  saliency explain --image bird.jpg --checkpoint runs/erm --method ig --seed 7

  # Compare two checkpoints side by side
  saliency compare --image bird.jpg \\
      --checkpoint runs/erm --name ERM \\
      --checkpoint runs/dro --name GroupDRO \\
      --labels Landbird,Waterbird --ground-truth Waterbird

Checkpoints are given by stem: runs/erm means runs/erm.mpk + runs/erm.json.")]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Method {
    /// Noisy-gradient averaging
    Smoothgrad,
    /// Integrated Gradients
    Ig,
    /// LIME segment perturbation
    Lime,
    /// Every method
    All,
}

impl Method {
    fn includes(self, other: Method) -> bool {
        self == Method::All || self == other
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Explain one model's prediction on an image
    Explain {
        /// Input image (PNG or JPEG)
        #[arg(long, value_name = "PATH")]
        image: PathBuf,

        /// Explanation method
        #[arg(long, value_enum, default_value = "all")]
        method: Method,

        /// Checkpoint stem; a randomly initialized CNN is used when omitted
        #[arg(long, value_name = "STEM")]
        checkpoint: Option<PathBuf>,

        /// Number of classes for a randomly initialized CNN
        #[arg(long, default_value = "2", value_name = "N")]
        classes: usize,

        /// Output directory
        #[arg(long, default_value = "./saliency_out", value_name = "DIR")]
        output: PathBuf,

        /// Seed for every random stream
        #[arg(long, value_name = "SEED")]
        seed: Option<u64>,

        /// JSON file with method settings
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,
    },
    /// Compare every method across several checkpoints
    Compare {
        /// Input image (PNG or JPEG)
        #[arg(long, value_name = "PATH")]
        image: PathBuf,

        /// Checkpoint stem (repeat once per model)
        #[arg(long = "checkpoint", value_name = "STEM", required = true)]
        checkpoints: Vec<PathBuf>,

        /// Display name (repeat once per checkpoint)
        #[arg(long = "name", value_name = "NAME")]
        names: Vec<String>,

        /// Comma-separated class labels; defaults to the checkpoint metadata
        #[arg(long, value_delimiter = ',', value_name = "LABELS")]
        labels: Vec<String>,

        /// Known label of the image
        #[arg(long, value_name = "LABEL")]
        ground_truth: Option<String>,

        /// Output directory
        #[arg(long, default_value = "./saliency_out", value_name = "DIR")]
        output: PathBuf,

        /// Seed for every random stream
        #[arg(long, value_name = "SEED")]
        seed: Option<u64>,

        /// JSON file with method settings
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let log_level = match cli.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::filter::LevelFilter::from_level(log_level))
        .init();

    let ctx = ExecutionContext::<ExplainBackend>::default();

    match cli.command {
        Commands::Explain {
            image,
            method,
            checkpoint,
            classes,
            output,
            seed,
            config,
        } => handle_explain(
            &ctx,
            &image,
            method,
            checkpoint.as_deref(),
            classes,
            &output,
            seed,
            config.as_deref(),
        ),
        Commands::Compare {
            image,
            checkpoints,
            names,
            labels,
            ground_truth,
            output,
            seed,
            config,
        } => handle_compare(
            &ctx,
            &image,
            &checkpoints,
            names,
            labels,
            ground_truth,
            &output,
            seed,
            config.as_deref(),
        ),
    }
}

fn load_image(path: &Path) -> Result<RgbImage> {
    load_rgb_image(path).with_context(|| format!("Failed to open image {}", path.display()))
}

/// Method settings from `--config`, with `--seed` applied to every stream.
fn load_config(path: Option<&Path>, seed: Option<u64>) -> Result<ComparisonConfig> {
    let mut config = match path {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config {}", path.display()))?;
            serde_json::from_str::<ComparisonConfig>(&json)
                .with_context(|| format!("Invalid config {}", path.display()))?
        }
        None => ComparisonConfig::default(),
    };

    if let Some(seed) = seed {
        let seed = Seed::new(seed);
        config.smooth_grad.seed = seed;
        config.integrated_gradients.seed = seed;
        config.lime.seed = seed;
    }
    Ok(config)
}

fn load_or_init(
    checkpoint: Option<&Path>,
    classes: usize,
    ctx: &ExecutionContext<ExplainBackend>,
) -> Result<(ImageCnn<ExplainBackend>, Vec<String>)> {
    match checkpoint {
        Some(stem) => {
            let (model, metadata) = load_image_cnn::<ExplainBackend>(stem, ctx.device())
                .with_context(|| format!("Failed to load checkpoint {}", stem.display()))?;
            Ok((model, metadata.class_labels))
        }
        None => {
            tracing::warn!("No checkpoint given; explaining a randomly initialized CNN");
            Ok((ImageCnnConfig::new(classes).init(ctx.device()), Vec::new()))
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn handle_explain(
    ctx: &ExecutionContext<ExplainBackend>,
    image_path: &Path,
    method: Method,
    checkpoint: Option<&Path>,
    classes: usize,
    output: &Path,
    seed: Option<u64>,
    config_path: Option<&Path>,
) -> Result<()> {
    if classes == 0 {
        bail!("--classes must be at least 1");
    }
    let image = load_image(image_path)?;
    let config = load_config(config_path, seed)?;
    let preprocessor = Preprocessor::default();
    let (model, labels) = load_or_init(checkpoint, classes, ctx)?;

    std::fs::create_dir_all(output)
        .with_context(|| format!("Failed to create output directory {}", output.display()))?;
    println!("Explaining {} ({} classes)", image_path.display(), model.n_classes());

    if method.includes(Method::Smoothgrad) {
        let map = smooth_grad(&model, &image, &preprocessor, &config.smooth_grad, ctx)
            .context("SmoothGrad failed")?;
        let path = output.join("smoothgrad.png");
        render::heatmap(&map).save(&path)?;
        println!("  Smoothed Gradients     -> {} (max {:.4})", path.display(), map.max());
    }

    if method.includes(Method::Ig) {
        let map = integrated_gradients(
            &model,
            &image,
            &preprocessor,
            &config.integrated_gradients,
            ctx,
        )
        .context("Integrated Gradients failed")?;
        let path = output.join("integrated_gradients.png");
        render::heatmap(&map).save(&path)?;
        println!("  Integrated Gradients   -> {} (max {:.4})", path.display(), map.max());
    }

    if method.includes(Method::Lime) {
        let explainer = config.lime_explainer();
        let explanation = explain_with_perturbation(
            &model,
            &image,
            &preprocessor,
            &explainer,
            &config.perturbation,
            ctx,
        )
        .context("LIME failed")?;
        let Some(&top) = explanation.top_labels().first() else {
            bail!("LIME returned no labels");
        };
        let (annotated, mask) = explanation.segment_mask(top, &config.mask)?;
        let overlay = mark_boundaries(&annotated, mask.values(), Rgb([255, 255, 0]))?;
        let path = output.join("lime.png");
        overlay.save(&path)?;

        let label = labels.get(top).cloned().unwrap_or_else(|| top.to_string());
        println!(
            "  LIME (class {})        -> {} ({} segments, {} pixels kept)",
            label,
            path.display(),
            explanation.n_segments(),
            mask.count()
        );
    }

    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn handle_compare(
    ctx: &ExecutionContext<ExplainBackend>,
    image_path: &Path,
    checkpoints: &[PathBuf],
    names: Vec<String>,
    labels: Vec<String>,
    ground_truth: Option<String>,
    output: &Path,
    seed: Option<u64>,
    config_path: Option<&Path>,
) -> Result<()> {
    let names = if names.is_empty() {
        checkpoints
            .iter()
            .map(|p| {
                p.file_stem()
                    .map_or_else(|| p.display().to_string(), |s| s.to_string_lossy().into_owned())
            })
            .collect()
    } else if names.len() == checkpoints.len() {
        names
    } else {
        bail!(
            "Got {} --name values for {} checkpoints",
            names.len(),
            checkpoints.len()
        );
    };

    let image = load_image(image_path)?;
    let config = load_config(config_path, seed)?;
    let preprocessor = Preprocessor::default();

    let mut models = Vec::with_capacity(checkpoints.len());
    let mut labels = labels;
    for stem in checkpoints {
        let (model, metadata) = load_image_cnn::<ExplainBackend>(stem, ctx.device())
            .with_context(|| format!("Failed to load checkpoint {}", stem.display()))?;
        if labels.is_empty() {
            labels = metadata.class_labels;
        }
        models.push(model);
    }

    let named: Vec<NamedModel<'_, ExplainBackend>> = names
        .iter()
        .zip(&models)
        .map(|(name, model)| {
            NamedModel::new(name.clone(), model as &dyn ImageClassifier<ExplainBackend>)
        })
        .collect();

    let explainer = config.lime_explainer();
    let grid = compare_models(
        &named,
        &image,
        &labels,
        ground_truth.as_deref(),
        &preprocessor,
        &config,
        &explainer,
        ctx,
    )
    .context("Comparison failed")?;

    let summary = render::write_grid(&grid, output)?;
    for row in &summary.rows {
        println!("{:<20} predicts {}", row.model, row.predicted_label);
    }
    println!("Grid written to {}", output.join(&summary.grid).display());
    Ok(())
}
