//! End-to-end tests: real CNNs, checkpoints and the comparison harness.

use approx::assert_relative_eq;
use burn::prelude::*;
use burn_autodiff::Autodiff;
use burn_ndarray::NdArray;
use image::{Rgb, RgbImage};
use ndarray::Array3;

use saliency::explain::perturbation::GridSegmenter;
use saliency::prelude::*;

type ExplainBackend = Autodiff<NdArray>;

fn small_preprocessor() -> Preprocessor {
    Preprocessor::new(PreprocessConfig::default().with_sizes(32, 24)).unwrap()
}

fn bird_like_image() -> RgbImage {
    RgbImage::from_fn(40, 40, |x, y| {
        if (x as i32 - 20).pow(2) + (y as i32 - 20).pow(2) < 100 {
            Rgb([200, 150, 40])
        } else {
            Rgb([30, 90, (y * 5) as u8])
        }
    })
}

fn small_cnn(device: &<ExplainBackend as Backend>::Device) -> ImageCnn<ExplainBackend> {
    ImageCnnConfig::new(2).with_channels(vec![4, 8]).init(device)
}

fn scores(model: &ImageCnn<ExplainBackend>, ctx: &ExecutionContext<ExplainBackend>) -> Vec<f32> {
    let input = small_preprocessor()
        .preprocess::<ExplainBackend>(&bird_like_image(), ctx.device())
        .unwrap();
    model
        .forward(input, ExecutionMode::Inference)
        .into_data()
        .to_vec()
        .unwrap()
}

/// Stub classifier with fixed scores, still connected to its input.
struct ConstantScores(Vec<f32>);

impl<B: Backend> ImageClassifier<B> for ConstantScores {
    fn forward(&self, images: Tensor<B, 4>, _mode: ExecutionMode) -> Tensor<B, 2> {
        let [batch, _, _, _] = images.dims();
        let n = self.0.len();
        let anchor = images.flatten::<2>(1, 3).sum_dim(1).mul_scalar(0.0).repeat_dim(1, n);
        let fixed = Tensor::<B, 1>::from_floats(self.0.as_slice(), &anchor.device())
            .reshape([1, n])
            .repeat_dim(0, batch);
        anchor + fixed
    }

    fn n_classes(&self) -> usize {
        self.0.len()
    }
}

#[test]
fn test_gradient_maps_on_cnn() {
    let ctx = ExecutionContext::<ExplainBackend>::default();
    let model = small_cnn(ctx.device());
    let preprocessor = small_preprocessor();
    let image = bird_like_image();
    let before = scores(&model, &ctx);

    let sg = smooth_grad(
        &model,
        &image,
        &preprocessor,
        &SmoothGradConfig::default().with_n_samples(4),
        &ctx,
    )
    .unwrap();
    let ig = integrated_gradients(
        &model,
        &image,
        &preprocessor,
        &IntegratedGradientsConfig::default().with_n_steps(5),
        &ctx,
    )
    .unwrap();

    for map in [&sg, &ig] {
        assert_eq!(map.dims(), (24, 24));
        assert!(map.values().iter().all(|&v| v >= 0.0 && v.is_finite()));
    }
    assert_eq!(sg.n_samples(), 4);
    assert_eq!(ig.n_samples(), 4);

    // explanation must leave the weights untouched
    assert_eq!(before, scores(&model, &ctx));
}

#[test]
fn test_default_pipeline_from_array() {
    let ctx = ExecutionContext::<ExplainBackend>::default();
    let model = ImageCnnConfig::new(3).with_channels(vec![4]).init(ctx.device());
    let pixels = Array3::from_shape_fn((60, 80, 3), |(y, x, c)| ((x + y + c * 40) % 256) as u8);
    let image = image_from_array(&pixels).unwrap();

    let map = smooth_grad(
        &model,
        &image,
        &Preprocessor::default(),
        &SmoothGradConfig::default().with_n_samples(1),
        &ctx,
    )
    .unwrap();
    assert_eq!(map.dims(), (224, 224));
}

#[test]
fn test_checkpoint_reload_gives_same_map() {
    let dir = tempfile::tempdir().unwrap();
    let stem = dir.path().join("erm");
    let ctx = ExecutionContext::<ExplainBackend>::default();

    let config = ImageCnnConfig::new(2).with_channels(vec![4, 8]);
    let model = config.init::<ExplainBackend>(ctx.device());
    let meta = CheckpointMetadata::for_image_cnn(&config)
        .unwrap()
        .with_labels(["Landbird", "Waterbird"])
        .with_objective("ERM");
    save_image_cnn(&model, &meta, &stem).unwrap();
    let (loaded, loaded_meta) = load_image_cnn::<ExplainBackend>(&stem, ctx.device()).unwrap();
    assert_eq!(loaded_meta.class_labels, vec!["Landbird", "Waterbird"]);

    let ig_config = IntegratedGradientsConfig::default().with_n_steps(4);
    let preprocessor = small_preprocessor();
    let a = integrated_gradients(&model, &bird_like_image(), &preprocessor, &ig_config, &ctx).unwrap();
    let b = integrated_gradients(&loaded, &bird_like_image(), &preprocessor, &ig_config, &ctx).unwrap();

    for (x, y) in a.values().iter().zip(b.values().iter()) {
        assert_relative_eq!(*x, *y, epsilon = 1e-6);
    }
}

#[test]
fn test_comparison_rows_with_stub_models() {
    let ctx = ExecutionContext::<ExplainBackend>::default();
    let erm = ConstantScores(vec![3.0, 1.0]);
    let dro = ConstantScores(vec![1.0, 3.0]);
    let models = vec![
        NamedModel::new("ERM", &erm as &dyn ImageClassifier<ExplainBackend>),
        NamedModel::new("GroupDRO", &dro as &dyn ImageClassifier<ExplainBackend>),
    ];
    let labels = vec!["Landbird".to_string(), "Waterbird".to_string()];
    let config = ComparisonConfig {
        smooth_grad: SmoothGradConfig::default().with_n_samples(2),
        integrated_gradients: IntegratedGradientsConfig::default().with_n_steps(3),
        perturbation: PerturbationConfig::default().with_num_samples(16),
        mask: MaskOptions::default(),
        ..Default::default()
    };
    let explainer = LimeImageExplainer::default().with_segmenter(GridSegmenter::new(8));

    let grid = compare_models(
        &models,
        &bird_like_image(),
        &labels,
        Some("Waterbird"),
        &small_preprocessor(),
        &config,
        &explainer,
        &ctx,
    )
    .unwrap();

    assert_eq!(grid.len(), 2);
    assert_eq!(grid.rows()[0].model_name, "ERM");
    assert_eq!(grid.rows()[0].predicted_label, "Landbird");
    assert_eq!(grid.rows()[1].model_name, "GroupDRO");
    assert_eq!(grid.rows()[1].predicted_label, "Waterbird");

    for row in grid.rows() {
        assert_eq!(row.panels.len(), 4);
        match &row.panels[0] {
            Panel::Input {
                image,
                ground_truth,
                predicted,
            } => {
                assert_eq!(image.dimensions(), (24, 24));
                assert_eq!(ground_truth.as_deref(), Some("Waterbird"));
                assert_eq!(predicted, &row.predicted_label);
            }
            other => panic!("expected input panel, got {:?}", other.title()),
        }
        // constant scores have zero gradient everywhere
        match (&row.panels[1], &row.panels[2]) {
            (Panel::SmoothGrad(sg), Panel::IntegratedGradients(ig)) => {
                assert_eq!(sg.max(), 0.0);
                assert_eq!(ig.max(), 0.0);
            }
            _ => panic!("gradient panels out of order"),
        }
        match &row.panels[3] {
            Panel::Perturbation { overlay, mask, label } => {
                assert_eq!(overlay.dimensions(), (24, 24));
                assert_eq!(mask.dims(), (24, 24));
                assert_eq!(label, &row.predicted_label);
            }
            _ => panic!("expected perturbation panel"),
        }
    }
}

#[test]
fn test_comparison_with_real_cnns() {
    let ctx = ExecutionContext::<ExplainBackend>::default();
    let a = small_cnn(ctx.device());
    let b = small_cnn(ctx.device());
    let models = vec![
        NamedModel::new("a", &a as &dyn ImageClassifier<ExplainBackend>),
        NamedModel::new("b", &b as &dyn ImageClassifier<ExplainBackend>),
    ];
    let config = ComparisonConfig {
        smooth_grad: SmoothGradConfig::default().with_n_samples(2),
        integrated_gradients: IntegratedGradientsConfig::default().with_n_steps(3),
        perturbation: PerturbationConfig::default().with_num_samples(10),
        mask: MaskOptions::default(),
        ..Default::default()
    };

    let grid = compare_models(
        &models,
        &bird_like_image(),
        &[],
        None,
        &small_preprocessor(),
        &config,
        &config.lime_explainer(),
        &ctx,
    )
    .unwrap();

    let names: Vec<&str> = grid.rows().iter().map(|r| r.model_name.as_str()).collect();
    assert_eq!(names, ["a", "b"]);
    assert!(grid.rows().iter().all(|r| r.predicted_class < 2));
}
