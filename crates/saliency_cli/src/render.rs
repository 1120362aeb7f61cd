//! PNG rendering of saliency maps and comparison grids.

use std::path::Path;

use anyhow::{Context, Result};
use image::{imageops, Rgb, RgbImage};
use saliency_explain::{ComparisonGrid, Panel, SaliencyMap};
use serde::Serialize;

const TILE_GAP: u32 = 4;

/// Map a value in [0, 1] onto the black-red-yellow-white "hot" colormap.
pub fn hot(t: f32) -> Rgb<u8> {
    let t = t.clamp(0.0, 1.0);
    let channel = |offset: f32| ((3.0 * t - offset).clamp(0.0, 1.0) * 255.0).round() as u8;
    Rgb([channel(0.0), channel(1.0), channel(2.0)])
}

/// Render a saliency map with the hot colormap after scaling to [0, 1].
pub fn heatmap(map: &SaliencyMap) -> RgbImage {
    let normalized = map.normalize();
    let values = normalized.values();
    let (height, width) = values.dim();
    RgbImage::from_fn(width as u32, height as u32, |x, y| {
        hot(values[[y as usize, x as usize]])
    })
}

/// Image shown for a panel.
pub fn panel_image(panel: &Panel) -> RgbImage {
    match panel {
        Panel::Input { image, .. } => image.clone(),
        Panel::SmoothGrad(map) | Panel::IntegratedGradients(map) => heatmap(map),
        Panel::Perturbation { overlay, .. } => overlay.clone(),
    }
}

fn panel_slug(panel: &Panel) -> &'static str {
    match panel {
        Panel::Input { .. } => "input",
        Panel::SmoothGrad(_) => "smoothgrad",
        Panel::IntegratedGradients(_) => "integrated_gradients",
        Panel::Perturbation { .. } => "lime",
    }
}

/// Tile images into rows separated by a white gap.
pub fn stitch(rows: &[Vec<RgbImage>]) -> RgbImage {
    let tile_w = rows.iter().flatten().map(RgbImage::width).max().unwrap_or(0);
    let tile_h = rows.iter().flatten().map(RgbImage::height).max().unwrap_or(0);
    let n_cols = rows.iter().map(Vec::len).max().unwrap_or(0) as u32;
    let n_rows = rows.len() as u32;

    let width = n_cols * tile_w + n_cols.saturating_sub(1) * TILE_GAP;
    let height = n_rows * tile_h + n_rows.saturating_sub(1) * TILE_GAP;
    let mut canvas = RgbImage::from_pixel(width, height, Rgb([255, 255, 255]));

    for (r, row) in rows.iter().enumerate() {
        for (c, tile) in row.iter().enumerate() {
            let x = c as u32 * (tile_w + TILE_GAP);
            let y = r as u32 * (tile_h + TILE_GAP);
            imageops::replace(&mut canvas, tile, i64::from(x), i64::from(y));
        }
    }
    canvas
}

/// One rendered panel in the summary.
#[derive(Debug, Serialize)]
pub struct PanelSummary {
    /// Caption.
    pub title: String,
    /// File name relative to the output directory.
    pub file: String,
}

/// One model in the summary.
#[derive(Debug, Serialize)]
pub struct RowSummary {
    /// Model display name.
    pub model: String,
    /// Predicted class index.
    pub predicted_class: usize,
    /// Predicted class label.
    pub predicted_label: String,
    /// Rendered panels, left to right.
    pub panels: Vec<PanelSummary>,
}

/// Contents of `summary.json`.
#[derive(Debug, Serialize)]
pub struct Summary {
    /// Stitched grid file name.
    pub grid: String,
    /// Per-model rows.
    pub rows: Vec<RowSummary>,
}

fn file_stem(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect()
}

/// Write every panel, the stitched grid and `summary.json` into `out_dir`.
pub fn write_grid(grid: &ComparisonGrid, out_dir: &Path) -> Result<Summary> {
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("Failed to create output directory {}", out_dir.display()))?;

    let mut tiles = Vec::with_capacity(grid.len());
    let mut rows = Vec::with_capacity(grid.len());

    for (i, row) in grid.rows().iter().enumerate() {
        let stem = format!("{:02}_{}", i, file_stem(&row.model_name));
        let mut row_tiles = Vec::with_capacity(row.panels.len());
        let mut panels = Vec::with_capacity(row.panels.len());

        for panel in &row.panels {
            let image = panel_image(panel);
            let file = format!("{}_{}.png", stem, panel_slug(panel));
            image
                .save(out_dir.join(&file))
                .with_context(|| format!("Failed to write {}", file))?;
            panels.push(PanelSummary {
                title: panel.title(),
                file,
            });
            row_tiles.push(image);
        }

        tiles.push(row_tiles);
        rows.push(RowSummary {
            model: row.model_name.clone(),
            predicted_class: row.predicted_class,
            predicted_label: row.predicted_label.clone(),
            panels,
        });
    }

    let grid_file = "grid.png".to_string();
    stitch(&tiles)
        .save(out_dir.join(&grid_file))
        .context("Failed to write grid.png")?;

    let summary = Summary {
        grid: grid_file,
        rows,
    };
    let json = serde_json::to_string_pretty(&summary)?;
    std::fs::write(out_dir.join("summary.json"), json).context("Failed to write summary.json")?;
    Ok(summary)
}
