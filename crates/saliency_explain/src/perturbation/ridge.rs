//! Weighted ridge regression used as the local surrogate model.

use nalgebra::{DMatrix, DVector};
use ndarray::{Array1, ArrayView1, ArrayView2, Axis};

use crate::error::{ExplainError, Result};

/// A fitted linear surrogate `y ≈ intercept + coefficients · x`.
#[derive(Debug, Clone, PartialEq)]
pub struct RidgeFit {
    /// One coefficient per feature.
    pub coefficients: Array1<f32>,
    /// Unpenalised intercept.
    pub intercept: f32,
}

impl RidgeFit {
    /// Predict one row.
    pub fn predict_row(&self, row: ArrayView1<'_, f32>) -> f32 {
        self.intercept + row.dot(&self.coefficients)
    }

    /// Weighted coefficient of determination on `(x, y)`.
    ///
    /// A constant target (zero total variance) scores 1.0 when the fit is
    /// exact and 0.0 otherwise.
    pub fn score(&self, x: ArrayView2<'_, f32>, y: ArrayView1<'_, f32>, weights: ArrayView1<'_, f32>) -> f32 {
        let wsum: f64 = weights.iter().map(|&w| f64::from(w)).sum();
        if wsum <= 0.0 {
            return 0.0;
        }
        let y_mean = weights
            .iter()
            .zip(y.iter())
            .map(|(&w, &v)| f64::from(w) * f64::from(v))
            .sum::<f64>()
            / wsum;

        let mut residual = 0.0f64;
        let mut total = 0.0f64;
        for ((row, &target), &w) in x.axis_iter(Axis(0)).zip(y.iter()).zip(weights.iter()) {
            let w = f64::from(w);
            let target = f64::from(target);
            let pred = f64::from(self.predict_row(row));
            residual += w * (target - pred).powi(2);
            total += w * (target - y_mean).powi(2);
        }

        if total == 0.0 {
            if residual == 0.0 {
                1.0
            } else {
                0.0
            }
        } else {
            (1.0 - residual / total) as f32
        }
    }
}

/// Fit `min Σ wᵢ (yᵢ - b - xᵢ·β)² + α ‖β‖²`.
///
/// Features and target are centred with weighted means so the intercept is
/// not penalised; the normal equations are solved in f64 with nalgebra's
/// Cholesky factorisation.
pub fn weighted_ridge(
    x: ArrayView2<'_, f32>,
    y: ArrayView1<'_, f32>,
    weights: ArrayView1<'_, f32>,
    alpha: f32,
) -> Result<RidgeFit> {
    let (n, p) = x.dim();
    if y.len() != n || weights.len() != n {
        return Err(ExplainError::invalid(format!(
            "ridge: {} rows but {} targets and {} weights",
            n,
            y.len(),
            weights.len()
        )));
    }
    if n == 0 {
        return Err(ExplainError::invalid("ridge: no samples"));
    }
    if alpha < 0.0 || !alpha.is_finite() {
        return Err(ExplainError::invalid(format!("ridge: alpha must be >= 0, got {alpha}")));
    }

    let w: Vec<f64> = weights.iter().map(|&v| f64::from(v).max(0.0)).collect();
    let wsum: f64 = w.iter().sum();
    if wsum <= 0.0 {
        return Err(ExplainError::invalid("ridge: sample weights sum to zero"));
    }

    let x_mean = DVector::from_fn(p, |j, _| {
        x.column(j)
            .iter()
            .zip(&w)
            .map(|(&v, &wi)| wi * f64::from(v))
            .sum::<f64>()
            / wsum
    });
    let y_mean = y
        .iter()
        .zip(&w)
        .map(|(&v, &wi)| wi * f64::from(v))
        .sum::<f64>()
        / wsum;

    // rows scaled by sqrt(w) so that XcᵀXc is the weighted Gram matrix
    let root_w: Vec<f64> = w.iter().map(|wi| wi.sqrt()).collect();
    let xc = DMatrix::from_fn(n, p, |i, j| root_w[i] * (f64::from(x[[i, j]]) - x_mean[j]));
    let yc = DVector::from_fn(n, |i, _| root_w[i] * (f64::from(y[i]) - y_mean));

    let gram = xc.tr_mul(&xc) + DMatrix::identity(p, p) * f64::from(alpha);
    let rhs = xc.tr_mul(&yc);
    let beta = gram
        .cholesky()
        .ok_or_else(|| ExplainError::upstream("ridge: normal equations are not positive definite"))?
        .solve(&rhs);
    let intercept = y_mean - beta.dot(&x_mean);

    Ok(RidgeFit {
        coefficients: beta.iter().map(|&b| b as f32).collect(),
        intercept: intercept as f32,
    })
}
