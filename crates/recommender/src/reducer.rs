//! Dimensionality Reducer
//!
//! Principal component projection fit offline on the full training feature
//! matrix. The component count `k` is the smallest number of components whose
//! cumulative explained variance reaches the target (0.95 by default) and is
//! fixed for the life of the fitted reducer.

use crate::error::{RecommenderError, Result};
use linfa_linalg::eigh::Eigh;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

pub const DEFAULT_VARIANCE_TARGET: f64 = 0.95;

const VARIANCE_TOLERANCE: f64 = 1e-12;

/// Serializable representation of [`Pca`]
#[derive(Debug, Clone, Serialize, Deserialize)]
struct PcaParams {
    mean: Vec<f64>,
    components_shape: (usize, usize),
    components_data: Vec<f64>,
    explained_variance_ratio: Vec<f64>,
}

/// Fitted linear reducer: center, then project onto the top `k` components
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "PcaParams", into = "PcaParams")]
pub struct Pca {
    mean: Array1<f64>,
    /// `[k, D]`, one principal axis per row
    components: Array2<f64>,
    explained_variance_ratio: Vec<f64>,
}

impl From<Pca> for PcaParams {
    fn from(pca: Pca) -> Self {
        Self {
            mean: pca.mean.to_vec(),
            components_shape: pca.components.dim(),
            components_data: pca.components.iter().copied().collect(),
            explained_variance_ratio: pca.explained_variance_ratio,
        }
    }
}

impl TryFrom<PcaParams> for Pca {
    type Error = String;

    fn try_from(params: PcaParams) -> std::result::Result<Self, Self::Error> {
        let components = Array2::from_shape_vec(params.components_shape, params.components_data)
            .map_err(|e| format!("Failed to reconstruct components: {e}"))?;

        if components.ncols() != params.mean.len() {
            return Err(format!(
                "components have {} columns but mean has {} entries",
                components.ncols(),
                params.mean.len()
            ));
        }
        if components.nrows() == 0 {
            return Err("reducer has no components".to_string());
        }

        Ok(Self {
            mean: Array1::from_vec(params.mean),
            components,
            explained_variance_ratio: params.explained_variance_ratio,
        })
    }
}

impl Pca {
    /// Fit on an `[n, D]` matrix
    pub fn fit(x: ArrayView2<f64>, variance_target: f64) -> Result<Self> {
        let (n_samples, n_features) = x.dim();

        if n_samples < 2 {
            return Err(RecommenderError::Fit(format!(
                "reducer needs at least 2 samples, got {n_samples}"
            )));
        }
        if n_features == 0 {
            return Err(RecommenderError::Fit("reducer input has no features".into()));
        }
        if !(variance_target > 0.0 && variance_target <= 1.0) {
            return Err(RecommenderError::Fit(format!(
                "variance target must be in (0, 1], got {variance_target}"
            )));
        }

        let mean = x
            .mean_axis(Axis(0))
            .ok_or_else(|| RecommenderError::Fit("empty feature matrix".into()))?;
        let centered = &x - &mean;
        let covariance = centered.t().dot(&centered) / (n_samples - 1) as f64;

        let (eigenvalues, eigenvectors) = covariance
            .eigh()
            .map_err(|e| RecommenderError::Fit(format!("eigen-decomposition failed: {e}")))?;

        let mut order: Vec<usize> = (0..n_features).collect();
        order.sort_by(|&a, &b| eigenvalues[b].total_cmp(&eigenvalues[a]).then(a.cmp(&b)));

        let variances: Vec<f64> = order.iter().map(|&i| eigenvalues[i].max(0.0)).collect();
        let total: f64 = variances.iter().sum();

        let ratios: Vec<f64> = if total > VARIANCE_TOLERANCE {
            variances.iter().map(|v| v / total).collect()
        } else {
            vec![0.0; n_features]
        };

        let k = if total > VARIANCE_TOLERANCE {
            let mut cumulative = 0.0;
            ratios
                .iter()
                .position(|r| {
                    cumulative += r;
                    cumulative + VARIANCE_TOLERANCE >= variance_target
                })
                .map(|i| i + 1)
                .unwrap_or(n_features)
        } else {
            1
        };

        let mut components = Array2::<f64>::zeros((k, n_features));
        for (row, &col) in order.iter().take(k).enumerate() {
            let mut axis = eigenvectors.column(col).to_owned();
            // Deterministic orientation: largest-magnitude entry positive
            let pivot = axis
                .iter()
                .copied()
                .fold(0.0_f64, |best, v| if v.abs() > best.abs() { v } else { best });
            if pivot < 0.0 {
                axis.mapv_inplace(|v| -v);
            }
            components.row_mut(row).assign(&axis);
        }

        tracing::info!(
            "Fitted reducer: {} -> {} dimensions ({:.4} variance retained)",
            n_features,
            k,
            ratios.iter().take(k).sum::<f64>()
        );

        Ok(Self {
            mean,
            components,
            explained_variance_ratio: ratios.into_iter().take(k).collect(),
        })
    }

    /// Input dimension `D`
    pub fn input_dim(&self) -> usize {
        self.mean.len()
    }

    /// Output dimension `k`
    pub fn output_dim(&self) -> usize {
        self.components.nrows()
    }

    pub fn explained_variance_ratio(&self) -> &[f64] {
        &self.explained_variance_ratio
    }

    pub fn reduce(&self, features: &[f64]) -> Result<Vec<f64>> {
        if features.len() != self.input_dim() {
            return Err(RecommenderError::DimensionMismatch {
                expected: self.input_dim(),
                actual: features.len(),
            });
        }

        let centered = &ArrayView1::from(features) - &self.mean;
        Ok(self.components.dot(&centered).to_vec())
    }

    /// Reduce every row of an `[n, D]` matrix into `[n, k]`
    pub fn reduce_batch(&self, x: ArrayView2<f64>) -> Result<Array2<f64>> {
        if x.ncols() != self.input_dim() {
            return Err(RecommenderError::DimensionMismatch {
                expected: self.input_dim(),
                actual: x.ncols(),
            });
        }

        let centered = &x - &self.mean;
        Ok(centered.dot(&self.components.t()))
    }
}
