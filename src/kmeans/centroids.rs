//! Centroid set owned by the Lloyd iteration controller

use crate::core::{DalError, Result};
use crate::table::NumericTable;

/// K cluster centers of F features each, stored row-major
///
/// Squared norms are computed on construction so the norm-assisted distance
/// kernels can reuse them for the whole iteration.
#[derive(Debug, Clone, PartialEq)]
pub struct Centroids {
    n_clusters: usize,
    n_features: usize,
    values: Vec<f64>,
    norms: Vec<f64>,
}

impl Centroids {
    /// Create a centroid set from row-major values
    pub fn new(n_clusters: usize, n_features: usize, values: Vec<f64>) -> Result<Self> {
        if n_clusters == 0 {
            return Err(DalError::InvalidParameter(
                "Centroid set must hold at least one cluster".to_string(),
            ));
        }
        if values.len() != n_clusters * n_features {
            return Err(DalError::DimensionMismatch {
                expected: n_clusters * n_features,
                actual: values.len(),
            });
        }
        let norms = values
            .chunks(n_features.max(1))
            .take(n_clusters)
            .map(|c| c.iter().map(|v| v * v).sum())
            .collect();
        Ok(Self {
            n_clusters,
            n_features,
            values,
            norms,
        })
    }

    /// Create a centroid set from a list of equally sized rows
    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self> {
        let n_features = rows.first().map(|r| r.len()).unwrap_or(0);
        let mut values = Vec::with_capacity(rows.len() * n_features);
        for row in rows {
            if row.len() != n_features {
                return Err(DalError::DimensionMismatch {
                    expected: n_features,
                    actual: row.len(),
                });
            }
            values.extend_from_slice(row);
        }
        Self::new(rows.len(), n_features, values)
    }

    /// Take every row of a table as a centroid
    pub fn from_table(table: &NumericTable) -> Result<Self> {
        let n_features = table.n_columns();
        let mut values = vec![0.0; table.n_rows() * n_features];
        for (i, chunk) in values.chunks_mut(n_features.max(1)).enumerate() {
            if i < table.n_rows() {
                table.row(i).write_dense(chunk);
            }
        }
        Self::new(table.n_rows(), n_features, values)
    }

    pub fn n_clusters(&self) -> usize {
        self.n_clusters
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// Center of cluster `k`
    pub fn row(&self, k: usize) -> &[f64] {
        &self.values[k * self.n_features..(k + 1) * self.n_features]
    }

    /// Row-major values
    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    /// Squared L2 norm of every center
    pub fn norms_squared(&self) -> &[f64] {
        &self.norms
    }

    /// Sum over clusters of the squared distance each center moved
    pub fn squared_shift(&self, other: &Centroids) -> Result<f64> {
        if self.n_clusters != other.n_clusters || self.n_features != other.n_features {
            return Err(DalError::PartialShapeMismatch {
                expected_clusters: self.n_clusters,
                expected_features: self.n_features,
                actual_clusters: other.n_clusters,
                actual_features: other.n_features,
            });
        }
        Ok(self
            .values
            .iter()
            .zip(&other.values)
            .map(|(a, b)| (a - b) * (a - b))
            .sum())
    }

    /// Centers as a list of rows
    pub fn to_rows(&self) -> Vec<Vec<f64>> {
        (0..self.n_clusters).map(|k| self.row(k).to_vec()).collect()
    }
}
