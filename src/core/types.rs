//! Core type definitions and algorithm configurations

use crate::core::{DalError, Result};
use std::ops::BitOr;

/// Prediction result containing label and decision value
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    /// Predicted class label (+1 or -1)
    pub label: f64,
    /// Raw decision function value
    pub decision_value: f64,
}

impl Prediction {
    /// Create a new prediction
    pub fn new(label: f64, decision_value: f64) -> Self {
        Self {
            label,
            decision_value,
        }
    }

    /// Get confidence as absolute value of decision value
    pub fn confidence(&self) -> f64 {
        self.decision_value.abs()
    }
}

/// Sparse vector representation with sorted indices
///
/// Used as the row builder for CSR tables.
#[derive(Clone, Debug, PartialEq)]
pub struct SparseVector {
    /// Sorted indices of non-zero elements
    pub indices: Vec<usize>,
    /// Values corresponding to indices
    pub values: Vec<f64>,
}

impl SparseVector {
    /// Create a new sparse vector, ensuring indices are sorted
    pub fn new(indices: Vec<usize>, values: Vec<f64>) -> Self {
        assert_eq!(
            indices.len(),
            values.len(),
            "Indices and values must have same length"
        );

        let mut pairs: Vec<_> = indices.into_iter().zip(values).collect();
        pairs.sort_by_key(|&(idx, _)| idx);

        let (indices, values): (Vec<_>, Vec<_>) = pairs.into_iter().unzip();
        Self { indices, values }
    }

    /// Create an empty sparse vector
    pub fn empty() -> Self {
        Self {
            indices: Vec::new(),
            values: Vec::new(),
        }
    }

    /// Number of non-zero elements
    pub fn nnz(&self) -> usize {
        self.indices.len()
    }

    /// Check if vector is empty
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// Distance used by K-Means
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DistanceType {
    #[default]
    Euclidean,
}

/// K-Means computation method, tied to the input table layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KMeansMethod {
    /// Lloyd iterations over dense tables
    #[default]
    LloydDense,
    /// Lloyd iterations over CSR tables
    LloydCsr,
}

/// Bitmask selecting which K-Means outputs to compute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResultsToEvaluate(u8);

impl ResultsToEvaluate {
    pub const NONE: Self = Self(0);
    pub const CENTROIDS: Self = Self(1);
    pub const ASSIGNMENTS: Self = Self(1 << 1);
    pub const OBJECTIVE_FUNCTION: Self = Self(1 << 2);
    pub const ALL: Self = Self(0b111);

    /// Check whether every flag in `other` is set
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Raw bit representation
    pub fn bits(self) -> u8 {
        self.0
    }
}

impl Default for ResultsToEvaluate {
    fn default() -> Self {
        Self::ALL
    }
}

impl BitOr for ResultsToEvaluate {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Configuration for K-Means Lloyd clustering
#[derive(Debug, Clone)]
pub struct KMeansConfig {
    /// Number of clusters (K)
    pub n_clusters: usize,
    /// Maximum number of Lloyd iterations; 0 assigns against the initial centroids only
    pub max_iterations: usize,
    /// Iteration stops once the summed squared centroid shift is at or below this value
    pub accuracy_threshold: f64,
    /// Distance metric
    pub distance_type: DistanceType,
    /// Outputs to compute
    pub results_to_evaluate: ResultsToEvaluate,
    /// Computation method
    pub method: KMeansMethod,
    /// Rows per partition when a single table is processed in batch mode
    pub block_size: usize,
}

impl Default for KMeansConfig {
    fn default() -> Self {
        Self {
            n_clusters: 2,
            max_iterations: 100,
            accuracy_threshold: 0.0,
            distance_type: DistanceType::Euclidean,
            results_to_evaluate: ResultsToEvaluate::ALL,
            method: KMeansMethod::LloydDense,
            block_size: 512,
        }
    }
}

impl KMeansConfig {
    /// Validate parameter ranges
    pub fn validate(&self) -> Result<()> {
        if self.n_clusters == 0 {
            return Err(DalError::InvalidParameter(
                "Number of clusters must be positive".to_string(),
            ));
        }
        if !(self.accuracy_threshold >= 0.0) {
            return Err(DalError::InvalidParameter(format!(
                "Accuracy threshold must be non-negative, got {}",
                self.accuracy_threshold
            )));
        }
        if self.block_size == 0 {
            return Err(DalError::InvalidParameter(
                "Block size must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Kernel-value cache strategy used during SVM training
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheKind {
    /// Recompute the working-set kernel block every iteration
    #[default]
    NoCache,
    /// Keep every computed kernel row for the whole training run
    Simple,
    /// Keep a bounded number of kernel rows, evicting the least recently used
    Lru,
}

/// Configuration for SVM training
#[derive(Debug, Clone)]
pub struct OptimizerConfig {
    /// Regularization parameter (upper bound for alpha)
    pub c: f64,
    /// Tolerance on the maximal KKT violation gap
    pub epsilon: f64,
    /// Maximum number of outer (working-set) iterations
    pub max_iterations: usize,
    /// Working set size; derived from the execution device when `None`
    pub working_set_size: Option<usize>,
    /// Maximum number of pair updates inside one working-set solve
    pub inner_max_iterations: usize,
    /// Kernel cache strategy
    pub cache_kind: CacheKind,
    /// Kernel cache size in bytes (bounds the LRU variant)
    pub cache_size: usize,
    /// Stop after this many consecutive iterations without gap change
    pub n_no_changes: usize,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            c: 1.0,
            epsilon: 0.001,
            max_iterations: 10000,
            working_set_size: None,
            inner_max_iterations: 1000,
            cache_kind: CacheKind::NoCache,
            cache_size: 100_000_000, // 100MB
            n_no_changes: 5,
        }
    }
}

impl OptimizerConfig {
    /// Validate parameter ranges
    pub fn validate(&self) -> Result<()> {
        if !(self.c > 0.0) || !self.c.is_finite() {
            return Err(DalError::InvalidParameter(format!(
                "C must be positive and finite, got {}",
                self.c
            )));
        }
        if !(self.epsilon > 0.0) {
            return Err(DalError::InvalidParameter(format!(
                "Epsilon must be positive, got {}",
                self.epsilon
            )));
        }
        if let Some(w) = self.working_set_size {
            if w < 2 || !w.is_power_of_two() {
                return Err(DalError::InvalidParameter(format!(
                    "Working set size must be a power of two >= 2, got {w}"
                )));
            }
        }
        if self.inner_max_iterations == 0 {
            return Err(DalError::InvalidParameter(
                "Inner iteration limit must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
