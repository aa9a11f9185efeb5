//! High-level API for clustering and SVM classification
//!
//! This module provides builder-style front ends over the engines:
//! [`KMeans`] picks initial centroids and runs Lloyd iterations, [`SVM`]
//! trains a kernel classifier and wraps it for prediction and evaluation.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use rdal::api::{KMeans, SVM};
//! use rdal::kmeans::InitMethod;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Train a model on data
//! let svm = SVM::new()
//!     .with_c(1.0)
//!     .with_epsilon(0.001)
//!     .train_from_file("data.libsvm")?;
//! println!("Accuracy: {:.2}%", svm.evaluate_from_file("test.libsvm")? * 100.0);
//!
//! // Cluster a CSV file without labels
//! let clusters = KMeans::new(3)
//!     .with_init(InitMethod::PlusPlus { seed: 42 })
//!     .fit_from_file("points.csv")?;
//! println!("Objective: {:?}", clusters.objective_function);
//! # Ok(())
//! # }
//! ```

use crate::core::{
    CacheKind, DalError, Dataset, KMeansConfig, KMeansMethod, OptimizerConfig, Prediction,
    Result, ResultsToEvaluate, SVMModel,
};
use crate::data::{load_dataset, CSVDataset, LibSVMDataset};
use crate::dispatch::ExecutionContext;
use crate::kernel::{Kernel, KernelFunction};
use crate::kmeans::{init_centroids, Centroids, InitMethod, KMeansResult, LloydEngine};
use crate::optimizer::{SVMOptimizer, SvmModel};
use crate::table::{Layout, NumericTable, Row, RowBlock};
use std::path::Path;

/// High-level SVM interface with builder pattern
pub struct SVM<K: Kernel = KernelFunction> {
    kernel: K,
    config: OptimizerConfig,
    ctx: ExecutionContext,
}

impl SVM<KernelFunction> {
    /// Create a new SVM with linear kernel and default parameters
    pub fn new() -> Self {
        Self::with_kernel(KernelFunction::Linear)
    }
}

impl Default for SVM<KernelFunction> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Kernel> SVM<K> {
    /// Create SVM with custom kernel
    pub fn with_kernel(kernel: K) -> Self {
        Self {
            kernel,
            config: OptimizerConfig::default(),
            ctx: ExecutionContext::default(),
        }
    }

    /// Set regularization parameter C
    pub fn with_c(mut self, c: f64) -> Self {
        self.config.c = c;
        self
    }

    /// Set convergence tolerance
    pub fn with_epsilon(mut self, epsilon: f64) -> Self {
        self.config.epsilon = epsilon;
        self
    }

    /// Set maximum number of iterations
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.config.max_iterations = max_iterations;
        self
    }

    /// Set the kernel cache strategy
    pub fn with_cache_kind(mut self, cache_kind: CacheKind) -> Self {
        self.config.cache_kind = cache_kind;
        self
    }

    /// Set kernel cache size in bytes
    pub fn with_cache_size(mut self, cache_size: usize) -> Self {
        self.config.cache_size = cache_size;
        self
    }

    /// Fix the working set size instead of deriving it from the device
    pub fn with_working_set_size(mut self, working_set_size: usize) -> Self {
        self.config.working_set_size = Some(working_set_size);
        self
    }

    /// Run on the given execution context
    pub fn with_context(mut self, ctx: ExecutionContext) -> Self {
        self.ctx = ctx;
        self
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Train on a dataset
    pub fn train<D: Dataset>(self, dataset: &D) -> Result<TrainedModel<K>> {
        self.train_table(dataset.table(), dataset.labels())
    }

    /// Train on a table with one +1/-1 label per row
    pub fn train_table(self, table: &NumericTable, labels: &[f64]) -> Result<TrainedModel<K>> {
        let config = self.config.clone();
        let optimizer = SVMOptimizer::new(self.kernel, self.config).with_context(self.ctx);
        let model = optimizer.train_table(table, labels)?;
        Ok(TrainedModel { model, config })
    }

    /// Train from LibSVM format file
    pub fn train_from_file<P: AsRef<Path>>(self, path: P) -> Result<TrainedModel<K>> {
        let dataset = LibSVMDataset::from_file(path)?;
        self.train(&dataset)
    }

    /// Train from CSV file (automatically detects headers)
    pub fn train_from_csv<P: AsRef<Path>>(self, path: P) -> Result<TrainedModel<K>> {
        let dataset = CSVDataset::from_file(path)?;
        self.train(&dataset)
    }
}

/// Trained SVM model with high-level prediction interface
pub struct TrainedModel<K: Kernel> {
    model: SvmModel<K>,
    config: OptimizerConfig,
}

impl<K: Kernel> TrainedModel<K> {
    /// Wrap a model, e.g. one restored from disk
    pub fn from_model(model: SvmModel<K>, config: OptimizerConfig) -> Self {
        Self { model, config }
    }

    /// Predict a single row
    pub fn predict(&self, row: Row<'_>) -> Prediction {
        self.model.predict(row)
    }

    /// Predict every row of a table
    pub fn predict_table(&self, table: &NumericTable) -> Result<Vec<Prediction>> {
        self.model.predict_checked(table)
    }

    /// Predict from dataset
    pub fn predict_dataset<D: Dataset>(&self, dataset: &D) -> Result<Vec<Prediction>> {
        self.predict_table(dataset.table())
    }

    /// Predict from a LibSVM or CSV file, chosen by extension
    pub fn predict_from_file<P: AsRef<Path>>(&self, path: P) -> Result<Vec<Prediction>> {
        let (table, _) = load_dataset(path, true)?;
        self.predict_table(&table)
    }

    /// Evaluate accuracy on a dataset
    pub fn evaluate<D: Dataset>(&self, dataset: &D) -> Result<f64> {
        Ok(self.evaluate_detailed(dataset)?.accuracy())
    }

    /// Evaluate accuracy from a LibSVM or CSV file, chosen by extension
    pub fn evaluate_from_file<P: AsRef<Path>>(&self, path: P) -> Result<f64> {
        let (table, labels) = load_dataset(path, true)?;
        Ok(self.evaluate_table(&table, &labels)?.accuracy())
    }

    /// Get detailed evaluation metrics
    pub fn evaluate_detailed<D: Dataset>(&self, dataset: &D) -> Result<EvaluationMetrics> {
        self.evaluate_table(dataset.table(), dataset.labels())
    }

    /// Confusion counts of the predictions on `table` against `labels`
    pub fn evaluate_table(&self, table: &NumericTable, labels: &[f64]) -> Result<EvaluationMetrics> {
        if labels.len() != table.n_rows() {
            return Err(DalError::DimensionMismatch {
                expected: table.n_rows(),
                actual: labels.len(),
            });
        }
        let predictions = self.predict_table(table)?;

        let mut tp = 0; // True positives
        let mut tn = 0; // True negatives
        let mut fp = 0; // False positives
        let mut fn_ = 0; // False negatives

        for (pred, &actual) in predictions.iter().zip(labels.iter()) {
            match (pred.label > 0.0, actual > 0.0) {
                (true, true) => tp += 1,
                (false, false) => tn += 1,
                (true, false) => fp += 1,
                (false, true) => fn_ += 1,
            }
        }

        Ok(EvaluationMetrics::new(tp, tn, fp, fn_))
    }

    /// Get model information
    pub fn info(&self) -> ModelInfo {
        ModelInfo {
            n_support_vectors: self.model.n_support_vectors(),
            bias: self.model.bias(),
            n_features: self.model.n_features(),
            support_vector_indices: self.model.support_indices().to_vec(),
        }
    }

    /// Parameters the model was trained with
    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Get the underlying trained model
    pub fn inner(&self) -> &SvmModel<K> {
        &self.model
    }
}

/// Detailed evaluation metrics
#[derive(Debug, Clone)]
pub struct EvaluationMetrics {
    pub true_positives: usize,
    pub true_negatives: usize,
    pub false_positives: usize,
    pub false_negatives: usize,
}

impl EvaluationMetrics {
    fn new(tp: usize, tn: usize, fp: usize, fn_: usize) -> Self {
        Self {
            true_positives: tp,
            true_negatives: tn,
            false_positives: fp,
            false_negatives: fn_,
        }
    }

    /// Calculate accuracy: (TP + TN) / (TP + TN + FP + FN)
    pub fn accuracy(&self) -> f64 {
        let total =
            self.true_positives + self.true_negatives + self.false_positives + self.false_negatives;
        if total == 0 {
            0.0
        } else {
            (self.true_positives + self.true_negatives) as f64 / total as f64
        }
    }

    /// Calculate precision: TP / (TP + FP)
    pub fn precision(&self) -> f64 {
        let denominator = self.true_positives + self.false_positives;
        if denominator == 0 {
            0.0
        } else {
            self.true_positives as f64 / denominator as f64
        }
    }

    /// Calculate recall (sensitivity): TP / (TP + FN)
    pub fn recall(&self) -> f64 {
        let denominator = self.true_positives + self.false_negatives;
        if denominator == 0 {
            0.0
        } else {
            self.true_positives as f64 / denominator as f64
        }
    }

    /// Calculate F1 score: 2 * (precision * recall) / (precision + recall)
    pub fn f1_score(&self) -> f64 {
        let p = self.precision();
        let r = self.recall();
        if p + r == 0.0 {
            0.0
        } else {
            2.0 * (p * r) / (p + r)
        }
    }
}

/// Model information
#[derive(Debug, Clone)]
pub struct ModelInfo {
    pub n_support_vectors: usize,
    pub bias: f64,
    pub n_features: usize,
    pub support_vector_indices: Vec<usize>,
}

/// High-level K-Means interface with builder pattern
///
/// The Lloyd method follows the table layout: dense tables run the dense
/// local step, CSR tables the sparse one.
#[derive(Debug, Clone)]
pub struct KMeans {
    config: KMeansConfig,
    init: InitMethod,
    ctx: ExecutionContext,
}

impl KMeans {
    /// Cluster into `n_clusters` groups with default parameters
    pub fn new(n_clusters: usize) -> Self {
        Self {
            config: KMeansConfig {
                n_clusters,
                ..Default::default()
            },
            init: InitMethod::default(),
            ctx: ExecutionContext::default(),
        }
    }

    /// Set maximum number of Lloyd iterations; 0 only assigns
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.config.max_iterations = max_iterations;
        self
    }

    /// Stop once the summed squared centroid shift is at or below `threshold`
    pub fn with_accuracy_threshold(mut self, threshold: f64) -> Self {
        self.config.accuracy_threshold = threshold;
        self
    }

    /// Set how initial centroids are chosen by [`KMeans::fit`]
    pub fn with_init(mut self, init: InitMethod) -> Self {
        self.init = init;
        self
    }

    /// Select the outputs to compute
    pub fn with_results(mut self, results: ResultsToEvaluate) -> Self {
        self.config.results_to_evaluate = results;
        self
    }

    /// Rows per partition when a whole table is clustered
    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.config.block_size = block_size;
        self
    }

    /// Run on the given execution context
    pub fn with_context(mut self, ctx: ExecutionContext) -> Self {
        self.ctx = ctx;
        self
    }

    pub fn config(&self) -> &KMeansConfig {
        &self.config
    }

    /// Pick initial centroids and cluster `table`
    pub fn fit(&self, table: &NumericTable) -> Result<KMeansResult> {
        let initial = init_centroids(table, self.config.n_clusters, self.init)?;
        self.fit_with_centroids(table, &initial)
    }

    /// Cluster `table` starting from the given centroids
    pub fn fit_with_centroids(
        &self,
        table: &NumericTable,
        initial: &Centroids,
    ) -> Result<KMeansResult> {
        self.engine(table.layout())?.compute(table, initial)
    }

    /// Cluster rows spread over several partitions of one layout
    pub fn fit_partitioned(
        &self,
        partitions: &[RowBlock<'_>],
        initial: &Centroids,
    ) -> Result<KMeansResult> {
        let layout = partitions
            .first()
            .map(|block| block.layout())
            .ok_or(DalError::EmptyDataset)?;
        self.engine(layout)?.compute_partitioned(partitions, initial)
    }

    /// Load a LibSVM or CSV file (labels ignored) and cluster it
    pub fn fit_from_file<P: AsRef<Path>>(&self, path: P) -> Result<KMeansResult> {
        let (table, _) = load_dataset(path, false)?;
        self.fit(&table)
    }

    fn engine(&self, layout: Layout) -> Result<LloydEngine> {
        let method = match layout {
            Layout::Dense => KMeansMethod::LloydDense,
            Layout::Csr => KMeansMethod::LloydCsr,
        };
        let config = KMeansConfig {
            method,
            ..self.config.clone()
        };
        LloydEngine::new(config, self.ctx.clone())
    }
}
