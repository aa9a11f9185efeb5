//! SVM training loop and the trained model
//!
//! [`SVMOptimizer`] decomposes the dual problem: each outer iteration selects
//! a working set, asks the kernel cache for the working-set kernel rows,
//! solves the reduced problem with SMO, and folds the alpha changes back into
//! the gradient of every training row. Training ends when the optimality gap
//! drops below `epsilon`, when the gap stops changing for `n_no_changes`
//! iterations, or at `max_iterations`.

use crate::cache::KernelCache;
use crate::core::{DalError, OptimizerConfig, Prediction, Result, SVMModel};
use crate::dispatch::ExecutionContext;
use crate::kernel::Kernel;
use crate::solver::{
    compute_bias, dual_objective, kkt_gap, solve_working_set, working_set_size,
    WorkingSetSelector,
};
use crate::table::{Layout, NumericTable, Row};
use log::{debug, info, warn};
use std::sync::Arc;

/// Snapshot of the training state after one outer iteration
#[derive(Debug, Clone, Copy)]
pub struct TrainingState<'a> {
    /// Outer iterations completed
    pub iteration: usize,
    /// Dual coefficients
    pub alpha: &'a [f64],
    /// Label-weighted gradient
    pub f: &'a [f64],
    /// Labels
    pub y: &'a [f64],
    /// Box bound
    pub c: f64,
    /// Optimality gap before this iteration
    pub gap: f64,
}

/// Why training stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The optimality gap fell below epsilon
    Converged,
    /// The gap did not change for `n_no_changes` iterations
    Stagnated,
    /// `max_iterations` was reached
    MaxIterations,
}

/// Summary of a training run
#[derive(Debug, Clone)]
pub struct TrainingReport {
    pub iterations: usize,
    pub objective_value: f64,
    pub final_gap: f64,
    pub stop_reason: StopReason,
}

/// High-level SVM optimizer that integrates kernel functions and the solver
pub struct SVMOptimizer<K: Kernel> {
    kernel: Arc<K>,
    config: OptimizerConfig,
    ctx: ExecutionContext,
}

impl<K: Kernel> SVMOptimizer<K> {
    /// Create a new SVM optimizer with the given kernel and configuration
    pub fn new(kernel: K, config: OptimizerConfig) -> Self {
        Self {
            kernel: Arc::new(kernel),
            config,
            ctx: ExecutionContext::default(),
        }
    }

    /// Create a new SVM optimizer with default configuration
    pub fn with_kernel(kernel: K) -> Self {
        Self::new(kernel, OptimizerConfig::default())
    }

    /// Run kernel computations on the given execution context
    pub fn with_context(mut self, ctx: ExecutionContext) -> Self {
        self.ctx = ctx;
        self
    }

    /// Get the optimizer configuration
    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Get the kernel
    pub fn kernel(&self) -> &K {
        &self.kernel
    }

    /// Train on a labeled dataset
    pub fn train<D: crate::core::Dataset>(&self, dataset: &D) -> Result<SvmModel<K>> {
        self.train_table(dataset.table(), dataset.labels())
    }

    /// Train on a table with one +1/-1 label per row
    pub fn train_table(&self, table: &NumericTable, labels: &[f64]) -> Result<SvmModel<K>> {
        self.train_with_observer(table, labels, |_| {})
    }

    /// Train, calling `observer` after every outer iteration
    pub fn train_with_observer<F>(
        &self,
        table: &NumericTable,
        labels: &[f64],
        mut observer: F,
    ) -> Result<SvmModel<K>>
    where
        F: FnMut(&TrainingState<'_>),
    {
        self.config.validate()?;
        self.kernel.validate()?;
        validate_labels(table, labels)?;

        let n = table.n_rows();
        let n_features = table.n_columns();
        let c = self.config.c;
        let eps = self.config.epsilon;

        let requested = self
            .config
            .working_set_size
            .unwrap_or_else(|| self.ctx.max_work_group_size());
        let ws_size = working_set_size(n, requested);
        if ws_size != requested {
            debug!("Working set size {requested} reduced to {ws_size} for {n} rows");
        }

        let mut selector = WorkingSetSelector::new(n, ws_size)?;
        let mut cache = KernelCache::new(
            self.config.cache_kind,
            Arc::clone(&self.kernel),
            table,
            self.config.cache_size,
            &self.ctx,
        )?;

        let mut alpha = vec![0.0; n];
        let mut f: Vec<f64> = labels.iter().map(|&y| -y).collect();
        let mut prev_gap = f64::NAN;
        let mut unchanged = 0;
        let mut iterations = 0;
        let mut stop_reason = StopReason::MaxIterations;

        info!(
            "Training {} kernel SVM on {n} rows x {n_features} features, working set {ws_size}",
            self.kernel.name()
        );

        while iterations < self.config.max_iterations {
            let gap = kkt_gap(labels, &alpha, &f, c);
            if gap < eps {
                stop_reason = StopReason::Converged;
                break;
            }
            if (gap - prev_gap).abs() < eps * 1e-2 {
                unchanged += 1;
                if self.config.n_no_changes > 0 && unchanged >= self.config.n_no_changes {
                    warn!("Optimality gap stuck at {gap:.6e} for {unchanged} iterations, stopping");
                    stop_reason = StopReason::Stagnated;
                    break;
                }
            } else {
                unchanged = 0;
            }
            prev_gap = gap;

            let ws = selector.select(labels, &alpha, &f, c)?.to_vec();
            let block = cache.compute(table, &ws, n_features)?;
            let local = solve_working_set(
                &ws,
                &block,
                labels,
                &mut alpha,
                &f,
                c,
                eps,
                self.config.inner_max_iterations,
            );

            for (t, &delta) in local.delta_alpha.iter().enumerate() {
                if delta != 0.0 {
                    let coeff = labels[ws[t]] * delta;
                    for (fk, &kv) in f.iter_mut().zip(block.row(t)) {
                        *fk += coeff * kv;
                    }
                }
            }
            iterations += 1;

            debug!(
                "Iteration {iterations}: gap {gap:.6e}, local gap {:.6e}, {} pair updates",
                local.local_diff, local.inner_iterations
            );
            observer(&TrainingState {
                iteration: iterations,
                alpha: &alpha,
                f: &f,
                y: labels,
                c,
                gap,
            });
        }

        let final_gap = kkt_gap(labels, &alpha, &f, c);
        if stop_reason == StopReason::MaxIterations && final_gap < eps {
            stop_reason = StopReason::Converged;
        }

        let stats = cache.stats();
        debug!(
            "Kernel cache: {} hits, {} misses, {} of {} rows held",
            stats.hits, stats.misses, stats.size, stats.capacity
        );

        let support_indices: Vec<usize> = (0..n).filter(|&i| alpha[i] != 0.0).collect();
        let coefficients: Vec<f64> = support_indices
            .iter()
            .map(|&i| labels[i] * alpha[i])
            .collect();
        let support_vectors = table.gather_rows(&support_indices)?;
        let bias = compute_bias(labels, &alpha, &f, c);
        let report = TrainingReport {
            iterations,
            objective_value: dual_objective(labels, &alpha, &f),
            final_gap,
            stop_reason,
        };

        info!(
            "Training stopped after {iterations} iterations ({stop_reason:?}): {} support vectors, gap {final_gap:.6e}",
            support_indices.len()
        );

        let mut model = SvmModel::from_parts(
            Arc::clone(&self.kernel),
            support_vectors,
            coefficients,
            support_indices,
            bias,
        )?;
        model.set_n_features(n_features);
        model.report = Some(report);
        Ok(model)
    }
}

fn validate_labels(table: &NumericTable, labels: &[f64]) -> Result<()> {
    if table.is_empty() {
        return Err(DalError::EmptyDataset);
    }
    if labels.len() != table.n_rows() {
        return Err(DalError::DimensionMismatch {
            expected: table.n_rows(),
            actual: labels.len(),
        });
    }
    if let Some(&bad) = labels.iter().find(|&&y| y != 1.0 && y != -1.0) {
        return Err(DalError::InvalidLabel(bad));
    }
    let n_positive = labels.iter().filter(|&&y| y > 0.0).count();
    if n_positive == 0 || n_positive == labels.len() {
        return Err(DalError::InvalidDataset(
            "Training data must contain both +1 and -1 labels".to_string(),
        ));
    }
    Ok(())
}

/// A trained SVM model: support vectors, their coefficients and the bias
pub struct SvmModel<K: Kernel> {
    kernel: Arc<K>,
    support_vectors: NumericTable,
    coefficients: Vec<f64>,
    support_indices: Vec<usize>,
    bias: f64,
    n_features: usize,
    report: Option<TrainingReport>,
}

impl<K: Kernel> SvmModel<K> {
    /// Assemble a model from its parts
    ///
    /// `coefficients[s]` is `y * alpha` of support vector `s`; the feature
    /// count is taken from `support_vectors`.
    pub fn from_parts(
        kernel: Arc<K>,
        support_vectors: NumericTable,
        coefficients: Vec<f64>,
        support_indices: Vec<usize>,
        bias: f64,
    ) -> Result<Self> {
        kernel.validate()?;
        if coefficients.len() != support_vectors.n_rows() {
            return Err(DalError::DimensionMismatch {
                expected: support_vectors.n_rows(),
                actual: coefficients.len(),
            });
        }
        if support_indices.len() != support_vectors.n_rows() {
            return Err(DalError::DimensionMismatch {
                expected: support_vectors.n_rows(),
                actual: support_indices.len(),
            });
        }
        Ok(Self {
            kernel,
            n_features: support_vectors.n_columns(),
            support_vectors,
            coefficients,
            support_indices,
            bias,
            report: None,
        })
    }

    /// Decision value `sum_s coef_s K(sv_s, x) + bias`
    pub fn decision_function(&self, row: Row<'_>) -> f64 {
        let x_norm = row.norm_squared();
        let sum: f64 = self
            .coefficients
            .iter()
            .enumerate()
            .map(|(s, &coef)| {
                let sv = self.support_vectors.row(s);
                coef * self
                    .kernel
                    .compute_with_norms(sv, row, sv.norm_squared(), x_norm)
            })
            .sum();
        sum + self.bias
    }

    /// Predict every row of `table`, checking its width first
    ///
    /// Sparse tables may be narrower than the model; their missing trailing
    /// features count as zero.
    pub fn predict_checked(&self, table: &NumericTable) -> Result<Vec<Prediction>> {
        let width_ok = match table.layout() {
            Layout::Dense => table.n_columns() == self.n_features,
            Layout::Csr => table.n_columns() <= self.n_features,
        };
        if !width_ok {
            return Err(DalError::DimensionMismatch {
                expected: self.n_features,
                actual: table.n_columns(),
            });
        }
        Ok(self.predict_table(table))
    }

    /// Dual coefficients `y * alpha` of the support vectors
    pub fn classification_coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    /// Indices of the support vectors in the training table
    pub fn support_indices(&self) -> &[usize] {
        &self.support_indices
    }

    /// Feature rows of the support vectors
    pub fn support_vectors(&self) -> &NumericTable {
        &self.support_vectors
    }

    pub fn set_bias(&mut self, bias: f64) {
        self.bias = bias;
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn set_n_features(&mut self, n_features: usize) {
        self.n_features = n_features;
    }

    /// Get the kernel
    pub fn kernel(&self) -> &K {
        &self.kernel
    }

    /// Summary of the training run, absent for loaded models
    pub fn report(&self) -> Option<&TrainingReport> {
        self.report.as_ref()
    }
}

impl<K: Kernel> SVMModel for SvmModel<K> {
    fn predict(&self, row: Row<'_>) -> Prediction {
        let decision_value = self.decision_function(row);
        let label = if decision_value >= 0.0 { 1.0 } else { -1.0 };
        Prediction::new(label, decision_value)
    }

    fn n_support_vectors(&self) -> usize {
        self.coefficients.len()
    }

    fn bias(&self) -> f64 {
        self.bias
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::CacheKind;
    use crate::kernel::{LinearKernel, RBFKernel};

    fn line() -> (NumericTable, Vec<f64>) {
        let table =
            NumericTable::from_rows(&[vec![2.0], vec![-2.0], vec![1.5], vec![-1.5]]).unwrap();
        (table, vec![1.0, -1.0, 1.0, -1.0])
    }

    #[test]
    fn test_svm_optimizer_creation() {
        let config = OptimizerConfig::default();
        let optimizer = SVMOptimizer::new(LinearKernel::new(), config.clone());

        assert_eq!(optimizer.config().c, config.c);
        assert_eq!(optimizer.config().epsilon, config.epsilon);
    }

    #[test]
    fn test_svm_training_simple_case() {
        let (table, labels) = line();
        let optimizer = SVMOptimizer::with_kernel(LinearKernel::new());

        let model = optimizer
            .train_table(&table, &labels)
            .expect("Training should succeed");

        assert!(model.n_support_vectors() > 0);
        assert_eq!(
            model.classification_coefficients().len(),
            model.support_vectors().n_rows()
        );
        assert_eq!(
            model.report().map(|r| r.stop_reason),
            Some(StopReason::Converged)
        );

        for (i, &y) in labels.iter().enumerate() {
            assert_eq!(model.predict(table.row(i)).label, y);
        }
    }

    #[test]
    fn test_two_point_margin() {
        let table = NumericTable::from_rows(&[vec![1.0], vec![-1.0]]).unwrap();
        let labels = [1.0, -1.0];
        let config = OptimizerConfig {
            c: 10.0,
            ..Default::default()
        };
        let model = SVMOptimizer::new(LinearKernel::new(), config)
            .train_table(&table, &labels)
            .expect("Training should succeed");

        // w = 1, b = 0: both points sit on the margin
        assert_eq!(model.support_indices(), &[0, 1]);
        assert!((model.classification_coefficients()[0] - 0.5).abs() < 1e-9);
        assert!((model.classification_coefficients()[1] + 0.5).abs() < 1e-9);
        assert!(model.bias().abs() < 1e-9);
        assert!((model.decision_function(Row::Dense(&[0.5])) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_observer_sees_box_constraint() {
        let (table, labels) = line();
        let config = OptimizerConfig {
            c: 0.05,
            cache_kind: CacheKind::Lru,
            ..Default::default()
        };
        let mut calls = 0;
        SVMOptimizer::new(RBFKernel::new(0.5), config)
            .train_with_observer(&table, &labels, |state| {
                calls += 1;
                assert!(state.alpha.iter().all(|&a| (0.0..=state.c).contains(&a)));
            })
            .expect("Training should succeed");
        assert!(calls > 0);
    }

    #[test]
    fn test_label_validation() {
        let (table, _) = line();
        let optimizer = SVMOptimizer::with_kernel(LinearKernel::new());

        let result = optimizer.train_table(&table, &[1.0, 0.0, 1.0, -1.0]);
        assert!(matches!(result, Err(DalError::InvalidLabel(_))));

        let result = optimizer.train_table(&table, &[1.0, 1.0, 1.0, 1.0]);
        assert!(matches!(result, Err(DalError::InvalidDataset(_))));

        let result = optimizer.train_table(&table, &[1.0, -1.0]);
        assert!(matches!(result, Err(DalError::DimensionMismatch { .. })));
    }

    #[test]
    fn test_model_setters() {
        let (table, labels) = line();
        let mut model = SVMOptimizer::with_kernel(LinearKernel::new())
            .train_table(&table, &labels)
            .expect("Training should succeed");

        model.set_bias(3.0);
        assert_eq!(model.bias(), 3.0);
        model.set_n_features(4);
        assert_eq!(model.n_features(), 4);
    }
}
