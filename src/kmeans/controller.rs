//! Lloyd iteration controller and the two-step distributed protocol
//!
//! A distributed run is driven by the caller: every node runs
//! [`DistributedStep1Local`] over its own rows and ships the partial result
//! to the node holding [`DistributedStep2Master`], which merges the partials
//! and finalizes the next centroid set. [`LloydEngine`] drives the same two
//! steps in-process over a list of row blocks, running the local steps in
//! parallel.

use super::centroids::Centroids;
use super::local::{self, LocalStepOptions};
use super::partial::{PartialResult, PartialResultCollection};
use super::reduction::{self, IterationOutcome};
use crate::core::{DalError, KMeansConfig, KMeansMethod, Result, ResultsToEvaluate};
use crate::dispatch::ExecutionContext;
use crate::table::{Layout, NumericTable, RowBlock};
use log::{debug, info};
use rayon::prelude::*;

/// Final output of a K-Means computation
#[derive(Debug, Clone, PartialEq)]
pub struct KMeansResult {
    /// Final centroids, when requested
    pub centroids: Option<Centroids>,
    /// Cluster index of every input row, when requested
    pub assignments: Option<Vec<usize>>,
    /// Sum of squared distances to the final centroids, when requested
    pub objective_function: Option<f64>,
    /// Lloyd updates actually performed
    pub n_iterations: usize,
    /// Empty clusters met over all iterations
    pub n_empty_clusters: usize,
}

impl KMeansResult {
    /// Assign rows of a new table to the nearest final centroid
    pub fn predict(&self, table: &NumericTable, ctx: &ExecutionContext) -> Result<Vec<usize>> {
        let centroids = self.centroids.as_ref().ok_or_else(|| {
            DalError::InvalidParameter("Result was computed without centroids".to_string())
        })?;
        let method = match table.layout() {
            Layout::Dense => KMeansMethod::LloydDense,
            Layout::Csr => KMeansMethod::LloydCsr,
        };
        let options = LocalStepOptions {
            compute_assignments: true,
        };
        let partial = local::compute(&table.as_block(), centroids, method, options, ctx)?;
        partial
            .partial_assignments
            .ok_or_else(|| DalError::Numerical("Local step dropped assignments".to_string()))
    }
}

/// First step of a distributed iteration, run on every node
#[derive(Debug, Clone)]
pub struct DistributedStep1Local {
    method: KMeansMethod,
    options: LocalStepOptions,
    ctx: ExecutionContext,
}

impl DistributedStep1Local {
    pub fn new(method: KMeansMethod, ctx: ExecutionContext) -> Self {
        Self {
            method,
            options: LocalStepOptions::default(),
            ctx,
        }
    }

    /// Also record per-row assignments
    pub fn with_assignments(mut self, compute_assignments: bool) -> Self {
        self.options.compute_assignments = compute_assignments;
        self
    }

    /// Partial result of the node's rows against the current centroids
    pub fn compute(&self, block: &RowBlock<'_>, centroids: &Centroids) -> Result<PartialResult> {
        local::compute(block, centroids, self.method, self.options, &self.ctx)
    }
}

/// Second step of a distributed iteration, run once on the master node
#[derive(Debug, Clone)]
pub struct DistributedStep2Master {
    collection: PartialResultCollection,
}

impl DistributedStep2Master {
    /// Accept partial results of `n_clusters` x `n_features`
    pub fn new(n_clusters: usize, n_features: usize) -> Self {
        Self {
            collection: PartialResultCollection::new(n_clusters, n_features),
        }
    }

    /// Add one node's partial result
    pub fn add_input(&mut self, partial: PartialResult) -> Result<()> {
        self.collection.push(partial)
    }

    /// Partial results received since the last merge
    pub fn n_inputs(&self) -> usize {
        self.collection.len()
    }

    /// Merge every received partial result; the inputs are consumed
    pub fn compute(&mut self) -> Result<PartialResult> {
        reduction::merge(&mut self.collection)
    }

    /// Produce the next centroid set from merged accumulators
    pub fn finalize_compute(
        &self,
        merged: PartialResult,
        previous: &Centroids,
    ) -> Result<IterationOutcome> {
        reduction::finalize(merged, previous)
    }
}

/// In-process Lloyd driver
#[derive(Debug, Clone)]
pub struct LloydEngine {
    config: KMeansConfig,
    ctx: ExecutionContext,
}

impl LloydEngine {
    /// Create an engine, validating the configuration
    pub fn new(config: KMeansConfig, ctx: ExecutionContext) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, ctx })
    }

    pub fn config(&self) -> &KMeansConfig {
        &self.config
    }

    /// Cluster one table, split into blocks of `block_size` rows
    pub fn compute(&self, table: &NumericTable, initial: &Centroids) -> Result<KMeansResult> {
        let partitions = table.split_rows(self.config.block_size)?;
        self.compute_partitioned(&partitions, initial)
    }

    /// Cluster rows spread over several partitions
    ///
    /// Assignments are returned in partition order.
    pub fn compute_partitioned(
        &self,
        partitions: &[RowBlock<'_>],
        initial: &Centroids,
    ) -> Result<KMeansResult> {
        self.validate(partitions, initial)?;
        let k = initial.n_clusters();
        let f = initial.n_features();

        let step1 = DistributedStep1Local::new(self.config.method, self.ctx.clone());
        let mut master = DistributedStep2Master::new(k, f);
        let mut centroids = initial.clone();
        let mut n_iterations = 0;
        let mut n_empty_clusters = 0;

        for iteration in 0..self.config.max_iterations {
            let outcome = self.iterate(&step1, &mut master, partitions, &centroids)?;
            let shift = centroids.squared_shift(&outcome.centroids)?;
            debug!(
                "Iteration {}: objective {:.6}, centroid shift {:.6e}, empty clusters {}",
                iteration + 1,
                outcome.objective_function,
                shift,
                outcome.n_empty_clusters
            );

            centroids = outcome.centroids;
            n_iterations += 1;
            n_empty_clusters += outcome.n_empty_clusters;

            if shift <= self.config.accuracy_threshold {
                info!("K-Means converged after {n_iterations} iterations");
                break;
            }
        }
        if n_iterations == self.config.max_iterations && n_iterations > 0 {
            info!("K-Means stopped at the iteration limit ({n_iterations})");
        }

        let flags = self.config.results_to_evaluate;
        let wants_assignments = flags.contains(ResultsToEvaluate::ASSIGNMENTS);
        let wants_objective = flags.contains(ResultsToEvaluate::OBJECTIVE_FUNCTION);

        let (assignments, objective_function) = if wants_assignments || wants_objective {
            let scoring = step1.clone().with_assignments(wants_assignments);
            for partial in Self::local_steps(&scoring, partitions, &centroids)? {
                master.add_input(partial)?;
            }
            let merged = master.compute()?;
            (
                merged.partial_assignments,
                wants_objective.then_some(merged.partial_objective_function),
            )
        } else {
            (None, None)
        };

        Ok(KMeansResult {
            centroids: flags
                .contains(ResultsToEvaluate::CENTROIDS)
                .then_some(centroids),
            assignments,
            objective_function,
            n_iterations,
            n_empty_clusters,
        })
    }

    fn validate(&self, partitions: &[RowBlock<'_>], initial: &Centroids) -> Result<()> {
        if partitions.is_empty() {
            return Err(DalError::EmptyDataset);
        }
        if initial.n_clusters() != self.config.n_clusters {
            return Err(DalError::InvalidParameter(format!(
                "Expected {} initial centroids, got {}",
                self.config.n_clusters,
                initial.n_clusters()
            )));
        }
        for block in partitions {
            local::validate_block(block, initial, self.config.method)?;
        }
        let n_rows: usize = partitions.iter().map(|b| b.n_rows()).sum();
        if self.config.max_iterations > 0 && self.config.n_clusters > n_rows {
            return Err(DalError::InvalidParameter(format!(
                "Number of clusters ({}) exceeds number of rows ({n_rows})",
                self.config.n_clusters
            )));
        }
        Ok(())
    }

    fn local_steps(
        step1: &DistributedStep1Local,
        partitions: &[RowBlock<'_>],
        centroids: &Centroids,
    ) -> Result<Vec<PartialResult>> {
        partitions
            .par_iter()
            .map(|block| step1.compute(block, centroids))
            .collect()
    }

    fn iterate(
        &self,
        step1: &DistributedStep1Local,
        master: &mut DistributedStep2Master,
        partitions: &[RowBlock<'_>],
        centroids: &Centroids,
    ) -> Result<IterationOutcome> {
        for partial in Self::local_steps(step1, partitions, centroids)? {
            master.add_input(partial)?;
        }
        let merged = master.compute()?;
        master.finalize_compute(merged, centroids)
    }
}
