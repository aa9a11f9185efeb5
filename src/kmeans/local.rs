//! Lloyd local step: assign one block of rows and accumulate its partial result

use super::centroids::Centroids;
use super::device;
use super::partial::PartialResult;
use crate::core::{DalError, KMeansMethod, Result};
use crate::dispatch::{DispatchTable, ExecutionContext};
use crate::table::{Layout, Row, RowBlock};
use rayon::prelude::*;

/// What a local step should produce beyond the accumulators
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LocalStepOptions {
    /// Record the cluster index of every row
    pub compute_assignments: bool,
}

/// Signature shared by every local-step implementation
pub type LocalStepKernel =
    fn(&RowBlock<'_>, &Centroids, LocalStepOptions, &ExecutionContext) -> Result<PartialResult>;

/// Local step over dense tables
pub static LLOYD_DENSE: DispatchTable<LocalStepKernel> = DispatchTable::new(
    "lloyd_dense_local_step",
    scalar_local_step as LocalStepKernel,
    vectorized_local_step as LocalStepKernel,
    Some(device::local_step as LocalStepKernel),
);

/// Local step over CSR tables; there is no device pipeline for sparse input
pub static LLOYD_CSR: DispatchTable<LocalStepKernel> = DispatchTable::new(
    "lloyd_csr_local_step",
    scalar_local_step as LocalStepKernel,
    vectorized_local_step as LocalStepKernel,
    None,
);

/// Dispatch table for a method
pub fn dispatch_table(method: KMeansMethod) -> &'static DispatchTable<LocalStepKernel> {
    match method {
        KMeansMethod::LloydDense => &LLOYD_DENSE,
        KMeansMethod::LloydCsr => &LLOYD_CSR,
    }
}

/// Check that a block can be processed with `method` against `centroids`
pub fn validate_block(
    block: &RowBlock<'_>,
    centroids: &Centroids,
    method: KMeansMethod,
) -> Result<()> {
    let expected = match method {
        KMeansMethod::LloydDense => Layout::Dense,
        KMeansMethod::LloydCsr => Layout::Csr,
    };
    if block.layout() != expected {
        return Err(DalError::UnsupportedLayout(format!(
            "{method:?} cannot read a {:?} table",
            block.layout()
        )));
    }
    if block.n_columns() != centroids.n_features() {
        return Err(DalError::DimensionMismatch {
            expected: centroids.n_features(),
            actual: block.n_columns(),
        });
    }
    if block.n_rows() == 0 {
        return Err(DalError::EmptyDataset);
    }
    Ok(())
}

/// Run the local step for one block on the context's target
pub fn compute(
    block: &RowBlock<'_>,
    centroids: &Centroids,
    method: KMeansMethod,
    options: LocalStepOptions,
    ctx: &ExecutionContext,
) -> Result<PartialResult> {
    validate_block(block, centroids, method)?;
    let kernel = dispatch_table(method).resolve(ctx)?;
    kernel(block, centroids, options, ctx)
}

/// Nearest centroid by direct distance, ties to the lowest index
pub(crate) fn nearest_direct(row: Row<'_>, centroids: &Centroids) -> (usize, f64) {
    let mut best = (0, f64::INFINITY);
    for k in 0..centroids.n_clusters() {
        let d = row.squared_distance(centroids.row(k));
        if d < best.1 {
            best = (k, d);
        }
    }
    best
}

/// Nearest centroid through `|x|^2 - 2<x, c> + |c|^2`, ties to the lowest index
pub(crate) fn nearest_by_norms(row: Row<'_>, row_norm: f64, centroids: &Centroids) -> (usize, f64) {
    let norms = centroids.norms_squared();
    let mut best = (0, f64::INFINITY);
    for k in 0..centroids.n_clusters() {
        let d = (row_norm - 2.0 * row.dot_dense(centroids.row(k)) + norms[k]).max(0.0);
        if d < best.1 {
            best = (k, d);
        }
    }
    best
}

fn accumulate(
    block: &RowBlock<'_>,
    centroids: &Centroids,
    options: LocalStepOptions,
    nearest: &[(usize, f64)],
) -> Result<PartialResult> {
    let rows = options.compute_assignments.then_some(block.n_rows());
    let mut partial = PartialResult::new(centroids.n_clusters(), centroids.n_features(), rows)?;
    for (row, &(cluster, distance)) in block.rows().zip(nearest) {
        partial.observe(row, cluster, distance);
    }
    Ok(partial)
}

/// Row-at-a-time local step with term-by-term distances
pub fn scalar_local_step(
    block: &RowBlock<'_>,
    centroids: &Centroids,
    options: LocalStepOptions,
    _ctx: &ExecutionContext,
) -> Result<PartialResult> {
    let rows = options.compute_assignments.then_some(block.n_rows());
    let mut partial = PartialResult::new(centroids.n_clusters(), centroids.n_features(), rows)?;
    for row in block.rows() {
        let (cluster, distance) = nearest_direct(row, centroids);
        partial.observe(row, cluster, distance);
    }
    Ok(partial)
}

/// Norm-assisted local step
///
/// Distances are evaluated in parallel over rows; accumulation then runs in
/// row order so sums and candidates do not depend on scheduling.
pub fn vectorized_local_step(
    block: &RowBlock<'_>,
    centroids: &Centroids,
    options: LocalStepOptions,
    _ctx: &ExecutionContext,
) -> Result<PartialResult> {
    let nearest: Vec<(usize, f64)> = (0..block.n_rows())
        .into_par_iter()
        .with_min_len(64)
        .map(|i| {
            let row = block.row(i);
            nearest_by_norms(row, row.norm_squared(), centroids)
        })
        .collect();
    accumulate(block, centroids, options, &nearest)
}
