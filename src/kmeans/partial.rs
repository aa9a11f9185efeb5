//! Per-partition partial results of one Lloyd iteration
//!
//! A [`PartialResult`] accumulates everything the reduction needs from one
//! block of rows: per-cluster counts and feature sums, the partial objective,
//! and the farthest point seen per cluster (the empty-cluster candidate).
//! Partial results from all partitions of an iteration are collected in a
//! [`PartialResultCollection`], which checks shapes as results arrive.

use crate::core::{try_zeroed, DalError, Result};
use crate::table::Row;

/// Accumulators produced by one local step
#[derive(Debug, Clone, PartialEq)]
pub struct PartialResult {
    n_clusters: usize,
    n_features: usize,
    /// Rows assigned to each cluster
    pub n_observations: Vec<usize>,
    /// K x F sums of the rows assigned to each cluster
    pub partial_sums: Vec<f64>,
    /// Sum of squared distances to the assigned centroid
    pub partial_objective_function: f64,
    /// Distance of the farthest point per cluster, `NEG_INFINITY` when none
    pub partial_candidates_distances: Vec<f64>,
    /// K x F coordinates of the farthest point per cluster
    pub partial_candidates_centroids: Vec<f64>,
    /// Cluster index of every row, when requested
    pub partial_assignments: Option<Vec<usize>>,
}

impl PartialResult {
    /// Allocate zeroed accumulators for `n_clusters` x `n_features`
    ///
    /// `n_rows` reserves the assignment vector when assignments are requested.
    pub fn new(n_clusters: usize, n_features: usize, n_rows: Option<usize>) -> Result<Self> {
        let partial_sums = try_zeroed(n_clusters * n_features, "partial sums")?;
        let partial_candidates_centroids =
            try_zeroed(n_clusters * n_features, "candidate centroids")?;
        let partial_assignments = match n_rows {
            Some(n) => {
                let mut assignments = Vec::new();
                assignments
                    .try_reserve_exact(n)
                    .map_err(|e| DalError::Allocation(format!("assignments ({n} rows): {e}")))?;
                Some(assignments)
            }
            None => None,
        };

        Ok(Self {
            n_clusters,
            n_features,
            n_observations: vec![0; n_clusters],
            partial_sums,
            partial_objective_function: 0.0,
            partial_candidates_distances: vec![f64::NEG_INFINITY; n_clusters],
            partial_candidates_centroids,
            partial_assignments,
        })
    }

    pub fn n_clusters(&self) -> usize {
        self.n_clusters
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// Total number of rows accounted for
    pub fn total_observations(&self) -> usize {
        self.n_observations.iter().sum()
    }

    /// Sum of the rows assigned to cluster `k`
    pub fn sum(&self, k: usize) -> &[f64] {
        &self.partial_sums[k * self.n_features..(k + 1) * self.n_features]
    }

    /// Farthest point recorded for cluster `k` with its distance
    pub fn candidate(&self, k: usize) -> Option<(f64, &[f64])> {
        let distance = self.partial_candidates_distances[k];
        if distance == f64::NEG_INFINITY {
            return None;
        }
        let start = k * self.n_features;
        Some((
            distance,
            &self.partial_candidates_centroids[start..start + self.n_features],
        ))
    }

    /// Account one row assigned to `cluster` at squared distance `distance`
    pub fn observe(&mut self, row: Row<'_>, cluster: usize, distance: f64) {
        let f = self.n_features;
        self.n_observations[cluster] += 1;
        row.add_to(&mut self.partial_sums[cluster * f..(cluster + 1) * f]);
        self.partial_objective_function += distance;

        if distance > self.partial_candidates_distances[cluster] {
            self.partial_candidates_distances[cluster] = distance;
            row.write_dense(&mut self.partial_candidates_centroids[cluster * f..(cluster + 1) * f]);
        }

        if let Some(assignments) = self.partial_assignments.as_mut() {
            assignments.push(cluster);
        }
    }

    /// Fail unless this result has the given shape
    pub fn check_shape(&self, n_clusters: usize, n_features: usize) -> Result<()> {
        if self.n_clusters != n_clusters || self.n_features != n_features {
            return Err(DalError::PartialShapeMismatch {
                expected_clusters: n_clusters,
                expected_features: n_features,
                actual_clusters: self.n_clusters,
                actual_features: self.n_features,
            });
        }
        Ok(())
    }

    /// Fold `other` into `self`
    ///
    /// Counts, sums and objective add up. Each cluster keeps the farther of the
    /// two candidates; on equal distance the one already in `self` stays, so a
    /// left-to-right fold prefers the earliest partition. Assignments are
    /// concatenated and survive only if both sides carry them.
    pub fn merge_from(&mut self, other: &PartialResult) -> Result<()> {
        other.check_shape(self.n_clusters, self.n_features)?;
        let f = self.n_features;

        for (acc, n) in self.n_observations.iter_mut().zip(&other.n_observations) {
            *acc += n;
        }
        for (acc, v) in self.partial_sums.iter_mut().zip(&other.partial_sums) {
            *acc += v;
        }
        self.partial_objective_function += other.partial_objective_function;

        for k in 0..self.n_clusters {
            if other.partial_candidates_distances[k] > self.partial_candidates_distances[k] {
                self.partial_candidates_distances[k] = other.partial_candidates_distances[k];
                self.partial_candidates_centroids[k * f..(k + 1) * f]
                    .copy_from_slice(&other.partial_candidates_centroids[k * f..(k + 1) * f]);
            }
        }

        self.partial_assignments = match (self.partial_assignments.take(), &other.partial_assignments)
        {
            (Some(mut mine), Some(theirs)) => {
                mine.extend_from_slice(theirs);
                Some(mine)
            }
            _ => None,
        };
        Ok(())
    }
}

/// Partial results of one iteration, all of the same shape
#[derive(Debug, Clone)]
pub struct PartialResultCollection {
    n_clusters: usize,
    n_features: usize,
    items: Vec<PartialResult>,
}

impl PartialResultCollection {
    /// Create an empty collection accepting `n_clusters` x `n_features` results
    pub fn new(n_clusters: usize, n_features: usize) -> Self {
        Self {
            n_clusters,
            n_features,
            items: Vec::new(),
        }
    }

    /// Add a partial result, rejecting it if its shape differs
    pub fn push(&mut self, partial: PartialResult) -> Result<()> {
        partial.check_shape(self.n_clusters, self.n_features)?;
        self.items.push(partial);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn n_clusters(&self) -> usize {
        self.n_clusters
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// Remove and return every collected result, leaving the collection empty
    pub fn drain(&mut self) -> Vec<PartialResult> {
        std::mem::take(&mut self.items)
    }
}
