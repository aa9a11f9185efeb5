//! Device pipeline for the dense Lloyd local step
//!
//! One local step is a chain of kernels, each submitted to the device queue
//! and awaited before the next one reads its output:
//!
//! 1. `compute_squares`: squared norm of every row
//! 2. `compute_distances`: N x K distance matrix via the norm expansion
//! 3. `compute_assignments`: arg-min per row, ties to the lowest cluster
//! 4. `partial_candidates`: farthest row per cluster for every work-group
//! 5. `partial_centroids`: per-cluster counts, sums and objective per work-group
//! 6. `merge_reduce`: fold the work-group partials in work-group order

use super::centroids::Centroids;
use super::local::LocalStepOptions;
use super::partial::PartialResult;
use crate::core::{try_zeroed, DalError, Result};
use crate::dispatch::ExecutionContext;
use crate::table::{Row, RowBlock};
use rayon::prelude::*;

/// Farthest row of each cluster within one work-group, `None` when empty
type GroupCandidates = Vec<Option<(f64, usize)>>;

/// Run the local step as a staged device pipeline
pub fn local_step(
    block: &RowBlock<'_>,
    centroids: &Centroids,
    options: LocalStepOptions,
    ctx: &ExecutionContext,
) -> Result<PartialResult> {
    let device = ctx.require_device("lloyd_dense_local_step")?;
    let values = block.dense_values().ok_or_else(|| {
        DalError::UnsupportedLayout("device pipeline requires a dense table".to_string())
    })?;

    let n = block.n_rows();
    let k = centroids.n_clusters();
    let f = centroids.n_features();
    let group = device.max_work_group_size();

    let row_norms = device.submit("compute_squares", || {
        let mut norms = try_zeroed(n, "row norms")?;
        norms
            .par_chunks_mut(group)
            .enumerate()
            .for_each(|(g, out)| {
                for (r, norm) in out.iter_mut().enumerate() {
                    let row = &values[(g * group + r) * f..(g * group + r + 1) * f];
                    *norm = row.iter().map(|v| v * v).sum();
                }
            });
        Ok(norms)
    })?;

    let distances = device.submit("compute_distances", || {
        let mut distances = try_zeroed(n * k, "distance matrix")?;
        let centroid_norms = centroids.norms_squared();
        distances
            .par_chunks_mut(k * group)
            .enumerate()
            .for_each(|(g, out)| {
                for (r, row_out) in out.chunks_mut(k).enumerate() {
                    let i = g * group + r;
                    let row = Row::Dense(&values[i * f..(i + 1) * f]);
                    for (c, d) in row_out.iter_mut().enumerate() {
                        *d = (row_norms[i] - 2.0 * row.dot_dense(centroids.row(c))
                            + centroid_norms[c])
                            .max(0.0);
                    }
                }
            });
        Ok(distances)
    })?;

    let nearest: Vec<(usize, f64)> = device.submit("compute_assignments", || {
        Ok(distances
            .par_chunks(k)
            .map(|row| {
                row.iter()
                    .enumerate()
                    .fold((0, f64::INFINITY), |best, (c, &d)| {
                        if d < best.1 {
                            (c, d)
                        } else {
                            best
                        }
                    })
            })
            .collect())
    })?;
    drop(distances);

    let candidates: Vec<GroupCandidates> = device.submit("partial_candidates", || {
        Ok(nearest
            .par_chunks(group)
            .enumerate()
            .map(|(g, chunk)| {
                let mut best: GroupCandidates = vec![None; k];
                for (r, &(c, d)) in chunk.iter().enumerate() {
                    if best[c].map_or(true, |(bd, _)| d > bd) {
                        best[c] = Some((d, g * group + r));
                    }
                }
                best
            })
            .collect())
    })?;

    let sums: Vec<PartialResult> = device.submit("partial_centroids", || {
        nearest
            .par_chunks(group)
            .enumerate()
            .map(|(g, chunk)| {
                let mut partial = PartialResult::new(k, f, None)?;
                for (r, &(c, d)) in chunk.iter().enumerate() {
                    let i = g * group + r;
                    partial.n_observations[c] += 1;
                    Row::Dense(&values[i * f..(i + 1) * f])
                        .add_to(&mut partial.partial_sums[c * f..(c + 1) * f]);
                    partial.partial_objective_function += d;
                }
                Ok(partial)
            })
            .collect()
    })?;

    device.submit("merge_reduce", || {
        let rows = options.compute_assignments.then_some(n);
        let mut merged = PartialResult::new(k, f, rows)?;
        for partial in &sums {
            merged.merge_from(partial)?;
        }
        for group_best in &candidates {
            for (c, best) in group_best.iter().enumerate() {
                if let Some((d, i)) = *best {
                    if d > merged.partial_candidates_distances[c] {
                        merged.partial_candidates_distances[c] = d;
                        merged.partial_candidates_centroids[c * f..(c + 1) * f]
                            .copy_from_slice(&values[i * f..(i + 1) * f]);
                    }
                }
            }
        }
        if let Some(assignments) = merged.partial_assignments.as_mut() {
            assignments.extend(nearest.iter().map(|&(c, _)| c));
        }
        Ok(merged)
    })
}
