//! Distributed reduction of partial results and iteration finalization

use super::centroids::Centroids;
use super::partial::{PartialResult, PartialResultCollection};
use crate::core::{DalError, Result};
use log::{debug, warn};

/// Centroids and objective produced by finalizing one iteration
#[derive(Debug, Clone)]
pub struct IterationOutcome {
    /// Updated centroid set
    pub centroids: Centroids,
    /// Objective after empty-cluster correction
    pub objective_function: f64,
    /// Clusters that received no rows before repair
    pub n_empty_clusters: usize,
    /// Empty clusters left at their previous position for lack of a donor
    pub n_unrepaired_clusters: usize,
}

/// Merge every collected partial result and clear the collection
///
/// Results are folded in arrival order, so equal candidate distances resolve
/// to the earliest partition.
pub fn merge(collection: &mut PartialResultCollection) -> Result<PartialResult> {
    let mut partials = collection.drain().into_iter();
    let mut merged = partials.next().ok_or_else(|| {
        DalError::InvalidParameter("Reduction needs at least one partial result".to_string())
    })?;
    for partial in partials {
        merged.merge_from(&partial)?;
    }
    Ok(merged)
}

/// Turn merged accumulators into the next centroid set
///
/// Each cluster that received no rows takes the farthest remaining candidate
/// of a cluster with more than one row. Clusters are repaired in index order;
/// every donor gives at most one point, and the donor with the larger
/// candidate distance wins (the lower cluster index on equal distance). The
/// donated point leaves the donor's sum and count, and its distance leaves
/// the objective. An empty cluster without an available donor keeps its
/// previous center.
pub fn finalize(mut merged: PartialResult, previous: &Centroids) -> Result<IterationOutcome> {
    merged.check_shape(previous.n_clusters(), previous.n_features())?;
    let k = merged.n_clusters();
    let f = merged.n_features();

    let empty: Vec<usize> = (0..k).filter(|&c| merged.n_observations[c] == 0).collect();
    let mut donated = vec![false; k];
    let mut unrepaired = 0;
    let mut objective = merged.partial_objective_function;
    let mut replacement: Vec<Option<Vec<f64>>> = vec![None; k];

    for &target in &empty {
        let donor = (0..k)
            .filter(|&c| !donated[c] && merged.n_observations[c] > 1)
            .filter_map(|c| merged.candidate(c).map(|(d, _)| (c, d)))
            .fold(None, |best: Option<(usize, f64)>, (c, d)| match best {
                Some((_, bd)) if bd >= d => best,
                _ => Some((c, d)),
            });

        match donor {
            Some((donor, distance)) => {
                let point = merged.partial_candidates_centroids[donor * f..(donor + 1) * f].to_vec();
                for (s, v) in merged.partial_sums[donor * f..(donor + 1) * f]
                    .iter_mut()
                    .zip(&point)
                {
                    *s -= v;
                }
                merged.n_observations[donor] -= 1;
                objective -= distance;
                donated[donor] = true;
                debug!("Cluster {target} is empty, taking point at distance {distance} from cluster {donor}");
                replacement[target] = Some(point);
            }
            None => {
                warn!("Cluster {target} is empty and no candidate point is left; keeping its center");
                unrepaired += 1;
            }
        }
    }

    let mut values = Vec::with_capacity(k * f);
    for c in 0..k {
        if let Some(point) = &replacement[c] {
            values.extend_from_slice(point);
        } else if merged.n_observations[c] == 0 {
            values.extend_from_slice(previous.row(c));
        } else {
            let n = merged.n_observations[c] as f64;
            values.extend(merged.sum(c).iter().map(|s| s / n));
        }
    }

    Ok(IterationOutcome {
        centroids: Centroids::new(k, f, values)?,
        objective_function: objective.max(0.0),
        n_empty_clusters: empty.len(),
        n_unrepaired_clusters: unrepaired,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Row;

    fn partial(rows: &[(Vec<f64>, usize, f64)], k: usize) -> PartialResult {
        let f = rows[0].0.len();
        let mut p = PartialResult::new(k, f, None).unwrap();
        for (row, c, d) in rows {
            p.observe(Row::Dense(row), *c, *d);
        }
        p
    }

    #[test]
    fn test_merge_clears_collection() {
        let mut collection = PartialResultCollection::new(2, 1);
        collection
            .push(partial(&[(vec![1.0], 0, 1.0)], 2))
            .unwrap();
        collection
            .push(partial(&[(vec![3.0], 0, 1.0), (vec![8.0], 1, 0.0)], 2))
            .unwrap();

        let merged = merge(&mut collection).unwrap();
        assert!(collection.is_empty());
        assert_eq!(merged.n_observations, vec![2, 1]);
        assert_eq!(merged.partial_sums, vec![4.0, 8.0]);

        assert!(merge(&mut collection).is_err());
    }

    #[test]
    fn test_finalize_means() {
        let merged = partial(&[(vec![1.0, 2.0], 0, 0.5), (vec![3.0, 4.0], 0, 0.5)], 1);
        let previous = Centroids::from_rows(&[vec![0.0, 0.0]]).unwrap();
        let outcome = finalize(merged, &previous).unwrap();
        assert_eq!(outcome.centroids.row(0), &[2.0, 3.0]);
        assert_eq!(outcome.objective_function, 1.0);
        assert_eq!(outcome.n_empty_clusters, 0);
    }

    #[test]
    fn test_finalize_repairs_empty_cluster() {
        // cluster 0 holds three rows, cluster 1 none
        let merged = partial(
            &[(vec![0.0], 0, 0.0), (vec![1.0], 0, 1.0), (vec![10.0], 0, 100.0)],
            2,
        );
        let previous = Centroids::from_rows(&[vec![0.0], vec![50.0]]).unwrap();
        let outcome = finalize(merged, &previous).unwrap();

        assert_eq!(outcome.n_empty_clusters, 1);
        assert_eq!(outcome.n_unrepaired_clusters, 0);
        assert_eq!(outcome.centroids.row(0), &[0.5]);
        assert_eq!(outcome.centroids.row(1), &[10.0]);
        assert_eq!(outcome.objective_function, 1.0);
    }

    #[test]
    fn test_each_donor_gives_once() {
        // clusters 1 and 2 empty; cluster 0 is the only donor
        let merged = partial(&[(vec![0.0], 0, 0.0), (vec![4.0], 0, 16.0)], 3);
        let previous = Centroids::from_rows(&[vec![0.0], vec![7.0], vec![9.0]]).unwrap();
        let outcome = finalize(merged, &previous).unwrap();

        assert_eq!(outcome.n_empty_clusters, 2);
        assert_eq!(outcome.n_unrepaired_clusters, 1);
        assert_eq!(outcome.centroids.row(0), &[0.0]);
        assert_eq!(outcome.centroids.row(1), &[4.0]);
        assert_eq!(outcome.centroids.row(2), &[9.0]);
        assert_eq!(outcome.objective_function, 0.0);
    }

    #[test]
    fn test_single_member_cluster_never_donates() {
        let merged = partial(&[(vec![5.0], 0, 25.0)], 2);
        let previous = Centroids::from_rows(&[vec![0.0], vec![1.0]]).unwrap();
        let outcome = finalize(merged, &previous).unwrap();
        assert_eq!(outcome.centroids.row(0), &[5.0]);
        assert_eq!(outcome.centroids.row(1), &[1.0]);
        assert_eq!(outcome.n_unrepaired_clusters, 1);
    }

    #[test]
    fn test_finalize_shape_check() {
        let merged = partial(&[(vec![1.0], 0, 0.0)], 1);
        let previous = Centroids::from_rows(&[vec![0.0, 0.0]]).unwrap();
        assert!(finalize(merged, &previous).is_err());
    }
}
