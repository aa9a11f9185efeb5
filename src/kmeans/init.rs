//! Initial centroid selection

use super::centroids::Centroids;
use crate::core::{DalError, Result};
use crate::table::NumericTable;
use log::debug;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// How the initial centroids are chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InitMethod {
    /// The first K rows
    #[default]
    Deterministic,
    /// K distinct rows drawn uniformly
    Random { seed: u64 },
    /// k-means++ seeding: each next center drawn proportionally to the squared
    /// distance from the centers chosen so far
    PlusPlus { seed: u64 },
}

/// Pick `n_clusters` rows of `table` as initial centroids
pub fn init_centroids(
    table: &NumericTable,
    n_clusters: usize,
    method: InitMethod,
) -> Result<Centroids> {
    if n_clusters == 0 {
        return Err(DalError::InvalidParameter(
            "Number of clusters must be positive".to_string(),
        ));
    }
    if n_clusters > table.n_rows() {
        return Err(DalError::InvalidParameter(format!(
            "Cannot pick {n_clusters} initial centroids from {} rows",
            table.n_rows()
        )));
    }

    let rows = match method {
        InitMethod::Deterministic => (0..n_clusters).collect(),
        InitMethod::Random { seed } => sample_distinct(table.n_rows(), n_clusters, seed),
        InitMethod::PlusPlus { seed } => plus_plus(table, n_clusters, seed)?,
    };
    debug!("Initial centroids from rows {rows:?}");

    Centroids::from_table(&table.gather_rows(&rows)?)
}

/// Partial Fisher-Yates shuffle of `0..n`, keeping the first `k`
fn sample_distinct(n: usize, k: usize, seed: u64) -> Vec<usize> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut pool: Vec<usize> = (0..n).collect();
    for i in 0..k {
        let j = rng.random_range(i..n);
        pool.swap(i, j);
    }
    pool.truncate(k);
    pool
}

fn plus_plus(table: &NumericTable, k: usize, seed: u64) -> Result<Vec<usize>> {
    let n = table.n_rows();
    let mut rng = StdRng::seed_from_u64(seed);
    let mut chosen = vec![rng.random_range(0..n)];
    let mut is_chosen = vec![false; n];
    is_chosen[chosen[0]] = true;

    let dense = |i: usize| {
        let mut point = vec![0.0; table.n_columns()];
        table.row(i).write_dense(&mut point);
        point
    };

    let first = dense(chosen[0]);
    let mut weights: Vec<f64> = (0..n).map(|i| table.row(i).squared_distance(&first)).collect();

    while chosen.len() < k {
        let total: f64 = weights.iter().sum();
        if !total.is_finite() {
            return Err(DalError::Numerical(
                "k-means++ weights are not finite".to_string(),
            ));
        }

        let next = if total > 0.0 {
            let target = rng.random::<f64>() * total;
            let mut acc = 0.0;
            let mut pick = None;
            for (i, &w) in weights.iter().enumerate() {
                acc += w;
                if w > 0.0 && acc > target {
                    pick = Some(i);
                    break;
                }
            }
            // rounding can leave the target just above the last partial sum
            pick.or_else(|| weights.iter().rposition(|&w| w > 0.0))
        } else {
            None
        };
        // every remaining row coincides with a chosen center
        let next = next.unwrap_or_else(|| (0..n).find(|&i| !is_chosen[i]).unwrap_or(0));

        chosen.push(next);
        is_chosen[next] = true;
        let center = dense(next);
        for (i, w) in weights.iter_mut().enumerate() {
            let d = table.row(i).squared_distance(&center);
            if d < *w {
                *w = d;
            }
        }
    }
    Ok(chosen)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> NumericTable {
        NumericTable::from_rows(&[
            vec![0.0, 0.0],
            vec![0.1, 0.0],
            vec![10.0, 10.0],
            vec![10.1, 10.0],
            vec![-10.0, 5.0],
        ])
        .unwrap()
    }

    #[test]
    fn test_deterministic_takes_first_rows() {
        let c = init_centroids(&table(), 2, InitMethod::Deterministic).unwrap();
        assert_eq!(c.to_rows(), vec![vec![0.0, 0.0], vec![0.1, 0.0]]);
    }

    #[test]
    fn test_random_is_seeded_and_distinct() {
        let a = init_centroids(&table(), 3, InitMethod::Random { seed: 7 }).unwrap();
        let b = init_centroids(&table(), 3, InitMethod::Random { seed: 7 }).unwrap();
        assert_eq!(a, b);

        let rows = a.to_rows();
        for i in 0..rows.len() {
            for j in i + 1..rows.len() {
                assert_ne!(rows[i], rows[j]);
            }
        }
    }

    #[test]
    fn test_plus_plus_spreads_centers() {
        let c = init_centroids(&table(), 3, InitMethod::PlusPlus { seed: 42 }).unwrap();
        let rows = c.to_rows();
        // the three groups are far apart, so no two centers share a group
        let group = |p: &Vec<f64>| {
            if p[0] < -5.0 {
                2
            } else if p[0] > 5.0 {
                1
            } else {
                0
            }
        };
        let mut groups: Vec<_> = rows.iter().map(group).collect();
        groups.sort();
        groups.dedup();
        assert_eq!(groups.len(), 3);
    }

    #[test]
    fn test_plus_plus_with_duplicates() {
        let table = NumericTable::from_rows(&[vec![1.0], vec![1.0], vec![1.0]]).unwrap();
        let c = init_centroids(&table, 3, InitMethod::PlusPlus { seed: 1 }).unwrap();
        assert_eq!(c.n_clusters(), 3);
    }

    #[test]
    fn test_too_many_clusters() {
        let result = init_centroids(&table(), 6, InitMethod::Deterministic);
        assert!(matches!(result, Err(DalError::InvalidParameter(_))));
    }
}
