//! Sequential Minimal Optimization over one working set
//!
//! The dual problem is solved by decomposition: the outer loop picks a
//! working set of W variables, and [`solve_working_set`] optimizes those W
//! variables with repeated two-variable SMO steps while the rest stay fixed.
//! Only kernel values between working-set rows are needed here; the caller
//! propagates the resulting alpha changes to the full gradient.
//!
//! Throughout, `f[i] = y[i] * grad[i]` with `grad = Q alpha - e`, so
//! `f = -y` at `alpha = 0`. The optimality gap is
//! `max_{lower} f - min_{upper} f`.

use crate::cache::KernelBlock;
use crate::solver::workset::{is_lower, is_upper};

/// Lower bound on the curvature of a pair update
const TAU: f64 = 1e-12;

/// Outcome of one working-set solve
#[derive(Debug, Clone)]
pub struct LocalSolveResult {
    /// Change of each working-set alpha, in working-set order
    pub delta_alpha: Vec<f64>,
    /// Pair updates performed
    pub inner_iterations: usize,
    /// Optimality gap inside the working set before the first update
    pub local_diff: f64,
}

/// Optimality gap `max_{lower} f - min_{upper} f` over all rows
///
/// Returns `NEG_INFINITY` when either set is empty.
pub fn kkt_gap(y: &[f64], alpha: &[f64], f: &[f64], c: f64) -> f64 {
    let mut min_up = f64::INFINITY;
    let mut max_low = f64::NEG_INFINITY;
    for i in 0..f.len() {
        if is_upper(y[i], alpha[i], c) {
            min_up = min_up.min(f[i]);
        }
        if is_lower(y[i], alpha[i], c) {
            max_low = max_low.max(f[i]);
        }
    }
    if min_up.is_finite() && max_low.is_finite() {
        max_low - min_up
    } else {
        f64::NEG_INFINITY
    }
}

/// Optimize the working-set variables in place
///
/// `block.row(t)` holds the kernel values of working-set row `t` against all
/// rows. `alpha` is updated for the working-set indices and stays inside
/// `[0, c]`; `f` is not touched.
#[allow(clippy::too_many_arguments)]
pub fn solve_working_set(
    ws: &[usize],
    block: &KernelBlock,
    y: &[f64],
    alpha: &mut [f64],
    f: &[f64],
    c: f64,
    epsilon: f64,
    max_inner_iterations: usize,
) -> LocalSolveResult {
    let w = ws.len();
    let y_ws: Vec<f64> = ws.iter().map(|&i| y[i]).collect();
    let alpha_start: Vec<f64> = ws.iter().map(|&i| alpha[i]).collect();
    let mut alpha_ws = alpha_start.clone();
    let mut f_ws: Vec<f64> = ws.iter().map(|&i| f[i]).collect();
    let k = |s: usize, t: usize| block.row(s)[ws[t]];
    let diag: Vec<f64> = (0..w).map(|t| k(t, t)).collect();

    let mut local_eps = epsilon;
    let mut local_diff = 0.0;
    let mut inner_iterations = 0;

    for inner in 0..max_inner_iterations {
        // i: most violating upper index
        let mut i = None;
        let mut min_up = f64::INFINITY;
        let mut max_low = f64::NEG_INFINITY;
        for t in 0..w {
            if is_upper(y_ws[t], alpha_ws[t], c) && f_ws[t] < min_up {
                min_up = f_ws[t];
                i = Some(t);
            }
            if is_lower(y_ws[t], alpha_ws[t], c) && f_ws[t] > max_low {
                max_low = f_ws[t];
            }
        }
        let Some(i) = i else { break };
        if !max_low.is_finite() {
            break;
        }

        let diff = max_low - min_up;
        if inner == 0 {
            local_diff = diff;
            local_eps = epsilon.max(0.1 * diff);
        }
        if diff < local_eps {
            break;
        }

        // j: second-order choice among lower indices above f_i
        let mut j = None;
        let mut best = f64::INFINITY;
        for t in 0..w {
            if is_lower(y_ws[t], alpha_ws[t], c) && f_ws[t] > min_up {
                let b = f_ws[t] - min_up;
                let a = (diag[i] + diag[t] - 2.0 * k(i, t)).max(TAU);
                let gain = -b * b / a;
                if gain < best {
                    best = gain;
                    j = Some(t);
                }
            }
        }
        let Some(j) = j else { break };

        let b = f_ws[j] - f_ws[i];
        let a = (diag[i] + diag[j] - 2.0 * k(i, j)).max(TAU);
        let room_i = if y_ws[i] > 0.0 { c - alpha_ws[i] } else { alpha_ws[i] };
        let room_j = if y_ws[j] > 0.0 { alpha_ws[j] } else { c - alpha_ws[j] };
        let step = room_i.min(room_j).min(b / a);
        if step <= 0.0 {
            break;
        }

        alpha_ws[i] = (alpha_ws[i] + y_ws[i] * step).clamp(0.0, c);
        alpha_ws[j] = (alpha_ws[j] - y_ws[j] * step).clamp(0.0, c);
        for t in 0..w {
            f_ws[t] += step * (k(i, t) - k(j, t));
        }
        inner_iterations += 1;
    }

    let delta_alpha = (0..w)
        .map(|t| {
            alpha[ws[t]] = alpha_ws[t];
            alpha_ws[t] - alpha_start[t]
        })
        .collect();

    LocalSolveResult {
        delta_alpha,
        inner_iterations,
        local_diff,
    }
}

/// Bias of the decision function from the final state
///
/// With free vectors (`0 < alpha < c`) the bias is `-mean(f)` over them;
/// otherwise it is the midpoint `-(min_{upper} f + max_{lower} f) / 2`.
pub fn compute_bias(y: &[f64], alpha: &[f64], f: &[f64], c: f64) -> f64 {
    let mut free_sum = 0.0;
    let mut n_free = 0usize;
    let mut min_up = f64::INFINITY;
    let mut max_low = f64::NEG_INFINITY;

    for i in 0..f.len() {
        if alpha[i] > 0.0 && alpha[i] < c {
            free_sum += f[i];
            n_free += 1;
        }
        if is_upper(y[i], alpha[i], c) {
            min_up = min_up.min(f[i]);
        }
        if is_lower(y[i], alpha[i], c) {
            max_low = max_low.max(f[i]);
        }
    }

    if n_free > 0 {
        -free_sum / n_free as f64
    } else if min_up.is_finite() && max_low.is_finite() {
        -0.5 * (min_up + max_low)
    } else if min_up.is_finite() {
        -min_up
    } else if max_low.is_finite() {
        -max_low
    } else {
        0.0
    }
}

/// Dual objective `sum(alpha) - 1/2 alpha^T Q alpha`
///
/// Evaluated from the gradient: `1/2 sum alpha_i (1 - y_i f_i)`.
pub fn dual_objective(y: &[f64], alpha: &[f64], f: &[f64]) -> f64 {
    0.5 * (0..alpha.len())
        .map(|i| alpha[i] * (1.0 - y[i] * f[i]))
        .sum::<f64>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::KernelCache;
    use crate::core::CacheKind;
    use crate::dispatch::ExecutionContext;
    use crate::kernel::LinearKernel;
    use crate::table::NumericTable;
    use approx::assert_relative_eq;
    use std::sync::Arc;

    #[test]
    fn test_bias_with_free_vectors() {
        let y = [1.0, -1.0, 1.0];
        let alpha = [0.5, 0.5, 0.0];
        let f = [0.2, -0.4, 1.0];
        // free: 0 and 1 -> -(0.2 - 0.4) / 2
        assert_relative_eq!(compute_bias(&y, &alpha, &f, 1.0), 0.1, epsilon = 1e-15);
    }

    #[test]
    fn test_bias_without_free_vectors() {
        let y = [1.0, -1.0, 1.0];
        let alpha = [0.0, 1.0, 1.0];
        let f = [0.5, 0.3, -0.2];
        // upper: 0 and 1 (min 0.3), lower: 2 (max -0.2)
        assert_relative_eq!(compute_bias(&y, &alpha, &f, 1.0), -0.05, epsilon = 1e-15);
    }

    #[test]
    fn test_kkt_gap() {
        let y = [1.0, -1.0];
        let alpha = [0.0, 0.0];
        let f = [-1.0, 1.0];
        assert_eq!(kkt_gap(&y, &alpha, &f, 1.0), 2.0);

        // nothing can move down
        assert_eq!(kkt_gap(&[1.0], &[0.0], &[-1.0], 1.0), f64::NEG_INFINITY);
    }

    #[test]
    fn test_two_point_solve() {
        // x = +1 (y = +1) and x = -1 (y = -1), linear kernel
        let table = NumericTable::from_rows(&[vec![1.0], vec![-1.0]]).unwrap();
        let mut cache = KernelCache::new(
            CacheKind::NoCache,
            Arc::new(LinearKernel::new()),
            &table,
            0,
            &ExecutionContext::cpu(),
        )
        .unwrap();
        let ws = [0, 1];
        let block = cache.compute(&table, &ws, 1).unwrap();

        let y = [1.0, -1.0];
        let mut alpha = [0.0, 0.0];
        let f = [-1.0, 1.0];
        let result = solve_working_set(&ws, &block, &y, &mut alpha, &f, 10.0, 1e-3, 100);

        // optimum of the hard-margin problem: alpha = 0.5 each
        assert_relative_eq!(alpha[0], 0.5, epsilon = 1e-12);
        assert_relative_eq!(alpha[1], 0.5, epsilon = 1e-12);
        assert_eq!(result.delta_alpha, vec![0.5, 0.5]);
        assert_eq!(result.local_diff, 2.0);
        assert_eq!(result.inner_iterations, 1);
    }

    #[test]
    fn test_solve_respects_box() {
        let table = NumericTable::from_rows(&[vec![1.0], vec![-1.0]]).unwrap();
        let mut cache = KernelCache::new(
            CacheKind::NoCache,
            Arc::new(LinearKernel::new()),
            &table,
            0,
            &ExecutionContext::cpu(),
        )
        .unwrap();
        let block = cache.compute(&table, &[0, 1], 1).unwrap();

        let y = [1.0, -1.0];
        let mut alpha = [0.0, 0.0];
        let f = [-1.0, 1.0];
        solve_working_set(&[0, 1], &block, &y, &mut alpha, &f, 0.1, 1e-3, 100);
        assert_eq!(alpha, [0.1, 0.1]);
    }

    #[test]
    fn test_dual_objective() {
        let y = [1.0, -1.0];
        let alpha = [0.5, 0.5];
        // state after the two-point solve
        let f = [0.0, 0.0];
        assert_eq!(dual_objective(&y, &alpha, &f), 0.5);
    }
}
