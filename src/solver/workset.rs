//! Working-set selection for the decomposition solver
//!
//! Indices are ordered by their gradient value `f`. Walking that order from
//! the low end yields the candidates for increasing `y * alpha` (the "upper"
//! set), walking it from the high end yields candidates for decreasing it
//! (the "lower" set). Taking from both ends in turn fills the working set with
//! the most violating pairs first.

use crate::core::{DalError, Result};
use std::cmp::Ordering;

/// `y * alpha` can still grow: `(y > 0 && alpha < C) || (y < 0 && alpha > 0)`
#[inline]
pub fn is_upper(y: f64, alpha: f64, c: f64) -> bool {
    (y > 0.0 && alpha < c) || (y < 0.0 && alpha > 0.0)
}

/// `y * alpha` can still shrink: `(y > 0 && alpha > 0) || (y < 0 && alpha < C)`
#[inline]
pub fn is_lower(y: f64, alpha: f64, c: f64) -> bool {
    (y > 0.0 && alpha > 0.0) || (y < 0.0 && alpha < c)
}

/// Working-set size for `n` training rows on a device with the given
/// work-group limit: the largest power of two not above either, at least 2
pub fn working_set_size(n: usize, max_work_group_size: usize) -> usize {
    let bound = n.min(max_work_group_size).max(2);
    1 << (usize::BITS - 1 - bound.leading_zeros())
}

/// Select up to `n_select` indices not marked in `selected`
///
/// Chosen indices are marked in `selected`. When one side runs out of
/// eligible indices the other side keeps supplying them; fewer than
/// `n_select` indices are returned only when both sides are exhausted.
pub fn select_indices(
    y: &[f64],
    alpha: &[f64],
    f: &[f64],
    c: f64,
    n_select: usize,
    selected: &mut [bool],
) -> Vec<usize> {
    let n = f.len();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_unstable_by(|&a, &b| match f[a].total_cmp(&f[b]) {
        Ordering::Equal => a.cmp(&b),
        other => other,
    });

    let mut picked = Vec::with_capacity(n_select.min(n));
    let (mut low, mut high) = (0, n);
    let (mut low_done, mut high_done) = (false, false);
    let mut from_low = true;

    while picked.len() < n_select && !(low_done && high_done) {
        let next = if from_low {
            let mut found = None;
            while low < n {
                let i = order[low];
                low += 1;
                if !selected[i] && is_upper(y[i], alpha[i], c) {
                    found = Some(i);
                    break;
                }
            }
            found
        } else {
            let mut found = None;
            while high > 0 {
                high -= 1;
                let i = order[high];
                if !selected[i] && is_lower(y[i], alpha[i], c) {
                    found = Some(i);
                    break;
                }
            }
            found
        };

        match next {
            Some(i) => {
                selected[i] = true;
                picked.push(i);
            }
            None if from_low => low_done = true,
            None => high_done = true,
        }

        from_low = if low_done {
            false
        } else if high_done {
            true
        } else {
            !from_low
        };
    }
    picked
}

/// Working-set selector keeping half of the previous set between iterations
#[derive(Debug, Clone)]
pub struct WorkingSetSelector {
    n: usize,
    ws_size: usize,
    indicator: Vec<bool>,
    indices: Vec<usize>,
}

impl WorkingSetSelector {
    /// Create a selector for `n` rows and working sets of `ws_size` indices
    pub fn new(n: usize, ws_size: usize) -> Result<Self> {
        if ws_size == 0 || ws_size > n {
            return Err(DalError::InvalidParameter(format!(
                "Working set size {ws_size} must be in [1, {n}]"
            )));
        }
        Ok(Self {
            n,
            ws_size,
            indicator: vec![false; n],
            indices: Vec::with_capacity(ws_size),
        })
    }

    /// Requested working-set size
    pub fn ws_size(&self) -> usize {
        self.ws_size
    }

    /// The current working set
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    /// Move the second half of the current set to the front
    ///
    /// Returns how many indices were kept.
    pub fn copy_last_to_first(&mut self) -> usize {
        let keep = (self.ws_size / 2).min(self.indices.len());
        let start = self.indices.len() - keep;
        self.indices.drain(..start);
        keep
    }

    /// Select the next working set
    ///
    /// The first call selects a full set; later calls keep the second half
    /// of the previous set and select the rest fresh.
    pub fn select(&mut self, y: &[f64], alpha: &[f64], f: &[f64], c: f64) -> Result<&[usize]> {
        if let Some(&len) = [y.len(), alpha.len(), f.len()].iter().find(|&&len| len != self.n) {
            return Err(DalError::DimensionMismatch {
                expected: self.n,
                actual: len,
            });
        }

        self.indicator.fill(false);
        if !self.indices.is_empty() {
            self.copy_last_to_first();
            for &i in &self.indices {
                self.indicator[i] = true;
            }
        }

        let n_select = self.ws_size - self.indices.len();
        let fresh = select_indices(y, alpha, f, c, n_select, &mut self.indicator);
        self.indices.extend(fresh);
        Ok(&self.indices)
    }
}
