//! Kernel trait definition

use crate::core::{DalError, Result};
use crate::table::{NumericTable, Row};
use rayon::prelude::*;

/// Kernel function trait
///
/// A kernel function K(x, y) must satisfy Mercer's condition to be valid for SVM.
/// Rows of either storage kind can be mixed freely.
pub trait Kernel: Send + Sync {
    /// Compute kernel value K(x, y)
    fn compute(&self, x: Row<'_>, y: Row<'_>) -> f64;

    /// Compute K(x, y) using precomputed squared norms
    ///
    /// Kernels built on distances (RBF) override this; the default ignores
    /// the norms.
    fn compute_with_norms(&self, x: Row<'_>, y: Row<'_>, x_norm_sq: f64, y_norm_sq: f64) -> f64 {
        let _ = (x_norm_sq, y_norm_sq);
        self.compute(x, y)
    }

    /// Short kernel name used in logs and saved models
    fn name(&self) -> &'static str;

    /// Check the kernel parameters before any evaluation
    fn validate(&self) -> Result<()> {
        Ok(())
    }

    /// Fill `out` with the row-major `x.n_rows() x y.n_rows()` block of kernel values
    ///
    /// `y_norms` holds the squared norm of every row of `y`. Rows of `x` are
    /// evaluated in parallel.
    fn compute_block(
        &self,
        x: &NumericTable,
        y: &NumericTable,
        y_norms: &[f64],
        out: &mut [f64],
    ) -> Result<()> {
        check_block_shape(x, y, y_norms, out)?;
        let n = y.n_rows();
        if n == 0 {
            return Ok(());
        }
        out.par_chunks_mut(n).enumerate().for_each(|(i, row_out)| {
            let xi = x.row(i);
            let xi_norm = xi.norm_squared();
            for (j, value) in row_out.iter_mut().enumerate() {
                *value = self.compute_with_norms(xi, y.row(j), xi_norm, y_norms[j]);
            }
        });
        Ok(())
    }

    /// Sequential variant of [`Kernel::compute_block`]
    fn compute_block_sequential(
        &self,
        x: &NumericTable,
        y: &NumericTable,
        y_norms: &[f64],
        out: &mut [f64],
    ) -> Result<()> {
        check_block_shape(x, y, y_norms, out)?;
        let n = y.n_rows();
        for i in 0..x.n_rows() {
            let xi = x.row(i);
            let xi_norm = xi.norm_squared();
            for j in 0..n {
                out[i * n + j] = self.compute_with_norms(xi, y.row(j), xi_norm, y_norms[j]);
            }
        }
        Ok(())
    }
}

fn check_block_shape(
    x: &NumericTable,
    y: &NumericTable,
    y_norms: &[f64],
    out: &[f64],
) -> Result<()> {
    if x.n_columns() != y.n_columns() {
        return Err(DalError::DimensionMismatch {
            expected: y.n_columns(),
            actual: x.n_columns(),
        });
    }
    if y_norms.len() != y.n_rows() {
        return Err(DalError::DimensionMismatch {
            expected: y.n_rows(),
            actual: y_norms.len(),
        });
    }
    if out.len() != x.n_rows() * y.n_rows() {
        return Err(DalError::DimensionMismatch {
            expected: x.n_rows() * y.n_rows(),
            actual: out.len(),
        });
    }
    Ok(())
}
