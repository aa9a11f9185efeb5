//! RBF (Radial Basis Function) kernel implementation
//!
//! The RBF kernel is defined as: K(x, y) = exp(-γ * ||x - y||²)
//! where γ (gamma) is a hyperparameter that controls the kernel width.

use crate::core::{DalError, Result};
use crate::kernel::Kernel;
use crate::table::Row;

/// RBF (Radial Basis Function) kernel: K(x, y) = exp(-γ * ||x - y||²)
///
/// The gamma parameter controls the "reach" of each training example:
/// - High gamma: close points have high influence (potential overfitting)
/// - Low gamma: distant points have influence (potential underfitting)
#[derive(Debug, Clone, Copy)]
pub struct RBFKernel {
    gamma: f64,
}

impl RBFKernel {
    /// Create a new RBF kernel with specified gamma parameter
    ///
    /// # Panics
    /// Panics if gamma is not positive
    pub fn new(gamma: f64) -> Self {
        assert!(gamma > 0.0, "Gamma must be positive, got: {}", gamma);
        Self { gamma }
    }

    /// Create an RBF kernel, reporting a non-positive gamma as an error
    pub fn try_new(gamma: f64) -> Result<Self> {
        if !(gamma > 0.0) || !gamma.is_finite() {
            return Err(DalError::InvalidParameter(format!(
                "Gamma must be positive, got: {gamma}"
            )));
        }
        Ok(Self { gamma })
    }

    /// Create RBF kernel with gamma = 1.0 / n_features
    pub fn with_auto_gamma(n_features: usize) -> Self {
        assert!(n_features > 0, "Number of features must be positive");
        Self::new(1.0 / n_features as f64)
    }

    /// Get the gamma parameter
    pub fn gamma(&self) -> f64 {
        self.gamma
    }
}

impl Default for RBFKernel {
    /// Default RBF kernel with gamma = 1.0
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl Kernel for RBFKernel {
    fn compute(&self, x: Row<'_>, y: Row<'_>) -> f64 {
        self.compute_with_norms(x, y, x.norm_squared(), y.norm_squared())
    }

    fn compute_with_norms(&self, x: Row<'_>, y: Row<'_>, x_norm_sq: f64, y_norm_sq: f64) -> f64 {
        // ||x - y||² = ||x||² + ||y||² - 2*x^T*y, clamped against rounding
        let squared_distance = (x_norm_sq + y_norm_sq - 2.0 * x.dot(&y)).max(0.0);
        (-self.gamma * squared_distance).exp()
    }

    fn name(&self) -> &'static str {
        "rbf"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sparse<'a>(indices: &'a [usize], values: &'a [f64]) -> Row<'a> {
        Row::Sparse { indices, values }
    }

    #[test]
    fn test_rbf_kernel_creation() {
        assert_eq!(RBFKernel::new(0.5).gamma(), 0.5);
        assert_eq!(RBFKernel::with_auto_gamma(10).gamma(), 0.1);
        assert_eq!(RBFKernel::default().gamma(), 1.0);
        assert!(RBFKernel::try_new(0.0).is_err());
        assert!(RBFKernel::try_new(f64::NAN).is_err());
    }

    #[test]
    #[should_panic(expected = "Gamma must be positive")]
    fn test_rbf_kernel_invalid_gamma() {
        RBFKernel::new(-0.5);
    }

    #[test]
    fn test_rbf_kernel_identical_vectors() {
        let kernel = RBFKernel::new(1.0);
        let x = Row::Dense(&[1.0, 2.0, 3.0]);

        // K(x, x) should always be 1.0 for RBF kernel
        assert!((kernel.compute(x, x) - 1.0).abs() < 1e-10);
    }

    #[test]
    fn test_rbf_kernel_orthogonal_vectors() {
        let kernel = RBFKernel::new(1.0);
        let x = sparse(&[0, 2], &[1.0, 1.0]);
        let y = sparse(&[1, 3], &[1.0, 1.0]);

        // ||x - y||² = 4 (no overlap)
        let expected = (-4.0_f64).exp();
        assert!((kernel.compute(x, y) - expected).abs() < 1e-10);
    }

    #[test]
    fn test_rbf_kernel_dense_matches_sparse() {
        let kernel = RBFKernel::new(0.5);
        let dense = Row::Dense(&[1.0, 0.0, 3.0, 0.0, 2.0, 4.0]);
        let other = sparse(&[2, 3, 5], &[2.0, 1.0, 4.0]);
        let as_sparse = sparse(&[0, 2, 4, 5], &[1.0, 3.0, 2.0, 4.0]);

        // ||x - y||² = 1 + 1 + 1 + 4 + 0 = 7
        let expected = (-0.5 * 7.0_f64).exp();
        assert!((kernel.compute(dense, other) - expected).abs() < 1e-10);
        assert!((kernel.compute(as_sparse, other) - expected).abs() < 1e-10);
    }

    #[test]
    fn test_rbf_kernel_numerical_stability() {
        let kernel = RBFKernel::new(1e-6);
        let x = Row::Dense(&[1e6]);
        let y = Row::Dense(&[-1e6]);

        let result = kernel.compute(x, y);
        assert!(result.is_finite());
        assert!((0.0..=1.0).contains(&result));
    }
}
