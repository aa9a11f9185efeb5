//! Linear kernel implementation

use crate::kernel::Kernel;
use crate::table::Row;

/// Linear kernel: K(x, y) = x^T * y
///
/// Sparse rows are multiplied with a merge over their sorted indices, dense
/// rows with the unrolled dense product.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearKernel;

impl LinearKernel {
    /// Create a new linear kernel
    pub fn new() -> Self {
        Self
    }
}

impl Kernel for LinearKernel {
    fn compute(&self, x: Row<'_>, y: Row<'_>) -> f64 {
        x.dot(&y)
    }

    fn name(&self) -> &'static str {
        "linear"
    }
}
