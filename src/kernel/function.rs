//! Kernel selected at run time, for saved models and the command line

use crate::core::{DalError, Result};
use crate::kernel::{Kernel, RBFKernel};
use crate::table::Row;
use serde::{Deserialize, Serialize};

/// One of the built-in kernels
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum KernelFunction {
    #[default]
    Linear,
    Rbf { gamma: f64 },
}

impl KernelFunction {
    /// Build from a kernel name and an optional gamma
    pub fn from_name(name: &str, gamma: f64) -> Result<Self> {
        match name {
            "linear" => Ok(KernelFunction::Linear),
            "rbf" => Ok(KernelFunction::Rbf {
                gamma: RBFKernel::try_new(gamma)?.gamma(),
            }),
            other => Err(DalError::InvalidParameter(format!(
                "Unknown kernel '{other}', expected 'linear' or 'rbf'"
            ))),
        }
    }
}

impl Kernel for KernelFunction {
    fn compute(&self, x: Row<'_>, y: Row<'_>) -> f64 {
        match *self {
            KernelFunction::Linear => x.dot(&y),
            KernelFunction::Rbf { gamma } => {
                rbf(gamma, x.dot(&y), x.norm_squared(), y.norm_squared())
            }
        }
    }

    fn compute_with_norms(&self, x: Row<'_>, y: Row<'_>, x_norm_sq: f64, y_norm_sq: f64) -> f64 {
        match *self {
            KernelFunction::Linear => x.dot(&y),
            KernelFunction::Rbf { gamma } => rbf(gamma, x.dot(&y), x_norm_sq, y_norm_sq),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            KernelFunction::Linear => "linear",
            KernelFunction::Rbf { .. } => "rbf",
        }
    }

    fn validate(&self) -> Result<()> {
        if let KernelFunction::Rbf { gamma } = *self {
            RBFKernel::try_new(gamma)?;
        }
        Ok(())
    }
}

fn rbf(gamma: f64, dot: f64, x_norm_sq: f64, y_norm_sq: f64) -> f64 {
    (-gamma * (x_norm_sq + y_norm_sq - 2.0 * dot).max(0.0)).exp()
}
