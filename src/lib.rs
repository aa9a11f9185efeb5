//! Rust data-analytics kernels: K-Means clustering and kernel SVM training
//!
//! K-Means runs Lloyd iterations as a local step over row blocks followed by
//! a master-side reduction, so the same code serves in-process batch runs and
//! caller-driven distributed runs. SVM training decomposes the dual problem
//! into small working sets, solved with SMO over cached kernel rows.

pub mod api;
pub mod cache;
pub mod core;
pub mod data;
pub mod dispatch;
pub mod kernel;
pub mod kmeans;
pub mod optimizer;
pub mod persistence;
pub mod solver;
pub mod table;

// Re-export main types for convenience
pub use crate::api::{EvaluationMetrics, KMeans, ModelInfo, TrainedModel, SVM};
pub use crate::cache::{CacheStats, KernelCache};
pub use crate::core::traits::*;
pub use crate::core::types::*;
pub use crate::core::{DalError, Result};
pub use crate::data::{CSVDataset, LibSVMDataset};
pub use crate::dispatch::{ComputeTarget, Device, ExecutionContext};
pub use crate::kernel::{Kernel, KernelFunction, LinearKernel, RBFKernel};
pub use crate::kmeans::{Centroids, InitMethod, KMeansResult, LloydEngine};
pub use crate::optimizer::{SVMOptimizer, SvmModel, TrainingState};
pub use crate::table::{Layout, NumericTable, Row, RowBlock};

// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
