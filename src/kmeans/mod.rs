//! K-Means clustering with Lloyd iterations
//!
//! The engine is split the way a distributed run is split:
//!
//! - [`local`]: assignment and accumulation over one block of rows, dispatched
//!   to a scalar, vectorized or device implementation
//! - [`partial`]: the per-block accumulators and their typed collection
//! - [`reduction`]: merging partials and finalizing the next centroids,
//!   including empty-cluster repair
//! - [`controller`]: the iteration loop and the two-step distributed protocol
//!
//! # Example
//!
//! ```
//! use rdal::core::KMeansConfig;
//! use rdal::dispatch::ExecutionContext;
//! use rdal::kmeans::{init_centroids, InitMethod, LloydEngine};
//! use rdal::table::NumericTable;
//!
//! let table = NumericTable::from_rows(&[
//!     vec![0.0, 0.0],
//!     vec![0.5, 0.0],
//!     vec![9.0, 9.0],
//!     vec![9.5, 9.0],
//! ])?;
//! let config = KMeansConfig {
//!     n_clusters: 2,
//!     max_iterations: 10,
//!     ..Default::default()
//! };
//! let initial = init_centroids(&table, 2, InitMethod::PlusPlus { seed: 3 })?;
//! let result = LloydEngine::new(config, ExecutionContext::cpu())?.compute(&table, &initial)?;
//! assert_eq!(result.centroids.map(|c| c.n_clusters()), Some(2));
//! # Ok::<(), rdal::core::DalError>(())
//! ```

pub mod centroids;
pub mod controller;
pub mod device;
pub mod init;
pub mod local;
pub mod partial;
pub mod reduction;

pub use self::centroids::Centroids;
pub use self::controller::{
    DistributedStep1Local, DistributedStep2Master, KMeansResult, LloydEngine,
};
pub use self::init::{init_centroids, InitMethod};
pub use self::local::LocalStepOptions;
pub use self::partial::{PartialResult, PartialResultCollection};
pub use self::reduction::IterationOutcome;
