//! Kernel-value cache for the working-set solver
//!
//! Every outer SVM iteration needs the kernel values between the W rows of
//! the working set and all N training rows. [`KernelCache::compute`] gathers
//! the working-set rows into a sub-table, evaluates the injected kernel
//! against the full table and returns the W x N [`KernelBlock`].
//!
//! The [`CacheKind`] decides what survives between iterations:
//! `NoCache` recomputes the whole block each call, `Simple` keeps every
//! kernel row ever computed, and `Lru` keeps a bounded number of rows and
//! evicts the least recently used one.

use crate::core::{try_zeroed, CacheKind, DalError, Result};
use crate::dispatch::{DispatchTable, ExecutionContext};
use crate::kernel::Kernel;
use crate::table::NumericTable;
use log::debug;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Arc;

/// Kernel values between working-set rows and all training rows, row-major
#[derive(Debug, Clone, PartialEq)]
pub struct KernelBlock {
    n_rows: usize,
    n_columns: usize,
    values: Vec<f64>,
}

impl KernelBlock {
    /// Number of working-set rows (W)
    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    /// Number of training rows (N)
    pub fn n_columns(&self) -> usize {
        self.n_columns
    }

    /// Kernel values of working-set position `t` against every training row
    pub fn row(&self, t: usize) -> &[f64] {
        &self.values[t * self.n_columns..(t + 1) * self.n_columns]
    }

    /// Row-major values
    pub fn values(&self) -> &[f64] {
        &self.values
    }
}

/// Block evaluation resolved for the execution target
type BlockFn<K> =
    fn(&K, &NumericTable, &NumericTable, &[f64], &mut [f64], &ExecutionContext) -> Result<()>;

fn block_scalar<K: Kernel>(
    kernel: &K,
    x: &NumericTable,
    y: &NumericTable,
    y_norms: &[f64],
    out: &mut [f64],
    _ctx: &ExecutionContext,
) -> Result<()> {
    kernel.compute_block_sequential(x, y, y_norms, out)
}

fn block_parallel<K: Kernel>(
    kernel: &K,
    x: &NumericTable,
    y: &NumericTable,
    y_norms: &[f64],
    out: &mut [f64],
    _ctx: &ExecutionContext,
) -> Result<()> {
    kernel.compute_block(x, y, y_norms, out)
}

fn block_device<K: Kernel>(
    kernel: &K,
    x: &NumericTable,
    y: &NumericTable,
    y_norms: &[f64],
    out: &mut [f64],
    ctx: &ExecutionContext,
) -> Result<()> {
    let device = ctx.require_device("svm_kernel_block")?;
    device.submit("svm_kernel_block", || kernel.compute_block(x, y, y_norms, out))
}

/// Kernel-row cache over one training table
pub struct KernelCache<K: Kernel> {
    kind: CacheKind,
    kernel: Arc<K>,
    ctx: ExecutionContext,
    block_fn: BlockFn<K>,
    n_rows: usize,
    norms: Vec<f64>,
    simple: Vec<Option<Vec<f64>>>,
    lru: Option<LruCache<usize, Vec<f64>>>,
    hits: u64,
    misses: u64,
}

impl<K: Kernel> KernelCache<K> {
    /// Create a cache for `table`
    ///
    /// `cache_size` is a byte budget; it bounds the `Lru` variant, which keeps
    /// at least one kernel row.
    pub fn new(
        kind: CacheKind,
        kernel: Arc<K>,
        table: &NumericTable,
        cache_size: usize,
        ctx: &ExecutionContext,
    ) -> Result<Self> {
        let block_fn = DispatchTable::new(
            "svm_kernel_block",
            block_scalar::<K> as BlockFn<K>,
            block_parallel::<K> as BlockFn<K>,
            Some(block_device::<K> as BlockFn<K>),
        )
        .resolve(ctx)?;

        let n_rows = table.n_rows();
        let row_bytes = (n_rows * std::mem::size_of::<f64>()).max(1);
        let lru = match kind {
            CacheKind::Lru => {
                let capacity = NonZeroUsize::new(cache_size / row_bytes).unwrap_or(NonZeroUsize::MIN);
                debug!("Kernel cache: LRU of {capacity} rows of {n_rows} values");
                Some(LruCache::new(capacity))
            }
            _ => None,
        };
        let simple = match kind {
            CacheKind::Simple => vec![None; n_rows],
            _ => Vec::new(),
        };

        Ok(Self {
            kind,
            kernel,
            ctx: ctx.clone(),
            block_fn,
            n_rows,
            norms: table.row_norms_squared(),
            simple,
            lru,
            hits: 0,
            misses: 0,
        })
    }

    /// Cache strategy
    pub fn kind(&self) -> CacheKind {
        self.kind
    }

    /// Kernel values of the working-set rows against every row of `table`
    ///
    /// `table` must be the table the cache was built for; the gathered
    /// sub-table holds exactly `ws_indices.len()` rows of `n_features`
    /// columns, in working-set order.
    pub fn compute(
        &mut self,
        table: &NumericTable,
        ws_indices: &[usize],
        n_features: usize,
    ) -> Result<KernelBlock> {
        if table.n_rows() != self.n_rows {
            return Err(DalError::DimensionMismatch {
                expected: self.n_rows,
                actual: table.n_rows(),
            });
        }
        if table.n_columns() != n_features {
            return Err(DalError::DimensionMismatch {
                expected: n_features,
                actual: table.n_columns(),
            });
        }

        let n = self.n_rows;
        let w = ws_indices.len();
        let mut values = try_zeroed(w * n, "kernel block")?;

        // positions whose kernel row has to be computed now
        let mut missing = Vec::with_capacity(w);
        for (t, &idx) in ws_indices.iter().enumerate() {
            let cached = match self.kind {
                CacheKind::NoCache => None,
                CacheKind::Simple => self.simple.get(idx).and_then(|row| row.as_deref()),
                CacheKind::Lru => self
                    .lru
                    .as_mut()
                    .and_then(|cache| cache.get(&idx))
                    .map(|row| row.as_slice()),
            };
            match cached {
                Some(row) => {
                    values[t * n..(t + 1) * n].copy_from_slice(row);
                    self.hits += 1;
                }
                None => {
                    missing.push(t);
                    self.misses += 1;
                }
            }
        }

        if !missing.is_empty() {
            let rows: Vec<usize> = missing.iter().map(|&t| ws_indices[t]).collect();
            let sub = table.gather_rows(&rows)?;
            if sub.n_rows() != rows.len() || sub.n_columns() != n_features {
                return Err(DalError::DimensionMismatch {
                    expected: rows.len() * n_features,
                    actual: sub.n_rows() * sub.n_columns(),
                });
            }

            let mut fresh = try_zeroed(rows.len() * n, "kernel block")?;
            (self.block_fn)(&*self.kernel, &sub, table, &self.norms, &mut fresh, &self.ctx)?;

            for (r, &t) in missing.iter().enumerate() {
                let row = &fresh[r * n..(r + 1) * n];
                values[t * n..(t + 1) * n].copy_from_slice(row);
                match self.kind {
                    CacheKind::NoCache => {}
                    CacheKind::Simple => self.simple[ws_indices[t]] = Some(row.to_vec()),
                    CacheKind::Lru => {
                        if let Some(cache) = self.lru.as_mut() {
                            cache.put(ws_indices[t], row.to_vec());
                        }
                    }
                }
            }
        }

        Ok(KernelBlock {
            n_rows: w,
            n_columns: n,
            values,
        })
    }

    /// Get cache hit rate
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// Get cache statistics, counted in kernel rows
    pub fn stats(&self) -> CacheStats {
        let (capacity, size) = match self.kind {
            CacheKind::NoCache => (0, 0),
            CacheKind::Simple => (
                self.n_rows,
                self.simple.iter().filter(|row| row.is_some()).count(),
            ),
            CacheKind::Lru => self
                .lru
                .as_ref()
                .map(|cache| (cache.cap().get(), cache.len()))
                .unwrap_or((0, 0)),
        };
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            capacity,
            size,
        }
    }

    /// Drop every cached row and reset the counters
    pub fn clear(&mut self) {
        self.simple.iter_mut().for_each(|row| *row = None);
        if let Some(cache) = self.lru.as_mut() {
            cache.clear();
        }
        self.hits = 0;
        self.misses = 0;
    }
}

/// Cache statistics
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub capacity: usize,
    pub size: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::Device;
    use crate::kernel::{LinearKernel, RBFKernel};

    fn table() -> NumericTable {
        NumericTable::from_rows(&[
            vec![1.0, 0.0],
            vec![0.0, 2.0],
            vec![1.0, 1.0],
            vec![3.0, -1.0],
        ])
        .unwrap()
    }

    fn cache(kind: CacheKind, size: usize) -> KernelCache<LinearKernel> {
        KernelCache::new(
            kind,
            Arc::new(LinearKernel::new()),
            &table(),
            size,
            &ExecutionContext::cpu(),
        )
        .unwrap()
    }

    #[test]
    fn test_no_cache_block() {
        let table = table();
        let mut cache = cache(CacheKind::NoCache, 0);
        let block = cache.compute(&table, &[2, 0], 2).unwrap();

        assert_eq!(block.n_rows(), 2);
        assert_eq!(block.n_columns(), 4);
        assert_eq!(block.row(0), &[1.0, 2.0, 2.0, 2.0]);
        assert_eq!(block.row(1), &[1.0, 0.0, 1.0, 3.0]);
        assert_eq!(cache.stats().hits, 0);
        assert_eq!(cache.stats().misses, 2);
    }

    #[test]
    fn test_simple_cache_reuses_rows() {
        let table = table();
        let mut cache = cache(CacheKind::Simple, 0);
        let first = cache.compute(&table, &[0, 1], 2).unwrap();
        let second = cache.compute(&table, &[1, 3], 2).unwrap();

        assert_eq!(first.row(1), second.row(0));
        assert_eq!(cache.stats().hits, 1);
        assert_eq!(cache.stats().misses, 3);
        assert_eq!(cache.stats().size, 3);
        assert_eq!(cache.hit_rate(), 0.25);
    }

    #[test]
    fn test_lru_cache_evicts() {
        let table = table();
        // room for one kernel row of four values
        let mut cache = cache(CacheKind::Lru, 4 * 8);
        cache.compute(&table, &[0], 2).unwrap();
        cache.compute(&table, &[1], 2).unwrap();
        cache.compute(&table, &[0], 2).unwrap();

        let stats = cache.stats();
        assert_eq!(stats.capacity, 1);
        assert_eq!(stats.size, 1);
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 3);

        cache.compute(&table, &[0], 2).unwrap();
        assert_eq!(cache.stats().hits, 1);

        cache.clear();
        assert_eq!(cache.stats().size, 0);
        assert_eq!(cache.stats().hits, 0);
    }

    #[test]
    fn test_all_variants_agree() {
        let table = table();
        let ws = [3, 1, 2];
        let reference = cache(CacheKind::NoCache, 0).compute(&table, &ws, 2).unwrap();
        for kind in [CacheKind::Simple, CacheKind::Lru] {
            let mut c = cache(kind, 1024);
            c.compute(&table, &[1], 2).unwrap();
            assert_eq!(c.compute(&table, &ws, 2).unwrap(), reference);
        }
    }

    #[test]
    fn test_shape_validation() {
        let table = table();
        let mut cache = cache(CacheKind::NoCache, 0);
        assert!(cache.compute(&table, &[0], 3).is_err());
        assert!(cache.compute(&table, &[7], 2).is_err());

        let other = NumericTable::from_rows(&[vec![1.0, 1.0]]).unwrap();
        assert!(cache.compute(&other, &[0], 2).is_err());
    }

    #[test]
    fn test_targets_agree() {
        let table = table();
        let kernel = Arc::new(RBFKernel::new(0.5));
        let device = Device::open("test-gpu", 2, 16).unwrap();
        let mut blocks = Vec::new();
        for ctx in [
            ExecutionContext::cpu_scalar(),
            ExecutionContext::cpu(),
            ExecutionContext::with_device(device),
        ] {
            let mut cache =
                KernelCache::new(CacheKind::NoCache, kernel.clone(), &table, 0, &ctx).unwrap();
            blocks.push(cache.compute(&table, &[0, 2], 2).unwrap());
        }
        assert_eq!(blocks[0], blocks[1]);
        assert_eq!(blocks[1], blocks[2]);
    }
}
