//! Execution context and compute-kernel dispatch
//!
//! Every entry point takes an explicit [`ExecutionContext`]. The context names
//! the compute target once; algorithms resolve it against a [`DispatchTable`]
//! of plain function pointers before entering their hot loops, so the per-row
//! code never branches on the target.

use crate::core::{DalError, Result};
use log::debug;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::fmt;
use std::sync::Arc;

/// Work-group limit assumed for CPU targets
pub const CPU_MAX_WORK_GROUP_SIZE: usize = 256;

/// Where compute kernels run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComputeTarget {
    /// Plain per-element loops
    CpuScalar,
    /// Norm-assisted, unrolled loops on the global rayon pool
    CpuVectorized,
    /// Staged kernel pipeline on a dedicated device queue
    Device,
}

/// An offload device: a dedicated worker pool with a work-group limit
#[derive(Clone)]
pub struct Device {
    name: String,
    max_work_group_size: usize,
    pool: Arc<ThreadPool>,
}

impl Device {
    /// Open a device with the given number of compute units
    pub fn open(name: &str, compute_units: usize, max_work_group_size: usize) -> Result<Self> {
        if max_work_group_size < 2 || !max_work_group_size.is_power_of_two() {
            return Err(DalError::InvalidParameter(format!(
                "Max work-group size must be a power of two >= 2, got {max_work_group_size}"
            )));
        }
        let pool = ThreadPoolBuilder::new()
            .num_threads(compute_units)
            .thread_name({
                let name = name.to_string();
                move |i| format!("{name}-cu{i}")
            })
            .build()
            .map_err(|e| DalError::DeviceUnavailable(format!("{name}: {e}")))?;

        debug!(
            "Opened device {name} with {} compute units, max work-group {max_work_group_size}",
            pool.current_num_threads()
        );

        Ok(Self {
            name: name.to_string(),
            max_work_group_size,
            pool: Arc::new(pool),
        })
    }

    /// Device name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Largest work-group the device accepts
    pub fn max_work_group_size(&self) -> usize {
        self.max_work_group_size
    }

    /// Number of compute units
    pub fn compute_units(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Run one kernel on the device queue and wait for its completion
    pub fn submit<T, F>(&self, kernel: &str, f: F) -> Result<T>
    where
        T: Send,
        F: FnOnce() -> Result<T> + Send,
    {
        debug!("{}: launching kernel {kernel}", self.name);
        let result = self.pool.install(f);
        if let Err(ref e) = result {
            debug!("{}: kernel {kernel} failed: {e}", self.name);
        }
        result
    }
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("name", &self.name)
            .field("max_work_group_size", &self.max_work_group_size)
            .field("compute_units", &self.compute_units())
            .finish()
    }
}

/// Explicit execution context passed into every compute entry point
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    target: ComputeTarget,
    device: Option<Device>,
}

impl ExecutionContext {
    /// Vectorized CPU execution
    pub fn cpu() -> Self {
        Self {
            target: ComputeTarget::CpuVectorized,
            device: None,
        }
    }

    /// Scalar CPU execution
    pub fn cpu_scalar() -> Self {
        Self {
            target: ComputeTarget::CpuScalar,
            device: None,
        }
    }

    /// Execution on an offload device
    pub fn with_device(device: Device) -> Self {
        Self {
            target: ComputeTarget::Device,
            device: Some(device),
        }
    }

    /// The selected compute target
    pub fn target(&self) -> ComputeTarget {
        self.target
    }

    /// The device, when the target is a device
    pub fn device(&self) -> Option<&Device> {
        self.device.as_ref()
    }

    /// The device or an error naming the operation that needed it
    pub fn require_device(&self, operation: &str) -> Result<&Device> {
        self.device.as_ref().ok_or_else(|| {
            DalError::DeviceUnavailable(format!("{operation} requires a device context"))
        })
    }

    /// Work-group limit of the target
    pub fn max_work_group_size(&self) -> usize {
        self.device
            .as_ref()
            .map(|d| d.max_work_group_size())
            .unwrap_or(CPU_MAX_WORK_GROUP_SIZE)
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::cpu()
    }
}

/// Implementations of one kernel for each compute target
#[derive(Debug, Clone, Copy)]
pub struct DispatchTable<F: Copy> {
    name: &'static str,
    scalar: F,
    vectorized: F,
    device: Option<F>,
}

impl<F: Copy> DispatchTable<F> {
    /// Create a dispatch table
    pub const fn new(name: &'static str, scalar: F, vectorized: F, device: Option<F>) -> Self {
        Self {
            name,
            scalar,
            vectorized,
            device,
        }
    }

    /// Kernel name
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Pick the implementation for the context's target
    ///
    /// A device target without a device implementation is an error; there is
    /// no implicit fallback to the CPU.
    pub fn resolve(&self, ctx: &ExecutionContext) -> Result<F> {
        match ctx.target() {
            ComputeTarget::CpuScalar => Ok(self.scalar),
            ComputeTarget::CpuVectorized => Ok(self.vectorized),
            ComputeTarget::Device => {
                ctx.require_device(self.name)?;
                self.device.ok_or_else(|| {
                    DalError::DeviceUnavailable(format!(
                        "kernel {} has no device implementation",
                        self.name
                    ))
                })
            }
        }
    }
}
