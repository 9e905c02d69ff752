//! Queried device properties backing occupancy analysis.

use crate::capability::DeviceCapability;

/// Snapshot of one device's hardware limits, queried once per context.
///
/// This is the device half of launch planning: together with a function's
/// resource footprint it fully determines the launch configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceProperties {
    pub capability: DeviceCapability,
    pub multiprocessor_count: u32,
    pub warp_size: u32,
    pub max_threads_per_block: u32,
    pub max_threads_per_multiprocessor: u32,
    pub max_blocks_per_multiprocessor: u32,
    pub registers_per_multiprocessor: u32,
    pub shared_mem_per_multiprocessor: u32,
    pub shared_mem_per_block: u32,
    pub max_grid_dim_x: u32,
}

impl DeviceProperties {
    /// Hardware ceiling on concurrently resident warps per multiprocessor.
    pub fn max_warps_per_multiprocessor(&self) -> u32 {
        self.max_threads_per_multiprocessor / self.warp_size
    }
}

#[cfg(feature = "cuda")]
impl DeviceProperties {
    /// Query the properties of the device behind a driver context.
    pub fn query(context: &cudarc::driver::CudaContext) -> crate::error::Result<Self> {
        use cudarc::driver::sys::CUdevice_attribute::*;
        use snafu::ResultExt;

        use crate::error::DriverSnafu;

        let query = |attribute| {
            context
                .attribute(attribute)
                .context(DriverSnafu)
                .map(|value| value as u32)
        };

        Ok(Self {
            capability: DeviceCapability::new(
                query(CU_DEVICE_ATTRIBUTE_COMPUTE_CAPABILITY_MAJOR)?,
                query(CU_DEVICE_ATTRIBUTE_COMPUTE_CAPABILITY_MINOR)?,
            ),
            multiprocessor_count: query(CU_DEVICE_ATTRIBUTE_MULTIPROCESSOR_COUNT)?,
            warp_size: query(CU_DEVICE_ATTRIBUTE_WARP_SIZE)?,
            max_threads_per_block: query(CU_DEVICE_ATTRIBUTE_MAX_THREADS_PER_BLOCK)?,
            max_threads_per_multiprocessor: query(CU_DEVICE_ATTRIBUTE_MAX_THREADS_PER_MULTIPROCESSOR)?,
            max_blocks_per_multiprocessor: query(CU_DEVICE_ATTRIBUTE_MAX_BLOCKS_PER_MULTIPROCESSOR)?,
            registers_per_multiprocessor: query(CU_DEVICE_ATTRIBUTE_MAX_REGISTERS_PER_MULTIPROCESSOR)?,
            shared_mem_per_multiprocessor: query(CU_DEVICE_ATTRIBUTE_MAX_SHARED_MEMORY_PER_MULTIPROCESSOR)?,
            shared_mem_per_block: query(CU_DEVICE_ATTRIBUTE_MAX_SHARED_MEMORY_PER_BLOCK)?,
            max_grid_dim_x: query(CU_DEVICE_ATTRIBUTE_MAX_GRID_DIM_X)?,
        })
    }
}
