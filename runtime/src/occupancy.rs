//! Launch-configuration planning from occupancy analysis.
//!
//! Everything here is a pure function of its inputs: a function's resource
//! footprint, a device's multiprocessor characteristics, and the caller's
//! problem size fully determine the launch configuration, so identical
//! inputs always produce bit-identical plans.

use iskra_device::{DeviceProperties, FunctionRuntimeInfo};

/// Dynamic shared-memory requirement of a kernel, sized at plan time once
/// the block shape is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DynamicSharedMemory {
    /// No dynamic shared memory.
    #[default]
    None,
    /// Bytes per thread in the block (reduction scratch and the like).
    PerThread(u32),
    /// Fixed allocation per block.
    PerBlock(u32),
}

impl DynamicSharedMemory {
    fn bytes_for_block(self, threads: u32) -> u32 {
        match self {
            DynamicSharedMemory::None => 0,
            DynamicSharedMemory::PerThread(bytes) => bytes * threads,
            DynamicSharedMemory::PerBlock(bytes) => bytes,
        }
    }
}

/// Launch configuration for one kernel build.
///
/// Recomputed for every build call and carried by the built-kernel handle;
/// never cached beyond it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LaunchConfig {
    pub grid_dim: (u32, u32, u32),
    pub block_dim: (u32, u32, u32),
    pub shared_mem_bytes: u32,
    /// Resident warps over the hardware maximum, in percent.
    pub occupancy_pct: u32,
}

/// Plan a launch: the block size maximizing concurrently resident warps
/// without violating any resource limit, a grid covering `problem_size` by
/// ceiling division, and the dynamic shared-memory allocation for that
/// block.
pub fn plan(
    info: &FunctionRuntimeInfo,
    props: &DeviceProperties,
    problem_size: usize,
    dynamic_smem: DynamicSharedMemory,
) -> LaunchConfig {
    let block = optimal_block_size(info, props, dynamic_smem);
    LaunchConfig {
        grid_dim: grid_covering(problem_size, block, props),
        block_dim: (block, 1, 1),
        shared_mem_bytes: dynamic_smem.bytes_for_block(block),
        occupancy_pct: occupancy_pct(info, props, block, dynamic_smem),
    }
}

/// Sweep candidate block sizes (warp multiples up to the tighter of the
/// function and device thread limits) and keep the one with the most
/// resident warps. Ties go to the larger block, which needs fewer blocks to
/// cover the same problem.
fn optimal_block_size(info: &FunctionRuntimeInfo, props: &DeviceProperties, dynamic_smem: DynamicSharedMemory) -> u32 {
    let warp = props.warp_size;
    let ceiling = info.max_threads_per_block.min(props.max_threads_per_block).max(warp);

    let mut best = warp;
    let mut best_warps = 0;

    let mut threads = warp;
    while threads <= ceiling {
        let warps = resident_warps(info, props, threads, dynamic_smem);
        if warps >= best_warps {
            best = threads;
            best_warps = warps;
        }
        threads += warp;
    }

    best
}

/// Warps concurrently resident on one multiprocessor for a given block size.
fn resident_warps(
    info: &FunctionRuntimeInfo,
    props: &DeviceProperties,
    threads: u32,
    dynamic_smem: DynamicSharedMemory,
) -> u32 {
    let blocks = resident_blocks(info, props, threads, dynamic_smem);
    (blocks * (threads / props.warp_size)).min(props.max_warps_per_multiprocessor())
}

/// Blocks of `threads` threads concurrently resident on one multiprocessor,
/// limited by every per-multiprocessor resource the block consumes. Zero
/// means the block shape cannot run at all.
fn resident_blocks(
    info: &FunctionRuntimeInfo,
    props: &DeviceProperties,
    threads: u32,
    dynamic_smem: DynamicSharedMemory,
) -> u32 {
    let smem_per_block = info.shared_mem_bytes + dynamic_smem.bytes_for_block(threads);
    if smem_per_block > props.shared_mem_per_block {
        return 0;
    }

    let mut blocks = props.max_blocks_per_multiprocessor.min(props.max_threads_per_multiprocessor / threads);
    if info.registers > 0 {
        blocks = blocks.min(props.registers_per_multiprocessor / (info.registers * threads));
    }
    if smem_per_block > 0 {
        blocks = blocks.min(props.shared_mem_per_multiprocessor / smem_per_block);
    }
    blocks
}

/// Grid covering `problem_size` elements with ceiling division, spilling
/// into the second grid dimension past the device's per-dimension limit.
fn grid_covering(problem_size: usize, block: u32, props: &DeviceProperties) -> (u32, u32, u32) {
    let blocks = problem_size.div_ceil(block as usize).max(1);
    let limit = props.max_grid_dim_x.max(1) as usize;

    if blocks <= limit {
        (blocks as u32, 1, 1)
    } else {
        let rows = blocks.div_ceil(limit);
        let cols = blocks.div_ceil(rows);
        (cols as u32, rows as u32, 1)
    }
}

/// Achieved occupancy for a block size, in percent of the warp ceiling.
fn occupancy_pct(
    info: &FunctionRuntimeInfo,
    props: &DeviceProperties,
    threads: u32,
    dynamic_smem: DynamicSharedMemory,
) -> u32 {
    resident_warps(info, props, threads, dynamic_smem) * 100 / props.max_warps_per_multiprocessor()
}
