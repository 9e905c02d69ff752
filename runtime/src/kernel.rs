//! Kernel-build driver: thin composition of cache, registry, and planner.
//!
//! The front end hands over a request record per kernel-requiring operation
//! node; this driver keys it, resolves it through the cache and the active
//! context's module registry, plans the launch, and returns an opaque handle
//! the execution layer can launch. It performs no caching of its own.

use std::sync::Arc;

use tracing::debug;

use iskra_device::{ExecutionContext, LoadedModule};

use crate::cache::{CompilationCache, CompiledBinary};
use crate::error::Result;
use crate::key::CompileKey;
use crate::occupancy::{self, DynamicSharedMemory, LaunchConfig};

/// How a free variable of the generated kernel is bound in the front end's
/// environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    /// Device-resident array, marshaled as a buffer argument at launch.
    Array,
    /// Host scalar embedded per launch.
    Scalar,
}

/// A free variable the generated source closes over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FreeVar {
    pub name: String,
    pub binding: Binding,
}

impl FreeVar {
    pub fn array(name: impl Into<String>) -> Self {
        Self { name: name.into(), binding: Binding::Array }
    }

    pub fn scalar(name: impl Into<String>) -> Self {
        Self { name: name.into(), binding: Binding::Scalar }
    }
}

/// Request record produced by the front-end compiler pass for one
/// kernel-requiring operation node.
#[derive(Debug, Clone)]
pub struct KernelRequest {
    /// Generated device source text.
    pub source: String,
    /// Logical entry symbol.
    pub entry: String,
    /// Free-variable environment descriptor.
    pub free_vars: Vec<FreeVar>,
    /// Elements the launch must cover, typically the driving array's size.
    pub problem_size: usize,
    /// Dynamic shared-memory need of the generated kernel.
    pub dynamic_smem: DynamicSharedMemory,
}

/// Opaque built-kernel handle: entry name, loaded function, owning module,
/// and launch configuration. Only ever returned fully valid.
pub struct BuiltKernel {
    entry: String,
    binary: Arc<CompiledBinary>,
    module: Arc<LoadedModule>,
    launch: LaunchConfig,
    free_vars: Vec<FreeVar>,
}

impl BuiltKernel {
    pub fn entry(&self) -> &str {
        &self.entry
    }

    pub fn binary(&self) -> &Arc<CompiledBinary> {
        &self.binary
    }

    pub fn module(&self) -> &Arc<LoadedModule> {
        &self.module
    }

    pub fn launch(&self) -> LaunchConfig {
        self.launch
    }

    pub fn free_vars(&self) -> &[FreeVar] {
        &self.free_vars
    }

    /// Names of the device arrays the execution layer must marshal, in
    /// environment order.
    pub fn array_arguments(&self) -> impl Iterator<Item = &str> {
        self.free_vars.iter().filter(|var| var.binding == Binding::Array).map(|var| var.name.as_str())
    }

    /// Resolve `name` as a device-array binding.
    ///
    /// # Panics
    ///
    /// Panics when the variable is missing or bound to a non-array: the
    /// front end handed this kernel a malformed environment, which is a bug
    /// in the caller, not a runtime condition to recover from.
    pub fn expect_array(&self, name: &str) -> &FreeVar {
        let var = self
            .free_vars
            .iter()
            .find(|var| var.name == name)
            .unwrap_or_else(|| panic!("free variable '{name}' is not in the kernel environment"));
        match var.binding {
            Binding::Array => var,
            Binding::Scalar => panic!("free variable '{name}' does not name a device array"),
        }
    }
}

/// Build a launchable kernel for `request` under `ctx`.
///
/// Composes the cache (at most one compile per key), the entry's module
/// registry (at most one link per context), and the occupancy planner. The
/// call blocks only if it is the first to need a still-compiling binary.
pub fn build_kernel(
    cache: &CompilationCache,
    ctx: &dyn ExecutionContext,
    request: &KernelRequest,
) -> Result<BuiltKernel> {
    let props = ctx.properties();
    let key = CompileKey::of_source(props.capability, &request.source);

    let entry = cache.obtain_or_compile(key, &request.source, &request.entry);
    let binary = entry.binary()?;
    let module = entry.resolve(ctx)?;

    let info = module.info();
    let launch = occupancy::plan(&info, props, request.problem_size, request.dynamic_smem);

    debug!(
        kernel.entry = %request.entry,
        key = %key,
        registers = info.registers,
        shared_mem = launch.shared_mem_bytes,
        block = ?launch.block_dim,
        grid = ?launch.grid_dim,
        occupancy = launch.occupancy_pct,
        "kernel ready"
    );

    Ok(BuiltKernel {
        entry: request.entry.clone(),
        binary,
        module,
        launch,
        free_vars: request.free_vars.clone(),
    })
}
