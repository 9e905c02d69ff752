//! Execution-context seam.
//!
//! Execution contexts are owned by the embedding runtime, never by this
//! crate: modules are loaded into them on demand and released again when the
//! owner announces teardown. The trait keeps the cache independent of the
//! concrete driver, which also makes registry and cache behavior testable
//! without a device.

use std::fmt;

use crate::error::Result;
use crate::module::LoadedModule;
use crate::properties::DeviceProperties;

/// Identity of one execution context.
///
/// Loaded modules hold this as a non-owning back-reference: it names the
/// context a module was linked into without keeping that context alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContextId(u64);

impl ContextId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx#{}", self.0)
    }
}

/// An externally owned execution context, as seen by the kernel cache.
pub trait ExecutionContext: Send + Sync {
    /// Stable identity used to key per-context module registries.
    fn id(&self) -> ContextId;

    /// Properties of the device this context is bound to.
    fn properties(&self) -> &DeviceProperties;

    /// Link a compiled binary image into this context and resolve `entry`.
    ///
    /// Implementations query the function's resource footprint at link time
    /// and must keep the underlying driver context alive for the lifetime of
    /// the returned module, so a module handle can never dangle past its
    /// context.
    fn load_module(&self, image: &[u8], entry: &str) -> Result<LoadedModule>;
}

#[cfg(feature = "cuda")]
mod cuda {
    //! CUDA driver implementation of the execution-context seam.

    use std::sync::Arc;
    use std::sync::atomic::{AtomicU64, Ordering};

    use cudarc::driver::{CudaContext, CudaModule};
    use snafu::ResultExt;

    use crate::context::{ContextId, ExecutionContext};
    use crate::error::{DriverSnafu, Result};
    use crate::module::{FunctionRuntimeInfo, LoadedModule, ModuleHandle};
    use crate::properties::DeviceProperties;

    /// Process-unique context identities.
    static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

    /// Execution context backed by a CUDA driver context.
    pub struct CudaExecutionContext {
        context: Arc<CudaContext>,
        id: ContextId,
        properties: DeviceProperties,
    }

    impl CudaExecutionContext {
        /// Wrap a driver context, querying device properties once.
        pub fn new(context: Arc<CudaContext>) -> Result<Self> {
            let properties = DeviceProperties::query(&context)?;
            let id = ContextId::new(NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed));
            Ok(Self { context, id, properties })
        }

        pub fn cuda_context(&self) -> &Arc<CudaContext> {
            &self.context
        }
    }

    /// Driver module handle; keeps the module (and transitively its context)
    /// alive until dropped.
    struct CudaModuleHandle {
        _module: Arc<CudaModule>,
        entry: String,
    }

    impl ModuleHandle for CudaModuleHandle {
        fn entry(&self) -> &str {
            &self.entry
        }
    }

    impl ExecutionContext for CudaExecutionContext {
        fn id(&self) -> ContextId {
            self.id
        }

        fn properties(&self) -> &DeviceProperties {
            &self.properties
        }

        fn load_module(&self, image: &[u8], entry: &str) -> Result<LoadedModule> {
            use cudarc::driver::sys::CUfunction_attribute::*;

            let ptx = cudarc::nvrtc::Ptx::from_src(String::from_utf8_lossy(image));
            let module = self.context.load_module(ptx).context(DriverSnafu)?;
            let function = module.load_function(entry).context(DriverSnafu)?;

            let info = FunctionRuntimeInfo {
                registers: function.attribute(CU_FUNC_ATTRIBUTE_NUM_REGS).context(DriverSnafu)? as u32,
                shared_mem_bytes: function.attribute(CU_FUNC_ATTRIBUTE_SHARED_SIZE_BYTES).context(DriverSnafu)?
                    as u32,
                local_mem_bytes: function.attribute(CU_FUNC_ATTRIBUTE_LOCAL_SIZE_BYTES).context(DriverSnafu)? as u32,
                const_mem_bytes: function.attribute(CU_FUNC_ATTRIBUTE_CONST_SIZE_BYTES).context(DriverSnafu)? as u32,
                max_threads_per_block: function
                    .attribute(CU_FUNC_ATTRIBUTE_MAX_THREADS_PER_BLOCK)
                    .context(DriverSnafu)? as u32,
            };

            Ok(LoadedModule::new(
                Box::new(CudaModuleHandle { _module: module, entry: entry.to_string() }),
                self.id,
                info,
            ))
        }
    }
}

#[cfg(feature = "cuda")]
pub use cuda::CudaExecutionContext;
