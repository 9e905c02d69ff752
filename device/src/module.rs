//! Loaded device modules and the per-entry module registry.
//!
//! A compiled binary is valid on every device of its capability, but a
//! *module* is only valid inside the context it was linked into. The
//! registry therefore fans one binary out to at most one module per context:
//! re-linking per context is unavoidable, re-compiling never happens here.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::context::{ContextId, ExecutionContext};
use crate::error::Result;

/// Resource footprint of a linked device function, queried once at link
/// time and cached alongside the module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FunctionRuntimeInfo {
    pub registers: u32,
    pub shared_mem_bytes: u32,
    pub local_mem_bytes: u32,
    pub const_mem_bytes: u32,
    pub max_threads_per_block: u32,
}

/// Driver-level module handle.
///
/// Dropping the handle unloads the module. Implementations keep their owning
/// context alive internally, so a handle never outlives its context and a
/// context teardown observed through the registry never double-frees.
pub trait ModuleHandle: Send + Sync {
    /// Entry symbol this module was linked for.
    fn entry(&self) -> &str;
}

/// A module linked into one execution context.
pub struct LoadedModule {
    handle: Box<dyn ModuleHandle>,
    /// Non-owning back-reference to the owning context.
    context: ContextId,
    info: FunctionRuntimeInfo,
}

impl LoadedModule {
    pub fn new(handle: Box<dyn ModuleHandle>, context: ContextId, info: FunctionRuntimeInfo) -> Self {
        Self { handle, context, info }
    }

    /// Identity of the context this module is linked into.
    pub fn context(&self) -> ContextId {
        self.context
    }

    pub fn entry(&self) -> &str {
        self.handle.entry()
    }

    pub fn info(&self) -> FunctionRuntimeInfo {
        self.info
    }

    pub fn handle(&self) -> &dyn ModuleHandle {
        &*self.handle
    }
}

impl fmt::Debug for LoadedModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedModule")
            .field("entry", &self.entry())
            .field("context", &self.context)
            .field("info", &self.info)
            .finish()
    }
}

/// Context-scoped table of loaded modules for one compiled binary.
///
/// There is intentionally no upper bound on the number of contexts sharing
/// one binary. Identity is driven by the owning cache entry's key, never by
/// module identity.
#[derive(Default)]
pub struct ModuleRegistry {
    modules: Mutex<HashMap<ContextId, Arc<LoadedModule>>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Module for `ctx`, linking `image` on first use within that context.
    pub fn resolve(&self, ctx: &dyn ExecutionContext, image: &[u8], entry: &str) -> Result<Arc<LoadedModule>> {
        let mut modules = self.modules.lock();
        if let Some(module) = modules.get(&ctx.id()) {
            return Ok(Arc::clone(module));
        }

        let module = Arc::new(ctx.load_module(image, entry)?);
        debug!(
            module.entry = %entry,
            context = %ctx.id(),
            registers = module.info().registers,
            shared_mem = module.info().shared_mem_bytes,
            "linked module into context"
        );
        modules.insert(ctx.id(), Arc::clone(&module));
        Ok(module)
    }

    /// Drop the module bound to a torn-down context, if any.
    ///
    /// Returns whether a module was actually released. The driver resources
    /// are freed when the last strong holder of the module drops, which is
    /// this registry unless a built-kernel handle is still outstanding.
    pub fn release_context(&self, id: ContextId) -> bool {
        self.modules.lock().remove(&id).is_some()
    }

    /// Number of contexts currently holding a module for this entry.
    pub fn context_count(&self) -> usize {
        self.modules.lock().len()
    }
}
