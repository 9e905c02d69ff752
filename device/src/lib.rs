//! Device-facing half of the iskra kernel cache.
//!
//! Provides compute-capability identification, queried device properties,
//! the execution-context seam, and the per-entry module registry that fans
//! one compiled binary out to many contexts.
//!
//! Execution contexts are externally owned: this crate loads modules into
//! them and reacts to their teardown, but never creates or destroys one.

pub mod capability;
pub mod context;
pub mod error;
pub mod module;
pub mod properties;

#[cfg(any(test, feature = "test-support"))]
pub mod test;

pub use capability::DeviceCapability;
#[cfg(feature = "cuda")]
pub use context::CudaExecutionContext;
pub use context::{ContextId, ExecutionContext};
pub use error::*;
pub use module::{FunctionRuntimeInfo, LoadedModule, ModuleHandle, ModuleRegistry};
pub use properties::DeviceProperties;
