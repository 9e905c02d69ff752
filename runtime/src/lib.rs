//! Kernel compilation, linking, and caching for a GPU array-computation
//! backend.
//!
//! A front-end pass lowers array programs into device source fragments; this
//! crate turns each fragment into a loaded, launchable module exactly once
//! per distinct source body and device capability:
//!
//! - [`cache`]: content-addressed compilation cache (capability × source
//!   hash), shared across execution contexts, never evicting successes.
//! - [`compiler`]: the device-compiler seam and the per-miss background
//!   compile task; callers block only at first real use of a binary.
//! - [`occupancy`]: pure launch planning from function footprint and device
//!   limits.
//! - [`disk`]: restart-surviving persistent mirror of the cache.
//! - [`kernel`]: the thin build driver composing the above into an opaque
//!   built-kernel handle.

pub mod cache;
pub mod compiler;
pub mod disk;
pub mod error;
pub mod future;
pub mod headers;
pub mod kernel;
pub mod key;
pub mod nvcc;
#[cfg(feature = "cuda")]
pub mod nvrtc;
pub mod occupancy;

#[cfg(test)]
pub mod test;

pub use cache::{CacheEntry, CompilationCache, CompiledBinary};
pub use compiler::{CompileFailure, CompileProfile, Compiler};
pub use disk::{DiskStore, PersistentRecord};
pub use error::*;
pub use kernel::{Binding, BuiltKernel, FreeVar, KernelRequest, build_kernel};
pub use key::CompileKey;
pub use nvcc::NvccCompiler;
#[cfg(feature = "cuda")]
pub use nvrtc::NvrtcCompiler;
pub use occupancy::{DynamicSharedMemory, LaunchConfig, plan};
