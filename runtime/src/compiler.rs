//! Device-compiler seam and the background compile task.
//!
//! One compile task runs per cache miss, as its own named thread, so program
//! execution is never serialized behind the device toolchain. The task is
//! the single producer of its entry's future: it promotes the entry, writes
//! the persistent record, and only then wakes the waiters. On failure it
//! evicts the entry so a later request may retry.

use std::sync::Arc;
use std::thread;

use tracing::{debug, warn};

use iskra_device::DeviceCapability;

use crate::cache::{CacheEntry, CacheShared, CompileOutcome, CompiledBinary};
use crate::error::Error;
use crate::future::Promise;

/// A compiler that turns generated device source into a loadable binary
/// image.
///
/// The invocation contract is fixed: source text, entry symbol, and a flag
/// set derived from the target capability. Implementations must be safe to
/// call from any thread; the cache invokes them from its compile tasks.
pub trait Compiler: Send + Sync {
    fn compile(&self, source: &str, entry: &str, capability: DeviceCapability) -> Result<Vec<u8>, CompileFailure>;
}

/// Terminal outcome of a rejected compile, cloned to every waiter.
#[derive(Debug, Clone)]
pub struct CompileFailure {
    /// The compiler's diagnostic log.
    pub log: String,
    /// The offending generated source, kept for postmortem.
    pub source_text: String,
}

impl From<CompileFailure> for Error {
    fn from(failure: CompileFailure) -> Self {
        Error::CompileFailed { log: failure.log, source_text: failure.source_text }
    }
}

/// Compile profile: optimized for production, debug when inspecting
/// generated kernels with device tooling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompileProfile {
    #[default]
    Optimized,
    /// Device debug info, no optimization, retained build products.
    Debug,
}

impl CompileProfile {
    /// Profile selected by `ISKRA_DEBUG_CUDA`.
    pub fn from_env() -> Self {
        if std::env::var_os("ISKRA_DEBUG_CUDA").is_some() { Self::Debug } else { Self::Optimized }
    }
}

/// Driver for one in-flight compilation.
pub(crate) struct AsyncCompiler;

impl AsyncCompiler {
    /// Launch the background compile task for a freshly inserted Pending
    /// entry. Called exactly once per cache miss, by the caller whose insert
    /// won.
    pub(crate) fn spawn(
        shared: Arc<CacheShared>,
        entry: Arc<CacheEntry>,
        promise: Promise<CompileOutcome>,
        source: String,
    ) {
        let key = entry.key();
        thread::Builder::new()
            .name(format!("iskra-compile-{:016x}", key.source_hash))
            .spawn(move || {
                debug!(kernel.entry = %entry.entry_name(), key = %key, "compile started");

                match shared.compiler.compile(&source, entry.entry_name(), key.capability) {
                    Ok(image) => {
                        let binary = Arc::new(CompiledBinary::new(key, image));
                        entry.promote(Arc::clone(&binary));
                        if let Some(store) = &shared.store
                            && let Err(error) = store.insert(key, entry.entry_name(), binary.image())
                        {
                            warn!(key = %key, %error, "failed to persist compiled binary");
                        }
                        debug!(key = %key, image.bytes = binary.image().len(), "compile finished");
                        promise.complete(Ok(binary));
                    }
                    Err(failure) => {
                        warn!(key = %key, "compile failed:\n{}", failure.log);
                        shared.evict_failed(key, &entry);
                        promise.complete(Err(failure));
                    }
                }
            })
            .expect("failed to spawn compile thread");
    }
}
